//! Process-wide table of jobs.
//!
//! Entries are never evicted; completed jobs stay readable for the process
//! lifetime. Memory grows with submissions, which is accepted for this
//! service.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use uuid::Uuid;

use super::models::{JobSnapshot, JobState};

/// Shared handle to one job's mutable state. All mutation happens from the
/// single pipeline task executing that job; readers only take the lock long
/// enough to copy a snapshot out.
pub type SharedJobState = Arc<Mutex<JobState>>;

/// Mapping from job id to state. Cloned handles share the same table.
#[derive(Clone, Default)]
pub struct JobTable {
    jobs: Arc<RwLock<HashMap<String, SharedJobState>>>,
}

impl JobTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a fresh queued job and return its generated id with the state
    /// handle.
    pub fn create(&self) -> (String, SharedJobState) {
        let job_id = Uuid::new_v4().to_string();
        let state = Arc::new(Mutex::new(JobState::new()));
        self.jobs
            .write()
            .unwrap()
            .insert(job_id.clone(), state.clone());
        (job_id, state)
    }

    pub fn get(&self, job_id: &str) -> Option<SharedJobState> {
        self.jobs.read().unwrap().get(job_id).cloned()
    }

    /// Point-in-time snapshot of a job, or `None` for unknown ids.
    pub fn snapshot(&self, job_id: &str) -> Option<JobSnapshot> {
        self.get(job_id)
            .map(|state| state.lock().unwrap().snapshot())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::models::JobStatus;

    #[test]
    fn create_returns_unique_ids() {
        let table = JobTable::new();
        let (a, _) = table.create();
        let (b, _) = table.create();
        assert_ne!(a, b);
    }

    #[test]
    fn get_returns_the_created_state() {
        let table = JobTable::new();
        let (job_id, state) = table.create();
        state.lock().unwrap().total = 7;

        let fetched = table.get(&job_id).unwrap();
        assert_eq!(fetched.lock().unwrap().total, 7);
    }

    #[test]
    fn unknown_id_yields_none() {
        let table = JobTable::new();
        assert!(table.get("nope").is_none());
        assert!(table.snapshot("nope").is_none());
    }

    #[test]
    fn snapshot_reflects_current_state() {
        let table = JobTable::new();
        let (job_id, state) = table.create();

        let before = table.snapshot(&job_id).unwrap();
        assert_eq!(before.status, JobStatus::Queued);

        state.lock().unwrap().fail("broken");
        let after = table.snapshot(&job_id).unwrap();
        assert_eq!(after.status, JobStatus::Failed);
        assert!(after.done);
    }
}
