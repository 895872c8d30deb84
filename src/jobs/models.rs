//! Data models for the job subsystem.
//!
//! Defines the submitted manifest payload, the mutable per-job state and its
//! serializable snapshot view.

use serde::{Deserialize, Serialize};
use tracing::info;

/// Number of trailing log lines exposed by a snapshot. The in-memory log is
/// unbounded; only reads are truncated.
pub const SNAPSHOT_LOG_WINDOW: usize = 200;

/// Lifecycle status of a job. Transitions are one-directional:
/// Queued -> Running -> Completed | Failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    /// Returns true if this is a terminal state (Completed or Failed).
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

/// Submitted playlist manifest. Field names on the wire follow the source
/// catalogue's export format.
#[derive(Debug, Clone, Deserialize)]
pub struct Manifest {
    #[serde(rename = "Cookie")]
    pub cookie: String,
    #[serde(rename = "BaseURL")]
    pub base_url: String,
    #[serde(rename = "PlayListsTracks")]
    pub tracks: Vec<TrackDescriptor>,
    #[serde(rename = "AlbumArt", default)]
    pub album_art_url: Option<String>,
}

/// One track entry in the manifest.
#[derive(Debug, Clone, Deserialize)]
pub struct TrackDescriptor {
    /// Relative media path on the remote host, e.g. `/abc123.mp4`.
    #[serde(rename = "m4a")]
    pub media_path: String,
    #[serde(rename = "workName")]
    pub work_name: String,
    pub title: String,
    pub artist: String,
    pub album: AlbumDescriptor,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AlbumDescriptor {
    /// Combined `<album title>（<album artist>）` string.
    #[serde(rename = "cataloguename")]
    pub catalogue_name: String,
}

/// Mutable record of one job's progress. Mutated only by the pipeline
/// executing the job; read concurrently through [`JobState::snapshot`].
#[derive(Debug)]
pub struct JobState {
    pub status: JobStatus,
    /// Count of tracks fully delivered so far. Monotonically non-decreasing,
    /// never exceeds `total`.
    pub progress: usize,
    /// Track count of the manifest, fixed once the job starts.
    pub total: usize,
    /// Append-only human-readable log.
    pub logs: Vec<String>,
    pub done: bool,
    pub error: Option<String>,
    /// Files handed to the upload client (upload variant).
    pub uploaded: usize,
    /// Finished zip blob (archive variant). Never exposed in snapshots.
    pub archive: Option<Vec<u8>>,
}

impl JobState {
    pub fn new() -> Self {
        Self {
            status: JobStatus::Queued,
            progress: 0,
            total: 0,
            logs: Vec::new(),
            done: false,
            error: None,
            uploaded: 0,
            archive: None,
        }
    }

    /// Append a log line, mirrored to the server log.
    pub fn log(&mut self, message: impl Into<String>) {
        let message = message.into();
        info!("{}", message);
        self.logs.push(message);
    }

    /// Mark the job failed with a terminal error message.
    pub fn fail(&mut self, message: impl Into<String>) {
        let message = message.into();
        self.status = JobStatus::Failed;
        self.error = Some(message.clone());
        self.done = true;
        self.log(format!("Job failed: {}", message));
    }

    /// Point-in-time copy of the reportable fields. Truncates the log to the
    /// trailing [`SNAPSHOT_LOG_WINDOW`] entries, never mutates the state.
    pub fn snapshot(&self) -> JobSnapshot {
        let log_start = self.logs.len().saturating_sub(SNAPSHOT_LOG_WINDOW);
        JobSnapshot {
            progress: self.progress,
            total: self.total,
            done: self.done,
            error: self.error.clone(),
            uploaded: self.uploaded,
            status: self.status,
            logs: self.logs[log_start..].to_vec(),
        }
    }
}

impl Default for JobState {
    fn default() -> Self {
        Self::new()
    }
}

/// Serializable point-in-time view of a [`JobState`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobSnapshot {
    pub progress: usize,
    pub total: usize,
    pub done: bool,
    pub error: Option<String>,
    pub uploaded: usize,
    pub status: JobStatus,
    pub logs: Vec<String>,
}

impl JobSnapshot {
    /// A job is terminal once done or once an error is recorded.
    pub fn is_terminal(&self) -> bool {
        self.done || self.error.is_some()
    }
}
