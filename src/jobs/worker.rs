//! Single-consumer queue worker.
//!
//! Serializes job execution: one pipeline run at a time, process-wide. This
//! bounds resource usage (connections, temp files) at the cost of
//! throughput.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::models::Manifest;
use super::pipeline::JobPipeline;
use super::table::JobTable;

/// One enqueued submission waiting for the worker.
pub struct QueuedJob {
    pub job_id: String,
    pub manifest: Manifest,
}

pub type JobSender = mpsc::UnboundedSender<QueuedJob>;

/// Creates the submission channel shared between handlers and the worker.
pub fn job_channel() -> (JobSender, mpsc::UnboundedReceiver<QueuedJob>) {
    mpsc::unbounded_channel()
}

/// Dequeues one job at a time and runs the pipeline to completion before
/// taking the next.
pub struct QueueWorker {
    table: JobTable,
    pipeline: Arc<JobPipeline>,
    receiver: mpsc::UnboundedReceiver<QueuedJob>,
}

impl QueueWorker {
    pub fn new(
        table: JobTable,
        pipeline: Arc<JobPipeline>,
        receiver: mpsc::UnboundedReceiver<QueuedJob>,
    ) -> Self {
        Self {
            table,
            pipeline,
            receiver,
        }
    }

    /// Main worker loop - call from a spawned task.
    ///
    /// Cancelling `shutdown` stops the loop between jobs and drops any
    /// in-flight pipeline run; the interrupted job keeps whatever state it
    /// last reached.
    pub async fn run(mut self, shutdown: CancellationToken) {
        info!("Queue worker starting");

        loop {
            let queued = tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Queue worker shutting down");
                    break;
                }
                item = self.receiver.recv() => match item {
                    Some(queued) => queued,
                    None => {
                        debug!("Submission channel closed");
                        break;
                    }
                },
            };

            // A dequeued id without a table entry should not normally
            // happen; skip it silently.
            let Some(state) = self.table.get(&queued.job_id) else {
                continue;
            };

            state
                .lock()
                .unwrap()
                .log(format!("Dequeued job {} for processing", queued.job_id));

            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!(
                        "Queue worker cancelled while processing job {}",
                        queued.job_id
                    );
                    break;
                }
                _ = self.pipeline.process(&queued.job_id, &queued.manifest, &state) => {}
            }
        }

        info!("Queue worker stopped");
    }
}
