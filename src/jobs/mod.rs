pub mod models;
pub mod naming;
pub mod pipeline;
pub mod table;
pub mod worker;

pub use models::{JobSnapshot, JobStatus, Manifest};
pub use pipeline::JobPipeline;
pub use table::JobTable;
pub use worker::{job_channel, JobSender, QueueWorker, QueuedJob};
