use axum::extract::FromRef;
use std::time::Instant;

use crate::jobs::{JobSender, JobTable};

use super::ServerConfig;

#[derive(Clone)]
pub struct ServerState {
    pub config: ServerConfig,
    pub start_time: Instant,
    pub job_table: JobTable,
    pub job_sender: JobSender,
}

impl ServerState {
    pub fn new(config: ServerConfig, job_table: JobTable, job_sender: JobSender) -> ServerState {
        ServerState {
            config,
            start_time: Instant::now(),
            job_table,
            job_sender,
        }
    }
}

impl FromRef<ServerState> for JobTable {
    fn from_ref(input: &ServerState) -> Self {
        input.job_table.clone()
    }
}

impl FromRef<ServerState> for JobSender {
    fn from_ref(input: &ServerState) -> Self {
        input.job_sender.clone()
    }
}

impl FromRef<ServerState> for ServerConfig {
    fn from_ref(input: &ServerState) -> Self {
        input.config.clone()
    }
}
