//! Runtime settings derived from the command line.

use std::path::PathBuf;

/// How tagged files leave the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum DeliveryMode {
    /// Hand each tagged file to the music-service upload client.
    Upload,
    /// Bundle all tagged files into one downloadable zip.
    Archive,
}

impl std::fmt::Display for DeliveryMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeliveryMode::Upload => write!(f, "upload"),
            DeliveryMode::Archive => write!(f, "archive"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub port: u16,
    pub delivery_mode: DeliveryMode,
    /// Browser-auth headers file for the upload client. Required in upload
    /// mode; jobs fail fast without it.
    pub auth_headers_path: Option<PathBuf>,
    /// Timeout for media fetches and uploads, in seconds.
    pub request_timeout_sec: u64,
    /// Frontend directory served statically at the root, if any.
    pub frontend_dir_path: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            port: 8080,
            delivery_mode: DeliveryMode::Upload,
            auth_headers_path: None,
            request_timeout_sec: 300,
            frontend_dir_path: None,
        }
    }
}
