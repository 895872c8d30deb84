use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, level_filters::LevelFilter, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod config;
use config::{DeliveryMode, Settings};

mod delivery;
use delivery::{UploadClient, YtMusicUploader};

mod fetch;
use fetch::HttpFetcher;

mod jobs;
use jobs::{job_channel, JobPipeline, JobTable, QueueWorker};

mod server;
use server::{run_server, ServerConfig};

mod tagging;
use tagging::Mp4TagWriter;

/// How long shutdown waits for the worker to wind down before giving up.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

#[derive(Parser, Debug)]
struct CliArgs {
    /// The port to listen on.
    #[clap(short, long, default_value_t = 8080)]
    pub port: u16,

    /// How tagged tracks are delivered.
    #[clap(long, value_enum, default_value_t = DeliveryMode::Upload)]
    pub delivery: DeliveryMode,

    /// Path to the browser-auth headers JSON file for the upload client.
    /// Without it, upload-mode jobs fail before touching the network.
    #[clap(long)]
    pub auth_headers: Option<PathBuf>,

    /// Timeout in seconds for media fetches and uploads.
    #[clap(long, default_value_t = 300)]
    pub request_timeout_sec: u64,

    /// Path to the frontend directory to be statically served.
    #[clap(long)]
    pub frontend_dir_path: Option<String>,
}

impl CliArgs {
    fn into_settings(self) -> Settings {
        Settings {
            port: self.port,
            delivery_mode: self.delivery,
            auth_headers_path: self.auth_headers,
            request_timeout_sec: self.request_timeout_sec,
            frontend_dir_path: self.frontend_dir_path,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let settings = CliArgs::parse().into_settings();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .with_env_var("LOG_LEVEL")
                .from_env_lossy(),
        )
        .try_init()
        .unwrap();

    let fetcher = Arc::new(
        HttpFetcher::new(settings.request_timeout_sec).context("Failed to create fetcher")?,
    );

    let uploader: Option<Arc<dyn UploadClient>> = match (&settings.delivery_mode, &settings.auth_headers_path) {
        (DeliveryMode::Upload, Some(path)) => {
            info!("Upload client configured with auth headers from {:?}", path);
            let uploader = YtMusicUploader::from_auth_file(path, settings.request_timeout_sec)
                .context("Failed to load upload auth headers")?;
            Some(Arc::new(uploader))
        }
        (DeliveryMode::Upload, None) => {
            warn!("No auth headers file configured; upload jobs will fail immediately");
            None
        }
        (DeliveryMode::Archive, _) => None,
    };

    let pipeline = Arc::new(JobPipeline::new(
        fetcher,
        Arc::new(Mp4TagWriter),
        uploader,
        settings.delivery_mode,
    ));

    let job_table = JobTable::new();
    let (job_sender, job_receiver) = job_channel();

    let shutdown = CancellationToken::new();
    let worker = QueueWorker::new(job_table.clone(), pipeline, job_receiver);
    let worker_handle = tokio::spawn(worker.run(shutdown.clone()));

    let server_config = ServerConfig {
        port: settings.port,
        delivery_mode: settings.delivery_mode,
        frontend_dir_path: settings.frontend_dir_path.clone(),
    };

    info!(
        "Starting in {} mode on port {}",
        settings.delivery_mode, settings.port
    );

    let server_shutdown = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutdown signal received");
            server_shutdown.cancel();
        }
    });

    let result = run_server(server_config, job_table, job_sender, shutdown.clone()).await;

    // The worker may still be mid-pipeline; cancel it and wait, bounded.
    shutdown.cancel();
    if tokio::time::timeout(SHUTDOWN_GRACE, worker_handle)
        .await
        .is_err()
    {
        warn!("Queue worker did not stop within {:?}", SHUTDOWN_GRACE);
    }

    result
}
