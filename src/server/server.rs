use anyhow::Result;
use std::{convert::Infallible, time::Duration};

use tracing::{info, warn};

use axum::{
    body::Body,
    extract::{Path, State},
    http::{header, StatusCode},
    middleware,
    response::sse::{Event, KeepAlive, Sse},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use tower_http::services::ServeDir;

use crate::jobs::table::SharedJobState;
use crate::jobs::{JobSender, JobSnapshot, JobStatus, JobTable, Manifest, QueuedJob};

use super::{cors, log_requests, state::ServerState, ServerConfig};

#[derive(Serialize)]
struct ServerStats {
    pub uptime: String,
    pub delivery_mode: String,
}

fn format_uptime(duration: Duration) -> String {
    let total_seconds = duration.as_secs();

    let days = total_seconds / 86_400;
    let hours = (total_seconds % 86_400) / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    format!("{}d {:02}:{:02}:{:02}", days, hours, minutes, seconds)
}

#[derive(Serialize)]
struct StartJobResponse {
    job_id: String,
    status: JobStatus,
}

fn invalid_job_id() -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(serde_json::json!({"error": "Invalid job ID"})),
    )
        .into_response()
}

async fn home(State(state): State<ServerState>) -> impl IntoResponse {
    let stats = ServerStats {
        uptime: format_uptime(state.start_time.elapsed()),
        delivery_mode: state.config.delivery_mode.to_string(),
    };
    Json(stats)
}

/// Create the job, enqueue it and return. Execution happens later on the
/// worker; the response time does not depend on the track count.
async fn start_job(State(state): State<ServerState>, Json(manifest): Json<Manifest>) -> Response {
    let (job_id, job_state) = state.job_table.create();
    info!("Received /start request, assigned job_id={}", job_id);

    job_state
        .lock()
        .unwrap()
        .log(format!("Queued job {}", job_id));

    let queued = QueuedJob {
        job_id: job_id.clone(),
        manifest,
    };
    if state.job_sender.send(queued).is_err() {
        // Only possible while shutting down.
        job_state.lock().unwrap().fail("Job queue is not running");
    }

    let status = job_state.lock().unwrap().status;
    Json(StartJobResponse { job_id, status }).into_response()
}

async fn get_progress(State(table): State<JobTable>, Path(job_id): Path<String>) -> Response {
    match table.snapshot(&job_id) {
        Some(snapshot) => Json(snapshot).into_response(),
        None => invalid_job_id(),
    }
}

/// Once-per-second diffing snapshot stream. Identical consecutive snapshots
/// are not re-sent; the stream ends after the terminal snapshot has been
/// emitted. Dropping the connection drops the stream.
pub fn progress_event_stream(
    state: SharedJobState,
) -> impl tokio_stream::Stream<Item = Result<Event, Infallible>> {
    async_stream::stream! {
        let mut ticker = tokio::time::interval(Duration::from_secs(1));
        let mut last_payload: Option<String> = None;

        loop {
            ticker.tick().await;

            let snapshot: JobSnapshot = state.lock().unwrap().snapshot();
            let terminal = snapshot.is_terminal();

            match serde_json::to_string(&snapshot) {
                Ok(payload) => {
                    if last_payload.as_deref() != Some(payload.as_str()) {
                        yield Ok(Event::default().event("progress").data(&payload));
                        last_payload = Some(payload);
                    }
                }
                Err(err) => {
                    warn!("Failed to serialize job snapshot: {}", err);
                }
            }

            if terminal {
                break;
            }
        }
    }
}

async fn stream_progress(State(table): State<JobTable>, Path(job_id): Path<String>) -> Response {
    let Some(state) = table.get(&job_id) else {
        return invalid_job_id();
    };

    let stream = progress_event_stream(state);
    let mut response = Sse::new(stream)
        .keep_alive(
            KeepAlive::new()
                .interval(Duration::from_secs(15))
                .text("keep-alive"),
        )
        .into_response();
    response.headers_mut().insert(
        header::CACHE_CONTROL,
        header::HeaderValue::from_static("no-cache"),
    );
    response
}

/// Archive-variant download. Answers 404 until the job is done and an
/// archive blob exists.
async fn download_archive(State(table): State<JobTable>, Path(job_id): Path<String>) -> Response {
    let Some(state) = table.get(&job_id) else {
        return invalid_job_id();
    };

    let archive = {
        let state = state.lock().unwrap();
        if state.done {
            state.archive.clone()
        } else {
            None
        }
    };

    match archive {
        Some(blob) => Response::builder()
            .status(StatusCode::OK)
            .header(header::CONTENT_TYPE, "application/zip")
            .header(
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"tracks-{}.zip\"", job_id),
            )
            .body(Body::from(blob))
            .unwrap(),
        None => (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({"error": "Archive not ready"})),
        )
            .into_response(),
    }
}

fn make_app(config: ServerConfig, job_table: JobTable, job_sender: JobSender) -> Router {
    let state = ServerState::new(config.clone(), job_table, job_sender);

    let api_routes: Router = Router::new()
        .route("/start", post(start_job))
        .route("/progress/{job_id}", get(get_progress))
        .route("/progress-stream/{job_id}", get(stream_progress))
        .route("/download/{job_id}", get(download_archive))
        .with_state(state.clone());

    let home_router: Router = match config.frontend_dir_path {
        Some(frontend_path) => {
            let static_files_service =
                ServeDir::new(frontend_path).append_index_html_on_directories(true);
            Router::new().fallback_service(static_files_service)
        }
        None => Router::new().route("/", get(home)).with_state(state),
    };

    home_router
        .merge(api_routes)
        .layer(middleware::from_fn(cors))
        .layer(middleware::from_fn(log_requests))
}

pub async fn run_server(
    config: ServerConfig,
    job_table: JobTable,
    job_sender: JobSender,
    shutdown: tokio_util::sync::CancellationToken,
) -> Result<()> {
    let port = config.port;
    let app = make_app(config, job_table, job_sender);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;
    info!("Ready to serve at port {}!", port);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::{job_channel, models::JobState};
    use axum::body::to_bytes;
    use axum::http::Request;
    use std::sync::{Arc, Mutex};
    use tokio_stream::StreamExt;
    use tower::ServiceExt;

    fn test_app() -> (Router, JobTable) {
        let table = JobTable::new();
        let (sender, _receiver) = job_channel();
        // The receiver is kept alive so submissions stay queued.
        std::mem::forget(_receiver);
        let app = make_app(ServerConfig::default(), table.clone(), sender);
        (app, table)
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn unknown_job_id_is_a_structured_404() {
        let (app, _) = test_app();

        for uri in ["/progress/nope", "/progress-stream/nope", "/download/nope"] {
            let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
            let response = app.clone().oneshot(request).await.unwrap();
            assert_eq!(response.status(), StatusCode::NOT_FOUND, "uri {}", uri);
            let body = body_json(response).await;
            assert_eq!(body["error"], "Invalid job ID");
        }
    }

    #[tokio::test]
    async fn start_creates_a_queued_job() {
        let (app, table) = test_app();

        let manifest = r#"{"Cookie": "c", "BaseURL": "https://cdn.example/", "PlayListsTracks": []}"#;
        let request = Request::builder()
            .method("POST")
            .uri("/start")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(manifest))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_json(response).await;
        assert_eq!(body["status"], "queued");
        let job_id = body["job_id"].as_str().unwrap();

        let snapshot = table.snapshot(job_id).unwrap();
        assert_eq!(snapshot.status, JobStatus::Queued);
        assert!(!snapshot.done);
        assert_eq!(snapshot.logs.len(), 1);
        assert!(snapshot.logs[0].contains("Queued job"));
    }

    #[tokio::test]
    async fn malformed_manifest_is_rejected_at_the_boundary() {
        let (app, _) = test_app();

        let request = Request::builder()
            .method("POST")
            .uri("/start")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(r#"{"BaseURL": "u"}"#))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn progress_reflects_job_state() {
        let (app, table) = test_app();
        let (job_id, state) = table.create();
        {
            let mut state = state.lock().unwrap();
            state.total = 2;
            state.progress = 1;
        }

        let request = Request::builder()
            .uri(format!("/progress/{}", job_id))
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_json(response).await;
        assert_eq!(body["progress"], 1);
        assert_eq!(body["total"], 2);
        assert_eq!(body["done"], false);
        assert_eq!(body["uploaded"], 0);
    }

    #[tokio::test]
    async fn options_preflight_short_circuits_with_204() {
        let (app, _) = test_app();

        let request = Request::builder()
            .method("OPTIONS")
            .uri("/start")
            .header(header::ORIGIN, "https://app.example")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        let headers = response.headers();
        assert_eq!(
            headers.get(header::ACCESS_CONTROL_ALLOW_ORIGIN).unwrap(),
            "https://app.example"
        );
        assert_eq!(headers.get(header::VARY).unwrap(), "Origin");
        assert_eq!(
            headers.get(header::ACCESS_CONTROL_ALLOW_METHODS).unwrap(),
            "GET,POST,OPTIONS"
        );
        assert_eq!(
            headers.get(header::ACCESS_CONTROL_ALLOW_HEADERS).unwrap(),
            "Content-Type"
        );
    }

    #[tokio::test]
    async fn cors_origin_is_echoed_on_regular_responses() {
        let (app, _) = test_app();

        let request = Request::builder()
            .uri("/")
            .header(header::ORIGIN, "https://other.example")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response
                .headers()
                .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
                .unwrap(),
            "https://other.example"
        );
    }

    #[tokio::test]
    async fn download_is_404_until_the_archive_exists() {
        let (app, table) = test_app();
        let (job_id, state) = table.create();

        let uri = format!("/download/{}", job_id);
        let request = Request::builder().uri(&uri).body(Body::empty()).unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        {
            let mut state = state.lock().unwrap();
            state.done = true;
            state.status = JobStatus::Completed;
            state.archive = Some(b"zipbytes".to_vec());
        }

        let request = Request::builder().uri(&uri).body(Body::empty()).unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            "application/zip"
        );
        let disposition = response
            .headers()
            .get(header::CONTENT_DISPOSITION)
            .unwrap()
            .to_str()
            .unwrap()
            .to_string();
        assert!(disposition.contains(&job_id));
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&bytes[..], b"zipbytes");
    }

    #[tokio::test]
    async fn sse_response_has_event_stream_headers() {
        let (app, table) = test_app();
        let (job_id, state) = table.create();
        state.lock().unwrap().fail("stop streaming");

        let request = Request::builder()
            .uri(format!("/progress-stream/{}", job_id))
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let headers = response.headers();
        assert!(headers
            .get(header::CONTENT_TYPE)
            .unwrap()
            .to_str()
            .unwrap()
            .starts_with("text/event-stream"));
        assert_eq!(headers.get(header::CACHE_CONTROL).unwrap(), "no-cache");

        // The job is terminal, so the body is finite and carries exactly one
        // progress event.
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let text = String::from_utf8(bytes.to_vec()).unwrap();
        assert_eq!(text.matches("event: progress").count(), 1);
        assert!(text.contains("\"status\":\"failed\""));
    }

    #[tokio::test(start_paused = true)]
    async fn stream_skips_unchanged_snapshots_and_closes_on_terminal() {
        let state = Arc::new(Mutex::new(JobState::new()));
        let stream = progress_event_stream(state.clone());
        tokio::pin!(stream);

        // First tick emits the initial snapshot.
        assert!(stream.next().await.is_some());

        // Nothing changed; mutate after a while and expect exactly one more
        // event, then end-of-stream because the job turned terminal.
        {
            let mut state = state.lock().unwrap();
            state.progress = 1;
            state.done = true;
            state.status = JobStatus::Completed;
        }

        assert!(stream.next().await.is_some());
        assert!(stream.next().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn stream_for_terminal_job_emits_final_state_once() {
        let state = Arc::new(Mutex::new(JobState::new()));
        state.lock().unwrap().fail("gone");

        let stream = progress_event_stream(state);
        tokio::pin!(stream);

        assert!(stream.next().await.is_some());
        assert!(stream.next().await.is_none());
    }

    #[test]
    fn uptime_formatting() {
        assert_eq!(format_uptime(Duration::from_secs(0)), "0d 00:00:00");
        assert_eq!(format_uptime(Duration::from_secs(90_061)), "1d 01:01:01");
    }
}
