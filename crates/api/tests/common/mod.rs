#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderName, Method, Request, StatusCode};
use axum::response::Response;
use axum::Router;
use http_body_util::BodyExt;
use reface_core::job::{Job, JobStatus};
use reface_core::types::JobId;
use reface_pipeline::fakes::{FakeFaceEngine, FakeMediaToolchain};
use reface_pipeline::{FramePipeline, PipelineConfig};
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::CorsLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;

use reface_api::config::{EngineConfig, ServerConfig};
use reface_api::engine::{InMemoryRegistry, JobDispatcher, JobEngine, Worker};
use reface_api::routes;
use reface_api::state::AppState;
use reface_api::ws::WsManager;

/// Build a test `ServerConfig` with safe defaults.
///
/// One worker, a short dispatcher poll and workspaces under `temp_root`.
pub fn test_config(temp_root: &Path) -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        engine: EngineConfig {
            max_workers: 1,
            poll_interval: Duration::from_millis(20),
            shutdown_timeout: Duration::from_secs(5),
        },
        pipeline: PipelineConfig {
            temp_root: temp_root.to_path_buf(),
            face_call_timeout: Duration::from_secs(5),
            media_call_timeout: Duration::from_secs(5),
            ..PipelineConfig::default()
        },
    }
}

/// Scratch directory holding a source video, a target face image and the
/// workspace root.
pub struct Fixture {
    pub dir: tempfile::TempDir,
}

impl Fixture {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("in.mp4"), b"video").unwrap();
        std::fs::write(dir.path().join("face.jpg"), b"image").unwrap();
        std::fs::create_dir_all(dir.path().join("work")).unwrap();
        Self { dir }
    }

    pub fn path(&self, name: &str) -> String {
        self.dir.path().join(name).to_string_lossy().into_owned()
    }

    pub fn temp_root(&self) -> PathBuf {
        self.dir.path().join("work")
    }

    /// A valid POST /process body writing to `output`.
    pub fn submission(&self, output: &str) -> serde_json::Value {
        serde_json::json!({
            "source_path": self.path("in.mp4"),
            "target_face_path": self.path("face.jpg"),
            "output_path": self.path(output),
        })
    }

    /// Whether no job workspace is left under the temp root.
    pub fn workspaces_cleaned(&self) -> bool {
        std::fs::read_dir(self.temp_root())
            .map(|mut entries| entries.next().is_none())
            .unwrap_or(true)
    }
}

/// Application state with an empty in-memory registry.
pub fn test_state(config: ServerConfig) -> AppState {
    let ws_manager = Arc::new(WsManager::new());
    let engine = Arc::new(JobEngine::new(
        Arc::new(InMemoryRegistry::new()),
        Arc::clone(&ws_manager),
    ));
    AppState {
        engine,
        config: Arc::new(config),
        ws_manager,
    }
}

/// Build the full application router with all middleware layers.
///
/// This mirrors the router construction in `main.rs` so integration tests
/// exercise the same middleware stack (CORS, request ID, timeout, tracing,
/// panic recovery) that production uses.
pub fn build_test_app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(["http://localhost:5173".parse().unwrap()])
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([CONTENT_TYPE])
        .max_age(Duration::from_secs(3600));

    let request_id_header = HeaderName::from_static("x-request-id");

    Router::new()
        .merge(routes::app_routes())
        .layer(CatchPanicLayer::new())
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            Duration::from_secs(30),
        ))
        .layer(PropagateRequestIdLayer::new(request_id_header.clone()))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(SetRequestIdLayer::new(request_id_header, MakeRequestUuid))
        .layer(cors)
        .with_state(state)
}

/// A running dispatcher backed by fake collaborators.
pub struct RunningDispatcher {
    pub cancel: CancellationToken,
    pub handle: tokio::task::JoinHandle<()>,
}

impl RunningDispatcher {
    /// Cancel and wait for the drain to finish.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        self.handle.await.unwrap();
    }
}

pub fn start_dispatcher(
    state: &AppState,
    faces: FakeFaceEngine,
    media: FakeMediaToolchain,
) -> RunningDispatcher {
    let pipeline = FramePipeline::new(
        Arc::new(faces),
        Arc::new(media),
        state.config.pipeline.clone(),
    );
    let worker = Worker::new(
        Arc::clone(&state.engine),
        Arc::new(pipeline),
        Arc::clone(&state.ws_manager),
    );
    let dispatcher = JobDispatcher::new(Arc::clone(&state.engine), worker, &state.config.engine);

    let cancel = CancellationToken::new();
    let handle = tokio::spawn(dispatcher.run(cancel.clone()));
    RunningDispatcher { cancel, handle }
}

/// Poll the registry until `id` satisfies `done` (10 s limit).
pub async fn wait_for(state: &AppState, id: JobId, done: impl Fn(&Job) -> bool) -> Job {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    loop {
        let job = state.engine.status(id).await.unwrap().job;
        if done(&job) {
            return job;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "timed out waiting on job {id}; last seen {:?} {:?}",
            job.status,
            job.message
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

pub async fn wait_for_terminal(state: &AppState, id: JobId) -> Job {
    wait_for(state, id, |job| job.status.is_terminal()).await
}

pub async fn wait_for_status(state: &AppState, id: JobId, status: JobStatus) -> Job {
    wait_for(state, id, |job| job.status == status).await
}

// ---------------------------------------------------------------------------
// HTTP helpers
// ---------------------------------------------------------------------------

pub async fn get(app: Router, uri: &str) -> Response {
    let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
    app.oneshot(request).await.unwrap()
}

pub async fn post_json(app: Router, uri: &str, body: serde_json::Value) -> Response {
    let request = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    app.oneshot(request).await.unwrap()
}

pub async fn body_json(response: Response) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

/// Submit through the HTTP API and return the new task id.
pub async fn submit(app: &Router, body: serde_json::Value) -> JobId {
    let response = post_json(app.clone(), "/process", body).await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let json = body_json(response).await;
    json["task_id"].as_str().unwrap().parse().unwrap()
}
