pub mod health;
pub mod jobs;

use axum::routing::get;
use axum::Router;

use crate::state::AppState;
use crate::ws;

/// Build the full route tree.
///
/// Everything is mounted at the root, where the polling client expects it.
///
/// ```text
/// /health                     liveness
/// /ws                         WebSocket job-event feed
/// /process, /status/{id},
/// /queue, /system/status      job API (see `routes::jobs`)
/// ```
pub fn app_routes() -> Router<AppState> {
    Router::new()
        .merge(health::router())
        .merge(jobs::router())
        .route("/ws", get(ws::ws_handler))
}
