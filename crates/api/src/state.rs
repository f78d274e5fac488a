use std::sync::Arc;

use crate::config::ServerConfig;
use crate::engine::JobEngine;
use crate::ws::WsManager;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// This is cheaply cloneable (inner data is behind `Arc`).
#[derive(Clone)]
pub struct AppState {
    /// Job intake, registry and queue.
    pub engine: Arc<JobEngine>,
    /// Server configuration.
    pub config: Arc<ServerConfig>,
    /// WebSocket connection manager (live job events).
    pub ws_manager: Arc<WsManager>,
}
