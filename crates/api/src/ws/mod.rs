//! WebSocket feed of job lifecycle events.
//!
//! Provides connection management, heartbeat pings and the HTTP upgrade
//! handler mounted at `/ws`.

mod handler;
mod heartbeat;
pub mod manager;

pub use handler::ws_handler;
pub use heartbeat::start_heartbeat;
pub use manager::WsManager;
