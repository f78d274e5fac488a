//! Job lifecycle events pushed to WebSocket clients.

use axum::extract::ws::Message;
use reface_core::job::Job;
use reface_core::progress;

use crate::ws::WsManager;

/// Broadcast `job` as an event of type `event_type` (one of the
/// `reface_core::job_events` constants).
pub async fn publish(ws_manager: &WsManager, event_type: &str, job: &Job) {
    let mut payload = serde_json::json!({
        "type": event_type,
        "task_id": job.id,
        "status": job.status,
        "progress": progress::display_percent(job.progress),
        "message": job.message,
        "text": progress::render(job.progress, &job.message),
    });
    if let Some(error) = &job.error {
        payload["error"] = serde_json::json!(error);
    }
    broadcast_json(ws_manager, payload).await;
}

/// Serialize a JSON value and broadcast it to all connected WebSocket clients.
async fn broadcast_json(ws_manager: &WsManager, payload: serde_json::Value) {
    ws_manager
        .broadcast(Message::Text(payload.to_string().into()))
        .await;
}
