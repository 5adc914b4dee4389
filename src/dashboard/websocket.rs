//! WebSocket handler — streams one job's events live.
//!
//! Each client gets the job's recent notification backlog immediately on
//! connect, then live `{"type": "log"|"progress"|"complete"}` frames off the
//! per-job [`crate::events::EventBus`] for as long as the pipeline is running.
//! A job with no live handle (finished, or never existed) gets the backlog
//! replayed from persisted log entries, then the socket closes.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path as AxumPath, State};
use axum::response::IntoResponse;
use std::sync::Arc;

use super::AppState;

pub(super) async fn handler_job_stream(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    AxumPath(job_id): AxumPath<i64>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| stream_loop(socket, state, job_id))
}

async fn stream_loop(mut socket: WebSocket, state: Arc<AppState>, job_id: i64) {
    let Some(bus) = state.engine.event_bus(job_id) else {
        if let Ok(entries) = state.db.get_log_entries(job_id, 200).await {
            let msg = serde_json::json!({"type": "backlog", "logs": entries});
            if let Ok(text) = serde_json::to_string(&msg) {
                let _ = socket.send(Message::Text(text.into())).await;
            }
        }
        let _ = socket.send(Message::Close(None)).await;
        return;
    };

    for notification in bus.recent_notifications(50).into_iter().rev() {
        if let Ok(text) = serde_json::to_string(&notification) {
            if socket.send(Message::Text(text.into())).await.is_err() {
                return;
            }
        }
    }

    let mut rx = bus.subscribe_ws_or_init();
    loop {
        tokio::select! {
            result = rx.recv() => {
                match result {
                    Ok(text) => {
                        if socket.send(Message::Text(text.into())).await.is_err() {
                            break;
                        }
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => {}
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }
            msg = socket.recv() => {
                match msg {
                    Some(Ok(Message::Close(_))) | None => break,
                    _ => {}
                }
            }
        }
        if !state.engine.is_running(job_id) {
            break;
        }
    }
}
