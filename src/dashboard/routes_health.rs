//! # Health Endpoint
//!
//! `GET /health` reports process liveness plus database reachability, with a
//! 2-second timeout on the `SELECT 1` round trip so a stalled pool doesn't
//! hang the probe itself.

use super::AppState;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use std::sync::Arc;
use std::time::Duration;

pub(super) async fn handler_health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let check = tokio::time::timeout(
        Duration::from_secs(2),
        sqlx::query_scalar::<_, i32>("SELECT 1").fetch_one(state.db.pool()),
    )
    .await;

    let (status, db_ok) = match check {
        Ok(Ok(_)) => (StatusCode::OK, true),
        Ok(Err(_)) | Err(_) => (StatusCode::SERVICE_UNAVAILABLE, false),
    };

    (
        status,
        Json(serde_json::json!({
            "status": if db_ok { "ok" } else { "degraded" },
            "database": db_ok,
            "running_jobs": state.engine.running_job_count(),
        })),
    )
}
