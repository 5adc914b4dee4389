//! Job API — REST endpoints over the factorization job engine.

use axum::extract::{Path as AxumPath, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use std::sync::Arc;

use super::AppState;
use crate::db::JobFilter;
use crate::engine::{JobAction, JobCreateRequest};

#[derive(Deserialize)]
pub(super) struct ListJobsQuery {
    #[serde(flatten)]
    filter: JobFilter,
    #[serde(default = "default_limit")]
    limit: i64,
    #[serde(default)]
    offset: i64,
}

fn default_limit() -> i64 {
    50
}

fn error_response(status: StatusCode, err: impl std::fmt::Display) -> axum::response::Response {
    (status, Json(serde_json::json!({"error": err.to_string()}))).into_response()
}

pub(super) async fn handler_create_job(
    State(state): State<Arc<AppState>>,
    Json(req): Json<JobCreateRequest>,
) -> impl IntoResponse {
    let job_id = match state.engine.submit(req).await {
        Ok(id) => id,
        Err(e) => return error_response(StatusCode::BAD_REQUEST, e),
    };
    match state.db.get_job(job_id).await {
        Ok(Some(job)) => (StatusCode::CREATED, Json(serde_json::json!({"job": job}))).into_response(),
        Ok(None) => error_response(StatusCode::INTERNAL_SERVER_ERROR, "job vanished after creation"),
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, e),
    }
}

pub(super) async fn handler_list_jobs(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListJobsQuery>,
) -> impl IntoResponse {
    match state.db.list_jobs(query.limit, query.offset, &query.filter).await {
        Ok(jobs) => Json(serde_json::json!({"jobs": jobs})).into_response(),
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, e),
    }
}

pub(super) async fn handler_get_job(
    State(state): State<Arc<AppState>>,
    AxumPath(id): AxumPath<i64>,
) -> impl IntoResponse {
    match state.db.get_job(id).await {
        Ok(Some(job)) => Json(serde_json::json!({"job": job})).into_response(),
        Ok(None) => error_response(StatusCode::NOT_FOUND, "job not found"),
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, e),
    }
}

#[derive(Deserialize)]
pub(super) struct ControlPayload {
    action: JobAction,
}

pub(super) async fn handler_control_job(
    State(state): State<Arc<AppState>>,
    AxumPath(id): AxumPath<i64>,
    Json(payload): Json<ControlPayload>,
) -> impl IntoResponse {
    match state.engine.control(id, payload.action) {
        Ok(()) => Json(serde_json::json!({"ok": true, "id": id})).into_response(),
        Err(e) => error_response(StatusCode::BAD_REQUEST, e),
    }
}

pub(super) async fn handler_job_logs(
    State(state): State<Arc<AppState>>,
    AxumPath(id): AxumPath<i64>,
) -> impl IntoResponse {
    match state.db.get_log_entries(id, 1000).await {
        Ok(entries) => Json(serde_json::json!({"logs": entries})).into_response(),
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, e),
    }
}

pub(super) async fn handler_job_results(
    State(state): State<Arc<AppState>>,
    AxumPath(id): AxumPath<i64>,
) -> impl IntoResponse {
    match state.db.get_results(id).await {
        Ok(results) => Json(serde_json::json!({"results": results})).into_response(),
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, e),
    }
}
