//! CSV batch intake — `POST /upload/csv`.
//!
//! One decimal integer per row, or three columns `n, lower_bound, upper_bound`
//! per row for a pre-bounded range scan. No `csv` crate in this workspace's
//! dependency stack, so parsing is a plain line/comma split; the format is
//! deliberately this simple, not a general CSV dialect.
//!
//! Before any row is handed to the engine, [`crate::batch_gcd::find_shared_factors`]
//! runs once over every bare-`n` row in the batch — rows that share a factor
//! with another row in the same upload get it recorded immediately as a
//! `batch_gcd_preprocess` result, the same fast pre-pass this crate's
//! batch-GCD module documents as its purpose.

use axum::extract::{Multipart, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use rug::Integer;
use std::sync::Arc;

use super::AppState;
use crate::engine::JobCreateRequest;

struct CsvRow {
    n: String,
    lo: Option<String>,
    hi: Option<String>,
}

fn parse_csv(body: &str) -> Result<Vec<CsvRow>, String> {
    let mut rows = Vec::new();
    for (line_no, line) in body.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let cols: Vec<&str> = line.split(',').map(str::trim).collect();
        match cols.as_slice() {
            [n] => {
                Integer::parse(n).map_err(|_| format!("line {}: {n:?} is not an integer", line_no + 1))?;
                rows.push(CsvRow { n: n.to_string(), lo: None, hi: None });
            }
            [n, lo, hi] => {
                Integer::parse(n).map_err(|_| format!("line {}: {n:?} is not an integer", line_no + 1))?;
                Integer::parse(lo).map_err(|_| format!("line {}: {lo:?} is not an integer", line_no + 1))?;
                Integer::parse(hi).map_err(|_| format!("line {}: {hi:?} is not an integer", line_no + 1))?;
                rows.push(CsvRow { n: n.to_string(), lo: Some(lo.to_string()), hi: Some(hi.to_string()) });
            }
            _ => return Err(format!("line {}: expected 1 or 3 columns, got {}", line_no + 1, cols.len())),
        }
    }
    if rows.is_empty() {
        return Err("upload contained no data rows".to_string());
    }
    Ok(rows)
}

pub(super) async fn handler_upload_csv(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> impl IntoResponse {
    let mut filename = "upload.csv".to_string();
    let mut body = String::new();
    loop {
        let field = match multipart.next_field().await {
            Ok(Some(f)) => f,
            Ok(None) => break,
            Err(e) => {
                return (StatusCode::BAD_REQUEST, Json(serde_json::json!({"error": e.to_string()})))
                    .into_response()
            }
        };
        if let Some(name) = field.file_name() {
            filename = name.to_string();
        }
        let bytes = match field.bytes().await {
            Ok(b) => b,
            Err(e) => {
                return (StatusCode::BAD_REQUEST, Json(serde_json::json!({"error": e.to_string()})))
                    .into_response()
            }
        };
        body.push_str(&String::from_utf8_lossy(&bytes));
    }

    let rows = match parse_csv(&body) {
        Ok(r) => r,
        Err(e) => return (StatusCode::BAD_REQUEST, Json(serde_json::json!({"error": e}))).into_response(),
    };

    let bare_ns: Vec<Integer> = rows
        .iter()
        .filter(|r| r.lo.is_none())
        .filter_map(|r| Integer::parse(&r.n).ok().map(Integer::from))
        .collect();
    let shared = crate::batch_gcd::find_shared_factors(&bare_ns);
    let shared_by_n: std::collections::HashMap<String, Integer> = shared
        .into_iter()
        .map(|(i, factor, _cofactor)| (bare_ns[i].to_string(), factor))
        .collect();

    let token = uuid::Uuid::new_v4().to_string();
    if let Err(e) = tokio::fs::create_dir_all(&state.upload_dir).await {
        return (StatusCode::INTERNAL_SERVER_ERROR, Json(serde_json::json!({"error": e.to_string()})))
            .into_response();
    }
    let path = state.upload_dir.join(format!("{token}.csv"));
    if let Err(e) = tokio::fs::write(&path, &body).await {
        return (StatusCode::INTERNAL_SERVER_ERROR, Json(serde_json::json!({"error": e.to_string()})))
            .into_response();
    }

    if let Err(e) = state
        .db
        .create_upload(&token, &filename, rows.len() as i64, &path.to_string_lossy())
        .await
    {
        return (StatusCode::INTERNAL_SERVER_ERROR, Json(serde_json::json!({"error": e.to_string()})))
            .into_response();
    }

    let mut job_ids = Vec::with_capacity(rows.len());
    for row in &rows {
        let req = JobCreateRequest {
            n: row.n.clone(),
            mode: Some(if row.lo.is_some() {
                crate::engine::JobMode::RangeScan
            } else {
                crate::engine::JobMode::Csv
            }),
            lo: row.lo.clone(),
            hi: row.hi.clone(),
            policy: Default::default(),
            ecm_params: Default::default(),
            use_equation: false,
        };
        let job_id = match state.engine.submit(req).await {
            Ok(id) => id,
            Err(e) => {
                tracing::warn!(n = %row.n, error = %e, "csv row failed to enqueue");
                continue;
            }
        };
        if let Some(factor) = shared_by_n.get(&row.n) {
            let _ = state
                .db
                .insert_result(job_id, &factor.to_string(), false, "batch_gcd_preprocess", 0, None)
                .await;
            let _ = state.db.append_job_factor(job_id, &factor.to_string()).await;
        }
        job_ids.push(job_id);
    }

    let _ = state.db.update_upload_state(&token, "enqueued").await;

    (
        StatusCode::CREATED,
        Json(serde_json::json!({
            "token": token,
            "filename": filename,
            "rows": rows.len(),
            "job_ids": job_ids,
        })),
    )
        .into_response()
}
