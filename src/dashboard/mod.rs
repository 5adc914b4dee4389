//! # Dashboard — HTTP/WebSocket Front End for the Job Engine
//!
//! Runs an Axum server exposing job CRUD/control, the equation-solver
//! diagnostics endpoints, CSV batch intake, a per-job event stream, and a
//! liveness probe. All state funnels through [`crate::db::Database`] and
//! [`crate::engine::Engine`]; this module only wires routes to handlers.

mod routes_equations;
mod routes_health;
mod routes_jobs;
mod routes_upload;
mod websocket;

use crate::db::Database;
use crate::engine::Engine;
use anyhow::Result;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::Router;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::services::ServeDir;
use tower_http::timeout::TimeoutLayer;

pub struct AppState {
    pub db: Arc<Database>,
    pub engine: Arc<Engine>,
    pub upload_dir: PathBuf,
}

impl AppState {
    pub fn new(db: Arc<Database>, engine: Arc<Engine>, upload_dir: PathBuf) -> Arc<Self> {
        Arc::new(AppState { db, engine, upload_dir })
    }
}

fn cors_layer() -> CorsLayer {
    match std::env::var("CORS_ORIGINS") {
        Ok(origins) if !origins.trim().is_empty() => {
            let parsed: Vec<_> = origins
                .split(',')
                .filter_map(|o| o.trim().parse().ok())
                .collect();
            CorsLayer::new()
                .allow_origin(parsed)
                .allow_methods(Any)
                .allow_headers(Any)
        }
        _ => CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any),
    }
}

pub fn build_router(state: Arc<AppState>, static_dir: Option<&Path>) -> Router {
    let mut app = Router::new()
        .route(
            "/jobs",
            get(routes_jobs::handler_list_jobs).post(routes_jobs::handler_create_job),
        )
        .route("/jobs/{id}", get(routes_jobs::handler_get_job))
        .route("/jobs/{id}/control", post(routes_jobs::handler_control_job))
        .route("/jobs/{id}/logs", get(routes_jobs::handler_job_logs))
        .route("/jobs/{id}/results", get(routes_jobs::handler_job_results))
        .route("/jobs/{id}/stream", get(websocket::handler_job_stream))
        .route("/equations/curve", get(routes_equations::handler_curve))
        .route(
            "/equations/find-x-when-y-one/{n}",
            get(routes_equations::handler_find_x_when_y_one),
        )
        .route(
            "/equations/compute-constraint/{n}/{x}",
            get(routes_equations::handler_compute_constraint),
        )
        .route("/equations/analyze/{n}", get(routes_equations::handler_analyze))
        .route("/upload/csv", post(routes_upload::handler_upload_csv))
        .route("/health", get(routes_health::handler_health));

    if let Some(dir) = static_dir {
        app = app.fallback_service(ServeDir::new(dir).append_index_html_on_directories(true));
    }

    app.layer(cors_layer())
        .layer(CatchPanicLayer::new())
        .layer(RequestBodyLimitLayer::new(64 * 1024 * 1024))
        .layer(TimeoutLayer::with_status_code(StatusCode::REQUEST_TIMEOUT, Duration::from_secs(30)))
        .with_state(state)
}

pub async fn run(
    port: u16,
    database_url: &str,
    checkpoint_dir: &Path,
    upload_dir: &Path,
    static_dir: Option<&Path>,
) -> Result<()> {
    let database = Arc::new(Database::connect(database_url).await?);
    let engine = Engine::new(Arc::clone(&database), checkpoint_dir.to_path_buf());
    let state = AppState::new(database, engine, upload_dir.to_path_buf());
    let app = build_router(state, static_dir);

    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!(port, "dashboard listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await?;
    tracing::info!("dashboard shut down gracefully");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler");
        tokio::select! {
            _ = ctrl_c => tracing::info!("received SIGINT, shutting down"),
            _ = sigterm.recv() => tracing::info!("received SIGTERM, shutting down"),
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
        tracing::info!("received SIGINT, shutting down");
    }
}
