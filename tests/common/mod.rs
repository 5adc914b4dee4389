//! Shared test helpers for integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::Once;

/// Returns the test database URL from the `TEST_DATABASE_URL` environment variable.
/// Panics if the variable is not set.
pub fn test_db_url() -> String {
    std::env::var("TEST_DATABASE_URL").expect("TEST_DATABASE_URL must be set for integration tests")
}

/// Returns true if the test database URL is configured.
pub fn has_test_db() -> bool {
    std::env::var("TEST_DATABASE_URL").is_ok()
}

/// One-time schema initialization.
static SCHEMA_INIT: Once = Once::new();

/// Ensure the test database schema is set up (runs once per test binary; no
/// migrations ship in this workspace, so the schema is created directly).
pub fn ensure_schema() {
    SCHEMA_INIT.call_once(|| {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let pool = sqlx::PgPool::connect(&test_db_url()).await.unwrap();
            create_schema(&pool).await;
        });
    });
}

/// Connect to the test database (also ensures schema is set up) and truncate
/// every table so each test starts from an empty history.
pub async fn setup_test_db() -> trurl_factor::db::Database {
    ensure_schema();
    let db = trurl_factor::db::Database::connect(&test_db_url())
        .await
        .expect("failed to connect to test database");
    truncate_all_tables(db.pool()).await;
    db
}

/// Build an Axum test app router connected to the test database.
pub async fn build_test_app() -> axum::Router {
    let db = Arc::new(setup_test_db().await);
    let checkpoint_dir = std::env::temp_dir().join("trurl-factor-test-checkpoints");
    let upload_dir = std::env::temp_dir().join("trurl-factor-test-uploads");
    let engine = trurl_factor::engine::Engine::new(Arc::clone(&db), checkpoint_dir);
    let state = trurl_factor::dashboard::AppState::new(db, engine, upload_dir);
    trurl_factor::dashboard::build_router(state, None)
}

async fn create_schema(pool: &sqlx::PgPool) {
    sqlx::raw_sql(
        "CREATE TABLE IF NOT EXISTS jobs (
            id BIGSERIAL PRIMARY KEY,
            n TEXT NOT NULL,
            mode TEXT NOT NULL,
            lo TEXT,
            hi TEXT,
            policy JSONB NOT NULL DEFAULT '{}',
            ecm_params JSONB NOT NULL DEFAULT '{}',
            use_equation BOOLEAN NOT NULL DEFAULT FALSE,
            state TEXT NOT NULL DEFAULT 'pending',
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            started_at TIMESTAMPTZ,
            finished_at TIMESTAMPTZ,
            progress_percent DOUBLE PRECISION NOT NULL DEFAULT 0,
            current_candidate TEXT,
            error_message TEXT,
            factors JSONB NOT NULL DEFAULT '[]'
        );

        CREATE TABLE IF NOT EXISTS log_entries (
            id BIGSERIAL PRIMARY KEY,
            job_id BIGINT NOT NULL REFERENCES jobs(id) ON DELETE CASCADE,
            sequence BIGINT NOT NULL,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            level TEXT NOT NULL,
            stage TEXT NOT NULL,
            message TEXT NOT NULL,
            payload JSONB
        );

        CREATE TABLE IF NOT EXISTS results (
            id BIGSERIAL PRIMARY KEY,
            job_id BIGINT NOT NULL REFERENCES jobs(id) ON DELETE CASCADE,
            factor TEXT NOT NULL,
            is_prime BOOLEAN NOT NULL,
            algorithm TEXT NOT NULL,
            elapsed_ms BIGINT NOT NULL,
            certificate JSONB,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        );

        CREATE TABLE IF NOT EXISTS uploads (
            token TEXT PRIMARY KEY,
            filename TEXT NOT NULL,
            row_count BIGINT NOT NULL,
            path TEXT NOT NULL,
            state TEXT NOT NULL,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        );

        CREATE TABLE IF NOT EXISTS snapshots (
            id BIGSERIAL PRIMARY KEY,
            job_id BIGINT NOT NULL REFERENCES jobs(id) ON DELETE CASCADE,
            x_min TEXT NOT NULL,
            x_max TEXT NOT NULL,
            step BIGINT NOT NULL,
            points JSONB NOT NULL,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        );

        CREATE TABLE IF NOT EXISTS kernel_runs (
            id BIGSERIAL PRIMARY KEY,
            job_id BIGINT NOT NULL REFERENCES jobs(id) ON DELETE CASCADE,
            algorithm TEXT NOT NULL,
            state TEXT NOT NULL,
            metrics JSONB,
            result JSONB,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        );

        CREATE TABLE IF NOT EXISTS factor_cache (
            n_digest TEXT PRIMARY KEY,
            n TEXT NOT NULL,
            factor TEXT NOT NULL,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        );",
    )
    .execute(pool)
    .await
    .unwrap();
}

/// Truncate every table to ensure test isolation.
pub async fn truncate_all_tables(pool: &sqlx::PgPool) {
    sqlx::raw_sql(
        "TRUNCATE TABLE kernel_runs, snapshots, results, log_entries, jobs, uploads, factor_cache
         RESTART IDENTITY CASCADE",
    )
    .execute(pool)
    .await
    .unwrap();
}
