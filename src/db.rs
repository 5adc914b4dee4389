//! # Database — PostgreSQL Storage Layer
//!
//! Async persistence for the factorization job engine via `sqlx::PgPool`
//! connecting to Supabase PostgreSQL.
//!
//! ## Schema
//!
//! - `jobs`: job identity, target N, mode, bounds, policy, lifecycle state
//! - `log_entries`: per-job monotonic-sequence log lines (dashboard stream source)
//! - `results`: discovered factors, with optional primality certificates
//! - `uploads`: CSV batch-intake tokens
//! - `snapshots`: cached equation-curve sample points
//! - `kernel_runs`: per-algorithm run records within a job
//! - `factor_cache`: N-digest keyed factor cache, independent of any one job
//!
//! ## Sync Wrapper
//!
//! Engine modules run inside Rayon thread pools (no Tokio runtime). The
//! `_sync` methods bridge async sqlx operations into sync contexts via
//! `tokio::runtime::Handle::block_on`. This is safe because Rayon threads
//! are not Tokio tasks — they won't deadlock the executor.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions};

#[derive(Clone, Debug, Serialize, sqlx::FromRow)]
pub struct JobRow {
    pub id: i64,
    pub n: String,
    pub mode: String,
    pub lo: Option<String>,
    pub hi: Option<String>,
    pub policy: Value,
    pub ecm_params: Value,
    pub use_equation: bool,
    pub state: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub started_at: Option<chrono::DateTime<chrono::Utc>>,
    pub finished_at: Option<chrono::DateTime<chrono::Utc>>,
    pub progress_percent: f64,
    pub current_candidate: Option<String>,
    pub error_message: Option<String>,
    pub factors: Value,
}

#[derive(Deserialize, Default, Clone)]
pub struct JobFilter {
    pub state: Option<String>,
    pub mode: Option<String>,
    pub sort_by: Option<String>,
    pub sort_dir: Option<String>,
}

impl JobFilter {
    fn safe_sort_column(&self) -> &str {
        match self.sort_by.as_deref() {
            Some("created_at") => "created_at",
            Some("progress_percent") => "progress_percent",
            Some("state") => "state",
            _ => "id",
        }
    }
    fn safe_sort_dir(&self) -> &str {
        match self.sort_dir.as_deref() {
            Some("asc") | Some("ASC") => "ASC",
            _ => "DESC",
        }
    }
}

#[derive(Clone, Debug, Serialize, sqlx::FromRow)]
pub struct LogEntryRow {
    pub id: i64,
    pub job_id: i64,
    pub sequence: i64,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub level: String,
    pub stage: String,
    pub message: String,
    pub payload: Option<Value>,
}

#[derive(Clone, Debug, Serialize, sqlx::FromRow)]
pub struct ResultRow {
    pub id: i64,
    pub job_id: i64,
    pub factor: String,
    pub is_prime: bool,
    pub algorithm: String,
    pub elapsed_ms: i64,
    pub certificate: Option<Value>,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Clone, Debug, Serialize, sqlx::FromRow)]
pub struct UploadRow {
    pub token: String,
    pub filename: String,
    pub row_count: i64,
    pub path: String,
    pub state: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Clone, Debug, Serialize, sqlx::FromRow)]
pub struct SnapshotRow {
    pub id: i64,
    pub job_id: i64,
    pub x_min: String,
    pub x_max: String,
    pub step: i64,
    pub points: Value,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Clone, Debug, Serialize, sqlx::FromRow)]
pub struct KernelRunRow {
    pub id: i64,
    pub job_id: i64,
    pub algorithm: String,
    pub state: String,
    pub metrics: Option<Value>,
    pub result: Option<Value>,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Clone, Debug, Serialize, sqlx::FromRow)]
pub struct FactorCacheRow {
    pub n_digest: String,
    pub n: String,
    pub factor: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    pub async fn connect(database_url: &str) -> Result<Self> {
        // Parse the URL manually to preserve the full username — sqlx's built-in
        // parser strips the ".project-ref" suffix that Supabase pooler requires.
        let url = url::Url::parse(database_url)?;
        let username = urlencoding::decode(url.username())?.into_owned();
        let password = url
            .password()
            .map(|p| urlencoding::decode(p).map(|s| s.into_owned()))
            .transpose()?;
        let mut opts = PgConnectOptions::new()
            .host(url.host_str().unwrap_or("localhost"))
            .port(url.port().unwrap_or(5432))
            .database(url.path().trim_start_matches('/'))
            .username(&username);
        if let Some(ref pw) = password {
            opts = opts.password(pw);
        }
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect_with(opts)
            .await?;
        Ok(Database { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    // --- Jobs ---

    #[allow(clippy::too_many_arguments)]
    pub async fn create_job(
        &self,
        n: &str,
        mode: &str,
        lo: Option<&str>,
        hi: Option<&str>,
        policy: &Value,
        ecm_params: &Value,
        use_equation: bool,
    ) -> Result<i64> {
        let job_id: i64 = sqlx::query_scalar(
            "INSERT INTO jobs (n, mode, lo, hi, policy, ecm_params, use_equation, state,
                                created_at, progress_percent, factors)
             VALUES ($1, $2, $3, $4, $5, $6, $7, 'pending', NOW(), 0, '[]'::jsonb)
             RETURNING id",
        )
        .bind(n)
        .bind(mode)
        .bind(lo)
        .bind(hi)
        .bind(policy)
        .bind(ecm_params)
        .bind(use_equation)
        .fetch_one(&self.pool)
        .await?;
        Ok(job_id)
    }

    pub async fn get_job(&self, job_id: i64) -> Result<Option<JobRow>> {
        let row = sqlx::query_as::<_, JobRow>(
            "SELECT id, n, mode, lo, hi, policy, ecm_params, use_equation, state,
                    created_at, started_at, finished_at, progress_percent,
                    current_candidate, error_message, factors
             FROM jobs WHERE id = $1",
        )
        .bind(job_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    pub async fn list_jobs(&self, limit: i64, offset: i64, filter: &JobFilter) -> Result<Vec<JobRow>> {
        let mut conditions = Vec::new();
        let mut param_idx = 1u32;

        if filter.state.is_some() {
            conditions.push(format!("state = ${}", param_idx));
            param_idx += 1;
        }
        if filter.mode.is_some() {
            conditions.push(format!("mode = ${}", param_idx));
            param_idx += 1;
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", conditions.join(" AND "))
        };

        let sql = format!(
            "SELECT id, n, mode, lo, hi, policy, ecm_params, use_equation, state,
                    created_at, started_at, finished_at, progress_percent,
                    current_candidate, error_message, factors
             FROM jobs{} ORDER BY {} {} LIMIT ${} OFFSET ${}",
            where_clause,
            filter.safe_sort_column(),
            filter.safe_sort_dir(),
            param_idx,
            param_idx + 1,
        );

        let mut query = sqlx::query_as::<_, JobRow>(&sql);
        if let Some(ref state) = filter.state {
            query = query.bind(state);
        }
        if let Some(ref mode) = filter.mode {
            query = query.bind(mode);
        }
        query = query.bind(limit);
        query = query.bind(offset);

        let rows = query.fetch_all(&self.pool).await?;
        Ok(rows)
    }

    /// Transition a job's lifecycle state. `finished_at` is set exactly when
    /// entering {completed, failed, cancelled}; `started_at` exactly once,
    /// on first entering `running`.
    pub async fn update_job_state(&self, job_id: i64, state: &str, error: Option<&str>) -> Result<()> {
        let started = if state == "running" { Some(chrono::Utc::now()) } else { None };
        let finished = if matches!(state, "completed" | "failed" | "cancelled") {
            Some(chrono::Utc::now())
        } else {
            None
        };
        sqlx::query(
            "UPDATE jobs SET state = $1, error_message = $2,
                    started_at = COALESCE(started_at, $3),
                    finished_at = COALESCE($4, finished_at)
             WHERE id = $5",
        )
        .bind(state)
        .bind(error)
        .bind(started)
        .bind(finished)
        .bind(job_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Update progress; the caller is responsible for never regressing it,
    /// the same monotonic discipline `events::EventBus` enforces in memory.
    pub async fn update_job_progress(
        &self,
        job_id: i64,
        progress_percent: f64,
        current_candidate: &str,
    ) -> Result<()> {
        sqlx::query("UPDATE jobs SET progress_percent = $1, current_candidate = $2 WHERE id = $3")
            .bind(progress_percent)
            .bind(current_candidate)
            .bind(job_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Append a factor to the job's summary list (append-only JSON array).
    pub async fn append_job_factor(&self, job_id: i64, factor: &str) -> Result<()> {
        sqlx::query("UPDATE jobs SET factors = factors || to_jsonb($1::text) WHERE id = $2")
            .bind(factor)
            .bind(job_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    // --- Log entries ---

    /// Append a log entry with a monotonically increasing per-job sequence
    /// number, computed within the same transaction as the insert.
    pub async fn append_log_entry(
        &self,
        job_id: i64,
        level: &str,
        stage: &str,
        message: &str,
        payload: Option<&Value>,
    ) -> Result<i64> {
        let mut tx = self.pool.begin().await?;
        let next_sequence: i64 = sqlx::query_scalar(
            "SELECT COALESCE(MAX(sequence), 0) + 1 FROM log_entries WHERE job_id = $1",
        )
        .bind(job_id)
        .fetch_one(&mut *tx)
        .await?;
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO log_entries (job_id, sequence, created_at, level, stage, message, payload)
             VALUES ($1, $2, NOW(), $3, $4, $5, $6)
             RETURNING id",
        )
        .bind(job_id)
        .bind(next_sequence)
        .bind(level)
        .bind(stage)
        .bind(message)
        .bind(payload)
        .fetch_one(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(id)
    }

    /// Synchronous wrapper for kernel code running on rayon threads.
    pub fn append_log_entry_sync(
        &self,
        rt: &tokio::runtime::Handle,
        job_id: i64,
        level: &str,
        stage: &str,
        message: &str,
        payload: Option<&Value>,
    ) -> Result<i64> {
        rt.block_on(self.append_log_entry(job_id, level, stage, message, payload))
    }

    pub async fn get_log_entries(&self, job_id: i64, limit: i64) -> Result<Vec<LogEntryRow>> {
        let rows = sqlx::query_as::<_, LogEntryRow>(
            "SELECT id, job_id, sequence, created_at, level, stage, message, payload
             FROM log_entries WHERE job_id = $1 ORDER BY sequence LIMIT $2",
        )
        .bind(job_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    // --- Results ---

    pub async fn insert_result(
        &self,
        job_id: i64,
        factor: &str,
        is_prime: bool,
        algorithm: &str,
        elapsed_ms: i64,
        certificate: Option<&Value>,
    ) -> Result<i64> {
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO results (job_id, factor, is_prime, algorithm, elapsed_ms, certificate, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, NOW())
             RETURNING id",
        )
        .bind(job_id)
        .bind(factor)
        .bind(is_prime)
        .bind(algorithm)
        .bind(elapsed_ms)
        .bind(certificate)
        .fetch_one(&self.pool)
        .await?;
        Ok(id)
    }

    #[allow(clippy::too_many_arguments)]
    pub fn insert_result_sync(
        &self,
        rt: &tokio::runtime::Handle,
        job_id: i64,
        factor: &str,
        is_prime: bool,
        algorithm: &str,
        elapsed_ms: i64,
        certificate: Option<&Value>,
    ) -> Result<i64> {
        rt.block_on(self.insert_result(job_id, factor, is_prime, algorithm, elapsed_ms, certificate))
    }

    pub async fn get_results(&self, job_id: i64) -> Result<Vec<ResultRow>> {
        let rows = sqlx::query_as::<_, ResultRow>(
            "SELECT id, job_id, factor, is_prime, algorithm, elapsed_ms, certificate, created_at
             FROM results WHERE job_id = $1 ORDER BY created_at",
        )
        .bind(job_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    // --- Uploads ---

    pub async fn create_upload(&self, token: &str, filename: &str, row_count: i64, path: &str) -> Result<()> {
        sqlx::query(
            "INSERT INTO uploads (token, filename, row_count, path, state, created_at)
             VALUES ($1, $2, $3, $4, 'received', NOW())",
        )
        .bind(token)
        .bind(filename)
        .bind(row_count)
        .bind(path)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_upload(&self, token: &str) -> Result<Option<UploadRow>> {
        let row = sqlx::query_as::<_, UploadRow>(
            "SELECT token, filename, row_count, path, state, created_at FROM uploads WHERE token = $1",
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    pub async fn update_upload_state(&self, token: &str, state: &str) -> Result<()> {
        sqlx::query("UPDATE uploads SET state = $1 WHERE token = $2")
            .bind(state)
            .bind(token)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    // --- Snapshots ---

    pub async fn insert_snapshot(
        &self,
        job_id: i64,
        x_min: &str,
        x_max: &str,
        step: i64,
        points: &Value,
    ) -> Result<i64> {
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO snapshots (job_id, x_min, x_max, step, points, created_at)
             VALUES ($1, $2, $3, $4, $5, NOW())
             RETURNING id",
        )
        .bind(job_id)
        .bind(x_min)
        .bind(x_max)
        .bind(step)
        .bind(points)
        .fetch_one(&self.pool)
        .await?;
        Ok(id)
    }

    /// Look up a cached curve sample so `/equations/curve` can skip
    /// recomputation for a repeated (N, x_min, x_max, step) request.
    pub async fn get_snapshot(&self, job_id: i64, x_min: &str, x_max: &str, step: i64) -> Result<Option<SnapshotRow>> {
        let row = sqlx::query_as::<_, SnapshotRow>(
            "SELECT id, job_id, x_min, x_max, step, points, created_at
             FROM snapshots WHERE job_id = $1 AND x_min = $2 AND x_max = $3 AND step = $4
             ORDER BY created_at DESC LIMIT 1",
        )
        .bind(job_id)
        .bind(x_min)
        .bind(x_max)
        .bind(step)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    // --- Kernel runs ---

    pub async fn insert_kernel_run(&self, job_id: i64, algorithm: &str) -> Result<i64> {
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO kernel_runs (job_id, algorithm, state, created_at)
             VALUES ($1, $2, 'running', NOW())
             RETURNING id",
        )
        .bind(job_id)
        .bind(algorithm)
        .fetch_one(&self.pool)
        .await?;
        Ok(id)
    }

    pub async fn complete_kernel_run(
        &self,
        kernel_run_id: i64,
        state: &str,
        metrics: Option<&Value>,
        result: Option<&Value>,
    ) -> Result<()> {
        sqlx::query("UPDATE kernel_runs SET state = $1, metrics = $2, result = $3 WHERE id = $4")
            .bind(state)
            .bind(metrics)
            .bind(result)
            .bind(kernel_run_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn get_kernel_runs(&self, job_id: i64) -> Result<Vec<KernelRunRow>> {
        let rows = sqlx::query_as::<_, KernelRunRow>(
            "SELECT id, job_id, algorithm, state, metrics, result, created_at
             FROM kernel_runs WHERE job_id = $1 ORDER BY created_at",
        )
        .bind(job_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    // --- Factor cache ---

    /// Look up a previously discovered factor by the SHA-256 digest of N's
    /// decimal representation — keyed independently of any particular job,
    /// so re-submitting the same N short-circuits the whole pipeline.
    pub async fn get_cached_factor(&self, n_digest: &str) -> Result<Option<FactorCacheRow>> {
        let row = sqlx::query_as::<_, FactorCacheRow>(
            "SELECT n_digest, n, factor, created_at FROM factor_cache WHERE n_digest = $1",
        )
        .bind(n_digest)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    pub async fn upsert_cached_factor(&self, n_digest: &str, n: &str, factor: &str) -> Result<()> {
        sqlx::query(
            "INSERT INTO factor_cache (n_digest, n, factor, created_at)
             VALUES ($1, $2, $3, NOW())
             ON CONFLICT (n_digest) DO UPDATE SET factor = EXCLUDED.factor, created_at = NOW()",
        )
        .bind(n_digest)
        .bind(n)
        .bind(factor)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub fn upsert_cached_factor_sync(
        &self,
        rt: &tokio::runtime::Handle,
        n_digest: &str,
        n: &str,
        factor: &str,
    ) -> Result<()> {
        rt.block_on(self.upsert_cached_factor(n_digest, n, factor))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_filter_sort_column_whitelists_known_columns() {
        let cases = vec![
            ("created_at", "created_at"),
            ("progress_percent", "progress_percent"),
            ("state", "state"),
        ];
        for (input, expected) in cases {
            let filter = JobFilter { sort_by: Some(input.into()), ..Default::default() };
            assert_eq!(filter.safe_sort_column(), expected);
        }
    }

    #[test]
    fn job_filter_sort_column_defaults_to_id_for_unknown() {
        let unknown_inputs = vec!["id", "ID", "unknown", "'; DROP TABLE jobs; --", "", "n", "policy"];
        for input in unknown_inputs {
            let filter = JobFilter { sort_by: Some(input.into()), ..Default::default() };
            assert_eq!(filter.safe_sort_column(), "id", "unexpected column for '{}'", input);
        }
    }

    #[test]
    fn job_filter_sort_column_defaults_to_id_when_none() {
        let filter = JobFilter::default();
        assert_eq!(filter.safe_sort_column(), "id");
    }

    #[test]
    fn job_filter_sort_dir_accepts_asc() {
        for input in ["asc", "ASC"] {
            let filter = JobFilter { sort_dir: Some(input.into()), ..Default::default() };
            assert_eq!(filter.safe_sort_dir(), "ASC");
        }
    }

    #[test]
    fn job_filter_sort_dir_defaults_to_desc() {
        let unknown_inputs = vec!["desc", "DESC", "Asc", "random", "'; DROP TABLE--", ""];
        for input in unknown_inputs {
            let filter = JobFilter { sort_dir: Some(input.into()), ..Default::default() };
            assert_eq!(filter.safe_sort_dir(), "DESC", "unexpected dir for '{}'", input);
        }
    }

    #[test]
    fn job_filter_default_is_empty() {
        let filter = JobFilter::default();
        assert!(filter.state.is_none());
        assert!(filter.mode.is_none());
        assert!(filter.sort_by.is_none());
        assert!(filter.sort_dir.is_none());
    }
}
