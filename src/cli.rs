//! # CLI Execution Functions
//!
//! Extracted from `main.rs` to keep the entry point slim. Contains the
//! execution logic for each subcommand: the synchronous `factor` path, the
//! `dashboard` launcher, certificate re-verification, and rayon configuration.

use anyhow::{Context, Result};
use trurl_factor::db::Database;
use trurl_factor::engine::{Engine, JobCreateRequest, JobMode};
use trurl_factor::verify;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use super::Cli;

// ── Synchronous factor dispatch ─────────────────────────────────

/// Submit one job to the engine and block until it reaches a terminal state,
/// printing periodic progress to stderr (mirroring the dashboard's live
/// stream) and the final job record as JSON to stdout.
pub fn run_factor(cli: &Cli, n: &str, lo: Option<&str>, hi: Option<&str>, use_equation: bool) -> Result<()> {
    let database_url = cli
        .database_url
        .as_deref()
        .context("DATABASE_URL is required (set via --database-url or env)")?;

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async move {
        let database = Arc::new(Database::connect(database_url).await?);
        let engine = Engine::new(Arc::clone(&database), cli.checkpoint.clone());

        let mode = if lo.is_some() {
            JobMode::RangeScan
        } else if use_equation {
            JobMode::EquationGuided
        } else {
            JobMode::Auto
        };

        let req = JobCreateRequest {
            n: n.to_string(),
            mode: Some(mode),
            lo: lo.map(str::to_string),
            hi: hi.map(str::to_string),
            policy: Default::default(),
            ecm_params: Default::default(),
            use_equation,
        };

        let job_id = engine.submit(req).await?;
        info!(job_id, n, "job submitted");

        let mut last_reported = std::time::Instant::now() - Duration::from_secs(30);
        let job = loop {
            tokio::time::sleep(Duration::from_millis(500)).await;
            let job = database
                .get_job(job_id)
                .await?
                .context("job vanished mid-run")?;

            if last_reported.elapsed() >= Duration::from_secs(30) {
                eprintln!(
                    "[job {job_id}] {:.1}% | candidate: {}",
                    job.progress_percent,
                    job.current_candidate.as_deref().unwrap_or("-"),
                );
                last_reported = std::time::Instant::now();
            }

            if matches!(job.state.as_str(), "completed" | "failed" | "cancelled") {
                break job;
            }
        };

        println!("{}", serde_json::to_string_pretty(&job)?);
        if job.state == "failed" {
            anyhow::bail!(job.error_message.unwrap_or_else(|| "job failed".to_string()));
        }
        Ok(())
    })
}

// ── Dashboard launcher ───────────────────────────────────────────

pub fn run_dashboard(
    cli: &Cli,
    port: u16,
    upload_dir: &std::path::Path,
    static_dir: Option<&std::path::Path>,
) -> Result<()> {
    let database_url = cli
        .database_url
        .as_deref()
        .context("DATABASE_URL is required (set via --database-url or env)")?;
    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(trurl_factor::dashboard::run(
        port,
        database_url,
        &cli.checkpoint,
        upload_dir,
        static_dir,
    ))
}

// ── Certificate verification ─────────────────────────────────────

/// Re-verify every certificate recorded against a job's results, independent
/// of the engine that produced them.
pub fn run_verify_job(cli: &Cli, job_id: i64) -> Result<()> {
    let database_url = cli
        .database_url
        .as_deref()
        .context("DATABASE_URL is required (set via --database-url or env)")?;
    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async move {
        let database = Database::connect(database_url).await?;
        let results = database.get_results(job_id).await?;

        let mut checked = 0;
        let mut failed = 0;
        for result in results {
            let Some(cert_json) = result.certificate else { continue };
            let cert: trurl_factor::certificate::PrimalityCertificate =
                match serde_json::from_value(cert_json) {
                    Ok(c) => c,
                    Err(e) => {
                        warn!(result_id = result.id, error = %e, "certificate did not deserialize");
                        failed += 1;
                        continue;
                    }
                };
            checked += 1;
            if !verify::verify_certificate(&cert) {
                warn!(result_id = result.id, factor = %result.factor, "certificate failed independent verification");
                failed += 1;
            }
        }

        println!(
            "{}",
            serde_json::json!({"job_id": job_id, "checked": checked, "failed": failed}).to_string()
        );
        if failed > 0 {
            anyhow::bail!("{failed} of {checked} certificates failed verification");
        }
        Ok(())
    })
}

// ── Rayon Configuration ─────────────────────────────────────────

/// Configure the rayon global thread pool with optional QoS and thread count.
pub fn configure_rayon(threads: Option<usize>, qos: bool) {
    let num_threads = threads.unwrap_or(0);

    #[cfg(target_os = "macos")]
    if qos {
        let result = rayon::ThreadPoolBuilder::new()
            .num_threads(num_threads)
            .spawn_handler(|thread| {
                std::thread::Builder::new().spawn(move || {
                    // SAFETY: pthread_set_qos_class_self_np is a well-defined macOS API
                    // that sets the QoS class for the current thread. No memory safety concerns.
                    unsafe {
                        libc::pthread_set_qos_class_self_np(
                            libc::qos_class_t::QOS_CLASS_USER_INITIATED,
                            0,
                        );
                    }
                    thread.run();
                })?;
                Ok(())
            })
            .build_global();

        match result {
            Ok(()) => {
                info!("Rayon threads configured with macOS QoS: user-initiated (P-core scheduling)");
            }
            Err(e) => {
                warn!(error = %e, "Could not configure rayon thread pool");
            }
        }
        return;
    }

    #[cfg(not(target_os = "macos"))]
    if qos {
        warn!("--qos flag is only effective on macOS, ignoring");
    }

    if num_threads > 0 {
        if let Err(e) = rayon::ThreadPoolBuilder::new()
            .num_threads(num_threads)
            .build_global()
        {
            warn!(error = %e, "Could not configure rayon thread pool");
        }
    }
}
