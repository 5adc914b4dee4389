//! The staged factorization pipeline: primality gate, trial division,
//! Pollard rho, classical Shor, staged ECM, advanced ECM, external GNFS, and
//! the equation-guided sieve, run in that order against a worklist seeded
//! with the job's candidate and refilled by cofactor re-decomposition.
//!
//! Each stage is a pure kernel call bridged onto a blocking thread via
//! [`tokio::task::spawn_blocking`], since every kernel in [`crate::kernels`]
//! is synchronous and, in ECM's and Pollard rho's case, internally
//! parallel via rayon. Stage-level bookkeeping (DB rows, event bus
//! notifications, checkpoints) all happens on the async side around that
//! blocking call.

use super::{EcmModeConfig, JobMode, JobPolicy};
use crate::checkpoint::{self, Checkpoint};
use crate::db::Database;
use crate::events::{Event, EventBus, Level};
use crate::kernels::ecm::{self, Stage as EcmStage};
use crate::kernels::{shor, trial_division, CancelToken, KernelOutcome};
use crate::kernels::pollard_rho;
use crate::{certificate, external_gnfs, primality, primeiter, proof, trurl, verify};
use anyhow::{Context, Result};
use rug::Integer;
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Instant;

pub struct JobContext {
    pub db: Arc<Database>,
    pub bus: Arc<EventBus>,
    pub token: CancelToken,
    pub checkpoint_path: PathBuf,
    pub job_id: i64,
    pub n: Integer,
    pub mode: JobMode,
    pub lo: Option<String>,
    pub hi: Option<String>,
    pub policy: JobPolicy,
    pub ecm_stages: Vec<EcmStage>,
    pub use_equation: bool,
}

async fn log(ctx: &JobContext, level: Level, stage: &str, message: impl Into<String>) -> Result<()> {
    let message = message.into();
    let level_str = match level {
        Level::Debug => "debug",
        Level::Info => "info",
        Level::Warning => "warning",
        Level::Error => "error",
    };
    ctx.bus.emit(Event::LogEntry { level, stage: stage.to_string(), message: message.clone(), payload: None });
    ctx.db.append_log_entry(ctx.job_id, level_str, stage, &message, None).await?;
    Ok(())
}

async fn report_progress(ctx: &JobContext, percent: f64, candidate: &Integer) -> Result<()> {
    let candidate_str = candidate.to_string();
    ctx.bus.emit(Event::ProgressTick { percent, current_candidate: candidate_str.clone() });
    ctx.db.update_job_progress(ctx.job_id, percent, &candidate_str).await?;
    Ok(())
}

/// Block until the job is resumed or cancelled. Checked between pipeline
/// stages and at the top of the worklist loop — never inside a kernel call,
/// which only observes cancellation, not pause, via [`CancelToken::is_paused`]
/// is left to the kernel's own cooperative checks where it has one.
async fn wait_while_paused(ctx: &JobContext) -> Result<()> {
    if !ctx.token.is_paused() {
        return Ok(());
    }
    log(ctx, Level::Info, "pipeline", "job paused").await?;
    ctx.db.update_job_state(ctx.job_id, "paused", None).await?;
    while ctx.token.is_paused() && !ctx.token.is_cancelled() {
        tokio::time::sleep(std::time::Duration::from_millis(250)).await;
    }
    if !ctx.token.is_cancelled() {
        ctx.db.update_job_state(ctx.job_id, "running", None).await?;
        log(ctx, Level::Info, "pipeline", "job resumed").await?;
    }
    Ok(())
}

async fn finish(ctx: &JobContext, status: &str, message: Option<String>) -> Result<()> {
    ctx.db.update_job_state(ctx.job_id, status, message.as_deref()).await?;
    ctx.bus.emit(Event::Complete { status: status.to_string(), message: message.clone() });
    checkpoint::clear(&ctx.checkpoint_path);
    log(ctx, Level::Info, "pipeline", format!("job {status}{}", message.map(|m| format!(": {m}")).unwrap_or_default())).await?;
    Ok(())
}

/// Build and verify a primality certificate for `n`, persist it as a
/// `ResultRow`, and record `n` itself as the job's factor.
async fn record_prime(ctx: &JobContext, n: &Integer) -> Result<()> {
    let started = Instant::now();
    let n_owned = n.clone();
    let mut cert = tokio::task::spawn_blocking(move || {
        let small_primes = crate::sieve::generate_primes(20_000);
        let steps = proof::build_certificate_steps(&n_owned, &small_primes);
        certificate::PrimalityCertificate::new(n_owned.to_string(), steps)
    })
    .await
    .context("certificate build task panicked")?;
    cert.verified = verify::verify_certificate(&cert);
    let cert_json = serde_json::to_value(&cert)?;

    ctx.db
        .insert_result(
            ctx.job_id,
            &n.to_string(),
            true,
            "primality_gate",
            started.elapsed().as_millis() as i64,
            Some(&cert_json),
        )
        .await?;
    ctx.db.append_job_factor(ctx.job_id, &n.to_string()).await?;
    log(ctx, Level::Info, "primality_gate", format!("{n} is prime (certificate verified={})", cert.verified)).await?;
    Ok(())
}

/// Record a non-trivial factor found by a kernel stage, then push the factor
/// and its cofactor back onto the worklist for primality re-checking and, if
/// composite, further factorization.
async fn record_factor(
    ctx: &JobContext,
    parent: &Integer,
    factor: &Integer,
    algorithm: &str,
    started: Instant,
    worklist: &mut VecDeque<Integer>,
) -> Result<()> {
    ctx.db
        .insert_result(ctx.job_id, &factor.to_string(), false, algorithm, started.elapsed().as_millis() as i64, None)
        .await?;
    log(ctx, Level::Info, algorithm, format!("found factor {factor} of {parent}")).await?;

    let cofactor = Integer::from(parent / factor);
    worklist.push_back(factor.clone());
    worklist.push_back(cofactor);
    Ok(())
}

/// Run the whole staged pipeline for a job, including cofactor
/// re-decomposition, until the worklist is empty, the job is cancelled, or
/// an unrecoverable error occurs.
pub async fn run_job(ctx: JobContext) -> Result<()> {
    ctx.db.update_job_state(ctx.job_id, "running", None).await?;
    log(&ctx, Level::Info, "pipeline", format!("starting job {} for N={}", ctx.job_id, ctx.n)).await?;

    if let Some(resumed) = checkpoint::load(&ctx.checkpoint_path) {
        log(&ctx, Level::Info, "pipeline", format!("resuming from checkpoint: {resumed:?}")).await?;
    }

    if matches!(ctx.mode, JobMode::RangeScan) {
        run_range_scan(&ctx).await?;
        return Ok(());
    }

    let mut worklist: VecDeque<Integer> = VecDeque::new();
    worklist.push_back(ctx.n.clone());

    while let Some(candidate) = worklist.pop_front() {
        if ctx.token.is_cancelled() {
            finish(&ctx, "cancelled", None).await?;
            return Ok(());
        }
        wait_while_paused(&ctx).await?;
        if ctx.token.is_cancelled() {
            finish(&ctx, "cancelled", None).await?;
            return Ok(());
        }
        if candidate <= 1 {
            continue;
        }

        if primality::is_prime_fast(&candidate) {
            record_prime(&ctx, &candidate).await?;
            continue;
        }

        if !factor_candidate(&ctx, &candidate, &mut worklist).await? {
            log(
                &ctx,
                Level::Warning,
                "pipeline",
                format!("exhausted every stage without finding a factor of {candidate}"),
            )
            .await?;
        }
    }

    finish(&ctx, "completed", None).await?;
    Ok(())
}

/// Sweep `[lo, hi]`, factoring each candidate independently. Used for
/// `mode = "range_scan"` jobs; does not participate in cofactor
/// re-decomposition across candidates, only within each one.
async fn run_range_scan(ctx: &JobContext) -> Result<()> {
    let lo = ctx.lo.as_deref().context("range_scan requires lo")?;
    let hi = ctx.hi.as_deref().context("range_scan requires hi")?;
    let lo = Integer::from(Integer::parse(lo)?);
    let hi = Integer::from(Integer::parse(hi)?);

    let mut iter = primeiter::BigPrimeIter::new(lo.clone(), hi.clone());
    let span = Integer::from(&hi - &lo).max(Integer::from(1));
    let mut scanned = 0u64;
    const PROGRESS_EVERY: u64 = 1_000;

    while let Some(candidate) = iter.next() {
        if ctx.token.is_cancelled() {
            finish(ctx, "cancelled", None).await?;
            return Ok(());
        }
        wait_while_paused(ctx).await?;
        if ctx.token.is_cancelled() {
            finish(ctx, "cancelled", None).await?;
            return Ok(());
        }

        let mut worklist = VecDeque::new();
        worklist.push_back(candidate.clone());
        while let Some(item) = worklist.pop_front() {
            if item <= 1 {
                continue;
            }
            if primality::is_prime_fast(&item) {
                record_prime(ctx, &item).await?;
            } else {
                factor_candidate(ctx, &item, &mut worklist).await?;
            }
        }

        scanned += 1;
        if scanned % PROGRESS_EVERY == 0 {
            let done = Integer::from(&candidate - &lo);
            let percent = trurl::TrurlSolver::new(hi.clone()).progress(&done, &Integer::from(0), &span);
            report_progress(ctx, percent, &candidate).await?;
        }
    }

    finish(ctx, "completed", None).await?;
    Ok(())
}

/// Run every applicable stage against a single composite `candidate`. Returns
/// `true` if a factor was found and pushed onto `worklist`.
async fn factor_candidate(ctx: &JobContext, candidate: &Integer, worklist: &mut VecDeque<Integer>) -> Result<bool> {
    let digits = crate::estimate_digits(candidate);
    // `EquationGuided` jobs skip straight to the equation-guided sieve below,
    // bypassing the general-purpose stages entirely rather than merely
    // falling through to them first.
    let skip_general_stages = matches!(ctx.mode, JobMode::EquationGuided);

    if !skip_general_stages {
        if ctx.policy.use_trial_division {
            if let Some(outcome) = run_trial_division(ctx, candidate).await? {
                if let KernelOutcome::Found(f) = outcome {
                    record_factor(ctx, candidate, &f, "trial_division", Instant::now(), worklist).await?;
                    return Ok(true);
                }
            }
        }

        if ctx.policy.use_pollard_rho {
            if let Some(outcome) = run_pollard_rho(ctx, candidate).await? {
                if let KernelOutcome::Found(f) = outcome {
                    record_factor(ctx, candidate, &f, "pollard_rho", Instant::now(), worklist).await?;
                    return Ok(true);
                }
            }
        }

        if ctx.policy.use_shor {
            if let Some(f) = run_shor(ctx, candidate).await? {
                record_factor(ctx, candidate, &f, "shor_classical", Instant::now(), worklist).await?;
                return Ok(true);
            }
        }

        if ctx.policy.use_ecm {
            if let Some(f) = run_ecm(ctx, candidate, &ctx.ecm_stages, "ecm_staged", 70.0).await? {
                record_factor(ctx, candidate, &f, "ecm_staged", Instant::now(), worklist).await?;
                return Ok(true);
            }

            if digits >= ctx.policy.advanced_ecm_min_digits as u64 {
                let advanced = vec![ecm::suggest_stage((digits / 2) as u32)];
                if let Some(f) = run_ecm(ctx, candidate, &advanced, "ecm_advanced", 75.0).await? {
                    record_factor(ctx, candidate, &f, "ecm_advanced", Instant::now(), worklist).await?;
                    return Ok(true);
                }
            }
        }

        if digits >= ctx.policy.external_gnfs_min_digits && external_gnfs::is_configured() {
            let started = Instant::now();
            log(ctx, Level::Info, "external_gnfs", format!("delegating {candidate} to external GNFS tool")).await?;
            match external_gnfs::run(candidate, &ctx.token).await? {
                KernelOutcome::Found(f) => {
                    record_factor(ctx, candidate, &f, "external_gnfs", started, worklist).await?;
                    report_progress(ctx, 85.0, candidate).await?;
                    return Ok(true);
                }
                KernelOutcome::NotFound | KernelOutcome::TimedOut => {
                    report_progress(ctx, 85.0, candidate).await?;
                }
            }
        }
    }

    if ctx.use_equation || skip_general_stages {
        if digits >= ctx.policy.equation_guided_min_digits as u64 {
            if let Some(f) = run_equation_sieve(ctx, candidate).await? {
                record_factor(ctx, candidate, &f, "equation_sieve", Instant::now(), worklist).await?;
                return Ok(true);
            }
        }
    }

    Ok(false)
}

async fn run_trial_division(ctx: &JobContext, candidate: &Integer) -> Result<Option<KernelOutcome>> {
    wait_while_paused(ctx).await?;
    if ctx.token.is_cancelled() {
        return Ok(None);
    }
    let run_id = ctx.db.insert_kernel_run(ctx.job_id, "trial_division").await?;
    log(ctx, Level::Info, "trial_division", format!("trial dividing {candidate} up to {}", ctx.policy.trial_division_limit)).await?;

    let n = candidate.clone();
    let limit = ctx.policy.trial_division_limit;
    let token = ctx.token.clone();
    let outcome = tokio::task::spawn_blocking(move || trial_division::run(&n, limit, &token))
        .await
        .context("trial_division task panicked")??;

    complete_stage(ctx, run_id, &outcome).await?;
    report_progress(ctx, 5.0, candidate).await?;
    Ok(Some(outcome))
}

async fn run_pollard_rho(ctx: &JobContext, candidate: &Integer) -> Result<Option<KernelOutcome>> {
    wait_while_paused(ctx).await?;
    if ctx.token.is_cancelled() {
        return Ok(None);
    }
    let run_id = ctx.db.insert_kernel_run(ctx.job_id, "pollard_rho").await?;
    log(ctx, Level::Info, "pollard_rho", format!("running Pollard rho on {candidate}")).await?;

    let n = candidate.clone();
    let max_iterations = ctx.policy.pollard_rho_max_iterations;
    let token = ctx.token.clone();
    let bus = Arc::clone(&ctx.bus);
    let candidate_str = candidate.to_string();
    let outcome = tokio::task::spawn_blocking(move || {
        let mut progress_cb = move |iterations: u64| {
            bus.emit(Event::ProgressTick {
                percent: 15.0,
                current_candidate: format!("{candidate_str} (pollard_rho iter {iterations})"),
            });
        };
        pollard_rho::run(&n, max_iterations, &token, Some(&mut progress_cb))
    })
    .await
    .context("pollard_rho task panicked")??;

    complete_stage(ctx, run_id, &outcome).await?;
    report_progress(ctx, 15.0, candidate).await?;
    Ok(Some(outcome))
}

async fn run_shor(ctx: &JobContext, candidate: &Integer) -> Result<Option<Integer>> {
    wait_while_paused(ctx).await?;
    if ctx.token.is_cancelled() {
        return Ok(None);
    }
    let run_id = ctx.db.insert_kernel_run(ctx.job_id, "shor_classical").await?;
    log(ctx, Level::Info, "shor_classical", format!("sweeping classical order-finding on {candidate}")).await?;

    let n = candidate.clone();
    let attempts = ctx.policy.shor_attempts_per_bound;
    let token = ctx.token.clone();
    let (outcome, diagnostics) = tokio::task::spawn_blocking(move || shor::run(&n, attempts, &token))
        .await
        .context("shor task panicked")??;

    let metrics = serde_json::json!({ "attempts": diagnostics.len() });
    complete_stage_with_metrics(ctx, run_id, &outcome, Some(metrics)).await?;
    report_progress(ctx, 30.0, candidate).await?;

    match outcome {
        KernelOutcome::Found(f) => Ok(Some(f)),
        _ => Ok(None),
    }
}

/// Run ECM (Enhanced mode, so progress checkpoints actually get written)
/// against `candidate` using `stages`, tagged with `algorithm` for the
/// kernel-run row and `end_percent` for the job's progress report.
async fn run_ecm(
    ctx: &JobContext,
    candidate: &Integer,
    stages: &[EcmStage],
    algorithm: &str,
    end_percent: f64,
) -> Result<Option<Integer>> {
    wait_while_paused(ctx).await?;
    if ctx.token.is_cancelled() {
        return Ok(None);
    }
    let run_id = ctx.db.insert_kernel_run(ctx.job_id, algorithm).await?;
    log(ctx, Level::Info, algorithm, format!("running ECM on {candidate} ({} stage(s))", stages.len())).await?;

    let n = candidate.clone();
    let mode: ecm::Mode = ctx.policy.ecm_mode.into();
    let token = ctx.token.clone();
    let stages_owned = stages.to_vec();
    let checkpoint_path = ctx.checkpoint_path.clone();
    let started = Instant::now();
    let sigma_log: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
    let sigma_log2 = Arc::clone(&sigma_log);

    let outcome = tokio::task::spawn_blocking(move || {
        let mut cb = |cp: &ecm::CurveCheckpoint| {
            let mut sigmas = sigma_log2.lock().unwrap();
            sigmas.push(cp.sigma.to_string());
            let curves_total = stages_owned
                .iter()
                .find(|s| s.b1 == cp.stage_b1)
                .map(|s| s.curves)
                .unwrap_or(cp.curves_completed_in_stage);
            let _ = checkpoint::save(
                &checkpoint_path,
                &Checkpoint::Ecm {
                    n: n.to_string(),
                    b1: cp.stage_b1,
                    b2: None,
                    curves_total,
                    curves_completed: cp.curves_completed_in_stage,
                    sigma_values_used: sigmas.clone(),
                    elapsed_secs: started.elapsed().as_secs(),
                },
            );
        };
        ecm::run_stages(&n, &stages_owned, &mode, &token, Some(&mut cb))
    })
    .await
    .context("ecm task panicked")??;

    complete_stage(ctx, run_id, &outcome).await?;
    report_progress(ctx, end_percent, candidate).await?;

    match outcome {
        KernelOutcome::Found(f) => Ok(Some(f)),
        _ => Ok(None),
    }
}

/// Trurl's equation-guided sieve: walk primes in the candidate's
/// `initial_bounds()` window, testing each as a divisor. Reports progress
/// every `K = 1000` candidates, matching this crate's big-integer iteration
/// cadence (small-integer range scans use the coarser `K = 10_000`).
async fn run_equation_sieve(ctx: &JobContext, candidate: &Integer) -> Result<Option<Integer>> {
    wait_while_paused(ctx).await?;
    if ctx.token.is_cancelled() {
        return Ok(None);
    }
    let run_id = ctx.db.insert_kernel_run(ctx.job_id, "equation_sieve").await?;
    log(ctx, Level::Info, "equation_sieve", format!("running Trurl equation sieve on {candidate}")).await?;

    let solver = trurl::TrurlSolver::new(candidate.clone());
    let (lower, upper) = solver.initial_bounds();
    let n = candidate.clone();
    let token = ctx.token.clone();
    let bus = Arc::clone(&ctx.bus);
    let checkpoint_path = ctx.checkpoint_path.clone();
    let candidate_str = candidate.to_string();

    let result = tokio::task::spawn_blocking(move || {
        const K: u64 = 1_000;
        let mut iter = primeiter::BigPrimeIter::new(lower.clone(), upper.clone());
        let mut scanned: u64 = 0;
        while let Some(p) = iter.next() {
            if token.is_cancelled() {
                return anyhow::Ok(KernelOutcome::TimedOut);
            }
            if n.is_divisible(&p) && p > 1 && p < n {
                return anyhow::Ok(KernelOutcome::Found(p));
            }
            scanned += 1;
            if scanned % K == 0 {
                let _ = checkpoint::save(&checkpoint_path, &Checkpoint::EquationSieve { last_prime: p.to_string() });
                let percent = solver.progress(&p, &lower, &upper);
                bus.emit(Event::ProgressTick {
                    percent: 70.0 + percent * 0.25,
                    current_candidate: format!("{candidate_str} (equation sieve @ {p})"),
                });
            }
        }
        anyhow::Ok(KernelOutcome::NotFound)
    })
    .await
    .context("equation_sieve task panicked")??;

    complete_stage(ctx, run_id, &result).await?;
    report_progress(ctx, 95.0, candidate).await?;

    match result {
        KernelOutcome::Found(f) => Ok(Some(f)),
        _ => Ok(None),
    }
}

async fn complete_stage(ctx: &JobContext, run_id: i64, outcome: &KernelOutcome) -> Result<()> {
    complete_stage_with_metrics(ctx, run_id, outcome, None).await
}

async fn complete_stage_with_metrics(
    ctx: &JobContext,
    run_id: i64,
    outcome: &KernelOutcome,
    metrics: Option<serde_json::Value>,
) -> Result<()> {
    let state = match outcome {
        KernelOutcome::Found(_) => "found",
        KernelOutcome::NotFound => "not_found",
        KernelOutcome::TimedOut => "timed_out",
    };
    let result = match outcome {
        KernelOutcome::Found(f) => Some(serde_json::json!({ "factor": f.to_string() })),
        _ => None,
    };
    ctx.db.complete_kernel_run(run_id, state, metrics.as_ref(), result.as_ref()).await?;
    Ok(())
}
