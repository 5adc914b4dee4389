//! # Job Engine — Orchestrates the Staged Factorization Pipeline
//!
//! The engine owns the mapping from a submitted [`JobCreateRequest`] to a
//! running pipeline: it persists the job row, hands out a [`kernels::CancelToken`]
//! and an [`events::EventBus`] keyed by job id, and bounds how many jobs run
//! concurrently with a semaphore, mirroring this crate's existing worker-pool
//! shape (rayon fan-out inside a stage, a small tokio pool across jobs).
//!
//! `submit` persists the job and spawns its pipeline as a detached tokio
//! task; `control` signals a running job's [`kernels::CancelToken`] and lets
//! the pipeline notice the request at its next checkpoint rather than
//! interrupting it mid-kernel-call. `stream` is served by the dashboard layer
//! directly off the per-job [`events::EventBus`] this module creates.

pub mod pipeline;

use crate::checkpoint;
use crate::db::Database;
use crate::events::EventBus;
use crate::kernels::CancelToken;
use anyhow::{bail, Context, Result};
use rug::Integer;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use tokio::sync::Semaphore;

/// How a job's candidate range is sourced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobMode {
    /// Factor a single decimal number, `n`.
    Auto,
    /// Sweep candidates in `[lo, hi]`, factoring each in turn.
    RangeScan,
    /// Candidates came from an uploaded CSV (see `db::UploadRow`).
    Csv,
    /// Skip straight to the equation-guided sieve stage.
    EquationGuided,
}

impl JobMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobMode::Auto => "auto",
            JobMode::RangeScan => "range_scan",
            JobMode::Csv => "csv",
            JobMode::EquationGuided => "equation_guided",
        }
    }
}

impl FromStr for JobMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "auto" => Ok(JobMode::Auto),
            "range_scan" => Ok(JobMode::RangeScan),
            "csv" => Ok(JobMode::Csv),
            "equation_guided" => Ok(JobMode::EquationGuided),
            other => bail!("unknown job mode {other:?}"),
        }
    }
}

/// ECM mode as stored in job policy, mirroring [`crate::kernels::ecm::Mode`]
/// minus the `External` tag, which is a job-level routing decision (stage 6)
/// rather than something the ECM kernel itself runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum EcmModeConfig {
    #[default]
    Default,
    Enhanced,
}

impl From<EcmModeConfig> for crate::kernels::ecm::Mode {
    fn from(value: EcmModeConfig) -> Self {
        match value {
            EcmModeConfig::Default => crate::kernels::ecm::Mode::Default,
            EcmModeConfig::Enhanced => crate::kernels::ecm::Mode::Enhanced,
        }
    }
}

/// Per-job tuning knobs for each pipeline stage. Unknown fields are rejected
/// so a typo in a submitted policy surfaces as a 4xx, not a silently ignored
/// default.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct JobPolicy {
    pub mr_rounds: u32,
    pub use_trial_division: bool,
    pub trial_division_limit: u64,
    pub use_pollard_rho: bool,
    pub pollard_rho_max_iterations: u64,
    pub use_shor: bool,
    pub shor_attempts_per_bound: u32,
    pub use_ecm: bool,
    pub ecm_mode: EcmModeConfig,
    pub advanced_ecm_min_digits: u32,
    pub external_gnfs_min_digits: u64,
    pub equation_guided_min_digits: u32,
}

impl Default for JobPolicy {
    fn default() -> Self {
        JobPolicy {
            mr_rounds: 40,
            use_trial_division: true,
            trial_division_limit: 1_000_000,
            use_pollard_rho: true,
            pollard_rho_max_iterations: crate::kernels::pollard_rho::DEFAULT_MAX_ITERATIONS,
            use_shor: true,
            shor_attempts_per_bound: 20,
            use_ecm: true,
            ecm_mode: EcmModeConfig::Default,
            advanced_ecm_min_digits: 30,
            external_gnfs_min_digits: 200,
            equation_guided_min_digits: 0,
        }
    }
}

/// Overrides for the ECM staircase; `None` means use [`crate::kernels::ecm::DEFAULT_STAIRCASE`].
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields, default)]
pub struct EcmParamsConfig {
    pub staircase: Option<Vec<(u64, u32)>>,
}

impl EcmParamsConfig {
    fn stages(&self) -> Vec<crate::kernels::ecm::Stage> {
        match &self.staircase {
            Some(pairs) => pairs
                .iter()
                .map(|&(b1, curves)| crate::kernels::ecm::Stage { b1, curves })
                .collect(),
            None => crate::kernels::ecm::DEFAULT_STAIRCASE.to_vec(),
        }
    }
}

/// A request to start a new factorization job.
#[derive(Debug, Clone, Deserialize)]
pub struct JobCreateRequest {
    pub n: String,
    #[serde(default)]
    pub mode: Option<JobMode>,
    pub lo: Option<String>,
    pub hi: Option<String>,
    #[serde(default)]
    pub policy: JobPolicy,
    #[serde(default)]
    pub ecm_params: EcmParamsConfig,
    #[serde(default)]
    pub use_equation: bool,
}

/// A control action submitted against a running job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobAction {
    Pause,
    Resume,
    Cancel,
}

/// How many jobs may run their pipeline concurrently. The pipeline itself
/// fans kernels out across rayon's global pool, so this bounds the number of
/// *jobs* competing for that pool, not the thread count directly.
const DEFAULT_MAX_CONCURRENT_JOBS: usize = 4;

/// Per-job bookkeeping the engine keeps only while a pipeline is live —
/// nothing here survives a process restart; a restart's in-flight jobs are
/// left `running` in the database and must be reconciled by an operator, the
/// same as this crate's prior worker-coordination model left `claimed` rows
/// for a dead worker.
struct JobHandle {
    token: CancelToken,
    bus: Arc<EventBus>,
}

pub struct Engine {
    db: Arc<Database>,
    checkpoint_dir: PathBuf,
    jobs: Mutex<HashMap<i64, JobHandle>>,
    concurrency: Arc<Semaphore>,
}

impl Engine {
    pub fn new(db: Arc<Database>, checkpoint_dir: PathBuf) -> Arc<Self> {
        Self::with_concurrency(db, checkpoint_dir, DEFAULT_MAX_CONCURRENT_JOBS)
    }

    pub fn with_concurrency(db: Arc<Database>, checkpoint_dir: PathBuf, max_concurrent: usize) -> Arc<Self> {
        Arc::new(Engine {
            db,
            checkpoint_dir,
            jobs: Mutex::new(HashMap::new()),
            concurrency: Arc::new(Semaphore::new(max_concurrent.max(1))),
        })
    }

    fn checkpoint_path(&self, job_id: i64) -> PathBuf {
        self.checkpoint_dir.join(format!("job-{job_id}.checkpoint"))
    }

    /// Persist a new job row and spawn its pipeline task. Returns the new
    /// job id immediately; the pipeline runs in the background.
    pub async fn submit(self: &Arc<Self>, req: JobCreateRequest) -> Result<i64> {
        let n = Integer::parse(req.n.trim())
            .map(Integer::from)
            .with_context(|| format!("{:?} is not a valid decimal integer", req.n))?;
        if n < 2 {
            bail!("candidate must be >= 2, got {n}");
        }
        let mode = req.mode.unwrap_or(JobMode::Auto);
        if matches!(mode, JobMode::RangeScan) && (req.lo.is_none() || req.hi.is_none()) {
            bail!("range_scan mode requires both lo and hi");
        }

        let policy_json = serde_json::to_value(&req.policy)?;
        let ecm_params_json = serde_json::to_value(&req.ecm_params)?;

        let job_id = self
            .db
            .create_job(
                &req.n,
                mode.as_str(),
                req.lo.as_deref(),
                req.hi.as_deref(),
                &policy_json,
                &ecm_params_json,
                req.use_equation,
            )
            .await?;

        let bus = Arc::new(EventBus::new());
        let token = CancelToken::new();
        self.jobs.lock().unwrap().insert(
            job_id,
            JobHandle { token: token.clone(), bus: Arc::clone(&bus) },
        );

        let engine = Arc::clone(self);
        let checkpoint_path = self.checkpoint_path(job_id);
        tokio::spawn(async move {
            let permit = engine.concurrency.clone().acquire_owned().await;
            let result = pipeline::run_job(pipeline::JobContext {
                db: Arc::clone(&engine.db),
                bus,
                token,
                checkpoint_path,
                job_id,
                n,
                mode,
                lo: req.lo,
                hi: req.hi,
                policy: req.policy,
                ecm_stages: req.ecm_params.stages(),
                use_equation: req.use_equation,
            })
            .await;
            drop(permit);
            if let Err(err) = result {
                tracing::error!(job_id, error = %err, "job pipeline failed");
                let _ = engine.db.update_job_state(job_id, "failed", Some(&err.to_string())).await;
            }
            engine.jobs.lock().unwrap().remove(&job_id);
        });

        Ok(job_id)
    }

    /// Signal a control action to a running job. Pause/resume/cancel are
    /// observed cooperatively by the pipeline at its next checkpoint, not
    /// applied synchronously — a paused job's DB row only flips to `paused`
    /// once the pipeline itself writes the checkpoint and transition.
    pub fn control(&self, job_id: i64, action: JobAction) -> Result<()> {
        let jobs = self.jobs.lock().unwrap();
        let handle = jobs
            .get(&job_id)
            .with_context(|| format!("job {job_id} is not currently running"))?;
        match action {
            JobAction::Pause => handle.token.pause(),
            JobAction::Resume => handle.token.resume(),
            JobAction::Cancel => handle.token.cancel(),
        }
        Ok(())
    }

    /// The event bus for a running job, if one is live. Used by the
    /// dashboard's WebSocket route to subscribe a client to this job's
    /// stream; returns `None` once the job has finished and its handle was
    /// torn down.
    pub fn event_bus(&self, job_id: i64) -> Option<Arc<EventBus>> {
        self.jobs.lock().unwrap().get(&job_id).map(|h| Arc::clone(&h.bus))
    }

    pub fn is_running(&self, job_id: i64) -> bool {
        self.jobs.lock().unwrap().contains_key(&job_id)
    }

    /// Number of jobs with a live pipeline task right now. Used by the
    /// `/health` endpoint, not for scheduling — the semaphore already bounds
    /// concurrency independently of this count.
    pub fn running_job_count(&self) -> usize {
        self.jobs.lock().unwrap().len()
    }

    /// Drop any stale on-disk checkpoint for a job — used once a job
    /// completes or is cancelled, so a later resubmission under the same id
    /// (which cannot happen today, ids are never reused, but a future
    /// requeue path might) never resumes from finished work.
    pub fn clear_checkpoint(&self, job_id: i64) {
        checkpoint::clear(&self.checkpoint_path(job_id));
    }
}
