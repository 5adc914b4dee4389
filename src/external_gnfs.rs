//! External GNFS subprocess integration.
//!
//! General Number Field Sieve implementations (cado-nfs, ggnfs, msieve) are
//! out of scope to reimplement, but a configured external binary can be
//! shelled out to once a candidate crosses the digit count where trial
//! division/rho/ECM stop being competitive. This module provides optional
//! subprocess integration with graceful fallback when no tool is configured
//! or found, mirroring this crate's general approach to optional external
//! primality/factoring tools: configured path, else search `PATH`, else
//! unavailable.

use crate::kernels::{CancelToken, KernelOutcome};
use regex::Regex;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::OnceLock;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::time::Instant;

/// Global external-GNFS configuration, set once at startup from the job
/// policy's `external_gnfs_path` / `external_gnfs_min_digits` settings.
struct GnfsConfig {
    min_digits: u64,
    timeout: Duration,
    binary_path: Option<PathBuf>,
}

static GNFS_CONFIG: OnceLock<GnfsConfig> = OnceLock::new();
static GNFS_BINARY: OnceLock<Option<PathBuf>> = OnceLock::new();
static FACTOR_LINE: OnceLock<Regex> = OnceLock::new();

/// Initialize external-GNFS configuration. Call once at startup.
pub fn init(min_digits: u64, binary_path: Option<PathBuf>, timeout: Duration) {
    let _ = GNFS_CONFIG.set(GnfsConfig {
        min_digits,
        timeout,
        binary_path,
    });
}

/// True once [`init`] has been called, regardless of whether a binary was
/// actually found — used by the engine to decide whether to attempt the
/// external-GNFS stage at all for a given job.
pub fn is_configured() -> bool {
    GNFS_CONFIG.get().is_some()
}

/// Minimum digit count the engine should reach before trying this stage.
/// Returns `None` if [`init`] was never called.
pub fn min_digits() -> Option<u64> {
    GNFS_CONFIG.get().map(|c| c.min_digits)
}

fn factor_line_regex() -> &'static Regex {
    FACTOR_LINE.get_or_init(|| {
        Regex::new(r"(?i)(?:factor[s]?|prp\d+):\s*(\d+)(?:\s+(\d+))?").unwrap()
    })
}

/// Locate the configured binary, or search `PATH` for `gnfs`. Caches the
/// result for the lifetime of the process.
async fn get_binary() -> Option<PathBuf> {
    if let Some(cached) = GNFS_BINARY.get() {
        return cached.clone();
    }
    let found = locate_binary().await;
    let _ = GNFS_BINARY.set(found.clone());
    found
}

async fn locate_binary() -> Option<PathBuf> {
    if let Some(config) = GNFS_CONFIG.get() {
        if let Some(ref path) = config.binary_path {
            if path.exists() {
                return Some(path.clone());
            }
        }
    }
    let output = Command::new("which")
        .arg("gnfs")
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .output()
        .await
        .ok()?;
    if !output.status.success() {
        return None;
    }
    let path = String::from_utf8(output.stdout).ok()?;
    let path = PathBuf::from(path.trim());
    path.exists().then_some(path)
}

/// Try to factor `n` using the configured external GNFS tool.
///
/// Returns `Ok(KernelOutcome::NotFound)` if no tool is configured, no binary
/// is found, or the candidate is below the configured digit threshold — all
/// treated as "this stage does not apply here", not as an error. A nonzero
/// exit status without a parsed factor line is likewise `NotFound`: external
/// tools commonly exit nonzero on "no factor found within budget", which is
/// not a fault of this driver.
pub async fn run(n: &rug::Integer, token: &CancelToken) -> anyhow::Result<KernelOutcome> {
    let Some(config) = GNFS_CONFIG.get() else {
        return Ok(KernelOutcome::NotFound);
    };

    let digits = crate::estimate_digits(n);
    if digits < config.min_digits {
        return Ok(KernelOutcome::NotFound);
    }

    let Some(binary) = get_binary().await else {
        return Ok(KernelOutcome::NotFound);
    };

    let mut child = Command::new(&binary)
        .arg(n.to_string())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .spawn()?;

    let stdout = child.stdout.take().expect("piped stdout");
    let mut lines = BufReader::new(stdout).lines();
    let deadline = Instant::now() + config.timeout;
    let re = factor_line_regex();
    let mut factor: Option<rug::Integer> = None;

    loop {
        if token.is_cancelled() {
            let _ = child.kill().await;
            return Ok(KernelOutcome::TimedOut);
        }
        if Instant::now() >= deadline {
            let _ = child.kill().await;
            return Ok(KernelOutcome::TimedOut);
        }

        let next = tokio::time::timeout(Duration::from_millis(200), lines.next_line()).await;
        let line = match next {
            Ok(Ok(Some(line))) => line,
            Ok(Ok(None)) => break, // EOF
            Ok(Err(e)) => return Err(e.into()),
            Err(_) => continue, // poll-interval timeout, loop to recheck cancellation
        };

        if let Some(caps) = re.captures(&line) {
            if let Some(m) = caps.get(1) {
                if let Ok(candidate) = rug::Integer::parse(m.as_str()) {
                    let candidate = rug::Integer::from(candidate);
                    if candidate > 1 && candidate < *n && n.is_divisible(&candidate) {
                        factor = Some(candidate);
                        break;
                    }
                }
            }
        }
    }

    let _ = child.wait().await;

    match factor {
        Some(f) => {
            crate::kernels::assert_nontrivial_factor(n, &f)?;
            Ok(KernelOutcome::Found(f))
        }
        None => Ok(KernelOutcome::NotFound),
    }
}
