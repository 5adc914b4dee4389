//! # Checkpoint — Resumable Job State Persistence
//!
//! Saves and loads pipeline-stage progress as JSON files with SHA-256
//! integrity verification and generational backups. Each resumable pipeline
//! stage has its own `Checkpoint` variant storing the minimal state needed
//! to continue without re-doing already-completed work.
//!
//! ## Atomic Writes
//!
//! Checkpoint files are written atomically: write to a temp file, then rename.
//! This prevents corruption from mid-write crashes or power loss.
//!
//! ## Integrity
//!
//! A SHA-256 hash is stored alongside the JSON data. On load, the hash is
//! verified — corrupted checkpoints are detected and skipped, falling back
//! to the most recent valid generation (up to 3 generations kept). A missing
//! or corrupted checkpoint on resume is not an error: the caller restarts
//! that stage from its initial state (logged at WARNING by the caller).
//!
//! ## Checkpoint Variants
//!
//! One variant per pipeline stage that can meaningfully resume: trial
//! division's last-tested prime, Pollard rho's iteration count and last
//! `(x, c)` pair, staged ECM's curve/sigma progress (the `{n, B1, B2,
//! curves_total, curves_completed, sigma_values_used, elapsed}` shape), and
//! the equation-guided prime sieve's last-tested prime.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};

/// Number of backup generations to keep.
const GENERATIONS: usize = 3;

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(tag = "type")]
pub enum Checkpoint {
    /// Trial division: the largest prime already tested as a divisor.
    TrialDivision { last_prime: u64 },

    /// Pollard rho (Brent): iteration count and the last `(x, c)` state,
    /// so the walk can resume mid-cycle rather than restarting `x0`.
    PollardRho {
        iterations: u64,
        last_x: String,
        last_c: u64,
    },

    /// Staged ECM: curve and sigma progress within the current `B1` stage.
    Ecm {
        n: String,
        b1: u64,
        #[serde(default)]
        b2: Option<u64>,
        curves_total: u32,
        curves_completed: u32,
        sigma_values_used: Vec<String>,
        elapsed_secs: u64,
    },

    /// Equation-guided prime sieve (Trurl's method): the last prime tested
    /// against the candidate range.
    EquationSieve { last_prime: String },
}

/// Wrapper that includes a SHA-256 checksum for integrity verification.
#[derive(Serialize, Deserialize)]
struct CheckpointEnvelope {
    checksum: String,
    data: serde_json::Value,
}

/// Compute SHA-256 hex digest of a string.
fn sha256_hex(data: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Return the path for generation `gen` (0 = current, 1 = .1, 2 = .2, ...).
fn generation_path(base: &Path, gen: usize) -> PathBuf {
    if gen == 0 {
        base.to_path_buf()
    } else {
        let mut p = base.as_os_str().to_os_string();
        p.push(format!(".{}", gen));
        PathBuf::from(p)
    }
}

/// Save a checkpoint with integrity checksum and rotating generations.
///
/// Rotation: current → .1 → .2 (oldest .2 is discarded).
/// The new checkpoint is written atomically via a .tmp file.
pub fn save(path: &Path, checkpoint: &Checkpoint) -> Result<()> {
    // Rotate existing generations: .2 is discarded, .1 → .2, current → .1
    for gen in (1..GENERATIONS).rev() {
        let src = generation_path(path, gen - 1);
        let dst = generation_path(path, gen);
        if src.exists() {
            let _ = fs::rename(&src, &dst);
        }
    }

    // Serialize the checkpoint data
    let data = serde_json::to_value(checkpoint)?;
    let data_str = serde_json::to_string_pretty(&data)?;
    let checksum = sha256_hex(&data_str);

    let envelope = CheckpointEnvelope { checksum, data };
    let json = serde_json::to_string_pretty(&envelope)?;

    // Atomic write: write to .tmp then rename
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, &json)?;
    fs::rename(&tmp, path)?;

    Ok(())
}

/// Load the newest valid checkpoint, falling back to older generations on corruption.
pub fn load(path: &Path) -> Option<Checkpoint> {
    for gen in 0..GENERATIONS {
        let p = generation_path(path, gen);
        if let Some(cp) = load_single(&p) {
            if gen > 0 {
                eprintln!(
                    "Warning: recovered checkpoint from generation {} ({})",
                    gen,
                    p.display()
                );
            }
            return Some(cp);
        }
    }

    // Legacy fallback: try loading without envelope (pre-hardening checkpoints)
    let data = fs::read_to_string(path).ok()?;
    let cp: Checkpoint = serde_json::from_str(&data).ok()?;
    eprintln!("Loaded legacy checkpoint (no checksum)");
    Some(cp)
}

/// Try to load and verify a single checkpoint file.
fn load_single(path: &Path) -> Option<Checkpoint> {
    let raw = fs::read_to_string(path).ok()?;
    let envelope: CheckpointEnvelope = serde_json::from_str(&raw).ok()?;

    // Verify integrity
    let data_str = serde_json::to_string_pretty(&envelope.data).ok()?;
    let expected = sha256_hex(&data_str);
    if expected != envelope.checksum {
        eprintln!(
            "Checkpoint integrity check failed: {} (expected {}, got {})",
            path.display(),
            &expected[..12],
            &envelope.checksum[..12.min(envelope.checksum.len())]
        );
        return None;
    }

    serde_json::from_value(envelope.data).ok()
}

/// Clear all checkpoint files (current + all generations).
pub fn clear(path: &Path) {
    for gen in 0..GENERATIONS {
        let _ = fs::remove_file(generation_path(path, gen));
    }
    // Also clean up any leftover .tmp file
    let _ = fs::remove_file(path.with_extension("tmp"));
}
