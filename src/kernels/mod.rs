//! Algorithm kernels: trial division, Pollard rho, staged ECM, classical Shor.
//!
//! Every kernel is a pure function of `(candidate, params, cancel token)` that
//! returns a typed [`KernelOutcome`] rather than raising — ordinary negative
//! results ("not found", "timed out") are not errors. An `Err` only escalates
//! for genuinely unexpected conditions, e.g. an internal invariant broken.

pub mod ecm;
pub mod pollard_rho;
pub mod shor;
pub mod trial_division;

use rug::Integer;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Result of running one kernel stage against a candidate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KernelOutcome {
    /// A non-trivial factor `1 < f < n` was found.
    Found(Integer),
    /// The stage exhausted its search space without finding a factor.
    NotFound,
    /// The stage ran out of its wall-clock or iteration budget.
    TimedOut,
}

/// Cooperative cancellation handle passed into every kernel.
///
/// Mirrors the shape the engine's job-control polling already uses elsewhere
/// in this crate (checkpoint/pause/cancel), but decoupled from any particular
/// transport: the engine is free to back it with DB polling, an in-memory
/// flag, or a test double.
#[derive(Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
    paused: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn pause(&self) {
        self.paused.store(true, Ordering::SeqCst);
    }

    pub fn resume(&self) {
        self.paused.store(false, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }
}

/// Verify that a claimed factor actually divides `n` and lies strictly
/// between 1 and `n`. Kernels call this before returning `Found` so that an
/// arithmetic bug surfaces as the `anyhow::Error` the engine escalates to a
/// failed job, never as a silently wrong "success".
pub(crate) fn assert_nontrivial_factor(n: &Integer, f: &Integer) -> anyhow::Result<()> {
    if *f <= 1 || f >= n {
        anyhow::bail!("kernel produced trivial factor {f} of {n}");
    }
    if !n.is_divisible(f) {
        anyhow::bail!("kernel produced non-dividing factor {f} of {n}");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancel_token_starts_unset() {
        let tok = CancelToken::new();
        assert!(!tok.is_cancelled());
        assert!(!tok.is_paused());
    }

    #[test]
    fn cancel_token_cancel_is_visible_across_clones() {
        let tok = CancelToken::new();
        let clone = tok.clone();
        clone.cancel();
        assert!(tok.is_cancelled());
    }

    #[test]
    fn cancel_token_pause_resume_roundtrip() {
        let tok = CancelToken::new();
        tok.pause();
        assert!(tok.is_paused());
        tok.resume();
        assert!(!tok.is_paused());
    }

    #[test]
    fn assert_nontrivial_factor_accepts_real_factor() {
        assert!(assert_nontrivial_factor(&Integer::from(143), &Integer::from(11)).is_ok());
    }

    #[test]
    fn assert_nontrivial_factor_rejects_non_divisor() {
        assert!(assert_nontrivial_factor(&Integer::from(143), &Integer::from(12)).is_err());
    }

    #[test]
    fn assert_nontrivial_factor_rejects_trivial_bounds() {
        assert!(assert_nontrivial_factor(&Integer::from(143), &Integer::from(1)).is_err());
        assert!(assert_nontrivial_factor(&Integer::from(143), &Integer::from(143)).is_err());
    }
}
