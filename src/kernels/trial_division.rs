//! Trial division by a wheel of primes.
//!
//! Grounded on `sieve::generate_primes` (u64 sieve of Eratosthenes already
//! used elsewhere in this crate for candidate generation) rather than
//! building a second sieve implementation.

use super::{CancelToken, KernelOutcome};
use crate::sieve;
use rug::Integer;

/// Default trial-division limit, per the pipeline's stage-1 default.
pub const DEFAULT_LIMIT: u64 = 10_000_000;

/// Trial-divide `n` by every prime `p <= min(limit, floor(sqrt(n)))`.
///
/// Returns the first dividing prime, or `NotFound` if none divides `n` within
/// the searched range. Cooperative cancellation is checked every `CHECK_INTERVAL`
/// primes tried, matching the engine's K=10⁴ inner-loop check cadence for
/// prime-sieve-driven stages.
pub fn run(n: &Integer, limit: u64, token: &CancelToken) -> anyhow::Result<KernelOutcome> {
    const CHECK_INTERVAL: usize = 10_000;

    if *n < 2 {
        anyhow::bail!("trial_division: candidate must be >= 2, got {n}");
    }

    let sqrt_n = n.clone().sqrt();
    let sqrt_n_u64 = if sqrt_n > u64::MAX { u64::MAX } else { sqrt_n.to_u64().unwrap_or(u64::MAX) };
    let effective_limit = limit.min(sqrt_n_u64);

    let primes = sieve::generate_primes(effective_limit);

    for (i, &p) in primes.iter().enumerate() {
        if i % CHECK_INTERVAL == 0 && token.is_cancelled() {
            return Ok(KernelOutcome::NotFound);
        }
        if n.is_divisible_u(p as u32) {
            let f = Integer::from(p);
            super::assert_nontrivial_factor(n, &f)?;
            return Ok(KernelOutcome::Found(f));
        }
    }

    Ok(KernelOutcome::NotFound)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_small_factor() {
        let tok = CancelToken::new();
        let outcome = run(&Integer::from(143), DEFAULT_LIMIT, &tok).unwrap();
        assert_eq!(outcome, KernelOutcome::Found(Integer::from(11)));
    }

    #[test]
    fn finds_factor_of_two() {
        let tok = CancelToken::new();
        let outcome = run(&Integer::from(1234), DEFAULT_LIMIT, &tok).unwrap();
        assert_eq!(outcome, KernelOutcome::Found(Integer::from(2)));
    }

    #[test]
    fn prime_candidate_not_found() {
        let tok = CancelToken::new();
        let outcome = run(&Integer::from(104729u32), DEFAULT_LIMIT, &tok).unwrap();
        assert_eq!(outcome, KernelOutcome::NotFound);
    }

    #[test]
    fn semiprime_of_two_large_primes_not_found_under_small_limit() {
        // 1009 * 1013, both primes well above a tiny limit
        let n = Integer::from(1009u32) * Integer::from(1013u32);
        let tok = CancelToken::new();
        let outcome = run(&n, 100, &tok).unwrap();
        assert_eq!(outcome, KernelOutcome::NotFound);
    }

    #[test]
    fn limit_is_capped_at_sqrt_n() {
        // Even with a huge limit, trial division against 143 only needs
        // primes up to floor(sqrt(143)) = 11.
        let tok = CancelToken::new();
        let outcome = run(&Integer::from(143), 10_000_000_000, &tok).unwrap();
        assert_eq!(outcome, KernelOutcome::Found(Integer::from(11)));
    }

    #[test]
    fn rejects_candidates_below_two() {
        let tok = CancelToken::new();
        assert!(run(&Integer::from(1), DEFAULT_LIMIT, &tok).is_err());
        assert!(run(&Integer::from(0), DEFAULT_LIMIT, &tok).is_err());
    }
}
