//! Classical Shor order-finding (no quantum subroutine — the classical
//! smooth-exponent "squeeze" approximation to order-finding).
//!
//! Grounded in `original_source/api/app/algos/shor_classical.py`'s
//! `generate_primes_up_to` / `build_smooth_exponent` / `find_order_classical` /
//! `shor_classical_post_processing` trio. The squeeze loop divides out primes
//! from the top one at a time — the same order as the original — rather than
//! retrying the whole search from scratch on each candidate order.

use super::{CancelToken, KernelOutcome};
use crate::{bigint, sieve};
use rug::rand::RandState;
use rug::Integer;

/// B values swept by the multi-attempt wrapper, in order.
pub const B_SWEEP: [u64; 4] = [10_000, 50_000, 200_000, 1_000_000];

/// Diagnostic record describing one attempt, independent of whether it found a factor.
#[derive(Debug, Clone)]
pub struct ShorDiagnostic {
    pub base: Integer,
    pub smoothness_bound: u64,
    pub order: Option<Integer>,
    pub condition: ShorCondition,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShorCondition {
    LuckyGcd,
    PowerGcd,
    OrderNotSmooth,
    OrderOdd,
    OrderTrivialPower,
    Success,
}

/// M = ∏_{q prime ≤ B} q^⌊log_q B⌋ — the largest B-smooth exponent whose
/// prime-power factors are all ≤ B.
fn build_smooth_exponent(bound: u64) -> Integer {
    let primes = sieve::generate_primes(bound);
    let mut m = Integer::from(1);
    for q in primes {
        let mut power = q;
        while power * q <= bound {
            power *= q;
        }
        m *= power;
    }
    m
}

/// `g = gcd(a^M - 1, n)` for the same `M` used by [`find_order_classical`] —
/// a p-1-style success that fires whenever the order of `a` is smooth modulo
/// only one of `n`'s prime factors, without needing the full order.
fn smooth_power_gcd(a: &Integer, n: &Integer, bound: u64) -> Option<Integer> {
    let m = build_smooth_exponent(bound);
    let am = bigint::mod_pow(a, &m, n).ok()?;
    let g = bigint::gcd(&Integer::from(&am - 1u32), n);
    if g > 1 && g < *n {
        Some(g)
    } else {
        None
    }
}

/// Squeeze-style classical order finding: verify `a^M ≡ 1 (mod n)`, then
/// divide M by each prime factor of M (in the same order they were multiplied
/// in) while `a^(M/q)` still ≡ 1 mod n. Returns `None` if the order is not
/// M-smooth (the initial verification fails).
fn find_order_classical(a: &Integer, n: &Integer, bound: u64) -> Option<Integer> {
    let m = build_smooth_exponent(bound);
    let am = bigint::mod_pow(a, &m, n).ok()?;
    if am != 1 {
        return None;
    }

    let mut order = m;
    let primes = sieve::generate_primes(bound);
    for q in primes {
        loop {
            if !order.is_divisible_u(q as u32) {
                break;
            }
            let candidate = Integer::from(&order / q);
            let reduced = match bigint::mod_pow(a, &candidate, n) {
                Ok(v) => v,
                Err(_) => break,
            };
            if reduced == 1 {
                order = candidate;
            } else {
                break;
            }
        }
    }
    Some(order)
}

/// Post-processing: given an even order `r` with `a^(r/2) != ±1`, extract a
/// factor via `gcd(a^(r/2) - 1, n)` then `gcd(a^(r/2) + 1, n)`.
fn post_process(a: &Integer, n: &Integer, r: &Integer) -> Option<Integer> {
    if r.is_odd() {
        return None;
    }
    let half = Integer::from(r / 2u32);
    let a_half = bigint::mod_pow(a, &half, n).ok()?;
    let n_minus_1 = Integer::from(n - 1u32);
    if a_half == 1 || a_half == n_minus_1 {
        return None;
    }

    let g1 = bigint::gcd(&Integer::from(&a_half - 1u32), n);
    if g1 > 1 && g1 < *n {
        return Some(g1);
    }
    let g2 = bigint::gcd(&Integer::from(&a_half + 1u32), n);
    if g2 > 1 && g2 < *n {
        return Some(g2);
    }
    None
}

/// Single attempt for a fixed base `a` and smoothness bound `B`.
fn attempt(n: &Integer, a: &Integer, bound: u64) -> (Option<Integer>, ShorDiagnostic) {
    let g = bigint::gcd(a, n);
    if g > 1 && g < *n {
        return (
            Some(g),
            ShorDiagnostic {
                base: a.clone(),
                smoothness_bound: bound,
                order: None,
                condition: ShorCondition::LuckyGcd,
            },
        );
    }

    if let Some(g) = smooth_power_gcd(a, n, bound) {
        return (
            Some(g),
            ShorDiagnostic {
                base: a.clone(),
                smoothness_bound: bound,
                order: None,
                condition: ShorCondition::PowerGcd,
            },
        );
    }

    let order = match find_order_classical(a, n, bound) {
        Some(r) => r,
        None => {
            return (
                None,
                ShorDiagnostic {
                    base: a.clone(),
                    smoothness_bound: bound,
                    order: None,
                    condition: ShorCondition::OrderNotSmooth,
                },
            )
        }
    };

    if order.is_odd() {
        return (
            None,
            ShorDiagnostic {
                base: a.clone(),
                smoothness_bound: bound,
                order: Some(order),
                condition: ShorCondition::OrderOdd,
            },
        );
    }

    match post_process(a, n, &order) {
        Some(f) => (
            Some(f),
            ShorDiagnostic {
                base: a.clone(),
                smoothness_bound: bound,
                order: Some(order),
                condition: ShorCondition::Success,
            },
        ),
        None => (
            None,
            ShorDiagnostic {
                base: a.clone(),
                smoothness_bound: bound,
                order: Some(order),
                condition: ShorCondition::OrderTrivialPower,
            },
        ),
    }
}

/// Multi-attempt wrapper: sweeps `B ∈ B_SWEEP` against random bases coprime
/// to `n`, returning the first non-trivial factor found, or `NotFound` after
/// exhausting the sweep (or `TimedOut` if cancelled mid-sweep).
pub fn run(n: &Integer, attempts_per_bound: u32, token: &CancelToken) -> anyhow::Result<(KernelOutcome, Vec<ShorDiagnostic>)> {
    if *n < 3 {
        anyhow::bail!("shor: candidate must be >= 3, got {n}");
    }
    if n.is_even() {
        let two = Integer::from(2);
        super::assert_nontrivial_factor(n, &two)?;
        return Ok((KernelOutcome::Found(two), Vec::new()));
    }

    let mut rng = RandState::new();
    let mut diagnostics = Vec::new();

    for &bound in &B_SWEEP {
        for _ in 0..attempts_per_bound {
            if token.is_cancelled() {
                return Ok((KernelOutcome::NotFound, diagnostics));
            }
            let upper = Integer::from(n - 3u32);
            let a = if upper <= 0 {
                Integer::from(2)
            } else {
                Integer::from(upper.clone().random_below(&mut rng) + 2)
            };
            let (found, diag) = attempt(n, &a, bound);
            diagnostics.push(diag);
            if let Some(f) = found {
                super::assert_nontrivial_factor(n, &f)?;
                return Ok((KernelOutcome::Found(f), diagnostics));
            }
        }
    }

    Ok((KernelOutcome::NotFound, diagnostics))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_smooth_exponent_is_multiple_of_all_small_prime_powers() {
        let m = build_smooth_exponent(20);
        // 2^4=16<=20, 3^2=9<=20, 5,7,11,13,17,19 (first power only)
        for p in [2u32, 3, 5, 7, 11, 13, 17, 19] {
            assert!(m.is_divisible_u(p));
        }
    }

    #[test]
    fn even_candidate_returns_two_immediately() {
        let tok = CancelToken::new();
        let (outcome, _) = run(&Integer::from(1234u32), 5, &tok).unwrap();
        assert_eq!(outcome, KernelOutcome::Found(Integer::from(2)));
    }

    #[test]
    fn finds_factor_of_small_semiprime() {
        let tok = CancelToken::new();
        let n = Integer::from(10403u32); // 101 * 103
        let (outcome, diags) = run(&n, 50, &tok).unwrap();
        match outcome {
            KernelOutcome::Found(f) => {
                assert!(n.is_divisible(&f));
                assert!(f > 1 && f < n);
            }
            KernelOutcome::NotFound => {
                // Classical Shor is probabilistic in its base choice; if this
                // particular sweep missed, at least confirm diagnostics were recorded.
                assert!(!diags.is_empty());
            }
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[test]
    fn smooth_power_gcd_succeeds_when_full_order_is_not_smooth() {
        // n = 15 = 3*5, a = 2, bound = 2 so M = 2. a^2 mod 15 = 4, so the
        // order isn't smooth and find_order_classical bails immediately —
        // but gcd(a^2 - 1, 15) = gcd(3, 15) = 3 still extracts a factor,
        // since ord_3(2) = 2 divides M even though ord_5(2) = 4 doesn't.
        let n = Integer::from(15);
        let a = Integer::from(2);
        assert!(find_order_classical(&a, &n, 2).is_none());
        assert_eq!(smooth_power_gcd(&a, &n, 2), Some(Integer::from(3)));
    }

    #[test]
    fn attempt_reports_power_gcd_condition_before_order_finding() {
        let n = Integer::from(15);
        let a = Integer::from(2);
        let (found, diag) = attempt(&n, &a, 2);
        assert_eq!(found, Some(Integer::from(3)));
        assert_eq!(diag.condition, ShorCondition::PowerGcd);
        assert_eq!(diag.order, None);
    }

    #[test]
    fn rejects_candidates_below_three() {
        let tok = CancelToken::new();
        assert!(run(&Integer::from(2u32), 5, &tok).is_err());
    }

    #[test]
    fn cancellation_stops_the_sweep() {
        let tok = CancelToken::new();
        tok.cancel();
        let n = Integer::from(999_999_999_989u64);
        let (outcome, _) = run(&n, 50, &tok).unwrap();
        assert_eq!(outcome, KernelOutcome::NotFound);
    }
}
