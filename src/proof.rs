//! # Proof — Pocklington N−1 Certificate Builder
//!
//! Builds a deterministic primality certificate for a candidate already
//! known to pass `is_prime_fast`. Pocklington's theorem needs only a
//! *partial* factorization of `N-1`: if a small-prime table yields a factor
//! `F` with `F² > N`, a single witness base `a` satisfying
//! `a^(N-1) ≡ 1 (mod N)` and `gcd(a^((N-1)/q) - 1, N) = 1` for every prime
//! `q | F` proves `N` prime outright — the unfactored remainder `R = (N-1)/F`
//! never needs to be inspected.
//!
//! ## References
//!
//! - H.C. Pocklington, "The Determination of the Prime or Composite Nature
//!   of Large Numbers by Fermat's Theorem", Proc. Cambridge Phil. Soc., 1914.

use crate::certificate::CertificateStep;
use rayon::prelude::*;
use rug::Integer;

/// A Pocklington N−1 proof: witness base, the factored part `F` of `N-1`,
/// its cofactor `R = (N-1)/F`, and the prime factors making up `F`.
pub struct PocklingtonResult {
    pub witness: u32,
    pub f: Integer,
    pub r: Integer,
    pub factors: Vec<Integer>,
}

/// Attempt a Pocklington N−1 proof using `small_primes` as the factor base
/// for `N-1`. Returns `None` if the small-prime table can't pull out a
/// factor `F` with `F² > N`, or no witness in `[2, 100]` satisfies every
/// factor simultaneously.
pub fn try_pocklington(candidate: &Integer, small_primes: &[u64]) -> Option<PocklingtonResult> {
    let n_minus_1 = Integer::from(candidate - 1u32);
    let mut remaining = n_minus_1.clone();
    let mut f = Integer::from(1);
    let mut factors = Vec::new();

    for &p in small_primes {
        if remaining == 1u32 {
            break;
        }
        if p < 2 {
            continue;
        }
        let p_int = Integer::from(p);
        if remaining.is_divisible(&p_int) {
            while remaining.is_divisible(&p_int) {
                remaining /= &p_int;
                f *= &p_int;
            }
            factors.push(p_int);
        }
    }

    if factors.is_empty() {
        return None;
    }
    if Integer::from(&f * &f) <= *candidate {
        return None;
    }
    let r = remaining;

    let witness = (2u32..=100).into_par_iter().find_map_first(|a| {
        let a_int = Integer::from(a);
        let fermat = a_int.clone().pow_mod(&n_minus_1, candidate).ok()?;
        if fermat != 1u32 {
            return None;
        }
        for q in &factors {
            let exp_q = Integer::from(&n_minus_1 / q);
            let reduced = a_int.clone().pow_mod(&exp_q, candidate).ok()?;
            let g = Integer::from(&reduced - 1u32).gcd(candidate);
            if g != 1u32 {
                return None;
            }
        }
        Some(a)
    })?;

    Some(PocklingtonResult { witness, f, r, factors })
}

/// Build the certificate step sequence for `candidate`, per the pipeline's
/// primality gate: a direct trial-division step for `n <= 1000`, otherwise
/// Pocklington if a witness is found, otherwise a bare probable-prime step.
pub fn build_certificate_steps(candidate: &Integer, small_primes: &[u64]) -> Vec<CertificateStep> {
    if *candidate <= 1000 {
        return vec![CertificateStep::SmallPrime { n: candidate.to_string() }];
    }

    match try_pocklington(candidate, small_primes) {
        Some(proof) => vec![CertificateStep::Pocklington {
            witness: proof.witness,
            f: proof.f.to_string(),
            r: proof.r.to_string(),
            factors: proof.factors.iter().map(|q| q.to_string()).collect(),
        }],
        None => vec![CertificateStep::ProbablePrime { rounds: 50 }],
    }
}
