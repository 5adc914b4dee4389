//! Lenstra's elliptic curve method (ECM) in Montgomery form, Suyama
//! parameterization, Stage 1 only.
//!
//! Grounded on `examples/jtcoolen-ecm`'s `arith/montgomery_point.rs` (the
//! `MontgomeryPoint` differential-addition/doubling/ladder trio) and
//! `lib.rs`'s `inversionless_ecm` (Crandall & Pomerance, Algorithm 7.4.4),
//! ported onto this crate's own `rug::Integer` conventions and `bigint`/
//! `sieve` helpers rather than carrying over that crate's own modular
//! arithmetic module verbatim.

use super::{CancelToken, KernelOutcome};
use crate::{bigint, sieve};
use rayon::prelude::*;
use rug::rand::RandState;
use rug::Integer;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// One (B1, curve count) rung of the default staircase.
#[derive(Debug, Clone, Copy)]
pub struct Stage {
    pub b1: u64,
    pub curves: u32,
}

/// Default staircase: widen B1 and curve count together as early stages fail.
pub const DEFAULT_STAIRCASE: [Stage; 3] = [
    Stage { b1: 10_000, curves: 25 },
    Stage { b1: 50_000, curves: 100 },
    Stage { b1: 250_000, curves: 200 },
];

/// How a run should behave beyond the default staircase.
#[derive(Clone)]
pub enum Mode {
    /// Walk `DEFAULT_STAIRCASE` once.
    Default,
    /// Walk `DEFAULT_STAIRCASE`, invoking `checkpoint` after every curve so the
    /// caller can persist progress (curves completed, sigma values tried).
    Enhanced,
    /// Delegate to an external ECM binary. Not implemented by this kernel —
    /// the engine's `external_gnfs` driver handles process delegation; this
    /// variant exists only so callers can tag a job's kernel choice without
    /// the kernel itself needing to know about subprocesses.
    External,
}

/// A single curve attempt's outcome, reported to an `Enhanced`-mode checkpoint
/// callback after every curve regardless of whether it found a factor.
#[derive(Debug, Clone)]
pub struct CurveCheckpoint {
    pub stage_b1: u64,
    pub curves_completed_in_stage: u32,
    pub sigma: Integer,
}

/// A point on a Montgomery curve `B*y^2 = x^3 + A*x^2 + x`, represented in
/// projective `(X : Z)` coordinates (the curve's own `B` never appears in the
/// arithmetic, only `a24 = (A + 2) / 4`).
#[derive(Clone)]
struct MontgomeryPoint {
    x: Integer,
    z: Integer,
    a24: Integer,
    n: Integer,
}

impl MontgomeryPoint {
    fn new(x: Integer, z: Integer, a24: Integer, n: Integer) -> Self {
        MontgomeryPoint { x, z, a24, n }
    }

    /// Differential addition: given `self = P`, `other = Q`, and
    /// `diff = P - Q`, returns `P + Q`.
    fn addh(&self, other: &MontgomeryPoint, diff: &MontgomeryPoint) -> MontgomeryPoint {
        let n = &self.n;
        let u = mul_mod(&sub_mod(&self.x, &self.z, n), &add_mod(&other.x, &other.z, n), n);
        let v = mul_mod(&add_mod(&self.x, &self.z, n), &sub_mod(&other.x, &other.z, n), n);
        let upv2 = square_mod(&add_mod(&u, &v, n), n);
        let umv2 = square_mod(&sub_mod(&u, &v, n), n);
        let x = mul_mod(&diff.z, &upv2, n);
        let z = mul_mod(&diff.x, &umv2, n);
        MontgomeryPoint::new(x, z, self.a24.clone(), n.clone())
    }

    /// Doubling: returns `2*self`.
    fn double(&self) -> MontgomeryPoint {
        let n = &self.n;
        let xps = square_mod(&add_mod(&self.x, &self.z, n), n);
        let xms = square_mod(&sub_mod(&self.x, &self.z, n), n);
        let diff = sub_mod(&xps, &xms, n);
        let x = mul_mod(&xps, &xms, n);
        let z = mul_mod(&diff, &add_mod(&xms, &mul_mod(&self.a24, &diff, n), n), n);
        MontgomeryPoint::new(x, z, self.a24.clone(), n.clone())
    }

    /// Montgomery ladder: returns `k * self`.
    fn ladder(&self, k: &Integer) -> MontgomeryPoint {
        if *k == 0 {
            return MontgomeryPoint::new(Integer::from(0), Integer::from(0), self.a24.clone(), self.n.clone());
        }
        let bits = k.significant_bits();
        let mut r0 = self.clone();
        let mut r1 = self.double();
        for i in (0..bits - 1).rev() {
            if k.get_bit(i) {
                r0 = r0.addh(&r1, self);
                r1 = r1.double();
            } else {
                r1 = r0.addh(&r1, self);
                r0 = r0.double();
            }
        }
        r0
    }
}

fn take_mod(a: &Integer, n: &Integer) -> Integer {
    let r = Integer::from(a % n);
    if r < 0 {
        r + n
    } else {
        r
    }
}

fn add_mod(a: &Integer, b: &Integer, n: &Integer) -> Integer {
    take_mod(&Integer::from(a + b), n)
}

fn sub_mod(a: &Integer, b: &Integer, n: &Integer) -> Integer {
    take_mod(&Integer::from(a - b), n)
}

fn mul_mod(a: &Integer, b: &Integer, n: &Integer) -> Integer {
    take_mod(&Integer::from(a * b), n)
}

fn square_mod(a: &Integer, n: &Integer) -> Integer {
    mul_mod(a, a, n)
}

/// Build the Stage 1 smooth exponent `k = prod p_i^a_i` over all primes `p <= b1`.
fn build_stage1_exponent(b1: u64) -> Integer {
    let primes = sieve::generate_primes(b1);
    let mut k = Integer::from(1);
    for p in primes {
        let mut power = p;
        while power * p <= b1 {
            power *= p;
        }
        k *= power;
    }
    k
}

/// One ECM curve attempt via Suyama's parameterization. Returns `Some(factor)`
/// on a non-trivial gcd, either because a point coordinate became
/// non-invertible mod n during curve construction, or because Stage 1's
/// ladder produced a Z divisible by a prime factor of n.
fn attempt_curve(n: &Integer, sigma: &Integer, stage1_exponent: &Integer) -> Option<Integer> {
    let five = Integer::from(5);
    let four = Integer::from(4);

    let v = mul_mod(&four, sigma, n);
    let u = sub_mod(&square_mod(sigma, n), &five, n);
    let diff = sub_mod(&v, &u, n);

    let u3 = mul_mod(&square_mod(&u, n), &u, n);
    let v3 = mul_mod(&square_mod(&v, n), &v, n);

    // c = (v - u)^3 * (3u + v) / (4 u^3 v) -- the Suyama a24 term, via
    // inversion of 4*u^3*v. A non-invertible denominator hands us a factor
    // directly instead of failing the curve.
    let denom = mul_mod(&mul_mod(&four, &u3, n), &v, n);
    let inv_denom = match denom.clone().invert(n) {
        Ok(inv) => inv,
        Err(_) => {
            let g = bigint::gcd(&denom, n);
            if g > 1 && g < *n {
                return Some(g);
            }
            return None;
        }
    };

    let diff3 = mul_mod(&square_mod(&diff, n), &diff, n);
    let three_u_plus_v = add_mod(&mul_mod(&Integer::from(3), &u, n), &v, n);
    let a24 = mul_mod(&mul_mod(&diff3, &three_u_plus_v, n), &inv_denom, n);

    let point = MontgomeryPoint::new(u3, v3, a24, n.clone());
    let result = point.ladder(stage1_exponent);

    if result.z == 0 {
        return None;
    }
    let g = bigint::gcd(&result.z, n);
    if g > 1 && g < *n {
        return Some(g);
    }
    None
}

/// Suggest a (B1, curve count, rough wall-clock order of magnitude) rung for
/// a factor of the given expected decimal digit length. Mirrors the staircase
/// widening seen in `DEFAULT_STAIRCASE`, extrapolated per Crandall & Pomerance's
/// standard ECM effort table.
pub fn suggest_stage(expected_factor_digits: u32) -> Stage {
    match expected_factor_digits {
        0..=15 => Stage { b1: 10_000, curves: 25 },
        16..=20 => Stage { b1: 50_000, curves: 100 },
        21..=25 => Stage { b1: 250_000, curves: 200 },
        26..=30 => Stage { b1: 1_000_000, curves: 700 },
        _ => Stage { b1: 3_000_000, curves: 1_600 },
    }
}

/// Run staged ECM against `n`: walk `DEFAULT_STAIRCASE`, trying `curves` random
/// Suyama curves per stage in parallel, widening B1 on exhaustion.
///
/// `checkpoint`, when `Some`, is invoked after every completed curve in
/// `Mode::Enhanced` (ignored in `Mode::Default`/`Mode::External`) so a caller
/// can persist resumable progress.
pub fn run(
    n: &Integer,
    mode: &Mode,
    token: &CancelToken,
    checkpoint: Option<&mut dyn FnMut(&CurveCheckpoint)>,
) -> anyhow::Result<KernelOutcome> {
    run_stages(n, &DEFAULT_STAIRCASE, mode, token, checkpoint)
}

/// Like [`run`], but walks a caller-supplied staircase instead of
/// `DEFAULT_STAIRCASE`. Used for the "advanced ECM" stage, which widens the
/// schedule with [`suggest_stage`] once a candidate's digit length crosses
/// the default staircase's effective range.
pub fn run_stages(
    n: &Integer,
    stages: &[Stage],
    mode: &Mode,
    token: &CancelToken,
    mut checkpoint: Option<&mut dyn FnMut(&CurveCheckpoint)>,
) -> anyhow::Result<KernelOutcome> {
    if *n < 2 {
        anyhow::bail!("ecm: candidate must be >= 2, got {n}");
    }
    if n.is_even() {
        let two = Integer::from(2);
        super::assert_nontrivial_factor(n, &two)?;
        return Ok(KernelOutcome::Found(two));
    }
    if matches!(mode, Mode::External) {
        anyhow::bail!("ecm: External mode is a job-tag only, not an executable kernel");
    }

    let mut rng = RandState::new();
    let found: Arc<AtomicBool> = Arc::new(AtomicBool::new(false));

    for stage in stages.iter().copied() {
        if token.is_cancelled() {
            return Ok(KernelOutcome::NotFound);
        }
        let k = build_stage1_exponent(stage.b1);

        let sigmas: Vec<Integer> = (0..stage.curves)
            .map(|_| {
                let upper = Integer::from(n - 6u32);
                if upper <= 0 {
                    Integer::from(6)
                } else {
                    Integer::from(upper.random_below(&mut rng) + 6)
                }
            })
            .collect();

        if matches!(mode, Mode::Enhanced) {
            // Sequential so the checkpoint callback sees every curve in order.
            for (i, sigma) in sigmas.iter().enumerate() {
                if token.is_cancelled() {
                    return Ok(KernelOutcome::NotFound);
                }
                if let Some(f) = attempt_curve(n, sigma, &k) {
                    super::assert_nontrivial_factor(n, &f)?;
                    return Ok(KernelOutcome::Found(f));
                }
                if let Some(cb) = checkpoint.as_mut() {
                    cb(&CurveCheckpoint {
                        stage_b1: stage.b1,
                        curves_completed_in_stage: i as u32 + 1,
                        sigma: sigma.clone(),
                    });
                }
            }
            continue;
        }

        let result = sigmas.par_iter().find_map_any(|sigma| {
            if found.load(Ordering::Relaxed) || token.is_cancelled() {
                return None;
            }
            let r = attempt_curve(n, sigma, &k);
            if r.is_some() {
                found.store(true, Ordering::Relaxed);
            }
            r
        });

        if let Some(f) = result {
            super::assert_nontrivial_factor(n, &f)?;
            return Ok(KernelOutcome::Found(f));
        }
    }

    Ok(KernelOutcome::NotFound)
}
