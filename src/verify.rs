//! Independent certificate verifier.
//!
//! Re-derives each step's claim from scratch rather than trusting the
//! certificate's own record: a `Pocklington` step recomputes the Fermat and
//! gcd conditions from the stored witness and factor list; a `SmallPrime`
//! step re-runs trial division directly. Per the Open Question on
//! `ecpp_step` verification (the certificate format accepts externally
//! supplied ECPP steps that this crate cannot independently check):
//! `ProbablePrime` and `EcppStep` are accepted as well-formed but never
//! promote a certificate to `verified: true` — only `{SmallPrime,
//! Pocklington}` are trusted as deterministic proofs.

use crate::certificate::{CertificateStep, PrimalityCertificate};
use crate::sieve;
use rug::Integer;
use std::str::FromStr;

/// Outcome of checking a single certificate step against the candidate it
/// claims to certify.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepVerdict {
    /// The step's claim was independently re-derived and holds.
    Verified,
    /// The step is well-formed but not a deterministic proof (probable-prime
    /// or externally-supplied ECPP data).
    Unverifiable,
    /// The step's claim does not hold — an altered or fabricated step.
    Rejected(String),
}

/// Re-check one certificate step against `n`.
pub fn verify_step(n: &Integer, step: &CertificateStep) -> StepVerdict {
    match step {
        CertificateStep::SmallPrime { n: claimed } => verify_small_prime(n, claimed),
        CertificateStep::Pocklington { witness, f, r, factors } => {
            verify_pocklington(n, *witness, f, r, factors)
        }
        CertificateStep::ProbablePrime { .. } => StepVerdict::Unverifiable,
        CertificateStep::EcppStep { .. } => StepVerdict::Unverifiable,
    }
}

fn verify_small_prime(n: &Integer, claimed: &str) -> StepVerdict {
    let claimed_n = match Integer::from_str(claimed) {
        Ok(v) => v,
        Err(_) => return StepVerdict::Rejected(format!("small_prime: '{claimed}' is not an integer")),
    };
    if claimed_n != *n {
        return StepVerdict::Rejected(format!("small_prime: claims n={claimed_n} but certificate is for {n}"));
    }
    if *n > 1000 {
        return StepVerdict::Rejected(format!("small_prime: n={n} exceeds the trial-division threshold of 1000"));
    }
    if *n < 2 {
        return StepVerdict::Rejected(format!("small_prime: {n} is not prime"));
    }
    let sqrt_n = n.clone().sqrt().to_u64().unwrap_or(u64::MAX);
    for p in sieve::generate_primes(sqrt_n) {
        if n.is_divisible_u(p as u32) && *n != p {
            return StepVerdict::Rejected(format!("small_prime: {n} is divisible by {p}"));
        }
    }
    StepVerdict::Verified
}

fn verify_pocklington(n: &Integer, witness: u32, f: &str, r: &str, factors: &[String]) -> StepVerdict {
    let f_val = match Integer::from_str(f) {
        Ok(v) => v,
        Err(_) => return StepVerdict::Rejected(format!("pocklington: '{f}' is not an integer")),
    };
    let r_val = match Integer::from_str(r) {
        Ok(v) => v,
        Err(_) => return StepVerdict::Rejected(format!("pocklington: '{r}' is not an integer")),
    };
    let n_minus_1 = Integer::from(n - 1u32);
    if Integer::from(&f_val * &r_val) != n_minus_1 {
        return StepVerdict::Rejected("pocklington: F*R != N-1".to_string());
    }
    if Integer::from(&f_val * &f_val) <= *n {
        return StepVerdict::Rejected("pocklington: F^2 <= N, insufficient for the theorem".to_string());
    }
    if factors.is_empty() {
        return StepVerdict::Rejected("pocklington: no factors listed".to_string());
    }

    let a = Integer::from(witness);
    let fermat = match a.clone().pow_mod(&n_minus_1, n) {
        Ok(v) => v,
        Err(_) => return StepVerdict::Rejected("pocklington: witness has no valid pow_mod".to_string()),
    };
    if fermat != 1u32 {
        return StepVerdict::Rejected(format!("pocklington: a^(N-1) != 1 (mod N) for witness {witness}"));
    }

    for q_str in factors {
        let q = match Integer::from_str(q_str) {
            Ok(v) => v,
            Err(_) => return StepVerdict::Rejected(format!("pocklington: factor '{q_str}' is not an integer")),
        };
        if !f_val.is_divisible(&q) {
            return StepVerdict::Rejected(format!("pocklington: claimed factor {q} does not divide F"));
        }
        let exp_q = Integer::from(&n_minus_1 / &q);
        let reduced = match a.clone().pow_mod(&exp_q, n) {
            Ok(v) => v,
            Err(_) => return StepVerdict::Rejected(format!("pocklington: no valid pow_mod for factor {q}")),
        };
        let g = Integer::from(&reduced - 1u32).gcd(n);
        if g != 1u32 {
            return StepVerdict::Rejected(format!("pocklington: gcd(a^((N-1)/{q})-1, N) != 1"));
        }
    }

    StepVerdict::Verified
}

/// Verify a whole certificate document: every step must independently
/// verify for the document to be considered proven. A document with only
/// `ProbablePrime`/`EcppStep` steps is well-formed but never `true` here.
pub fn verify_certificate(cert: &PrimalityCertificate) -> bool {
    let n = match Integer::from_str(&cert.n) {
        Ok(v) => v,
        Err(_) => return false,
    };
    if cert.steps.is_empty() {
        return false;
    }
    cert.steps.iter().all(|step| verify_step(&n, step) == StepVerdict::Verified)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proof;

    #[test]
    fn verifies_small_prime_step() {
        let n = Integer::from(97u32);
        let step = CertificateStep::SmallPrime { n: "97".to_string() };
        assert_eq!(verify_step(&n, &step), StepVerdict::Verified);
    }

    #[test]
    fn rejects_small_prime_step_for_composite() {
        let n = Integer::from(91u32); // 7 * 13
        let step = CertificateStep::SmallPrime { n: "91".to_string() };
        assert!(matches!(verify_step(&n, &step), StepVerdict::Rejected(_)));
    }

    #[test]
    fn verifies_pocklington_step_for_known_prime() {
        let n = Integer::from(104729u32);
        let small_primes = sieve::generate_primes(1000);
        let steps = proof::build_certificate_steps(&n, &small_primes);
        for step in &steps {
            assert_eq!(verify_step(&n, step), StepVerdict::Verified);
        }
    }

    #[test]
    fn rejects_altered_pocklington_witness() {
        let n = Integer::from(104729u32);
        let small_primes = sieve::generate_primes(1000);
        let steps = proof::build_certificate_steps(&n, &small_primes);
        let altered: Vec<CertificateStep> = steps
            .into_iter()
            .map(|s| match s {
                CertificateStep::Pocklington { f, r, factors, .. } => {
                    CertificateStep::Pocklington { witness: 99999, f, r, factors }
                }
                other => other,
            })
            .collect();
        for step in &altered {
            if let CertificateStep::Pocklington { .. } = step {
                assert!(matches!(verify_step(&n, step), StepVerdict::Rejected(_)));
            }
        }
    }

    #[test]
    fn probable_prime_step_is_unverifiable_not_rejected() {
        let n = Integer::from(1_000_003u32);
        let step = CertificateStep::ProbablePrime { rounds: 50 };
        assert_eq!(verify_step(&n, &step), StepVerdict::Unverifiable);
    }

    #[test]
    fn ecpp_step_is_unverifiable() {
        let n = Integer::from(1_000_003u32);
        let step = CertificateStep::EcppStep { data: serde_json::json!({}) };
        assert_eq!(verify_step(&n, &step), StepVerdict::Unverifiable);
    }

    #[test]
    fn certificate_round_trips_through_its_own_producer() {
        let n = Integer::from(104729u32);
        let small_primes = sieve::generate_primes(1000);
        let steps = proof::build_certificate_steps(&n, &small_primes);
        let cert = PrimalityCertificate::new(n.to_string(), steps);
        assert!(verify_certificate(&cert));
    }

    #[test]
    fn certificate_with_only_probable_prime_step_never_verifies() {
        let n = Integer::from(1_000_003u32);
        let cert = PrimalityCertificate::new(
            n.to_string(),
            vec![CertificateStep::ProbablePrime { rounds: 50 }],
        );
        assert!(!verify_certificate(&cert));
    }

    #[test]
    fn certificate_with_tampered_step_fails_verification() {
        let n = Integer::from(97u32);
        let mut cert = PrimalityCertificate::new(
            n.to_string(),
            vec![CertificateStep::SmallPrime { n: "97".to_string() }],
        );
        cert.steps[0] = CertificateStep::SmallPrime { n: "98".to_string() };
        assert!(!verify_certificate(&cert));
    }

    #[test]
    fn certificate_with_no_steps_never_verifies() {
        let cert = PrimalityCertificate::new(Integer::from(97u32).to_string(), vec![]);
        assert!(!verify_certificate(&cert));
    }
}
