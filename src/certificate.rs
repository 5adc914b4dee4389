//! # Certificate — Exportable Primality Certificates
//!
//! A certificate is a JSON document listing the proof steps taken to
//! establish `is_prime_fast(N)`, sufficient for an independent party to
//! re-verify the claim without re-running the original search.
//!
//! ## Step types
//!
//! - **SmallPrime**: `N` matched a small-prime table entry directly
//!   (`N <= 1000`), a trial-division proof.
//! - **Pocklington**: an N−1 proof — a partial factorization `N-1 = F·R` with
//!   `F² > N`, a witness base `a`, and the prime factors of `F`, each
//!   satisfying `a^(N-1) ≡ 1` and `gcd(a^((N-1)/q) - 1, N) = 1`.
//! - **ProbablePrime**: no deterministic witness found; `N` passed
//!   `k`-round Miller–Rabin only. Not a proof — the verifier never upgrades
//!   this to `verified`.
//! - **EcppStep**: a placeholder for an externally-supplied ECPP step. The
//!   verifier accepts its shape but cannot independently check it, so it is
//!   never sufficient on its own to mark a certificate verified.
//!
//! ## Serialization
//!
//! `#[serde(tag = "type")]` on [`CertificateStep`] gives each step a `"type"`
//! discriminator; the enclosing [`PrimalityCertificate`] document carries its
//! own constant `"type":"ECPP"` / `"version":"1.0"` fields per the wire format.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One step in a primality proof or probable-primality claim.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum CertificateStep {
    /// Direct trial-division proof for `n <= 1000`.
    #[serde(rename = "small_prime")]
    SmallPrime { n: String },

    /// Pocklington N−1 proof: witness base `a`, partial factorization
    /// `n - 1 = F * r` with `F^2 > n`, and the prime factors making up `F`.
    #[serde(rename = "pocklington")]
    Pocklington {
        witness: u32,
        f: String,
        r: String,
        factors: Vec<String>,
    },

    /// Miller–Rabin survival only, not a deterministic proof.
    #[serde(rename = "probable_prime")]
    ProbablePrime { rounds: u32 },

    /// Externally-supplied elliptic curve primality proof step. Accepted for
    /// round-trip but never independently verified by this crate.
    #[serde(rename = "ecpp_step")]
    EcppStep { data: serde_json::Value },
}

/// Exportable primality certificate: a JSON document listing every step of
/// the proof (or probable-primality claim) for `n`.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct PrimalityCertificate {
    pub n: String,
    pub steps: Vec<CertificateStep>,
    pub verified: bool,
    pub created_at: DateTime<Utc>,
    #[serde(rename = "type")]
    pub doc_type: String,
    pub version: String,
}

impl PrimalityCertificate {
    /// Build a new certificate document. `verified` defaults to `false` —
    /// callers set it after running [`crate::verify::verify_certificate`].
    pub fn new(n: String, steps: Vec<CertificateStep>) -> Self {
        PrimalityCertificate {
            n,
            steps,
            verified: false,
            created_at: Utc::now(),
            doc_type: "ECPP".to_string(),
            version: "1.0".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn small_prime_step_roundtrip() {
        let step = CertificateStep::SmallPrime { n: "97".to_string() };
        let json = serde_json::to_string(&step).unwrap();
        assert!(json.contains(r#""type":"small_prime""#));
        let decoded: CertificateStep = serde_json::from_str(&json).unwrap();
        assert_eq!(step, decoded);
    }

    #[test]
    fn pocklington_step_roundtrip() {
        let step = CertificateStep::Pocklington {
            witness: 3,
            f: "96".to_string(),
            r: "1".to_string(),
            factors: vec!["2".to_string(), "3".to_string()],
        };
        let json = serde_json::to_string(&step).unwrap();
        assert!(json.contains(r#""type":"pocklington""#));
        let decoded: CertificateStep = serde_json::from_str(&json).unwrap();
        assert_eq!(step, decoded);
    }

    #[test]
    fn probable_prime_step_roundtrip() {
        let step = CertificateStep::ProbablePrime { rounds: 50 };
        let json = serde_json::to_string(&step).unwrap();
        assert!(json.contains(r#""type":"probable_prime""#));
        let decoded: CertificateStep = serde_json::from_str(&json).unwrap();
        assert_eq!(step, decoded);
    }

    #[test]
    fn ecpp_step_roundtrip() {
        let step = CertificateStep::EcppStep {
            data: serde_json::json!({"curve": "a=1,b=2"}),
        };
        let json = serde_json::to_string(&step).unwrap();
        assert!(json.contains(r#""type":"ecpp_step""#));
        let decoded: CertificateStep = serde_json::from_str(&json).unwrap();
        assert_eq!(step, decoded);
    }

    #[test]
    fn unknown_step_type_fails_deserialization() {
        let json = r#"{"type":"unknown","data":"x"}"#;
        let result: Result<CertificateStep, _> = serde_json::from_str(json);
        assert!(result.is_err());
    }

    #[test]
    fn certificate_document_carries_wrapper_fields() {
        let cert = PrimalityCertificate::new(
            "97".to_string(),
            vec![CertificateStep::SmallPrime { n: "97".to_string() }],
        );
        assert_eq!(cert.doc_type, "ECPP");
        assert_eq!(cert.version, "1.0");
        assert!(!cert.verified);
    }

    #[test]
    fn certificate_document_json_roundtrip() {
        let cert = PrimalityCertificate::new(
            "104729".to_string(),
            vec![CertificateStep::Pocklington {
                witness: 3,
                f: "104728".to_string(),
                r: "1".to_string(),
                factors: vec!["2".to_string(), "7".to_string()],
            }],
        );
        let json = serde_json::to_string(&cert).unwrap();
        assert!(json.contains(r#""type":"ECPP""#));
        assert!(json.contains(r#""version":"1.0""#));
        let decoded: PrimalityCertificate = serde_json::from_str(&json).unwrap();
        assert_eq!(cert, decoded);
    }

    #[test]
    fn certificate_with_multiple_steps() {
        let cert = PrimalityCertificate::new(
            "561".to_string(),
            vec![
                CertificateStep::ProbablePrime { rounds: 50 },
                CertificateStep::EcppStep { data: serde_json::json!({}) },
            ],
        );
        assert_eq!(cert.steps.len(), 2);
        let json = serde_json::to_string(&cert).unwrap();
        let decoded: PrimalityCertificate = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded.steps.len(), 2);
    }
}
