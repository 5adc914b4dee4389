//! Arbitrary-precision arithmetic façade over [`rug::Integer`].
//!
//! Every other module in this crate reaches `rug` only through here (or through
//! the small set of free functions kept at the crate root for historical
//! reasons: `has_small_factor`, `mr_screened_test`, `estimate_digits`). Nothing
//! here ever widens a big integer into `f64` — `estimate_digits`/`exact_digits`
//! at the crate root are the one sanctioned digit-count proxy for logarithmic
//! work, and this module does not duplicate that escape hatch.

use anyhow::{bail, Result};
use rug::Integer;

/// `a + b`.
#[inline]
pub fn add(a: &Integer, b: &Integer) -> Integer {
    Integer::from(a + b)
}

/// `a - b`.
#[inline]
pub fn sub(a: &Integer, b: &Integer) -> Integer {
    Integer::from(a - b)
}

/// `a * b`.
#[inline]
pub fn mul(a: &Integer, b: &Integer) -> Integer {
    Integer::from(a * b)
}

/// Euclidean `(quotient, remainder)` with `0 <= remainder < |b|`.
///
/// Returns an error rather than panicking when `b == 0`, per the façade's
/// "no silent overflow, distinguished division failure" contract.
pub fn divmod(a: &Integer, b: &Integer) -> Result<(Integer, Integer)> {
    if *b == 0 {
        bail!("division by zero: {} / 0", a);
    }
    let (q, r) = a.clone().div_rem_euc(b.clone());
    Ok((q, r))
}

/// `a^e mod n`. Errors if `n == 0` (rug's own distinguished failure mode) or
/// if a negative exponent is requested against a non-invertible base.
pub fn mod_pow(a: &Integer, e: &Integer, n: &Integer) -> Result<Integer> {
    if *n == 0 {
        bail!("mod_pow: modulus is zero");
    }
    a.clone()
        .pow_mod(e, n)
        .map_err(|_| anyhow::anyhow!("mod_pow: base {} has no inverse mod {} for negative exponent {}", a, n, e))
}

/// `gcd(a, b)`, always non-negative.
#[inline]
pub fn gcd(a: &Integer, b: &Integer) -> Integer {
    a.clone().gcd(b)
}

/// Integer square root, `floor(sqrt(n))`. Errors on negative input.
pub fn isqrt(n: &Integer) -> Result<Integer> {
    if *n < 0 {
        bail!("isqrt: negative input {}", n);
    }
    Ok(n.clone().sqrt())
}

/// `true` iff `n` is a perfect square.
pub fn is_square(n: &Integer) -> bool {
    if *n < 0 {
        return false;
    }
    let r = n.clone().sqrt();
    Integer::from(&r * &r) == *n
}

/// Jacobi symbol `(a/n)` for odd positive `n`. Values are `-1`, `0`, or `1`.
#[inline]
pub fn jacobi(a: &Integer, n: &Integer) -> i32 {
    a.clone().jacobi(n)
}

/// Smallest probable prime strictly greater than `n`.
///
/// Delegates to GMP's `next_power` primitive (`nextprime`), which runs trial
/// division against small primes followed by Miller–Rabin. This is a
/// probabilistic oracle with the same error bound as `rug`'s
/// `is_probably_prime` — adequate for candidate generation, not for a
/// certificate (see [`crate::certificate`] for that).
pub fn next_prime(n: &Integer) -> Integer {
    n.clone().next_prime()
}

/// Uniform random integer in `[lo, hi)` using the supplied, caller-owned
/// generator state. Callers that need reproducibility seed the `RandState`
/// themselves; this façade never seeds one implicitly.
pub fn random_in_range(lo: &Integer, hi: &Integer, rng: &mut rug::rand::RandState) -> Result<Integer> {
    if hi <= lo {
        bail!("random_in_range: empty range [{}, {})", lo, hi);
    }
    let span = Integer::from(hi - lo);
    let offset = span.random_below(rng);
    Ok(Integer::from(lo + offset))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn divmod_basic() {
        let (q, r) = divmod(&Integer::from(17), &Integer::from(5)).unwrap();
        assert_eq!(q, Integer::from(3));
        assert_eq!(r, Integer::from(2));
    }

    #[test]
    fn divmod_by_zero_is_distinguished_error() {
        assert!(divmod(&Integer::from(10), &Integer::from(0)).is_err());
    }

    #[test]
    fn mod_pow_matches_manual_exponentiation() {
        // 3^10 mod 7: 3^10 = 59049, 59049 mod 7 = 3
        let r = mod_pow(&Integer::from(3), &Integer::from(10), &Integer::from(7)).unwrap();
        assert_eq!(r, Integer::from(3));
    }

    #[test]
    fn mod_pow_zero_modulus_errors() {
        assert!(mod_pow(&Integer::from(3), &Integer::from(2), &Integer::from(0)).is_err());
    }

    #[test]
    fn gcd_known_values() {
        assert_eq!(gcd(&Integer::from(48), &Integer::from(18)), Integer::from(6));
        assert_eq!(gcd(&Integer::from(17), &Integer::from(5)), Integer::from(1));
    }

    #[test]
    fn isqrt_perfect_and_imperfect_squares() {
        assert_eq!(isqrt(&Integer::from(144)).unwrap(), Integer::from(12));
        assert_eq!(isqrt(&Integer::from(143)).unwrap(), Integer::from(11));
    }

    #[test]
    fn isqrt_negative_errors() {
        assert!(isqrt(&Integer::from(-1)).is_err());
    }

    #[test]
    fn is_square_detects_squares_and_rejects_others() {
        assert!(is_square(&Integer::from(169)));
        assert!(!is_square(&Integer::from(170)));
        assert!(is_square(&Integer::from(0)));
    }

    #[test]
    fn jacobi_known_values() {
        // (5/21) = (5/3)(5/7) = (2/3)(5/7) = (-1)(-1) = 1 — cross-checked numerically.
        assert_eq!(jacobi(&Integer::from(5), &Integer::from(21)), 1);
    }

    #[test]
    fn next_prime_known_values() {
        assert_eq!(next_prime(&Integer::from(10)), Integer::from(11));
        assert_eq!(next_prime(&Integer::from(113)), Integer::from(127));
    }

    #[test]
    fn random_in_range_stays_in_bounds() {
        let mut rng = rug::rand::RandState::new();
        let lo = Integer::from(100);
        let hi = Integer::from(200);
        for _ in 0..50 {
            let v = random_in_range(&lo, &hi, &mut rng).unwrap();
            assert!(v >= lo && v < hi);
        }
    }

    #[test]
    fn random_in_range_empty_range_errors() {
        let mut rng = rug::rand::RandState::new();
        assert!(random_in_range(&Integer::from(5), &Integer::from(5), &mut rng).is_err());
    }
}
