//! Primality oracle: Miller–Rabin, strong Lucas (Selfridge), BPSW, and the
//! adaptive `is_prime_fast` entry point used throughout the engine.
//!
//! Grounded on the crate root's `mr_screened_test`/`frobenius_test` pair (the
//! "cheap screen first, expensive test only for survivors" shape), extended
//! here with a binary-doubling Lucas U/V recurrence and a Selfridge D-search
//! so the whole BPSW compound test is available on its own.

use crate::{has_small_factor, SMALL_PRIMES};
use rug::ops::RemRounding;
use rug::rand::RandState;
use rug::Integer;

/// Single Miller–Rabin round-check result: whether `n` survives `rounds`
/// independent random witnesses. `n` must already be known odd and > 3 by
/// the caller; this function handles the small/even cases defensively anyway.
pub fn miller_rabin(n: &Integer, rounds: u32) -> bool {
    if *n < 2 {
        return false;
    }
    if *n == 2 || *n == 3 {
        return true;
    }
    if n.is_even() {
        return false;
    }

    // n - 1 = 2^s * d, d odd
    let n_minus_1 = Integer::from(n - 1u32);
    let s = n_minus_1.find_one(0).unwrap_or(0);
    let d = Integer::from(&n_minus_1 >> s);

    let mut rng = RandState::new();
    let upper = Integer::from(n - 3u32);

    'witness: for _ in 0..rounds {
        // random base a in [2, n-2]
        let a = if upper <= 0 {
            Integer::from(2)
        } else {
            Integer::from(upper.clone().random_below(&mut rng) + 2)
        };

        let mut x = match a.clone().pow_mod(&d, n) {
            Ok(v) => v,
            Err(_) => continue,
        };
        if x == 1 || x == n_minus_1 {
            continue;
        }
        for _ in 0..s.saturating_sub(1) {
            x = Integer::from(&x * &x) % n;
            if x == n_minus_1 {
                continue 'witness;
            }
        }
        return false;
    }
    true
}

/// Strong Lucas probable-prime test with Selfridge's parameter search.
///
/// Selects `D` from the sequence 5, −7, 9, −11, … until `Jacobi(D, n) = −1`.
/// Declares `n` composite if some `D` yields `Jacobi(D,n) = 0` (unless `|D| = n`,
/// the trivial case), and bails out declaring composite if `n` is a perfect
/// square (no `D` in the sequence can ever satisfy the Jacobi condition) once
/// the search passes `|D| = 10^6` without success.
pub fn strong_lucas(n: &Integer) -> bool {
    if *n < 2 {
        return false;
    }
    if *n == 2 {
        return true;
    }
    if n.is_even() {
        return false;
    }
    if crate::bigint::is_square(n) {
        return false;
    }

    let mut d_abs: u64 = 5;
    let mut sign = 1i64;
    let d = loop {
        let d_val = Integer::from(sign * d_abs as i64);
        let j = d_val.clone().jacobi(n);
        if j == -1 {
            break d_val;
        }
        if j == 0 {
            let g = d_val.clone().abs().gcd(n);
            if g != *n {
                return false;
            }
        }
        if d_abs >= 1_000_000 {
            // No suitable D found within the Selfridge search bound: n is
            // (overwhelmingly likely) a perfect square, already excluded above,
            // or a pathological input. Treat as composite per the spec.
            return false;
        }
        d_abs += 2;
        sign = -sign;
    };

    let p = Integer::from(1);
    // Q = (1 - D) / 4
    let q = Integer::from(1 - &d) / 4;

    // n + 1 = 2^s * d_odd
    let n_plus_1 = Integer::from(n + 1u32);
    let s = n_plus_1.find_one(0).unwrap_or(0);
    let d_odd = Integer::from(&n_plus_1 >> s);

    let (u_d, v_d, _q_pow) = lucas_uv_mod(&d_odd, &p, &q, n);

    if u_d == 0 {
        return true;
    }
    if v_d == 0 {
        return true;
    }

    let mut v = v_d;
    let mut qk = Integer::from(q.clone().pow_mod(&d_odd, n).unwrap_or_else(|_| Integer::from(0)));
    for _ in 1..s {
        v = Integer::from(&v * &v - Integer::from(2) * &qk).rem_euc(n);
        if v == 0 {
            return true;
        }
        qk = Integer::from(&qk * &qk) % n;
    }
    false
}

/// Compute `(U_k, V_k, Q^k) mod n` for the Lucas sequence with parameters
/// `(P, Q)`, via binary doubling:
///   U(2m)   = U(m)·V(m)
///   V(2m)   = V(m)² − 2·Q^m
///   U(2m+1) = (P·U(2m) + V(2m)) / 2
///   V(2m+1) = (D·U(2m) + P·V(2m)) / 2
/// Division by 2 is done mod n via the modular inverse of 2 (n is odd).
fn lucas_uv_mod(k: &Integer, p: &Integer, q: &Integer, n: &Integer) -> (Integer, Integer, Integer) {
    let d = Integer::from(p * p) - Integer::from(4) * q;
    let inv2 = Integer::from(2)
        .invert(n)
        .unwrap_or_else(|_| Integer::from(0));

    if *k == 0 {
        return (Integer::from(0), Integer::from(2), Integer::from(1) % n);
    }

    let bits = k.significant_bits();
    let mut u = Integer::from(1); // U(1)
    let mut v = p.clone().rem_euc(n); // V(1)
    let mut qk = q.clone().rem_euc(n); // Q^1

    for i in (0..bits - 1).rev() {
        // Double: (U(m), V(m), Q^m) -> (U(2m), V(2m), Q^(2m))
        let u2m = Integer::from(&u * &v).rem_euc(n);
        let v2m = (Integer::from(&v * &v) - Integer::from(2) * &qk).rem_euc(n);
        let q2m = Integer::from(&qk * &qk).rem_euc(n);

        u = u2m;
        v = v2m;
        qk = q2m;

        if k.get_bit(i) {
            // Advance by one: (U(2m), V(2m)) -> (U(2m+1), V(2m+1))
            let u_next = Integer::from(&(p * &u) + &v) * &inv2 % n;
            let v_next = Integer::from(&(&d * &u) + &(p * &v)) * &inv2 % n;
            u = u_next.rem_euc(n);
            v = v_next.rem_euc(n);
            qk = Integer::from(&qk * q).rem_euc(n);
        }
    }

    (u, v, qk)
}

/// Baillie–PSW: small-prime trial division, then MR base 2, then strong Lucas.
/// Both probabilistic legs must pass. No composite is known to fool BPSW.
pub fn is_prime_bpsw(n: &Integer) -> bool {
    if *n < 2 {
        return false;
    }
    for &p in &SMALL_PRIMES {
        if *n == p {
            return true;
        }
    }
    if has_small_factor(n) {
        return false;
    }
    if !miller_rabin_base_2(n) {
        return false;
    }
    strong_lucas(n)
}

/// Miller–Rabin with the single fixed base 2, as BPSW requires.
fn miller_rabin_base_2(n: &Integer) -> bool {
    if *n == 2 {
        return true;
    }
    if n.is_even() {
        return false;
    }
    let n_minus_1 = Integer::from(n - 1u32);
    let s = n_minus_1.find_one(0).unwrap_or(0);
    let d = Integer::from(&n_minus_1 >> s);

    let mut x = match Integer::from(2).pow_mod(&d, n) {
        Ok(v) => v,
        Err(_) => return false,
    };
    if x == 1 || x == n_minus_1 {
        return true;
    }
    for _ in 0..s.saturating_sub(1) {
        x = Integer::from(&x * &x) % n;
        if x == n_minus_1 {
            return true;
        }
    }
    false
}

/// Adaptive primality oracle: BPSW (exact for n ≤ 2⁶⁴, no known counterexample
/// beyond it either) for values that fit a `u64`; 40-round Miller–Rabin
/// (error ≤ 2⁻⁸⁰) otherwise, matching the error bound `is_prime_fast` promises
/// throughout this crate.
pub fn is_prime_fast(n: &Integer) -> bool {
    if n.significant_bits() <= 64 {
        return is_prime_bpsw(n);
    }
    miller_rabin(n, 40)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rug::ops::Pow;

    const SMALL_PRIMES_TEST: &[u32] = &[2, 3, 5, 7, 11, 13, 97, 101, 1009, 10007, 104729];
    const SMALL_COMPOSITES_TEST: &[u32] = &[4, 6, 8, 9, 15, 21, 25, 100, 561, 1105, 1729, 10001];

    #[test]
    fn miller_rabin_accepts_known_primes() {
        for &p in SMALL_PRIMES_TEST {
            assert!(miller_rabin(&Integer::from(p), 20), "MR rejected prime {p}");
        }
    }

    #[test]
    fn miller_rabin_rejects_known_composites() {
        for &c in SMALL_COMPOSITES_TEST {
            assert!(!miller_rabin(&Integer::from(c), 20), "MR accepted composite {c}");
        }
    }

    #[test]
    fn strong_lucas_accepts_known_primes() {
        for &p in SMALL_PRIMES_TEST {
            assert!(strong_lucas(&Integer::from(p)), "Lucas rejected prime {p}");
        }
    }

    #[test]
    fn strong_lucas_rejects_known_composites() {
        for &c in SMALL_COMPOSITES_TEST {
            assert!(!strong_lucas(&Integer::from(c)), "Lucas accepted composite {c}");
        }
    }

    #[test]
    fn strong_lucas_rejects_perfect_squares() {
        for s in [4u32, 9, 25, 49, 121, 169] {
            assert!(!strong_lucas(&Integer::from(s)));
        }
    }

    #[test]
    fn bpsw_agrees_on_small_range() {
        for n_val in 2u32..2000 {
            let n = Integer::from(n_val);
            let expected = n.clone().is_probably_prime(30) != rug::integer::IsPrime::No;
            assert_eq!(
                is_prime_bpsw(&n),
                expected,
                "BPSW disagreed with GMP MR at {n_val}"
            );
        }
    }

    #[test]
    fn bpsw_rejects_strong_pseudoprimes_to_base_2() {
        // These fool a single MR(2) round but must fail full BPSW (they are
        // not also strong Lucas pseudoprimes).
        for &c in &[2047u32, 3277, 4033] {
            assert!(!is_prime_bpsw(&Integer::from(c)));
        }
    }

    #[test]
    fn is_prime_fast_matches_bpsw_under_64_bits() {
        for &p in SMALL_PRIMES_TEST {
            assert!(is_prime_fast(&Integer::from(p)));
        }
        for &c in SMALL_COMPOSITES_TEST {
            assert!(!is_prime_fast(&Integer::from(c)));
        }
    }

    #[test]
    fn is_prime_fast_large_prime_beyond_64_bits() {
        // 2^127 - 1 is the Mersenne prime M127 (Lucas, 1876).
        let m127 = Integer::from(2u32).pow(127) - 1u32;
        assert!(is_prime_fast(&m127));
    }

    #[test]
    fn is_prime_fast_large_composite_beyond_64_bits() {
        let m127 = Integer::from(2u32).pow(127) - 1u32;
        let composite = Integer::from(&m127 * Integer::from(3u32));
        assert!(!is_prime_fast(&composite));
    }

    #[test]
    fn miller_rabin_rejects_negative_and_zero_and_one() {
        assert!(!miller_rabin(&Integer::from(-5), 10));
        assert!(!miller_rabin(&Integer::from(0), 10));
        assert!(!miller_rabin(&Integer::from(1), 10));
    }
}
