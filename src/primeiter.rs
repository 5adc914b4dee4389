//! Prime iteration over a `[lo, hi]` range, backed by two strategies chosen
//! by range size.
//!
//! Grounded on `sieve::generate_primes` (the crate's existing `u64`
//! sieve of Eratosthenes) for the fast path. Beyond `u64` range, falls back
//! to `bigint::next_prime`'s probable-primality walk, which is considerably
//! slower per step — callers are warned once at stage start via `tracing`.

use crate::{bigint, sieve};
use rug::Integer;

/// Segment size for the segmented sieve, in candidates per batch.
const SEGMENT_SIZE: u64 = 1 << 20;

/// Prime iterator over `[lo, hi]`, dispatching to a `u64` segmented sieve or
/// an arbitrary-precision probable-prime walk depending on range size.
pub enum PrimeIter {
    Segmented(SegmentedPrimeIter),
    BigInt(BigPrimeIter),
}

impl PrimeIter {
    /// Build an iterator over `[lo, hi]`. Emits a `tracing::warn!` once if the
    /// range exceeds `u64::MAX` and the slower arbitrary-precision backend is
    /// selected.
    pub fn new(lo: &Integer, hi: &Integer) -> Self {
        if *hi <= u64::MAX {
            let lo_u64 = if *lo < 0 { 0 } else { lo.to_u64().unwrap_or(0) };
            let hi_u64 = hi.to_u64().unwrap_or(u64::MAX);
            PrimeIter::Segmented(SegmentedPrimeIter::new(lo_u64, hi_u64))
        } else {
            tracing::warn!(
                "equation-guided prime sieve range exceeds u64::MAX ({hi}); falling back to \
                 the arbitrary-precision probable-prime walk, which is markedly slower per step"
            );
            PrimeIter::BigInt(BigPrimeIter::new(lo.clone(), hi.clone()))
        }
    }

    /// Skip forward so the next `next()` call returns the first prime `>= k`.
    pub fn skip_to(&mut self, k: &Integer) {
        match self {
            PrimeIter::Segmented(it) => it.skip_to(k.to_u64().unwrap_or(u64::MAX)),
            PrimeIter::BigInt(it) => it.skip_to(k.clone()),
        }
    }

    pub fn next_prime(&mut self) -> Option<Integer> {
        match self {
            PrimeIter::Segmented(it) => it.next().map(Integer::from),
            PrimeIter::BigInt(it) => it.next(),
        }
    }
}

/// Segmented sieve of Eratosthenes over `[lo, hi]`, both inclusive, for
/// ranges that fit in `u64`. Base primes up to `sqrt(hi)` are generated once;
/// each segment of `SEGMENT_SIZE` candidates is then sieved against them.
pub struct SegmentedPrimeIter {
    hi: u64,
    base_primes: Vec<u64>,
    segment_start: u64,
    segment: Vec<bool>,
    cursor: usize,
}

impl SegmentedPrimeIter {
    pub fn new(lo: u64, hi: u64) -> Self {
        let sqrt_hi = (hi as f64).sqrt() as u64 + 2;
        let base_primes = sieve::generate_primes(sqrt_hi);
        let mut it = SegmentedPrimeIter {
            hi,
            base_primes,
            segment_start: lo,
            segment: Vec::new(),
            cursor: 0,
        };
        it.sieve_segment(lo);
        it
    }

    fn sieve_segment(&mut self, start: u64) {
        let end = start.saturating_add(SEGMENT_SIZE - 1).min(self.hi);
        if start > end {
            self.segment = Vec::new();
            self.segment_start = start;
            self.cursor = 0;
            return;
        }
        let len = (end - start + 1) as usize;
        let mut is_prime = vec![true; len];

        for &p in &self.base_primes {
            if p < 2 {
                continue;
            }
            let lower = start.max(p.saturating_mul(p));
            let first_multiple = ((lower + p - 1) / p) * p;
            let mut idx = first_multiple;
            while idx <= end {
                is_prime[(idx - start) as usize] = false;
                idx += p;
            }
        }
        for v in start..=end {
            if v < 2 {
                is_prime[(v - start) as usize] = false;
            }
        }

        self.segment = is_prime;
        self.segment_start = start;
        self.cursor = 0;
    }

    /// Skip so the next `next()` returns the first prime `>= k`.
    pub fn skip_to(&mut self, k: u64) {
        if k < self.segment_start || k >= self.segment_start + self.segment.len() as u64 {
            self.sieve_segment(k);
        } else {
            self.cursor = (k - self.segment_start) as usize;
        }
    }
}

impl Iterator for SegmentedPrimeIter {
    type Item = u64;

    fn next(&mut self) -> Option<u64> {
        loop {
            while self.cursor < self.segment.len() {
                let candidate = self.segment_start + self.cursor as u64;
                self.cursor += 1;
                if self.segment[candidate as usize - self.segment_start as usize] {
                    return Some(candidate);
                }
            }
            let next_start = self.segment_start + self.segment.len() as u64;
            if next_start > self.hi {
                return None;
            }
            self.sieve_segment(next_start);
            if self.segment.is_empty() {
                return None;
            }
        }
    }
}

/// Arbitrary-precision prime walk beyond `u64` range, via repeated
/// `bigint::next_prime` probable-primality steps.
pub struct BigPrimeIter {
    current: Integer,
    hi: Integer,
    started: bool,
}

impl BigPrimeIter {
    pub fn new(lo: Integer, hi: Integer) -> Self {
        BigPrimeIter { current: lo, hi, started: false }
    }

    pub fn skip_to(&mut self, k: Integer) {
        self.current = k;
        self.started = false;
    }

    pub fn next(&mut self) -> Option<Integer> {
        let candidate = if !self.started {
            self.started = true;
            if self.current < 2 {
                bigint::next_prime(&Integer::from(1))
            } else {
                // next_prime is strictly-greater, so step back one to allow
                // `current` itself to be returned if it is already prime.
                bigint::next_prime(&Integer::from(&self.current - 1))
            }
        } else {
            bigint::next_prime(&self.current)
        };

        if candidate > self.hi {
            return None;
        }
        self.current = candidate.clone();
        Some(candidate)
    }
}
