//! # Batch GCD — Shared-Factor Detection Across a CSV Upload
//!
//! Bernstein's batch-GCD: given a set of candidates, find every pair that
//! shares a prime factor in roughly `O(n log^2 n)` big-integer multiplications
//! instead of `O(n^2)` pairwise `gcd` calls, by building a product tree over
//! the whole batch and descending a remainder tree back down it.
//!
//! Grounded in `original_source`'s `batch_gcd` module (named as in-scope CSV
//! intake preprocessing by the component table, but not given a correct
//! algorithm there — see below). Used as a fast pre-pass over an uploaded
//! batch: any row found to share a factor with another row gets that factor
//! recorded immediately, and only the (smaller) cofactor proceeds through the
//! normal pipeline.
//!
//! ## Corrected formula
//!
//! The source computes `gcd(num^2 / remainder, num)`, which is not Bernstein's
//! construction. The remainder tree produces, for each `x_i`, the value
//! `R_i = P mod x_i^2` where `P` is the product of the whole batch (including
//! `x_i` itself); the correct per-leaf factor is `gcd(R_i / x_i, x_i)`, i.e.
//! `gcd(remainder / num, num)`, not the other way around. This module
//! implements the corrected formula.

use rug::Integer;

/// Build a product tree over `leaves`: level 0 is the leaves themselves, each
/// subsequent level pairs up adjacent nodes and multiplies them, until a
/// single root remains. An odd node at any level is carried forward unpaired.
fn product_tree(leaves: Vec<Integer>) -> Vec<Vec<Integer>> {
    let mut levels = vec![leaves];
    while levels.last().unwrap().len() > 1 {
        let prev = levels.last().unwrap();
        let mut next = Vec::with_capacity(prev.len().div_ceil(2));
        let mut i = 0;
        while i < prev.len() {
            if i + 1 < prev.len() {
                next.push(Integer::from(&prev[i] * &prev[i + 1]));
            } else {
                next.push(prev[i].clone());
            }
            i += 2;
        }
        levels.push(next);
    }
    levels
}

/// Descend the product tree top-down, reducing the accumulated product modulo
/// the square of each node, so that the leaf level ends up holding, for each
/// `x_i`, `P mod x_i^2` where `P` is the full batch product.
fn remainder_tree(levels: &[Vec<Integer>]) -> Vec<Integer> {
    let top = &levels[levels.len() - 1];
    let p = top[0].clone();
    let mut current = vec![Integer::from(&p % Integer::from(&p * &p))];

    for level in (0..levels.len() - 1).rev() {
        let nodes = &levels[level];
        let mut next = Vec::with_capacity(nodes.len());
        for (j, node) in nodes.iter().enumerate() {
            let parent = &current[j / 2];
            let modulus = Integer::from(node * node);
            next.push(Integer::from(parent % &modulus));
        }
        current = next;
    }
    current
}

/// For each `x_i` in `xs`, compute `gcd(x_i, product of all other x_j)`.
/// Entries that share no factor with the rest of the batch come back as `1`.
/// `xs` must contain at least two values ≥ 2; a batch of fewer than two
/// candidates has nothing to cross-check, so every entry is returned as `1`.
pub fn batch_gcd(xs: &[Integer]) -> Vec<Integer> {
    if xs.len() < 2 {
        return vec![Integer::from(1); xs.len()];
    }
    let levels = product_tree(xs.to_vec());
    let remainders = remainder_tree(&levels);
    xs.iter()
        .zip(remainders.iter())
        .map(|(x, r)| {
            let quotient = Integer::from(r / x);
            quotient.gcd(x)
        })
        .collect()
}

/// Apply [`batch_gcd`] and report only the rows where a non-trivial shared
/// factor was found: `(index, factor, cofactor)`. `cofactor` is `xs[index] /
/// factor`, which still needs the normal pipeline unless it is `1` or prime.
pub fn find_shared_factors(xs: &[Integer]) -> Vec<(usize, Integer, Integer)> {
    let gcds = batch_gcd(xs);
    gcds.into_iter()
        .enumerate()
        .filter_map(|(i, g)| {
            if g > 1 && g < xs[i] {
                let cofactor = Integer::from(&xs[i] / &g);
                Some((i, g, cofactor))
            } else {
                None
            }
        })
        .collect()
}
