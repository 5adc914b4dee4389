use criterion::{black_box, criterion_group, criterion_main, Criterion};
use rug::Integer;

fn bench_try_pocklington_moderate(c: &mut Criterion) {
    let sieve_primes = trurl_factor::sieve::generate_primes(1000);
    // 27! + 1 is prime, n-1 = 27! factors completely over small primes.
    let mut factorial = Integer::from(1);
    for i in 2..=27u64 {
        factorial *= i;
    }
    let candidate = Integer::from(&factorial + 1u32);

    c.bench_function("try_pocklington(27!+1)", |b| {
        b.iter(|| trurl_factor::proof::try_pocklington(black_box(&candidate), black_box(&sieve_primes)));
    });
}

fn bench_try_pocklington_large(c: &mut Criterion) {
    let sieve_primes = trurl_factor::sieve::generate_primes(1000);
    // 41! + 1 is prime
    let mut factorial = Integer::from(1);
    for i in 2..=41u64 {
        factorial *= i;
    }
    let candidate = Integer::from(&factorial + 1u32);

    c.bench_function("try_pocklington(41!+1)", |b| {
        b.iter(|| trurl_factor::proof::try_pocklington(black_box(&candidate), black_box(&sieve_primes)));
    });
}

fn bench_build_certificate_steps(c: &mut Criterion) {
    let sieve_primes = trurl_factor::sieve::generate_primes(1000);
    let mut factorial = Integer::from(1);
    for i in 2..=27u64 {
        factorial *= i;
    }
    let candidate = Integer::from(&factorial + 1u32);

    c.bench_function("build_certificate_steps(27!+1)", |b| {
        b.iter(|| trurl_factor::proof::build_certificate_steps(black_box(&candidate), black_box(&sieve_primes)));
    });
}

criterion_group!(
    benches,
    bench_try_pocklington_moderate,
    bench_try_pocklington_large,
    bench_build_certificate_steps,
);
criterion_main!(benches);
