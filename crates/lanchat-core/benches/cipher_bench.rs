//! Criterion benchmarks for the AES-256-CFB cipher session.
//!
//! Measures encrypt and decrypt latency for typical chat line sizes up to the
//! single-read limit.
//!
//! Run with:
//! ```bash
//! cargo bench --package lanchat-core --bench cipher_bench
//! ```

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use lanchat_core::{protocol::READ_BUFFER_SIZE, KeyMaterial};

fn bench_encrypt(c: &mut Criterion) {
    let session = KeyMaterial::generate().cipher();
    let mut group = c.benchmark_group("encrypt");
    for size in [16usize, 128, READ_BUFFER_SIZE] {
        let plaintext = vec![b'a'; size];
        group.bench_with_input(BenchmarkId::from_parameter(size), &plaintext, |b, p| {
            b.iter(|| session.encrypt(black_box(p)))
        });
    }
    group.finish();
}

fn bench_decrypt(c: &mut Criterion) {
    let session = KeyMaterial::generate().cipher();
    let mut group = c.benchmark_group("decrypt");
    for size in [16usize, 128, READ_BUFFER_SIZE] {
        let ciphertext = session.encrypt(&vec![b'a'; size]);
        group.bench_with_input(BenchmarkId::from_parameter(size), &ciphertext, |b, ct| {
            b.iter(|| session.decrypt(black_box(ct)))
        });
    }
    group.finish();
}

criterion_group!(benches, bench_encrypt, bench_decrypt);
criterion_main!(benches);
