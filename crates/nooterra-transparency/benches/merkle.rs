use criterion::{black_box, criterion_group, criterion_main, Criterion};
use nooterra_crypto::sha256_hex;
use nooterra_transparency::{build_inclusion_proof, build_merkle_root};

fn leaves(count: usize) -> Vec<String> {
    (0..count).map(|i| sha256_hex(format!("entry-{i}").as_bytes())).collect()
}

fn bench_build_merkle_root_1k(c: &mut Criterion) {
    let leaves = leaves(1024);
    c.bench_function("build_merkle_root_1024_leaves", |b| {
        b.iter(|| build_merkle_root(black_box(&leaves)));
    });
}

fn bench_build_inclusion_proof_1k(c: &mut Criterion) {
    let leaves = leaves(1024);
    c.bench_function("build_inclusion_proof_1024_leaves", |b| {
        b.iter(|| build_inclusion_proof(black_box(&leaves), 517));
    });
}

criterion_group!(benches, bench_build_merkle_root_1k, bench_build_inclusion_proof_1k);
criterion_main!(benches);
