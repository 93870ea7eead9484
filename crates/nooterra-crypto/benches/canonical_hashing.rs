use std::collections::BTreeMap;

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use nooterra_crypto::{hash_canonical, sha256_hex, CanonicalValue};

fn record_shaped_value(field_count: usize) -> CanonicalValue {
    let mut object = BTreeMap::new();
    for i in 0..field_count {
        object.insert(format!("field_{i:03}"), CanonicalValue::String(format!("value-{i}")));
    }
    object.insert(
        "nested".to_string(),
        CanonicalValue::Array(
            (0..8).map(|i| CanonicalValue::Number(i64::from(i))).collect(),
        ),
    );
    CanonicalValue::Object(object)
}

fn bench_canonical_encode(c: &mut Criterion) {
    let value = record_shaped_value(24);
    c.bench_function("canonical_encode_record_shaped", |b| {
        b.iter(|| black_box(&value).encode());
    });
}

fn bench_hash_canonical(c: &mut Criterion) {
    let value = record_shaped_value(24);
    c.bench_function("hash_canonical_record_shaped", |b| {
        b.iter(|| hash_canonical(black_box(&value)));
    });
}

fn bench_sha256_hex(c: &mut Criterion) {
    let bytes = vec![0u8; 4096];
    c.bench_function("sha256_hex_4kb", |b| {
        b.iter(|| sha256_hex(black_box(&bytes)));
    });
}

criterion_group!(benches, bench_canonical_encode, bench_hash_canonical, bench_sha256_hex);
criterion_main!(benches);
