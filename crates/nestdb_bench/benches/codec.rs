//! Codec benchmarks: encode throughput and encoded-form comparison.

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use nestdb_codec::{encode, Value};

fn bench_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("encode");

    group.bench_function("int", |b| {
        let value = Value::Int(-104_466_272_306_065_862);
        b.iter(|| black_box(encode(black_box(&value))));
    });

    group.bench_function("uint", |b| {
        let value = Value::Uint(997_373_309_132_031_595);
        b.iter(|| black_box(encode(black_box(&value))));
    });

    group.bench_function("time", |b| {
        let value = Value::Time(1_451_606_400_000_000_000);
        b.iter(|| black_box(encode(black_box(&value))));
    });

    let email = "gödel-76@rudolph.com";
    group.throughput(Throughput::Bytes(email.len() as u64));
    group.bench_function("text_email", |b| {
        let value = Value::Text(email.into());
        b.iter(|| black_box(encode(black_box(&value))));
    });

    group.finish();
}

fn bench_compare(c: &mut Criterion) {
    let mut group = c.benchmark_group("compare_encoded");

    let a = encode(&Value::Int(-5));
    let b_val = encode(&Value::Int(5));
    group.bench_function("int_pair", |b| {
        b.iter(|| black_box(black_box(&a).cmp(black_box(&b_val))));
    });

    group.finish();
}

criterion_group!(benches, bench_encode, bench_compare);
criterion_main!(benches);
