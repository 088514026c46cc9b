//! Query benchmarks over a seeded collection.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use nestdb_bench::seeded_collection;
use nestdb_core::{Filter, FilterOperator, Query, Selector};

fn bench_queries(c: &mut Criterion) {
    let (_db, users) = seeded_collection(1000);
    let email_selector = Selector::new(["Email"]).unwrap();
    let zip_selector = Selector::new(["Address", "ZipCode"]).unwrap();
    let age_selector = Selector::new(["Age"]).unwrap();

    let mut group = c.benchmark_group("query");

    group.bench_function("equal_one_filter", |b| {
        let query = Query::new().filter(
            Filter::new(FilterOperator::Equal, email_selector.clone())
                .compare_to("gödel-76@rudolph.com"),
        );
        b.iter(|| black_box(users.query(black_box(&query)).unwrap()));
    });

    for limit in [10usize, 100] {
        group.bench_with_input(
            BenchmarkId::new("range_ordered", limit),
            &limit,
            |b, &limit| {
                let query = Query::new()
                    .limit(limit)
                    .order_by(age_selector.clone(), true)
                    .filter(
                        Filter::new(FilterOperator::Between, zip_selector.clone())
                            .compare_to(60u64)
                            .compare_to(80u64)
                            .equal_wanted(),
                    );
                b.iter(|| black_box(users.query(black_box(&query)).unwrap()));
            },
        );
    }

    group.finish();
}

criterion_group!(benches, bench_queries);
criterion_main!(benches);
