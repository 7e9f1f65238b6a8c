use std::hint::black_box;

use criterion::{Criterion, criterion_group, criterion_main};
use dual_sql::{Dialect, translate_placeholders};

fn wide_insert(columns: usize) -> String {
    let names: Vec<String> = (0..columns).map(|i| format!("c{i}")).collect();
    let marks = vec!["?"; columns].join(", ");
    format!(
        "INSERT INTO wide ({}) VALUES ({marks}) -- trailing ? comment",
        names.join(", ")
    )
}

fn bench_translation(c: &mut Criterion) {
    let simple = "SELECT * FROM consultants WHERE a = ? AND b = '?' -- ?";
    let literal_heavy =
        "SELECT 'it''s a ?', \"col?\" /* ? */ FROM t WHERE x = ? AND y IN (?, ?, ?)";
    let wide = wide_insert(64);

    let mut group = c.benchmark_group("translate_placeholders");
    group.bench_function("simple_postgres", |b| {
        b.iter(|| translate_placeholders(black_box(simple), Dialect::Postgres));
    });
    group.bench_function("literal_heavy_postgres", |b| {
        b.iter(|| translate_placeholders(black_box(literal_heavy), Dialect::Postgres));
    });
    group.bench_function("wide_insert_postgres", |b| {
        b.iter(|| translate_placeholders(black_box(&wide), Dialect::Postgres));
    });
    group.bench_function("wide_insert_sqlite_passthrough", |b| {
        b.iter(|| translate_placeholders(black_box(&wide), Dialect::Sqlite));
    });
    group.finish();
}

criterion_group!(benches, bench_translation);
criterion_main!(benches);
