//! Benchmarks for result materialization and configuration parsing.
//!
//! Stored results are sliced out of one shared buffer, so materializing a
//! result set should cost one refcount bump per non-NULL cell.

#![allow(missing_docs, clippy::unwrap_used)]

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use maria_client::materialize;
use maria_client::{Config, Param};
use maria_nonblock::{ColumnBuffer, StoredResult, StoredResultBuilder};
use std::hint::black_box;

fn stored_result(rows: usize, columns: usize) -> StoredResult {
    let mut builder = StoredResultBuilder::new(columns);
    for row in 0..rows {
        let values: Vec<Option<String>> = (0..columns)
            .map(|col| {
                if (row + col) % 7 == 0 {
                    None
                } else {
                    Some(format!("value-{row}-{col}"))
                }
            })
            .collect();
        builder.push_row(values);
    }
    builder.finish()
}

fn bench_stored_result(c: &mut Criterion) {
    let mut group = c.benchmark_group("stored_result");

    for rows in [1usize, 100, 10_000] {
        let template = stored_result(rows, 8);
        group.throughput(Throughput::Elements((rows * 8) as u64));
        group.bench_with_input(BenchmarkId::from_parameter(rows), &template, |b, template| {
            b.iter_batched(
                || template.clone(),
                |mut result| black_box(materialize::stored_result(&mut result)),
                criterion::BatchSize::SmallInput,
            )
        });
    }

    group.finish();
}

fn bench_column_buffers(c: &mut Criterion) {
    let mut group = c.benchmark_group("column_buffers");

    let mut columns = vec![ColumnBuffer::with_capacity(256); 8];
    for (i, column) in columns.iter_mut().enumerate() {
        if i % 3 == 0 {
            column.fill(None);
        } else {
            column.fill(Some(b"a reasonably sized text value".as_slice()));
        }
    }
    group.throughput(Throughput::Elements(columns.len() as u64));
    group.bench_function("row_of_8", |b| {
        b.iter(|| black_box(materialize::column_buffers(black_box(&columns))))
    });

    group.finish();
}

fn bench_bind_values(c: &mut Criterion) {
    let params = vec![
        Param::from(42),
        Param::from("alice"),
        Param::from(2.5),
        Param::Null,
    ];
    c.bench_function("bind_values/4_of_6", |b| {
        b.iter(|| maria_client::param::bind_values(black_box(&params), 6).unwrap())
    });
}

fn bench_connection_string_parsing(c: &mut Criterion) {
    let mut group = c.benchmark_group("connection_string");

    let simple = "host=localhost;user=app;password=secret;database=shop";
    group.throughput(Throughput::Bytes(simple.len() as u64));
    group.bench_function("simple", |b| {
        b.iter(|| black_box(Config::from_connection_string(black_box(simple))))
    });

    let full = "Server=db.internal:3307;UID=app;PWD=secret;DB=shop;\
                Connect Timeout=5;Read Timeout=30;Write Timeout=30;Inline Capacity=1024";
    group.throughput(Throughput::Bytes(full.len() as u64));
    group.bench_function("full", |b| {
        b.iter(|| black_box(Config::from_connection_string(black_box(full))))
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_stored_result,
    bench_column_buffers,
    bench_bind_values,
    bench_connection_string_parsing
);
criterion_main!(benches);
