//! Benchmarks for client-side hot paths: expression compilation, field
//! decoding and row access.

#![allow(missing_docs, clippy::unwrap_used)]

use std::hint::black_box;
use std::sync::Arc;

use criterion::{Criterion, Throughput, criterion_group, criterion_main};
use mysqlx_client::expr::{DataModel, compile, parse_expr};
use mysqlx_client::{Column, DbDoc, Row, Value};
use mysqlx_types::{encode_value, infer_column};

/// Condition strings of growing size, as applications write them.
fn bench_expression_compile(c: &mut Criterion) {
    let mut group = c.benchmark_group("expr_compile");

    let cases = [
        ("simple", "pages > :min"),
        ("boolean", "genre = :genre AND (pages > :min OR rating >= 8.5)"),
        (
            "functions",
            "LOWER(title) LIKE :pattern AND tags IN ('a', 'b', 'c') AND \
             JSON_LENGTH(tags) > 1 AND $.author.name IS NOT NULL",
        ),
        ("between", "pages BETWEEN :low AND :high AND NOT (genre = 'poetry')"),
    ];
    for (name, text) in cases {
        group.throughput(Throughput::Bytes(text.len() as u64));
        group.bench_function(name, |b| {
            b.iter(|| black_box(parse_expr(black_box(text), DataModel::Document)))
        });
    }

    let projection = vec!["title".to_string(), "pages * 2 AS twice".to_string()];
    let sort = vec!["pages DESC".to_string(), "title".to_string()];
    group.bench_function("find_statement", |b| {
        b.iter(|| {
            black_box(compile(
                Some(black_box("genre = :genre AND pages > :min")),
                &projection,
                &sort,
                DataModel::Document,
            ))
        })
    });

    group.finish();
}

/// Decoding of wire fields into values.
fn bench_field_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("field_decode");

    let samples = [
        ("sint", Value::Int(-1_234_567)),
        ("uint", Value::UInt(9_876_543_210)),
        ("double", Value::Double(3.25)),
        ("text", Value::from("The quick brown fox jumps over the lazy dog")),
        (
            "document",
            Value::Document(
                DbDoc::new()
                    .with("title", "Dune")
                    .with("pages", 412)
                    .with("tags", vec!["scifi", "classic"]),
            ),
        ),
    ];
    for (name, value) in samples {
        let column = Column::new(0, infer_column("v", &value));
        let field = encode_value(&value, &infer_column("v", &value)).unwrap();
        group.throughput(Throughput::Bytes(field.len() as u64));
        group.bench_function(name, |b| b.iter(|| black_box(column.decode(black_box(&field)))));
    }

    group.finish();
}

/// Typed access on a decoded row.
fn bench_row_access(c: &mut Criterion) {
    let mut group = c.benchmark_group("row_access");

    let values = vec![
        Value::Int(42),
        Value::from("Frank Herbert"),
        Value::Int(1920),
        Value::Document(DbDoc::new().with("country", "US")),
    ];
    let columns: Arc<[Column]> = ["id", "name", "born", "meta"]
        .iter()
        .zip(&values)
        .enumerate()
        .map(|(i, (name, value))| Column::new(i, infer_column(*name, value)))
        .collect();
    let row = Row::from_values(columns, values);

    group.bench_function("by_index", |b| {
        b.iter(|| black_box(row.get::<i64>(black_box(0usize))))
    });
    group.bench_function("by_name", |b| {
        b.iter(|| black_box(row.get::<String>(black_box("name"))))
    });
    group.bench_function("document", |b| {
        b.iter(|| black_box(row.get::<DbDoc>(black_box("meta"))))
    });

    group.finish();
}

/// Parsing documents handed to `add` as JSON text.
fn bench_document_parse(c: &mut Criterion) {
    let mut group = c.benchmark_group("document_parse");

    let small = r#"{"title": "Dune", "pages": 412}"#;
    let nested = r#"{"title": "Dune", "author": {"name": "Frank Herbert", "born": 1920},
        "tags": ["scifi", "classic", "desert"], "editions": [{"year": 1965}, {"year": 2005}]}"#;
    for (name, text) in [("small", small), ("nested", nested)] {
        group.throughput(Throughput::Bytes(text.len() as u64));
        group.bench_function(name, |b| b.iter(|| black_box(DbDoc::parse(black_box(text)))));
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_expression_compile,
    bench_field_decode,
    bench_row_access,
    bench_document_parse,
);
criterion_main!(benches);
