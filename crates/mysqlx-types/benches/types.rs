//! Benchmarks for row field decoding and document handling.

#![allow(clippy::unwrap_used, missing_docs)]

use criterion::{Criterion, Throughput, criterion_group, criterion_main};
use mysqlx_protocol::{ColumnMetaData, ColumnType, ContentType};
use mysqlx_types::{DbDoc, FromValue, Value, decode_value, encode_value, infer_column};
use rust_decimal::Decimal;
use std::hint::black_box;
use std::str::FromStr;

/// Benchmark scalar field decoding.
fn bench_decode_scalars(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode_scalar");

    let sint = ColumnMetaData::new(ColumnType::SInt, "n");
    let sint_field = encode_value(&Value::Int(-123_456_789), &sint).unwrap();
    group.bench_function("sint", |b| {
        b.iter(|| black_box(decode_value(&sint, black_box(&sint_field)).unwrap()))
    });

    let text = infer_column("s", &Value::from(""));
    let text_field = encode_value(
        &Value::from("This is a typical database column value with some content"),
        &text,
    )
    .unwrap();
    group.throughput(Throughput::Bytes(text_field.len() as u64));
    group.bench_function("string", |b| {
        b.iter(|| black_box(decode_value(&text, black_box(&text_field)).unwrap()))
    });

    let decimal = Value::Decimal(Decimal::from_str("-98765.4321").unwrap());
    let dec_col = infer_column("d", &decimal);
    let dec_field = encode_value(&decimal, &dec_col).unwrap();
    group.bench_function("decimal", |b| {
        b.iter(|| black_box(decode_value(&dec_col, black_box(&dec_field)).unwrap()))
    });

    group.finish();
}

/// Benchmark JSON document decoding.
fn bench_decode_document(c: &mut Criterion) {
    let column = ColumnMetaData::new(ColumnType::Bytes, "doc").with_content_type(ContentType::Json);
    let doc = (0..20)
        .map(|i| (format!("field_{i}"), Value::from(i * 7)))
        .collect::<DbDoc>()
        .with("nested", DbDoc::new().with("tags", vec!["a", "b", "c"]));
    let field = encode_value(&Value::Document(doc), &column).unwrap();

    let mut group = c.benchmark_group("decode_document");
    group.throughput(Throughput::Bytes(field.len() as u64));
    group.bench_function("20_fields", |b| {
        b.iter(|| black_box(decode_value(&column, black_box(&field)).unwrap()))
    });
    group.finish();
}

/// Benchmark typed extraction.
fn bench_from_value(c: &mut Criterion) {
    let int = Value::Int(42);
    let text = Value::from("hello");
    c.bench_function("from_value_i32", |b| {
        b.iter(|| black_box(i32::from_value(black_box(&int)).unwrap()))
    });
    c.bench_function("from_value_string", |b| {
        b.iter(|| black_box(String::from_value(black_box(&text)).unwrap()))
    });
}

criterion_group!(
    benches,
    bench_decode_scalars,
    bench_decode_document,
    bench_from_value
);
criterion_main!(benches);
