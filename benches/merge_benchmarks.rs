#![allow(missing_docs)]
//! Benchmarks for merging and expanding MarcXchange records.
//!
//! Inputs are generated in memory so the suite needs no fixtures.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use rawrepo_marcx::{batch, encode_record, expand, merge, Field, FieldRules, Record};
use std::collections::HashMap;

/// A common record with `n` fields spread over typical danMARC2 tags.
fn common_record(n: usize) -> Record {
    const TAGS: [&str; 8] = ["001", "004", "008", "100", "245", "300", "504", "652"];
    let fields = (0..n)
        .map(|i| {
            Field::builder(TAGS[i % TAGS.len()], "00")
                .subfield('a', format!("value {i}"))
                .subfield_str('b', "common")
                .build()
        })
        .collect();
    Record::from_fields(fields)
}

fn enrichment_record() -> Record {
    Record::builder()
        .field(Field::builder("001", "00").subfield_str('a', "1").subfield_str('b', "723000").build())
        .field(Field::builder("245", "00").subfield_str('a', "Local title").build())
        .field(Field::builder("504", "00").subfield_str('a', "Local note").build())
        .build()
}

fn linked_record(links: usize) -> (Record, HashMap<String, Record>) {
    let mut record = common_record(20);
    let mut authorities = HashMap::new();
    for i in 0..links {
        let id = format!("6800{i:04}");
        record.add_field(
            Field::builder("700", "00")
                .subfield_str('5', "870979")
                .subfield_str('6', &id)
                .build(),
        );
        let authority = Record::builder()
            .field(Field::builder("100", "00").subfield_str('a', "Heading").subfield_str('h', "Name").build())
            .field(Field::builder("400", "00").subfield_str('a', "Alias").build())
            .build();
        authorities.insert(id, authority);
    }
    (record, authorities)
}

/// Benchmark merging one 50-field record.
fn benchmark_merge(c: &mut Criterion) {
    let rules = FieldRules::danmarc2();
    let common = encode_record(&common_record(50)).unwrap();
    let local = encode_record(&enrichment_record()).unwrap();

    c.bench_function("merge_50_fields", |b| {
        b.iter(|| merge(black_box(&common), black_box(&local), false, &rules).unwrap());
    });
}

/// Benchmark expanding a record with 10 linked fields.
fn benchmark_expand(c: &mut Criterion) {
    let (record, authorities) = linked_record(10);

    c.bench_function("expand_10_links", |b| {
        b.iter(|| expand::expand(black_box(&record), &authorities, false).unwrap());
    });
}

/// Benchmark a parallel merge of 1,000 record pairs.
fn benchmark_merge_batch_1k(c: &mut Criterion) {
    let rules = FieldRules::danmarc2();
    let common = encode_record(&common_record(50)).unwrap();
    let local = encode_record(&enrichment_record()).unwrap();
    let pairs: Vec<(&[u8], &[u8])> = (0..1000).map(|_| (common.as_slice(), local.as_slice())).collect();

    c.bench_function("merge_batch_1k", |b| {
        b.iter(|| batch::merge_batch(black_box(&pairs), false, &rules).len());
    });
}

criterion_group!(
    benches,
    benchmark_merge,
    benchmark_expand,
    benchmark_merge_batch_1k,
);
criterion_main!(benches);
