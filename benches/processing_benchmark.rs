// Processing benchmarks
// Author: Gabriel Demetrios Lafis

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use record_transform_engine::{
    data::Record,
    processing::{
        AggregateProcessor, Condition, ConditionSet, FilterProcessor, MergeProcessor,
        NormalizationOperation, NormalizeProcessor,
    },
};

fn generate_records(count: usize) -> Vec<Record> {
    (0..count)
        .map(|i| {
            Record::new()
                .with("id", i as i64)
                .with("group", format!("g{}", i % 10))
                .with("amount", (i % 997) as f64 * 1.5)
                .with("label", format!("item-{}", i))
        })
        .collect()
}

fn bench_filter(c: &mut Criterion) {
    let records = generate_records(10_000);
    let processor = FilterProcessor::new();
    let set = ConditionSet::all(vec![
        Condition::new("amount", "greaterThan", 500),
        Condition::new("label", "contains", "7"),
    ]);

    c.bench_function("filter_10k", |b| {
        b.iter(|| processor.filter(black_box(&records), &set))
    });
}

fn bench_join(c: &mut Criterion) {
    let left = generate_records(5_000);
    let right: Vec<Record> = (0..5_000)
        .map(|i| Record::new().with("id", i as i64).with("extra", i as i64 * 2))
        .collect();
    let processor = MergeProcessor::new();
    let fields = vec!["id".to_string()];

    c.bench_function("inner_join_5k", |b| {
        b.iter(|| processor.inner_join(black_box(&left), black_box(&right), &fields))
    });
}

fn bench_aggregate(c: &mut Criterion) {
    let records = generate_records(10_000);
    let processor = AggregateProcessor::new();
    let group_by = vec!["group".to_string()];
    let operations = vec![
        ("amount".to_string(), "Sum".to_string()),
        ("amount".to_string(), "Average".to_string()),
        ("id".to_string(), "Count".to_string()),
    ];

    c.bench_function("aggregate_10k", |b| {
        b.iter(|| processor.aggregate(black_box(&records), &group_by, &operations))
    });
}

fn bench_normalize(c: &mut Criterion) {
    let records = generate_records(10_000);
    let processor = NormalizeProcessor::new();
    let operations = vec![
        ("amount".to_string(), NormalizationOperation::new("MinMax")),
        ("amount".to_string(), NormalizationOperation::new("ZScore").into_field("z")),
    ];

    c.bench_function("normalize_10k", |b| {
        b.iter(|| processor.normalize(black_box(&records), &operations))
    });
}

criterion_group!(benches, bench_filter, bench_join, bench_aggregate, bench_normalize);
criterion_main!(benches);
