use cosmos_policy_adapter::model::DefaultModel;
use cosmos_policy_adapter::query::removal_filter;
use cosmos_policy_adapter::record::{load_policy_line, PolicyRecord};
use criterion::{black_box, criterion_group, criterion_main, Criterion};

pub fn codec_bench(c: &mut Criterion) {
    let rule = ["data2_admin", "data2", "write"];

    c.bench_function("encode_rule", |b| {
        b.iter(|| PolicyRecord::from_rule(black_box("p"), black_box(&rule)))
    });

    let record = PolicyRecord::from_rule("p", &rule);
    c.bench_function("decode_rule", |b| {
        b.iter(|| {
            let mut model = DefaultModel::new();
            load_policy_line(black_box(&record), &mut model);
            model
        })
    });

    c.bench_function("removal_filter", |b| {
        b.iter(|| removal_filter(black_box("p"), black_box(0), black_box(&["", "data2", "write"])))
    });
}

criterion_group!(benches, codec_bench);
criterion_main!(benches);
