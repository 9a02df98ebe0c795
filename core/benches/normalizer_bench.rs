use arrowreg_core::chunker::chunk;
use arrowreg_core::normalizer::normalize;
use criterion::{criterion_group, criterion_main, Criterion};

fn bench_normalize(c: &mut Criterion) {
    let text = include_str!("../../data/cfr46.md");
    c.bench_function("normalize_cfr46_sample", |b| b.iter(|| normalize(text)));
    c.bench_function("chunk_cfr46_sample", |b| b.iter(|| chunk(text, "cfr46")));
}

criterion_group!(benches, bench_normalize);
criterion_main!(benches);
