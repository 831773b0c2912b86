use criterion::{black_box, criterion_group, criterion_main, Criterion};
use dss_calc::ForecastEngine;
use dss_core::DssConfig;
use rust_decimal::Decimal;

fn bench_weighted_recommendation(c: &mut Criterion) {
    let config = DssConfig::uniform(28, Decimal::from(15)).unwrap();
    let window: Vec<Decimal> = (0..28).map(|i| Decimal::from(80 + (i * 7) % 40)).collect();

    c.bench_function("weighted_recommendation_28d", |b| {
        b.iter(|| ForecastEngine::weighted_recommendation(black_box(&window), black_box(&config)))
    });
}

criterion_group!(benches, bench_weighted_recommendation);
criterion_main!(benches);
