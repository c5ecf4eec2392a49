//! Criterion benchmarks for pipeline hot paths.
//!
//! Benchmarks:
//! 1. Full clean of one series (session-bound and continuous)
//! 2. Iterative imputation against fill-forward
//! 3. Diagnostics (gaps, missingness, outliers)
//! 4. Batch cleaning across instruments

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use barclean_core::diagnostics::{diagnose, DiagnosticsConfig};
use barclean_core::impute::{impute, ImputeConfig, ImputeStrategy};
use barclean_core::{
    Candle, CandleSeries, CleanOptions, CleanRequest, Pipeline, PipelineConfig, ProfileRegistry,
    TimeBasis, Timeframe,
};

// ── Helpers ──────────────────────────────────────────────────────────

fn make_series(n: usize, missing_every: usize) -> CandleSeries {
    let base = chrono::NaiveDate::from_ymd_opt(2023, 1, 2)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap();
    let candles = (0..n)
        .map(|i| {
            let close = 100.0 + (i as f64 * 0.01).sin() * 10.0;
            let mut c = Candle::new(
                base + chrono::Duration::minutes(i as i64 * 5),
                close - 0.3,
                close + 1.5,
                close - 1.5,
                close,
                1_000.0 + (i % 500) as f64,
            );
            if missing_every > 0 && i % missing_every == 0 {
                c.close = None;
            }
            c
        })
        .collect();
    CandleSeries::new(TimeBasis::Naive, candles)
}

// ── 1. Full clean ────────────────────────────────────────────────────

fn bench_clean(c: &mut Criterion) {
    let registry = ProfileRegistry::builtin().unwrap();
    let pipeline = Pipeline::new(&registry, PipelineConfig::default());
    let mut group = c.benchmark_group("clean");

    for n in [10_000, 100_000] {
        let series = make_series(n, 97);
        for id in ["deuidxeur", "eurusd"] {
            group.bench_with_input(BenchmarkId::new(id, n), &series, |b, s| {
                b.iter(|| {
                    pipeline
                        .clean(
                            black_box(s.clone()),
                            id,
                            Timeframe::M5,
                            &CleanOptions::default(),
                        )
                        .unwrap()
                })
            });
        }
    }
    group.finish();
}

// ── 2. Imputation ────────────────────────────────────────────────────

fn bench_impute(c: &mut Criterion) {
    let series = make_series(50_000, 53);
    let mut group = c.benchmark_group("impute");

    for strategy in [ImputeStrategy::Iterative, ImputeStrategy::FillForward] {
        let config = ImputeConfig {
            strategy,
            ..Default::default()
        };
        group.bench_function(format!("{strategy:?}"), |b| {
            b.iter(|| impute(black_box(series.clone()), &config).unwrap())
        });
    }
    group.finish();
}

// ── 3. Diagnostics ───────────────────────────────────────────────────

fn bench_diagnostics(c: &mut Criterion) {
    let series = make_series(100_000, 0);
    let config = DiagnosticsConfig::default();
    c.bench_function("diagnose_100k", |b| {
        b.iter(|| diagnose(black_box(&series), Timeframe::M5, &config))
    });
}

// ── 4. Batch ─────────────────────────────────────────────────────────

fn bench_batch(c: &mut Criterion) {
    let registry = ProfileRegistry::builtin().unwrap();
    let pipeline = Pipeline::new(&registry, PipelineConfig::default());
    let ids: Vec<String> = registry.ids().map(str::to_string).collect();
    let series = make_series(20_000, 0);

    c.bench_function("batch_all_builtin", |b| {
        b.iter(|| {
            let requests = ids
                .iter()
                .map(|id| CleanRequest {
                    raw: series.clone(),
                    instrument: id.clone(),
                    timeframe: Timeframe::M5,
                    options: CleanOptions::default(),
                })
                .collect();
            pipeline.clean_batch(black_box(requests))
        })
    });
}

criterion_group!(
    benches,
    bench_clean,
    bench_impute,
    bench_diagnostics,
    bench_batch
);
criterion_main!(benches);
