use criterion::{Criterion, black_box, criterion_group, criterion_main};

use growth_core::config::StabilityCfg;
use growth_core::growth::{GrowthSeries, StepSample};
use growth_core::stability::{StabilityDetector, StepStats};

fn series(n: usize) -> GrowthSeries {
    let mut s = GrowthSeries::new(n);
    for i in 0..n {
        s.push(StepSample {
            start_s: i as u64 * 3 * 3600,
            elapsed_s: 3 * 3600,
            doubling_h: 12.0 + 0.05 * ((i % 3) as f64 - 1.0),
        });
    }
    s
}

fn bench_stability(c: &mut Criterion) {
    let s = series(6);
    let det = StabilityDetector::new(StabilityCfg::default());
    c.bench_function("evaluate_6_steps", |b| {
        b.iter(|| det.evaluate(black_box(&s), 6, black_box(100 * 3600), 0))
    });

    let pts: Vec<(f64, f64)> = series(64)
        .iter()
        .map(|p| (p.start_s as f64, p.doubling_h))
        .collect();
    c.bench_function("step_stats_64", |b| b.iter(|| StepStats::compute(black_box(&pts))));
}

criterion_group!(benches, bench_stability);
criterion_main!(benches);
