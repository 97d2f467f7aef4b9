//! Limiter benchmarks

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use pf_dsp::lookahead::{GainPlanner, LookaheadBuffer, required_gain};
use pf_dsp::oversampling::Oversampler;
use pf_dsp::{LatencyProfile, LimiterConfig, OversampleFactor, ParamId, TruePeakLimiter};

const BLOCK: usize = 512;

fn program(len: usize, phase: f64) -> Vec<f64> {
    (0..len)
        .map(|i| {
            let t = i as f64 + phase;
            1.4 * (t * 0.013).sin() + 0.4 * (t * 0.131).sin()
        })
        .collect()
}

fn bench_limiter_factors(c: &mut Criterion) {
    let mut group = c.benchmark_group("limiter_block_512");

    for factor in [
        OversampleFactor::X1,
        OversampleFactor::X2,
        OversampleFactor::X4,
        OversampleFactor::X8,
    ] {
        let mut limiter = TruePeakLimiter::new(LimiterConfig::new(48000.0, BLOCK)).unwrap();
        let handle = limiter.handle();
        handle.set_param(ParamId::LatencyProfile, LatencyProfile::OfflineMax.index() as f64);
        handle.set_param(ParamId::Oversampling, factor.index() as f64);

        let mut left = program(BLOCK, 0.0);
        let mut right = program(BLOCK, 17.0);

        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{:?}", factor)),
            &factor,
            |b, _| {
                b.iter(|| {
                    limiter.process_block(black_box(&mut left), black_box(&mut right));
                })
            },
        );
    }

    group.finish();
}

fn bench_planner(c: &mut Criterion) {
    // 5 ms at 4x 48 kHz
    let delay = 960;
    let mut planner = GainPlanner::new(delay);
    planner.set_delay(delay);
    let mut ring = LookaheadBuffer::new(delay);
    let input = program(BLOCK * 4, 0.0);

    c.bench_function("gain_planner_2048", |b| {
        b.iter(|| {
            let mut acc = 0.0;
            for &x in &input {
                ring.write(x);
                acc += planner.push(required_gain(x, 0.966)) * ring.tap(delay);
            }
            black_box(acc)
        })
    });
}

fn bench_oversampler(c: &mut Criterion) {
    let mut group = c.benchmark_group("oversampler_roundtrip_512");
    let input = program(BLOCK, 0.0);
    let mut up = vec![0.0; BLOCK * 32];
    let mut down = vec![0.0; BLOCK];

    for factor in [OversampleFactor::X2, OversampleFactor::X4, OversampleFactor::X32] {
        let mut os = Oversampler::new(BLOCK);
        os.set_factor(factor);
        let n = BLOCK * factor.factor();

        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{:?}", factor)),
            &factor,
            |b, _| {
                b.iter(|| {
                    os.upsample(black_box(&input), &mut up[..n]);
                    os.downsample(&up[..n], black_box(&mut down));
                })
            },
        );
    }

    group.finish();
}

criterion_group!(benches, bench_limiter_factors, bench_planner, bench_oversampler);
criterion_main!(benches);
