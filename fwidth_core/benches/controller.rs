use criterion::{BatchSize, Criterion, black_box, criterion_group, criterion_main};
use fwidth_core::mocks::ManualToolhead;
use fwidth_core::{
    AdcReport, Channel, ControlCfg, DelayQueue, DiameterLimits, QueueCfg, SamplerCfg,
    build_sensor, extrusion_percent,
};
use fwidth_traits::ExtrusionScaler;

struct NullScaler;

impl ExtrusionScaler for NullScaler {
    fn set_extrude_factor(
        &mut self,
        _percent: u32,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        Ok(())
    }
}

// Diameter trace wobbling around nominal with xorshift noise
fn synth_diameters(n: usize, seed: u32) -> Vec<f32> {
    let mut state = seed.max(1);
    (0..n)
        .map(|i| {
            let mut x = state;
            x ^= x << 13;
            x ^= x >> 17;
            x ^= x << 5;
            state = x;
            let noise = (x as f32) / (u32::MAX as f32 + 1.0) * 0.04 - 0.02;
            1.75 + 0.05 * (i as f32 / 50.0).sin() + noise
        })
        .collect()
}

pub fn bench_tick(c: &mut Criterion) {
    let mut g = c.benchmark_group("controller_tick");
    if let Ok(ss) = std::env::var("BENCH_SAMPLE_SIZE") {
        if let Ok(n) = ss.parse::<usize>() {
            g.sample_size(n.max(10));
        }
    } else {
        g.sample_size(50);
    }

    let trace = synth_diameters(4096, 0xC0FFEE);
    g.bench_function("tick_4096", |b| {
        b.iter_batched(
            || {
                let head = ManualToolhead::new(0.0);
                let core = build_sensor(
                    head.clone(),
                    NullScaler,
                    50.0,
                    DiameterLimits::default(),
                    QueueCfg::default(),
                    SamplerCfg::default(),
                    ControlCfg::default(),
                    None,
                )
                .expect("bench sensor");
                (core, head)
            },
            |(mut core, head)| {
                core.handle_ready(0);
                for (i, d) in trace.iter().enumerate() {
                    core.on_adc_report(AdcReport {
                        channel: Channel::First,
                        time_us: i as u64 * 1_000,
                        value: *d,
                    });
                    black_box(core.tick(i as u64 * 1_000_000));
                    head.advance(2.5);
                }
                core
            },
            BatchSize::SmallInput,
        )
    });
    g.finish();
}

pub fn bench_queue(c: &mut Criterion) {
    c.bench_function("queue_enqueue_pop", |b| {
        b.iter(|| {
            let mut q = DelayQueue::new(50.0, 5.0);
            let mut applied = 0u32;
            for i in 0..2048 {
                let pos = f64::from(i) * 2.5;
                q.enqueue(pos, 1.7);
                if let Some(m) = q.pop_due(pos) {
                    applied = applied.wrapping_add(extrusion_percent(1.75, m.diameter_mm));
                }
            }
            black_box(applied)
        })
    });
}

criterion_group!(benches, bench_tick, bench_queue);
criterion_main!(benches);
