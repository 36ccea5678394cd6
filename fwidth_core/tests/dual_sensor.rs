//! Dual-channel sampling through the full controller.

use fwidth_core::mocks::ManualToolhead;
use fwidth_core::{
    AdcReport, Calibration, Channel, FilamentWidthSensor, SampleOutcome, SamplerCfg,
    SensorLayout, StalePairPolicy, TickStatus,
};
use fwidth_hardware::RecordingScaler;
use rstest::rstest;

fn dual_sensor(policy: StalePairPolicy) -> (FilamentWidthSensor, ManualToolhead) {
    let head = ManualToolhead::new(0.0);
    let mut s = FilamentWidthSensor::builder()
        .with_toolhead(head.clone())
        .with_scaler(RecordingScaler::new())
        .with_measurement_delay(20.0)
        .with_sampler(SamplerCfg {
            layout: SensorLayout::Dual {
                max_skew_us: 10_000,
                policy,
            },
            calibration: Calibration {
                gain_mm_per_unit: 0.5,
                offset_mm: 0.0,
            },
        })
        .build()
        .unwrap();
    s.handle_ready(0);
    (s, head)
}

fn pair(s: &mut FilamentWidthSensor, t1: u64, r1: f32, t2: u64, r2: f32) -> SampleOutcome {
    s.on_adc_report(AdcReport {
        channel: Channel::First,
        time_us: t1,
        value: r1,
    });
    s.on_adc_report(AdcReport {
        channel: Channel::Second,
        time_us: t2,
        value: r2,
    })
}

#[test]
fn averaged_raw_readings_are_calibrated() {
    let (mut s, _) = dual_sensor(StalePairPolicy::HoldLast);
    // (3.2 + 2.8) / 2 * 0.5 = 1.5
    assert!(matches!(
        pair(&mut s, 0, 3.2, 4_000, 2.8),
        SampleOutcome::Updated(_)
    ));
    assert!((s.latest_diameter() - 1.5).abs() < 1e-6);
}

#[rstest]
#[case(StalePairPolicy::HoldLast, 1.5)]
#[case(StalePairPolicy::Invalidate, 0.0)]
fn stale_pair_policy_applies(#[case] policy: StalePairPolicy, #[case] expected: f64) {
    let (mut s, _) = dual_sensor(policy);
    pair(&mut s, 0, 3.0, 1_000, 3.0);
    // exactly at the skew limit is already too far apart
    assert_eq!(
        pair(&mut s, 100_000, 5.0, 110_000, 5.0),
        SampleOutcome::StalePair
    );
    assert!((s.latest_diameter() - expected).abs() < 1e-6);
}

#[test]
fn invalidated_pair_reads_as_no_filament() {
    let (mut s, _) = dual_sensor(StalePairPolicy::Invalidate);
    pair(&mut s, 0, 3.0, 1_000, 3.0);
    pair(&mut s, 50_000, 3.0, 90_000, 3.0);
    assert_eq!(s.tick(0), TickStatus::NoFilament);
}
