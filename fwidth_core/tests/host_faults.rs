use fwidth_core::mocks::{FailingScaler, FailingToolhead, ManualToolhead};
use fwidth_core::{AdcReport, Channel, FilamentWidthSensor, NextWake, SensorError, TickStatus};
use fwidth_hardware::RecordingScaler;

fn feed(s: &mut FilamentWidthSensor, value: f32) {
    s.on_adc_report(AdcReport {
        channel: Channel::First,
        time_us: 0,
        value,
    });
}

#[test]
fn toolhead_failure_degrades_and_reschedules() {
    let scaler = RecordingScaler::new();
    let mut s = FilamentWidthSensor::builder()
        .with_toolhead(FailingToolhead)
        .with_scaler(scaler.clone())
        .with_measurement_delay(50.0)
        .build()
        .unwrap();
    s.handle_ready(0);
    feed(&mut s, 1.5);

    let st = s.tick(0);
    assert!(matches!(st, TickStatus::HostFault(SensorError::Hardware(_))));
    assert!(scaler.history().is_empty());
    assert_eq!(s.next_wake(), NextWake::At(1_000_000));
}

#[test]
fn scaler_failure_on_tick_is_not_fatal() {
    let mut s = FilamentWidthSensor::builder()
        .with_toolhead(ManualToolhead::new(0.0))
        .with_scaler(FailingScaler)
        .with_measurement_delay(50.0)
        .build()
        .unwrap();
    s.handle_ready(0);
    feed(&mut s, 0.1);
    assert!(matches!(s.tick(0), TickStatus::HostFault(_)));
    assert!(s.is_due(1_000_000));
}

#[test]
fn scaler_failure_on_command_is_reported() {
    let mut s = FilamentWidthSensor::builder()
        .with_toolhead(ManualToolhead::new(0.0))
        .with_scaler(FailingScaler)
        .with_measurement_delay(50.0)
        .build()
        .unwrap();
    let err = s.run_command("RESET_FILAMENT_WIDTH_SENSOR", 0).unwrap_err();
    assert!(format!("{err:#}").contains("setting extrude factor"));
}
