use fwidth_core::error::BuildError;
use fwidth_core::mocks::ManualToolhead;
use fwidth_core::{
    ControlCfg, DiameterLimits, FilamentWidthSensor, QueueCfg, SamplerCfg, SensorLayout,
    StalePairPolicy, build_sensor,
};
use fwidth_hardware::RecordingScaler;
use rstest::rstest;

#[rstest]
fn missing_toolhead_yields_typed_build_error() {
    let err = FilamentWidthSensor::builder()
        .with_scaler(RecordingScaler::new())
        .with_measurement_delay(50.0)
        .try_build()
        .expect_err("should fail with MissingToolhead");
    match err.downcast_ref::<BuildError>() {
        Some(BuildError::MissingToolhead) => {}
        other => panic!("expected MissingToolhead, got: {other:?}"),
    }
}

#[rstest]
fn missing_delay_yields_typed_build_error() {
    let err = FilamentWidthSensor::builder()
        .with_toolhead(ManualToolhead::new(0.0))
        .with_scaler(RecordingScaler::new())
        .try_build()
        .expect_err("should fail with MissingDelay");
    assert!(matches!(
        err.downcast_ref::<BuildError>(),
        Some(BuildError::MissingDelay)
    ));
}

#[rstest]
#[case(1.75, 1.75, 3.0)]
#[case(1.75, 1.0, 1.75)]
#[case(1.75, 2.0, 3.0)]
#[case(f64::NAN, 1.0, 3.0)]
fn bad_diameter_limits_rejected(#[case] nominal: f64, #[case] min: f64, #[case] max: f64) {
    let err = FilamentWidthSensor::builder()
        .with_toolhead(ManualToolhead::new(0.0))
        .with_scaler(RecordingScaler::new())
        .with_measurement_delay(50.0)
        .with_limits(DiameterLimits {
            nominal_mm: nominal,
            min_mm: min,
            max_mm: max,
        })
        .build()
        .unwrap_err();
    assert!(matches!(
        err.downcast_ref::<BuildError>(),
        Some(BuildError::InvalidConfig(_))
    ));
}

#[rstest]
#[case(0.0)]
#[case(-5.0)]
#[case(f64::INFINITY)]
fn non_positive_delay_rejected(#[case] delay: f64) {
    let err = FilamentWidthSensor::builder()
        .with_toolhead(ManualToolhead::new(0.0))
        .with_scaler(RecordingScaler::new())
        .with_measurement_delay(delay)
        .build()
        .unwrap_err();
    assert!(err.to_string().contains("measurement_delay"));
}

#[rstest]
fn zero_control_interval_rejected() {
    let err = FilamentWidthSensor::builder()
        .with_toolhead(ManualToolhead::new(0.0))
        .with_scaler(RecordingScaler::new())
        .with_measurement_delay(50.0)
        .with_control(ControlCfg {
            interval_ms: 0,
            ..ControlCfg::default()
        })
        .build()
        .unwrap_err();
    assert!(err.to_string().contains("interval_ms"));
}

#[rstest]
fn zero_pair_skew_rejected() {
    let err = build_sensor(
        ManualToolhead::new(0.0),
        RecordingScaler::new(),
        50.0,
        DiameterLimits::default(),
        QueueCfg::default(),
        SamplerCfg {
            layout: SensorLayout::Dual {
                max_skew_us: 0,
                policy: StalePairPolicy::HoldLast,
            },
            ..SamplerCfg::default()
        },
        ControlCfg::default(),
        None,
    )
    .unwrap_err();
    assert!(err.to_string().contains("skew"));
}

#[rstest]
fn unusable_dump_file_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let err = FilamentWidthSensor::builder()
        .with_toolhead(ManualToolhead::new(0.0))
        .with_scaler(RecordingScaler::new())
        .with_measurement_delay(50.0)
        .with_dump_file(dir.path().join("missing").join("dump.json"))
        .build()
        .unwrap_err();
    assert!(matches!(
        err.downcast_ref::<fwidth_core::SensorError>(),
        Some(fwidth_core::SensorError::Config(_))
    ));
}

#[rstest]
fn generic_build_has_static_dispatch() {
    let head = ManualToolhead::new(0.0);
    let scaler = RecordingScaler::new();
    let mut core = build_sensor(
        head,
        scaler.clone(),
        50.0,
        DiameterLimits::default(),
        QueueCfg::default(),
        SamplerCfg::default(),
        ControlCfg::default(),
        None,
    )
    .unwrap();
    core.handle_ready(0);
    core.run_command("RESET_FILAMENT_WIDTH_SENSOR", 0).unwrap();
    assert_eq!(scaler.history(), vec![100]);
}
