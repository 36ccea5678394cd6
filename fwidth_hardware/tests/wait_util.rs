use std::sync::{
    Arc,
    atomic::{AtomicBool, AtomicUsize, Ordering},
};
use std::thread;
use std::time::Duration;

use fwidth_hardware::error::HwError;
use fwidth_hardware::util::wait_until_ready_with_timeout;
use rstest::rstest;

#[test]
fn wait_until_ready_success_path() {
    let busy = Arc::new(AtomicBool::new(true));
    let busy_bg = busy.clone();
    // Conversion finishes after a short delay
    thread::spawn(move || {
        thread::sleep(Duration::from_millis(3));
        busy_bg.store(false, Ordering::Relaxed);
    });

    let res = wait_until_ready_with_timeout(
        || Ok(busy.load(Ordering::Relaxed)),
        Duration::from_millis(200),
        Duration::from_micros(200),
    );
    assert!(res.is_ok(), "expected success, got {res:?}");
}

#[rstest]
#[case(Duration::from_millis(5), Duration::from_micros(200))]
#[case(Duration::from_millis(1), Duration::from_millis(3))]
#[case(Duration::ZERO, Duration::from_micros(50))]
fn wait_until_ready_timeout_path(#[case] timeout: Duration, #[case] poll: Duration) {
    let err = wait_until_ready_with_timeout(|| Ok(true), timeout, poll)
        .expect_err("expected timeout error");

    match err {
        HwError::ConversionTimeout => {}
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn wait_until_ready_propagates_probe_error() {
    let calls = AtomicUsize::new(0);
    let err = wait_until_ready_with_timeout(
        || {
            calls.fetch_add(1, Ordering::Relaxed);
            Err(HwError::I2c("nack".into()))
        },
        Duration::from_millis(50),
        Duration::from_micros(200),
    )
    .expect_err("probe error must surface");
    assert!(matches!(err, HwError::I2c(_)));
    assert_eq!(calls.load(Ordering::Relaxed), 1);
}
