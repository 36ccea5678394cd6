use std::time::{Duration, Instant};

use crate::error::{HwError, Result};

/// Poll `is_busy` until it reports false (conversion finished), or fail with
/// `ConversionTimeout` once `timeout` has elapsed. Sleeps `poll_interval`
/// between polls; errors from the probe are returned as-is.
pub fn wait_until_ready_with_timeout(
    mut is_busy: impl FnMut() -> Result<bool>,
    timeout: Duration,
    poll_interval: Duration,
) -> Result<()> {
    let deadline = Instant::now() + timeout;
    while is_busy()? {
        if Instant::now() >= deadline {
            return Err(HwError::ConversionTimeout);
        }
        std::thread::sleep(poll_interval);
    }
    Ok(())
}
