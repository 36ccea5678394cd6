//! Maps `Box<dyn Error>` from trait boundaries to typed `SensorError`.
//!
//! The traits in `fwidth_traits` use `Box<dyn Error + Send + Sync>`; this
//! module converts those to the typed error enum, with an optional
//! feature-gated path for `fwidth_hardware::HwError` downcasting.

use crate::error::SensorError;

/// Map a trait-boundary error to a typed `SensorError`.
///
/// Attempts to downcast known hardware error types first, then falls back
/// to string-based heuristics.
pub fn map_hw_error(e: &(dyn std::error::Error + 'static)) -> SensorError {
    #[cfg(feature = "hardware-errors")]
    {
        use fwidth_hardware::error::HwError;
        if let Some(hw) = e.downcast_ref::<HwError>() {
            return match hw {
                HwError::Timeout | HwError::ConversionTimeout => SensorError::Timeout,
                other => SensorError::HardwareFault(other.to_string()),
            };
        }
    }

    let s = e.to_string();
    if s.to_lowercase().contains("timeout") {
        SensorError::Timeout
    } else {
        SensorError::Hardware(s)
    }
}

/// Same as [`map_hw_error`] for the boxed errors returned by the traits.
pub(crate) fn map_boxed(e: Box<dyn std::error::Error + Send + Sync>) -> SensorError {
    map_hw_error(&*e)
}
