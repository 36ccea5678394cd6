//! Common time helpers for fwidth_core.

/// Number of microseconds in one millisecond.
pub const MICROS_PER_MS: u64 = 1_000;
/// Number of microseconds in one second.
pub const MICROS_PER_SEC: u64 = 1_000_000;

/// Convert milliseconds to microseconds, saturating on overflow.
#[inline]
pub fn ms_to_us(ms: u64) -> u64 {
    ms.saturating_mul(MICROS_PER_MS)
}

/// Host timestamp in seconds, for log fields.
#[inline]
pub fn us_to_secs(us: u64) -> f64 {
    us as f64 / MICROS_PER_SEC as f64
}
