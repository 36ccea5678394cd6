//! Extrusion multiplier arithmetic.
//!
//! Flow scales with cross-sectional area, so a strand of diameter `d`
//! instead of `nominal` needs `(nominal / d)^2` of the commanded length to
//! deliver the same volume.

/// Multiplier that leaves commanded extrusion untouched.
pub const NEUTRAL_PERCENT: u32 = 100;

/// `round((nominal / diameter)^2 * 100)`, rounding half away from zero.
/// Degenerate inputs (non-positive or non-finite) give the neutral multiplier.
#[inline]
pub fn extrusion_percent(nominal_mm: f64, diameter_mm: f64) -> u32 {
    if !(diameter_mm.is_finite() && diameter_mm > 0.0 && nominal_mm.is_finite() && nominal_mm > 0.0)
    {
        return NEUTRAL_PERCENT;
    }
    let ratio = nominal_mm / diameter_mm;
    let pct = (ratio * ratio * 100.0).round();
    if pct >= u32::MAX as f64 {
        u32::MAX
    } else {
        pct as u32
    }
}
