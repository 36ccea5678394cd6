/// Linear reading → diameter transform.
/// diameter_mm = gain_mm_per_unit * reading + offset_mm, clamped at 0.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Calibration {
    pub gain_mm_per_unit: f64,
    pub offset_mm: f64,
}

impl Calibration {
    /// Non-finite readings or parameters map to 0 ("absent") so a corrupt
    /// sample can only ever drive the neutral multiplier.
    pub fn to_diameter(&self, reading: f64) -> f64 {
        let d = self.gain_mm_per_unit * reading + self.offset_mm;
        if d.is_finite() { d.max(0.0) } else { 0.0 }
    }
}

impl Default for Calibration {
    fn default() -> Self {
        // readings already in millimeters
        Self {
            gain_mm_per_unit: 1.0,
            offset_mm: 0.0,
        }
    }
}
