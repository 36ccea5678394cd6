//! Runtime configuration types for the compensator.
//!
//! These are the structs `FilamentWidthCore` is built from. They are
//! separate from the TOML-deserialized config in `fwidth_config`; see
//! `conversions` for the mapping.

use crate::calibration::Calibration;

/// Valid physical diameter range and the nominal the multiplier aims for.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DiameterLimits {
    pub nominal_mm: f64,
    pub min_mm: f64,
    pub max_mm: f64,
}

impl Default for DiameterLimits {
    fn default() -> Self {
        Self {
            nominal_mm: 1.75,
            min_mm: 1.0,
            max_mm: 3.0,
        }
    }
}

impl DiameterLimits {
    /// Inclusive range check.
    #[inline]
    pub fn contains(&self, diameter_mm: f64) -> bool {
        diameter_mm >= self.min_mm && diameter_mm <= self.max_mm
    }
}

/// Delay queue spacing.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QueueCfg {
    /// Minimum extruder travel between consecutive queued measurements (mm).
    pub measurement_interval_mm: f64,
}

impl Default for QueueCfg {
    fn default() -> Self {
        Self {
            measurement_interval_mm: 5.0,
        }
    }
}

/// What to do when the two channels of a dual sensor are too far apart in time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StalePairPolicy {
    /// Keep the last good estimate.
    #[default]
    HoldLast,
    /// Reset the estimate to 0, which the controller reads as "no filament".
    Invalidate,
}

/// Sampler strategy selected by configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SensorLayout {
    /// One hall sensor; every reading is an estimate.
    #[default]
    Single,
    /// Two hall sensors averaged pairwise when their timestamps are within `max_skew_us`.
    Dual {
        max_skew_us: u64,
        policy: StalePairPolicy,
    },
}

/// Diameter sampler configuration.
#[derive(Debug, Clone, Copy, Default)]
pub struct SamplerCfg {
    pub layout: SensorLayout,
    pub calibration: Calibration,
}

/// Controller timing and presence detection.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ControlCfg {
    /// Tick period in milliseconds.
    pub interval_ms: u64,
    /// Estimates at or below this read as "no filament".
    pub presence_threshold_mm: f64,
}

impl Default for ControlCfg {
    fn default() -> Self {
        Self {
            interval_ms: 1000,
            presence_threshold_mm: 0.5,
        }
    }
}

/// ADC pump timing used by the host runner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PumpCfg {
    /// Max wait for one averaged reading (ms).
    pub read_timeout_ms: u64,
    /// Report capacity between the pump thread and the host loop.
    pub capacity: usize,
}

impl Default for PumpCfg {
    fn default() -> Self {
        Self {
            read_timeout_ms: 150,
            capacity: 64,
        }
    }
}
