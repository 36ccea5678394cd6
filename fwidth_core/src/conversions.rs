//! `From` implementations bridging `fwidth_config` types to `fwidth_core` types.

use crate::calibration::Calibration;
use crate::config::{
    ControlCfg, DiameterLimits, PumpCfg, QueueCfg, SamplerCfg, SensorLayout, StalePairPolicy,
};
use crate::util::ms_to_us;

// ── DiameterLimits / QueueCfg ────────────────────────────────────────────────

impl From<&fwidth_config::Filament> for DiameterLimits {
    fn from(c: &fwidth_config::Filament) -> Self {
        Self {
            nominal_mm: c.nominal_filament_diameter,
            min_mm: c.min_filament_diameter,
            max_mm: c.max_filament_diameter,
        }
    }
}

impl From<&fwidth_config::Filament> for QueueCfg {
    fn from(c: &fwidth_config::Filament) -> Self {
        Self {
            measurement_interval_mm: c.measurement_interval_mm,
        }
    }
}

// ── ControlCfg ───────────────────────────────────────────────────────────────

// The presence threshold lives under [filament] in the file.
impl From<&fwidth_config::Config> for ControlCfg {
    fn from(c: &fwidth_config::Config) -> Self {
        Self {
            interval_ms: c.control.interval_ms,
            presence_threshold_mm: c.filament.presence_threshold_mm,
        }
    }
}

// ── Sampler ──────────────────────────────────────────────────────────────────

impl From<fwidth_config::StalePairPolicy> for StalePairPolicy {
    fn from(p: fwidth_config::StalePairPolicy) -> Self {
        match p {
            fwidth_config::StalePairPolicy::HoldLast => StalePairPolicy::HoldLast,
            fwidth_config::StalePairPolicy::Invalidate => StalePairPolicy::Invalidate,
        }
    }
}

impl From<&fwidth_config::Sensor> for SensorLayout {
    fn from(c: &fwidth_config::Sensor) -> Self {
        match c.hall_sensor_2 {
            None => SensorLayout::Single,
            Some(_) => SensorLayout::Dual {
                max_skew_us: ms_to_us(c.max_pair_skew_ms),
                policy: c.stale_pair_policy.into(),
            },
        }
    }
}

impl From<&fwidth_config::Config> for SamplerCfg {
    fn from(c: &fwidth_config::Config) -> Self {
        Self {
            layout: SensorLayout::from(&c.sensor),
            calibration: c
                .calibration
                .as_ref()
                .map(Calibration::from)
                .unwrap_or_default(),
        }
    }
}

// ── PumpCfg ──────────────────────────────────────────────────────────────────

impl From<&fwidth_config::Sampling> for PumpCfg {
    fn from(c: &fwidth_config::Sampling) -> Self {
        Self {
            read_timeout_ms: c.read_timeout_ms,
            ..PumpCfg::default()
        }
    }
}

// ── Calibration ──────────────────────────────────────────────────────────────

impl From<&fwidth_config::PersistedCalibration> for Calibration {
    fn from(c: &fwidth_config::PersistedCalibration) -> Self {
        Self {
            gain_mm_per_unit: c.gain_mm_per_unit,
            offset_mm: c.offset_mm,
        }
    }
}

impl From<&fwidth_config::Calibration> for Calibration {
    fn from(c: &fwidth_config::Calibration) -> Self {
        Self {
            gain_mm_per_unit: c.gain_mm_per_unit,
            offset_mm: c.offset_mm,
        }
    }
}
