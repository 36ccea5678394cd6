//! Diameter sampler: turns averaged ADC reports into the current estimate.
//!
//! One sampler serves both sensor layouts. With a single hall sensor every
//! report overwrites the estimate. With two sensors the first channel is
//! stored and each second-channel report is averaged with it, provided the
//! two timestamps are close enough to describe the same piece of filament.

use crate::calibration::Calibration;
use crate::config::{SamplerCfg, SensorLayout, StalePairPolicy};

/// Which physical channel produced a report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    First,
    Second,
}

/// One hardware-averaged reading with its host timestamp (microseconds).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AdcReport {
    pub channel: Channel,
    pub time_us: u64,
    pub value: f32,
}

/// What a report did to the estimate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SampleOutcome {
    /// The estimate now holds this diameter (mm).
    Updated(f64),
    /// First channel of a pair stored; estimate unchanged.
    Stored,
    /// Second channel arrived too late (or alone); the stale-pair policy was applied.
    StalePair,
    /// Report for a channel the layout does not use.
    Ignored,
}

#[derive(Debug, Clone)]
pub struct DiameterSampler {
    layout: SensorLayout,
    calibration: Calibration,
    diameter_mm: f64,
    first: Option<(u64, f32)>,
    stale_pairs: u64,
}

impl DiameterSampler {
    pub fn new(cfg: SamplerCfg) -> Self {
        Self {
            layout: cfg.layout,
            calibration: cfg.calibration,
            diameter_mm: 0.0,
            first: None,
            stale_pairs: 0,
        }
    }

    /// Latest diameter estimate in mm; 0 until the first usable report.
    #[inline]
    pub fn latest(&self) -> f64 {
        self.diameter_mm
    }

    /// Number of second-channel reports that could not be paired.
    pub fn stale_pairs(&self) -> u64 {
        self.stale_pairs
    }

    pub fn on_reading(&mut self, report: AdcReport) -> SampleOutcome {
        match (self.layout, report.channel) {
            (SensorLayout::Single, Channel::First) => {
                self.diameter_mm = self.calibration.to_diameter(f64::from(report.value));
                tracing::trace!(diameter_mm = self.diameter_mm, "sample");
                SampleOutcome::Updated(self.diameter_mm)
            }
            (SensorLayout::Single, Channel::Second) => SampleOutcome::Ignored,
            (SensorLayout::Dual { .. }, Channel::First) => {
                self.first = Some((report.time_us, report.value));
                SampleOutcome::Stored
            }
            (
                SensorLayout::Dual {
                    max_skew_us,
                    policy,
                },
                Channel::Second,
            ) => match self.first {
                Some((t1, r1)) if t1.abs_diff(report.time_us) < max_skew_us => {
                    let avg = (f64::from(r1) + f64::from(report.value)) / 2.0;
                    self.diameter_mm = self.calibration.to_diameter(avg);
                    tracing::trace!(diameter_mm = self.diameter_mm, "paired sample");
                    SampleOutcome::Updated(self.diameter_mm)
                }
                first => {
                    self.stale_pairs += 1;
                    tracing::debug!(
                        first_us = first.map(|(t, _)| t),
                        second_us = report.time_us,
                        max_skew_us,
                        ?policy,
                        "stale sensor pair"
                    );
                    if policy == StalePairPolicy::Invalidate {
                        self.diameter_mm = 0.0;
                    }
                    SampleOutcome::StalePair
                }
            },
        }
    }
}
