//! Device backends for the filament width compensator.
//!
//! The simulated backend models one strand of filament moving through the
//! sensor at a constant feed rate, so the toolhead and the ADC channels agree
//! on where the filament is. The `hardware` feature adds an ADS1115 ADC on a
//! Raspberry Pi I²C bus.
#[cfg(feature = "hardware")]
pub mod ads1115;
pub mod error;
pub mod util;

use fwidth_traits::{Adc, Clock, ExtrusionScaler, Toolhead};
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::error::HwError;

/// Default ADS1115 address with ADDR tied to GND.
pub const ADS1115_DEFAULT_ADDRESS: u16 = 0x48;

/// Parsed ADC pin identifier.
///
/// Accepted forms: `ads1115:<channel>` and `ads1115@0x<addr>:<channel>`,
/// channel in 0..=3. `sim:<name>` selects a simulated channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdcPin {
    Ads1115 { address: u16, channel: u8 },
    Simulated(String),
}

impl FromStr for AdcPin {
    type Err = HwError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let invalid = || HwError::InvalidPin(s.to_string());
        if let Some(name) = s.strip_prefix("sim:") {
            if name.is_empty() {
                return Err(invalid());
            }
            return Ok(AdcPin::Simulated(name.to_string()));
        }
        let rest = s.strip_prefix("ads1115").ok_or_else(invalid)?;
        let (addr_part, channel_part) = rest.rsplit_once(':').ok_or_else(invalid)?;
        let address = match addr_part.strip_prefix('@') {
            None if addr_part.is_empty() => ADS1115_DEFAULT_ADDRESS,
            None => return Err(invalid()),
            Some(hex) => {
                let hex = hex
                    .strip_prefix("0x")
                    .or_else(|| hex.strip_prefix("0X"))
                    .ok_or_else(invalid)?;
                u16::from_str_radix(hex, 16).map_err(|_| invalid())?
            }
        };
        let channel: u8 = channel_part.parse().map_err(|_| invalid())?;
        if channel > 3 {
            return Err(invalid());
        }
        Ok(AdcPin::Ads1115 { address, channel })
    }
}

/// Piecewise-constant diameter along the strand: each step `(start_mm, diameter_mm)`
/// holds from its start position until the next step begins.
#[derive(Debug, Clone)]
pub struct DiameterProfile {
    base_mm: f64,
    steps: Vec<(f64, f64)>,
}

impl DiameterProfile {
    /// A strand that is `diameter_mm` everywhere.
    pub fn constant(diameter_mm: f64) -> Self {
        Self {
            base_mm: diameter_mm,
            steps: Vec::new(),
        }
    }

    /// Build from steps; positions before the first step read `base_mm`.
    pub fn from_steps(base_mm: f64, mut steps: Vec<(f64, f64)>) -> Self {
        steps.sort_by(|a, b| a.0.total_cmp(&b.0));
        Self { base_mm, steps }
    }

    pub fn diameter_at(&self, position_mm: f64) -> f64 {
        self.steps
            .iter()
            .rev()
            .find(|(start, _)| *start <= position_mm)
            .map(|(_, d)| *d)
            .unwrap_or(self.base_mm)
    }
}

/// Shared model of the filament strand: position grows at `feed_rate_mm_s`
/// from the moment the line was created.
#[derive(Debug, Clone)]
pub struct FilamentLine<C: Clock + Clone> {
    clock: C,
    epoch: Instant,
    feed_rate_mm_s: f64,
}

impl<C: Clock + Clone> FilamentLine<C> {
    pub fn new(clock: C, feed_rate_mm_s: f64) -> Self {
        let epoch = clock.now();
        Self {
            clock,
            epoch,
            feed_rate_mm_s: feed_rate_mm_s.max(0.0),
        }
    }

    /// Millimeters of filament fed so far.
    pub fn position(&self) -> f64 {
        let secs = self.clock.us_since(self.epoch) as f64 / 1_000_000.0;
        secs * self.feed_rate_mm_s
    }
}

/// Simulated toolhead reporting the strand position as the extruder position.
pub struct SimulatedToolhead<C: Clock + Clone> {
    line: FilamentLine<C>,
}

impl<C: Clock + Clone> SimulatedToolhead<C> {
    pub fn new(line: FilamentLine<C>) -> Self {
        Self { line }
    }
}

impl<C: Clock + Clone> Toolhead for SimulatedToolhead<C> {
    fn extruder_position(&mut self) -> Result<f64, Box<dyn std::error::Error + Send + Sync>> {
        Ok(self.line.position())
    }
}

/// Simulated hall-sensor channel.
///
/// Reads are paced on a fixed schedule of one report period on the line's
/// clock, starting when the channel is created, so channels created
/// together report together. Each read then looks up the
/// diameter under the sensor and converts it back to a raw reading through
/// the inverse of the linear calibration. A small xorshift PRNG adds
/// symmetric noise of up to `noise_mm`.
pub struct SimulatedAdc<C: Clock + Clone> {
    line: FilamentLine<C>,
    profile: DiameterProfile,
    gain_mm_per_unit: f64,
    offset_mm: f64,
    noise_mm: f64,
    report_period: Duration,
    next_due: Instant,
    rng_state: u32,
}

impl<C: Clock + Clone> SimulatedAdc<C> {
    pub fn new(line: FilamentLine<C>, profile: DiameterProfile, report_period: Duration) -> Self {
        let next_due = line.clock.now() + report_period;
        Self {
            next_due,
            line,
            profile,
            gain_mm_per_unit: 1.0,
            offset_mm: 0.0,
            noise_mm: 0.0,
            report_period,
            rng_state: 0x2545_F491,
        }
    }

    /// Match the calibration the compensator will apply to this channel.
    pub fn with_calibration(mut self, gain_mm_per_unit: f64, offset_mm: f64) -> Self {
        if gain_mm_per_unit.is_finite() && gain_mm_per_unit != 0.0 {
            self.gain_mm_per_unit = gain_mm_per_unit;
        }
        self.offset_mm = offset_mm;
        self
    }

    pub fn with_noise(mut self, noise_mm: f64, seed: u32) -> Self {
        self.noise_mm = noise_mm.abs();
        self.rng_state = seed.max(1);
        self
    }

    fn next_unit(&mut self) -> f64 {
        let mut x = self.rng_state;
        x ^= x << 13;
        x ^= x >> 17;
        x ^= x << 5;
        self.rng_state = x;
        (x as f64) / (u32::MAX as f64 + 1.0)
    }
}

impl<C: Clock + Clone> Adc for SimulatedAdc<C> {
    fn read(&mut self, _timeout: Duration) -> Result<f32, Box<dyn std::error::Error + Send + Sync>> {
        self.next_due = wait_for_slot(&self.line.clock, self.next_due, self.report_period);
        let diameter = self.profile.diameter_at(self.line.position());
        let noise = (self.next_unit() * 2.0 - 1.0) * self.noise_mm;
        let raw = (diameter + noise - self.offset_mm) / self.gain_mm_per_unit;
        tracing::trace!(diameter, raw, "simulated adc sample");
        Ok(raw as f32)
    }
}

/// Sleep until `due`, then return the next slot. A reader that fell behind
/// skips the missed slots instead of bursting.
pub fn wait_for_slot<C: Clock>(clock: &C, due: Instant, period: Duration) -> Instant {
    let now = clock.now();
    if due > now {
        clock.sleep(due - now);
        return due + period;
    }
    let missed = now.duration_since(due).as_nanos() / period.as_nanos().max(1);
    let skip = u32::try_from(missed + 1).unwrap_or(u32::MAX);
    due + period.saturating_mul(skip)
}

/// Extrusion scaler that records every directive it receives.
///
/// Clones share the same history, so a test can keep one handle while the
/// compensator owns another.
#[derive(Debug, Clone, Default)]
pub struct RecordingScaler {
    history: Arc<Mutex<Vec<u32>>>,
}

impl RecordingScaler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn history(&self) -> Vec<u32> {
        self.history.lock().map(|h| h.clone()).unwrap_or_default()
    }

    pub fn last(&self) -> Option<u32> {
        self.history.lock().ok().and_then(|h| h.last().copied())
    }
}

impl ExtrusionScaler for RecordingScaler {
    fn set_extrude_factor(
        &mut self,
        percent: u32,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        tracing::debug!(percent, "M221 S{percent}");
        self.history
            .lock()
            .map_err(|_| Box::new(std::io::Error::other("scaler history poisoned")))?
            .push(percent);
        Ok(())
    }
}
