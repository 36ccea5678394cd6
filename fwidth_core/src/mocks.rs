//! Test and helper doubles for fwidth_core

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Toolhead whose extruder position is set by hand. Clones share the position.
#[derive(Debug, Clone, Default)]
pub struct ManualToolhead {
    bits: Arc<AtomicU64>,
}

impl ManualToolhead {
    pub fn new(position_mm: f64) -> Self {
        let t = Self::default();
        t.set(position_mm);
        t
    }

    pub fn set(&self, position_mm: f64) {
        self.bits.store(position_mm.to_bits(), Ordering::Relaxed);
    }

    pub fn advance(&self, mm: f64) {
        self.set(self.get() + mm);
    }

    pub fn get(&self) -> f64 {
        f64::from_bits(self.bits.load(Ordering::Relaxed))
    }
}

impl fwidth_traits::Toolhead for ManualToolhead {
    fn extruder_position(&mut self) -> Result<f64, BoxError> {
        Ok(self.get())
    }
}

/// A toolhead that always errors; the host never answers.
pub struct FailingToolhead;

impl fwidth_traits::Toolhead for FailingToolhead {
    fn extruder_position(&mut self) -> Result<f64, BoxError> {
        Err(Box::new(std::io::Error::other("toolhead unavailable")))
    }
}

/// A scaler that rejects every directive.
pub struct FailingScaler;

impl fwidth_traits::ExtrusionScaler for FailingScaler {
    fn set_extrude_factor(&mut self, _percent: u32) -> Result<(), BoxError> {
        Err(Box::new(std::io::Error::other("gcode queue closed")))
    }
}
