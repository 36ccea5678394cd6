//! Outcomes of one controller tick and the timer schedule.

use crate::error::SensorError;
use crate::queue::QueuedMeasurement;

/// Result of a single controller tick.
#[derive(Debug, Clone, PartialEq)]
pub enum TickStatus {
    /// Nothing due yet; the host keeps the previous multiplier.
    Idle,
    /// A due in-range measurement produced a corrective multiplier.
    Applied {
        percent: u32,
        measurement: QueuedMeasurement,
    },
    /// A due measurement was outside the valid range; neutral multiplier emitted.
    OutOfRange { measurement: QueuedMeasurement },
    /// Latest estimate below the presence threshold; neutral emitted and queue cleared.
    NoFilament,
    /// The compensator is disabled or the host is not ready; nothing was done.
    Inactive,
    /// A host collaborator failed; nothing was emitted this tick.
    HostFault(SensorError),
}

/// When the controller timer should fire next, in host microseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NextWake {
    At(u64),
    Never,
}

impl NextWake {
    #[inline]
    pub fn is_due(self, now_us: u64) -> bool {
        matches!(self, NextWake::At(t) if t <= now_us)
    }
}
