//! Position-keyed delay queue.
//!
//! The sensor sits `measurement_delay` millimeters of filament upstream of
//! the melt zone, so each estimate is tagged with the extruder position at
//! which that piece of filament reaches the nozzle. Entries are appended in
//! ascending trigger order and consumed from the head once the extruder has
//! caught up.

use serde::Serialize;
use std::collections::VecDeque;

/// One diameter estimate waiting for its filament segment to reach the nozzle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct QueuedMeasurement {
    /// Absolute extruder position (mm) at which this estimate applies.
    pub trigger_position_mm: f64,
    pub diameter_mm: f64,
}

#[derive(Debug, Clone)]
pub struct DelayQueue {
    entries: VecDeque<QueuedMeasurement>,
    measurement_delay_mm: f64,
    measurement_interval_mm: f64,
    // Bumped on every mutation; snapshot writers compare against it.
    generation: u64,
}

impl DelayQueue {
    /// Negative or non-finite distances are clamped to 0.
    pub fn new(measurement_delay_mm: f64, measurement_interval_mm: f64) -> Self {
        let sane = |v: f64| if v.is_finite() { v.max(0.0) } else { 0.0 };
        Self {
            entries: VecDeque::new(),
            measurement_delay_mm: sane(measurement_delay_mm),
            measurement_interval_mm: sane(measurement_interval_mm),
            generation: 0,
        }
    }

    /// Append `(position + delay, diameter)` when the queue is empty or the
    /// new trigger is at least one interval past the tail. Returns whether
    /// an entry was added.
    pub fn enqueue(&mut self, current_position_mm: f64, diameter_mm: f64) -> bool {
        let trigger = current_position_mm + self.measurement_delay_mm;
        let accept = match self.entries.back() {
            None => true,
            Some(last) => trigger >= last.trigger_position_mm + self.measurement_interval_mm,
        };
        if accept {
            self.entries.push_back(QueuedMeasurement {
                trigger_position_mm: trigger,
                diameter_mm,
            });
            self.generation = self.generation.wrapping_add(1);
            tracing::debug!(
                trigger_mm = trigger,
                diameter_mm,
                len = self.entries.len(),
                "measurement queued"
            );
        }
        accept
    }

    /// Remove and return the head if the extruder has reached its trigger.
    /// At most one entry per call; a backlog drains over later calls.
    pub fn pop_due(&mut self, current_position_mm: f64) -> Option<QueuedMeasurement> {
        let due = self
            .entries
            .front()
            .is_some_and(|head| head.trigger_position_mm <= current_position_mm);
        if !due {
            return None;
        }
        let item = self.entries.pop_front();
        self.generation = self.generation.wrapping_add(1);
        item
    }

    pub fn clear(&mut self) {
        if self.entries.is_empty() {
            return;
        }
        tracing::debug!(dropped = self.entries.len(), "delay queue cleared");
        self.entries.clear();
        self.generation = self.generation.wrapping_add(1);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn front(&self) -> Option<&QueuedMeasurement> {
        self.entries.front()
    }

    pub fn back(&self) -> Option<&QueuedMeasurement> {
        self.entries.back()
    }

    pub fn iter(&self) -> impl Iterator<Item = &QueuedMeasurement> {
        self.entries.iter()
    }

    pub fn measurement_delay_mm(&self) -> f64 {
        self.measurement_delay_mm
    }

    pub fn measurement_interval_mm(&self) -> f64 {
        self.measurement_interval_mm
    }

    pub(crate) fn generation(&self) -> u64 {
        self.generation
    }
}
