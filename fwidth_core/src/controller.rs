//! The filament width controller (`FilamentWidthCore`).
//!
//! Owns the sampler, the delay queue and the activation state, and drives
//! the host's extrusion scaler once per control tick. Everything here is
//! single-owner: the host loop feeds ADC reports, fires ticks when the
//! wake time is due and routes commands, all from one thread.

use eyre::WrapErr;
use fwidth_traits::{ExtrusionScaler, Toolhead};

use crate::activation::{ActivationState, Transition};
use crate::command::{self, Command};
use crate::config::{ControlCfg, DiameterLimits};
use crate::error::{Result, SensorError};
use crate::hw_error::map_boxed;
use crate::multiplier::{NEUTRAL_PERCENT, extrusion_percent};
use crate::queue::{DelayQueue, QueuedMeasurement};
use crate::sampler::{AdcReport, DiameterSampler, SampleOutcome};
use crate::snapshot::QueueSnapshot;
use crate::status::{NextWake, TickStatus};
use crate::util::{ms_to_us, us_to_secs};

pub struct FilamentWidthCore<T: Toolhead, X: ExtrusionScaler> {
    pub(crate) toolhead: T,
    pub(crate) scaler: X,
    pub(crate) limits: DiameterLimits,
    pub(crate) control: ControlCfg,
    pub(crate) sampler: DiameterSampler,
    pub(crate) queue: DelayQueue,
    pub(crate) activation: ActivationState,
    pub(crate) ready: bool,
    pub(crate) next_wake: NextWake,
    pub(crate) snapshot: Option<QueueSnapshot>,

    pub(crate) ticks: u64,
    pub(crate) emitted: u64,
    pub(crate) last_percent: Option<u32>,
    pub(crate) last_measurement: Option<QueuedMeasurement>,
}

impl<T: Toolhead, X: ExtrusionScaler> core::fmt::Debug for FilamentWidthCore<T, X> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("FilamentWidthCore")
            .field("diameter_mm", &self.sampler.latest())
            .field("activation", &self.activation)
            .field("queue_len", &self.queue.len())
            .field("next_wake", &self.next_wake)
            .finish()
    }
}

impl<T: Toolhead, X: ExtrusionScaler> FilamentWidthCore<T, X> {
    pub(crate) fn from_parts(
        toolhead: T,
        scaler: X,
        limits: DiameterLimits,
        control: ControlCfg,
        sampler: DiameterSampler,
        queue: DelayQueue,
        snapshot: Option<QueueSnapshot>,
    ) -> Self {
        Self {
            toolhead,
            scaler,
            limits,
            control,
            sampler,
            queue,
            activation: ActivationState::Active,
            ready: false,
            next_wake: NextWake::Never,
            snapshot,
            ticks: 0,
            emitted: 0,
            last_percent: None,
            last_measurement: None,
        }
    }

    /// The host has finished starting up; arm the timer if active.
    pub fn handle_ready(&mut self, now_us: u64) {
        self.ready = true;
        if self.activation.is_active() {
            self.next_wake = NextWake::At(now_us);
        }
        tracing::info!(
            at_s = us_to_secs(now_us),
            active = self.activation.is_active(),
            "filament width sensor ready"
        );
    }

    /// Feed one averaged ADC report to the sampler.
    pub fn on_adc_report(&mut self, report: AdcReport) -> SampleOutcome {
        self.sampler.on_reading(report)
    }

    #[inline]
    pub fn latest_diameter(&self) -> f64 {
        self.sampler.latest()
    }

    pub fn next_wake(&self) -> NextWake {
        self.next_wake
    }

    /// True when the timer should fire at `now_us`.
    pub fn is_due(&self, now_us: u64) -> bool {
        self.ready && self.activation.is_active() && self.next_wake.is_due(now_us)
    }

    pub fn is_active(&self) -> bool {
        self.activation.is_active()
    }

    pub fn is_ready(&self) -> bool {
        self.ready
    }

    pub fn queue(&self) -> &DelayQueue {
        &self.queue
    }

    /// Telemetry: last multiplier sent to the host.
    pub fn last_percent(&self) -> Option<u32> {
        self.last_percent
    }
    /// Telemetry: last measurement popped from the queue.
    pub fn last_measurement(&self) -> Option<QueuedMeasurement> {
        self.last_measurement
    }
    /// Telemetry: controller ticks run so far.
    pub fn ticks(&self) -> u64 {
        self.ticks
    }
    /// Telemetry: multiplier directives sent so far.
    pub fn emitted(&self) -> u64 {
        self.emitted
    }
    pub fn stale_pairs(&self) -> u64 {
        self.sampler.stale_pairs()
    }

    /// One controller tick at host time `now_us`.
    ///
    /// Host failures never abort the loop: they are logged, nothing is
    /// emitted, and the next wake is still scheduled.
    pub fn tick(&mut self, now_us: u64) -> TickStatus {
        if !(self.ready && self.activation.is_active()) {
            return TickStatus::Inactive;
        }
        self.ticks += 1;
        self.next_wake = NextWake::At(now_us.saturating_add(ms_to_us(self.control.interval_ms)));

        let status = self.tick_inner();
        if let TickStatus::HostFault(e) = &status {
            tracing::warn!(error = %e, at_s = us_to_secs(now_us), "tick degraded");
        }
        self.sync_snapshot();
        status
    }

    fn tick_inner(&mut self) -> TickStatus {
        let position = match self.toolhead.extruder_position() {
            Ok(p) => p,
            Err(e) => return TickStatus::HostFault(map_boxed(e)),
        };
        let diameter = self.sampler.latest();
        self.queue.enqueue(position, diameter);

        if diameter <= self.control.presence_threshold_mm {
            self.queue.clear();
            return match self.emit(NEUTRAL_PERCENT) {
                Ok(()) => TickStatus::NoFilament,
                Err(e) => TickStatus::HostFault(e),
            };
        }

        let Some(measurement) = self.queue.pop_due(position) else {
            return TickStatus::Idle;
        };
        self.last_measurement = Some(measurement);

        if self.limits.contains(measurement.diameter_mm) {
            let percent = extrusion_percent(self.limits.nominal_mm, measurement.diameter_mm);
            match self.emit(percent) {
                Ok(()) => TickStatus::Applied {
                    percent,
                    measurement,
                },
                Err(e) => TickStatus::HostFault(e),
            }
        } else {
            tracing::debug!(
                diameter_mm = measurement.diameter_mm,
                min_mm = self.limits.min_mm,
                max_mm = self.limits.max_mm,
                "measurement out of range"
            );
            match self.emit(NEUTRAL_PERCENT) {
                Ok(()) => TickStatus::OutOfRange { measurement },
                Err(e) => TickStatus::HostFault(e),
            }
        }
    }

    fn emit(&mut self, percent: u32) -> std::result::Result<(), SensorError> {
        self.scaler.set_extrude_factor(percent).map_err(map_boxed)?;
        self.emitted += 1;
        self.last_percent = Some(percent);
        tracing::debug!(percent, "extrude factor set");
        Ok(())
    }

    fn emit_cmd(&mut self, percent: u32) -> Result<()> {
        self.emit(percent)
            .map_err(eyre::Report::new)
            .wrap_err("setting extrude factor")
    }

    fn sync_snapshot(&mut self) {
        if let Some(snap) = self.snapshot.as_mut()
            && let Err(e) = snap.sync(&self.queue)
        {
            tracing::warn!(error = %e, "queue snapshot failed");
        }
    }

    /// `QUERY_FILAMENT_WIDTH`.
    pub fn query(&self) -> String {
        let d = self.sampler.latest();
        if d > self.control.presence_threshold_mm {
            command::diameter_message(d)
        } else {
            command::MSG_NOT_PRESENT.to_string()
        }
    }

    /// `RESET_FILAMENT_WIDTH_SENSOR`: drop queued measurements and go neutral.
    pub fn reset(&mut self) -> Result<String> {
        self.queue.clear();
        self.sync_snapshot();
        self.emit_cmd(NEUTRAL_PERCENT)?;
        tracing::info!("filament width measurements cleared");
        Ok(command::MSG_CLEARED.to_string())
    }

    /// `DISABLE_FILAMENT_WIDTH_SENSOR`.
    pub fn disable(&mut self) -> Result<String> {
        if self.activation.disable() == Transition::Unchanged {
            return Ok(command::MSG_ALREADY_OFF.to_string());
        }
        self.next_wake = NextWake::Never;
        self.queue.clear();
        self.sync_snapshot();
        self.emit_cmd(NEUTRAL_PERCENT)?;
        tracing::info!("filament width sensor disabled");
        Ok(command::MSG_TURNED_OFF.to_string())
    }

    /// `ENABLE_FILAMENT_WIDTH_SENSOR`. The timer is armed immediately once
    /// the host is ready; before that `handle_ready` arms it.
    pub fn enable(&mut self, now_us: u64) -> String {
        if self.activation.enable() == Transition::Unchanged {
            return command::MSG_ALREADY_ON.to_string();
        }
        if self.ready {
            self.next_wake = NextWake::At(now_us);
        }
        tracing::info!("filament width sensor enabled");
        command::MSG_TURNED_ON.to_string()
    }

    /// Route a parsed command to its handler.
    pub fn dispatch(&mut self, cmd: Command, now_us: u64) -> Result<String> {
        tracing::debug!(command = %cmd, "command");
        match cmd {
            Command::Query => Ok(self.query()),
            Command::Reset => self.reset(),
            Command::Disable => self.disable(),
            Command::Enable => Ok(self.enable(now_us)),
        }
    }

    /// Parse and dispatch a command by name.
    pub fn run_command(&mut self, name: &str, now_us: u64) -> Result<String> {
        let cmd: Command = name.parse().map_err(eyre::Report::new)?;
        self.dispatch(cmd, now_us)
    }
}
