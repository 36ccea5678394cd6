//! Type-state builder for `FilamentWidthSensor` and generic `build_sensor` constructor.
//!
//! The builder enforces at compile time that a toolhead, an extrusion scaler
//! and the measurement delay are provided before `build()` is available.
//! `try_build()` is always available for dynamic checks.

use std::marker::PhantomData;
use std::path::PathBuf;

use fwidth_traits::{ExtrusionScaler, Toolhead};

use crate::command::Command;
use crate::config::{ControlCfg, DiameterLimits, QueueCfg, SamplerCfg, SensorLayout};
use crate::controller::FilamentWidthCore;
use crate::error::{BuildError, Result};
use crate::queue::{DelayQueue, QueuedMeasurement};
use crate::sampler::{AdcReport, DiameterSampler, SampleOutcome};
use crate::snapshot::QueueSnapshot;
use crate::status::{NextWake, TickStatus};

// ── Public dynamic-dispatch wrapper ──────────────────────────────────────────

/// Boxed compensator for hosts that pick their devices at runtime.
pub struct FilamentWidthSensor {
    pub(crate) inner: FilamentWidthCore<Box<dyn Toolhead>, Box<dyn ExtrusionScaler>>,
}

impl core::fmt::Debug for FilamentWidthSensor {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Debug::fmt(&self.inner, f)
    }
}

impl FilamentWidthSensor {
    /// Start building a sensor.
    pub fn builder() -> SensorBuilder<Missing, Missing, Missing> {
        SensorBuilder::default()
    }

    pub fn handle_ready(&mut self, now_us: u64) {
        self.inner.handle_ready(now_us);
    }

    pub fn on_adc_report(&mut self, report: AdcReport) -> SampleOutcome {
        self.inner.on_adc_report(report)
    }

    pub fn tick(&mut self, now_us: u64) -> TickStatus {
        self.inner.tick(now_us)
    }

    pub fn is_due(&self, now_us: u64) -> bool {
        self.inner.is_due(now_us)
    }

    pub fn next_wake(&self) -> NextWake {
        self.inner.next_wake()
    }

    pub fn dispatch(&mut self, cmd: Command, now_us: u64) -> Result<String> {
        self.inner.dispatch(cmd, now_us)
    }

    pub fn run_command(&mut self, name: &str, now_us: u64) -> Result<String> {
        self.inner.run_command(name, now_us)
    }

    pub fn latest_diameter(&self) -> f64 {
        self.inner.latest_diameter()
    }

    pub fn is_active(&self) -> bool {
        self.inner.is_active()
    }

    pub fn queue(&self) -> &DelayQueue {
        self.inner.queue()
    }

    pub fn last_percent(&self) -> Option<u32> {
        self.inner.last_percent()
    }

    pub fn last_measurement(&self) -> Option<QueuedMeasurement> {
        self.inner.last_measurement()
    }

    pub fn ticks(&self) -> u64 {
        self.inner.ticks()
    }

    /// Hand the boxed core to the host runner.
    pub fn into_core(self) -> FilamentWidthCore<Box<dyn Toolhead>, Box<dyn ExtrusionScaler>> {
        self.inner
    }
}

// ── Type-state markers ───────────────────────────────────────────────────────

pub struct Missing;
pub struct Set;

/// Builder for `FilamentWidthSensor`. All fields are validated on `build()`.
pub struct SensorBuilder<T, X, D> {
    toolhead: Option<Box<dyn Toolhead>>,
    scaler: Option<Box<dyn ExtrusionScaler>>,
    measurement_delay_mm: Option<f64>,
    limits: Option<DiameterLimits>,
    queue: Option<QueueCfg>,
    sampler: Option<SamplerCfg>,
    control: Option<ControlCfg>,
    dump_file: Option<PathBuf>,
    _t: PhantomData<T>,
    _x: PhantomData<X>,
    _d: PhantomData<D>,
}

impl Default for SensorBuilder<Missing, Missing, Missing> {
    fn default() -> Self {
        Self {
            toolhead: None,
            scaler: None,
            measurement_delay_mm: None,
            limits: None,
            queue: None,
            sampler: None,
            control: None,
            dump_file: None,
            _t: PhantomData,
            _x: PhantomData,
            _d: PhantomData,
        }
    }
}

fn invalid(msg: &'static str) -> eyre::Report {
    eyre::Report::new(BuildError::InvalidConfig(msg))
}

/// Validate configuration and construct a `FilamentWidthCore`.
///
/// Shared by `SensorBuilder::try_build()` and `build_sensor()`.
#[allow(clippy::too_many_arguments)]
fn validate_and_build<T: Toolhead, X: ExtrusionScaler>(
    toolhead: T,
    scaler: X,
    measurement_delay_mm: f64,
    limits: DiameterLimits,
    queue: QueueCfg,
    sampler: SamplerCfg,
    control: ControlCfg,
    dump_file: Option<PathBuf>,
) -> Result<FilamentWidthCore<T, X>> {
    // ── Validation ───────────────────────────────────────────────────────────
    let DiameterLimits {
        nominal_mm,
        min_mm,
        max_mm,
    } = limits;
    if !(nominal_mm.is_finite() && min_mm.is_finite() && max_mm.is_finite()) {
        return Err(invalid("diameter limits must be finite"));
    }
    if !(min_mm < nominal_mm && nominal_mm < max_mm) {
        return Err(invalid("diameter limits must satisfy min < nominal < max"));
    }
    if !(measurement_delay_mm.is_finite() && measurement_delay_mm > 0.0) {
        return Err(invalid("measurement_delay must be > 0"));
    }
    if !(queue.measurement_interval_mm.is_finite() && queue.measurement_interval_mm >= 0.0) {
        return Err(invalid("measurement_interval_mm must be >= 0"));
    }
    if control.interval_ms == 0 {
        return Err(invalid("control interval_ms must be >= 1"));
    }
    let threshold = control.presence_threshold_mm;
    if !(threshold.is_finite() && threshold >= 0.0 && threshold < min_mm) {
        return Err(invalid("presence_threshold_mm must be in [0, min)"));
    }
    let gain = sampler.calibration.gain_mm_per_unit;
    if !(gain.is_finite() && gain != 0.0 && sampler.calibration.offset_mm.is_finite()) {
        return Err(invalid("calibration must be finite with non-zero gain"));
    }
    if let SensorLayout::Dual { max_skew_us: 0, .. } = sampler.layout {
        return Err(invalid("max pair skew must be > 0"));
    }

    // ── Resources ────────────────────────────────────────────────────────────
    let snapshot = dump_file
        .map(QueueSnapshot::open)
        .transpose()
        .map_err(eyre::Report::new)?;

    tracing::debug!(
        nominal_mm,
        min_mm,
        max_mm,
        measurement_delay_mm,
        interval_mm = queue.measurement_interval_mm,
        layout = ?sampler.layout,
        "filament width sensor configured"
    );

    Ok(FilamentWidthCore::from_parts(
        toolhead,
        scaler,
        limits,
        control,
        DiameterSampler::new(sampler),
        DelayQueue::new(measurement_delay_mm, queue.measurement_interval_mm),
        snapshot,
    ))
}

impl<T, X, D> SensorBuilder<T, X, D> {
    /// Fallible build available in any type-state; returns detailed error for missing pieces.
    pub fn try_build(self) -> Result<FilamentWidthSensor> {
        let toolhead = self
            .toolhead
            .ok_or_else(|| eyre::Report::new(BuildError::MissingToolhead))?;
        let scaler = self
            .scaler
            .ok_or_else(|| eyre::Report::new(BuildError::MissingScaler))?;
        let delay = self
            .measurement_delay_mm
            .ok_or_else(|| eyre::Report::new(BuildError::MissingDelay))?;

        let inner = validate_and_build(
            toolhead,
            scaler,
            delay,
            self.limits.unwrap_or_default(),
            self.queue.unwrap_or_default(),
            self.sampler.unwrap_or_default(),
            self.control.unwrap_or_default(),
            self.dump_file,
        )?;
        Ok(FilamentWidthSensor { inner })
    }

    /// Move every field into a builder with different type-state markers.
    fn retype<T2, X2, D2>(self) -> SensorBuilder<T2, X2, D2> {
        SensorBuilder {
            toolhead: self.toolhead,
            scaler: self.scaler,
            measurement_delay_mm: self.measurement_delay_mm,
            limits: self.limits,
            queue: self.queue,
            sampler: self.sampler,
            control: self.control,
            dump_file: self.dump_file,
            _t: PhantomData,
            _x: PhantomData,
            _d: PhantomData,
        }
    }
}

/// Chainable setters that do not affect type-state.
impl<T, X, D> SensorBuilder<T, X, D> {
    pub fn with_limits(mut self, limits: DiameterLimits) -> Self {
        self.limits = Some(limits);
        self
    }
    pub fn with_queue(mut self, queue: QueueCfg) -> Self {
        self.queue = Some(queue);
        self
    }
    pub fn with_sampler(mut self, sampler: SamplerCfg) -> Self {
        self.sampler = Some(sampler);
        self
    }
    pub fn with_control(mut self, control: ControlCfg) -> Self {
        self.control = Some(control);
        self
    }
    /// Persist the delay queue to `path` after every change.
    pub fn with_dump_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.dump_file = Some(path.into());
        self
    }
}

// Setters that advance type-state
impl<X, D> SensorBuilder<Missing, X, D> {
    pub fn with_toolhead(self, toolhead: impl Toolhead + 'static) -> SensorBuilder<Set, X, D> {
        let mut next = self.retype();
        next.toolhead = Some(Box::new(toolhead));
        next
    }
}

impl<T, D> SensorBuilder<T, Missing, D> {
    pub fn with_scaler(self, scaler: impl ExtrusionScaler + 'static) -> SensorBuilder<T, Set, D> {
        let mut next = self.retype();
        next.scaler = Some(Box::new(scaler));
        next
    }
}

impl<T, X> SensorBuilder<T, X, Missing> {
    pub fn with_measurement_delay(self, mm: f64) -> SensorBuilder<T, X, Set> {
        let mut next = self.retype();
        next.measurement_delay_mm = Some(mm);
        next
    }
}

impl<T, X, D> SensorBuilder<T, X, D> {
    /// Take every tunable (including the measurement delay) from a loaded config.
    pub fn with_config(self, cfg: &fwidth_config::Config) -> SensorBuilder<T, X, Set> {
        let mut next = self
            .with_limits(DiameterLimits::from(&cfg.filament))
            .with_queue(QueueCfg::from(&cfg.filament))
            .with_sampler(SamplerCfg::from(cfg))
            .with_control(ControlCfg::from(cfg))
            .retype::<T, X, Set>();
        next.measurement_delay_mm = Some(cfg.filament.measurement_delay);
        next.dump_file = cfg.persistence.dump_file.clone();
        next
    }
}

impl SensorBuilder<Set, Set, Set> {
    /// Validate and build. Only available when toolhead, scaler and delay are set.
    pub fn build(self) -> Result<FilamentWidthSensor> {
        self.try_build()
    }
}

/// Generic, statically-dispatched alias using the unified core.
pub type FilamentWidthSensorG<T, X> = FilamentWidthCore<T, X>;

/// Build a statically-dispatched compensator from concrete devices.
#[allow(clippy::too_many_arguments)]
pub fn build_sensor<T, X>(
    toolhead: T,
    scaler: X,
    measurement_delay_mm: f64,
    limits: DiameterLimits,
    queue: QueueCfg,
    sampler: SamplerCfg,
    control: ControlCfg,
    dump_file: Option<PathBuf>,
) -> Result<FilamentWidthSensorG<T, X>>
where
    T: Toolhead,
    X: ExtrusionScaler,
{
    validate_and_build(
        toolhead,
        scaler,
        measurement_delay_mm,
        limits,
        queue,
        sampler,
        control,
        dump_file,
    )
}
