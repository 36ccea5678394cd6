#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
//! Config schema and calibration parsing for the filament width compensator.
//!
//! - `Config` and sub-structs are deserialized from TOML and validated.
//! - Calibration CSV loader enforces headers and performs a robust refit
//!   to reduce outlier influence before slope/intercept estimation.
use serde::Deserialize;
use serde::de::Deserializer;
use std::path::PathBuf;

/// Calibration CSV schema.
///
/// Expected headers:
/// reading,diameter
///
/// Example (two drill-rod gauges through the sensor):
/// reading,diameter
/// 1.52,1.50
/// 2.03,2.00
#[derive(Debug, Deserialize, Clone, Copy)]
pub struct CalibrationRow {
    pub reading: f64,
    pub diameter: f64,
}

/// Behaviour when a dual-channel pair is too far apart in time to combine.
#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StalePairPolicy {
    /// Keep the last good combined estimate.
    #[default]
    HoldLast,
    /// Drop the estimate to zero so the controller treats filament as absent.
    Invalidate,
}

#[derive(Debug, Deserialize)]
pub struct Sensor {
    pub hall_sensor_1: String,
    #[serde(default)]
    pub hall_sensor_2: Option<String>,
    #[serde(default)]
    pub stale_pair_policy: StalePairPolicy,
    /// Max timestamp distance (ms) between the two channels of a combined pair.
    #[serde(default = "default_max_pair_skew_ms")]
    pub max_pair_skew_ms: u64,
}

fn default_max_pair_skew_ms() -> u64 {
    10
}

#[derive(Debug, Deserialize)]
pub struct Filament {
    #[serde(default = "default_nominal")]
    pub nominal_filament_diameter: f64,
    #[serde(default = "default_min")]
    pub min_filament_diameter: f64,
    #[serde(default = "default_max")]
    pub max_filament_diameter: f64,
    /// Distance (mm) from the sensor to the melt zone. Required.
    pub measurement_delay: f64,
    /// Minimum extruder travel between two queued measurements.
    #[serde(default = "default_measurement_interval")]
    pub measurement_interval_mm: f64,
    /// Estimates at or below this are read as "no filament loaded".
    #[serde(default = "default_presence_threshold")]
    pub presence_threshold_mm: f64,
}

fn default_nominal() -> f64 {
    1.75
}
fn default_min() -> f64 {
    1.0
}
fn default_max() -> f64 {
    3.0
}
fn default_measurement_interval() -> f64 {
    5.0
}
fn default_presence_threshold() -> f64 {
    0.5
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Sampling {
    /// Period between averaged ADC reports.
    pub report_interval_ms: u64,
    /// Spacing of the individual conversions inside one averaged report.
    pub sample_time_ms: u64,
    pub sample_count: u32,
    /// Max wait for one averaged report before the pump logs a timeout.
    pub read_timeout_ms: u64,
}

impl Default for Sampling {
    fn default() -> Self {
        Self {
            report_interval_ms: 500,
            sample_time_ms: 1,
            sample_count: 8,
            read_timeout_ms: 150,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ControlCfg {
    /// Controller tick period.
    pub interval_ms: u64,
}

impl Default for ControlCfg {
    fn default() -> Self {
        Self { interval_ms: 1000 }
    }
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Logging {
    pub file: Option<String>,  // path to .log (JSON lines)
    pub level: Option<String>, // "info","debug"
    /// Log rotation policy: "never" | "daily" | "hourly" (default: never)
    pub rotation: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Persistence {
    /// Optional queue snapshot target; must be writable at startup.
    pub dump_file: Option<PathBuf>,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Simulation {
    pub feed_rate_mm_s: f64,
    /// Diameter before the first profile step.
    pub base_diameter_mm: f64,
    /// Diameter steps along the strand. Accepts either:
    /// - array of tables: [{ position_mm = 100.0, diameter_mm = 1.5 }, ...]
    /// - array of tuples: [[100.0, 1.5], ...]
    #[serde(deserialize_with = "de_profile")]
    pub profile: Vec<(f64, f64)>,
    pub noise_mm: f64,
    pub seed: u32,
}

impl Default for Simulation {
    fn default() -> Self {
        Self {
            feed_rate_mm_s: 2.0,
            base_diameter_mm: 1.75,
            profile: Vec::new(),
            noise_mm: 0.0,
            seed: 0xC0FFEE,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct Config {
    pub sensor: Sensor,
    pub filament: Filament,
    #[serde(default)]
    pub sampling: Sampling,
    #[serde(default)]
    pub control: ControlCfg,
    /// Optional persisted calibration; preferred at runtime over CSV when present.
    #[serde(default)]
    pub calibration: Option<PersistedCalibration>,
    #[serde(default)]
    pub persistence: Persistence,
    #[serde(default)]
    pub logging: Logging,
    #[serde(default)]
    pub simulation: Simulation,
}

#[derive(Debug, Deserialize, Clone, Copy)]
pub struct PersistedCalibration {
    /// millimeters per ADC unit
    pub gain_mm_per_unit: f64,
    /// additive offset in millimeters
    #[serde(default)]
    pub offset_mm: f64,
}

impl From<PersistedCalibration> for Calibration {
    fn from(p: PersistedCalibration) -> Self {
        Calibration {
            gain_mm_per_unit: p.gain_mm_per_unit,
            offset_mm: p.offset_mm,
        }
    }
}

pub fn load_toml(s: &str) -> Result<Config, toml::de::Error> {
    toml::from_str::<Config>(s)
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum StepToml {
    Tuple((f64, f64)),
    Table { position_mm: f64, diameter_mm: f64 },
}

fn de_profile<'de, D>(deserializer: D) -> Result<Vec<(f64, f64)>, D::Error>
where
    D: Deserializer<'de>,
{
    let opt: Option<Vec<StepToml>> = Option::deserialize(deserializer)?;
    let mut out = Vec::new();
    if let Some(items) = opt {
        for s in items {
            match s {
                StepToml::Tuple((pos, dia)) => out.push((pos, dia)),
                StepToml::Table {
                    position_mm,
                    diameter_mm,
                } => out.push((position_mm, diameter_mm)),
            }
        }
    }
    Ok(out)
}

/// Linear reading → diameter transform: `diameter = gain * reading + offset`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Calibration {
    pub gain_mm_per_unit: f64,
    pub offset_mm: f64,
}

impl Calibration {
    /// Fit `diameter = a*reading + b` by ordinary least squares, then refit once
    /// without points whose residual exceeds 2σ.
    pub fn from_rows(rows: Vec<CalibrationRow>) -> eyre::Result<Self> {
        if rows.len() < 2 {
            eyre::bail!("calibration requires at least two rows, got {}", rows.len());
        }
        for (i, r) in rows.iter().enumerate() {
            if !r.reading.is_finite() || !r.diameter.is_finite() {
                eyre::bail!("calibration row {} has a non-finite value", i);
            }
        }

        // Readings must be strictly monotonic (increasing or decreasing), no duplicates
        let mut dir: i8 = 0;
        for i in 1..rows.len() {
            let d = rows[i].reading - rows[i - 1].reading;
            if d == 0.0 {
                eyre::bail!(
                    "calibration rows have duplicate readings at index {} and {}",
                    i - 1,
                    i
                );
            }
            let step_dir = if d > 0.0 { 1 } else { -1 };
            if dir == 0 {
                dir = step_dir;
            } else if dir != step_dir {
                eyre::bail!(
                    "calibration readings must be monotonic (strictly increasing or strictly decreasing)"
                );
            }
        }

        let pts: Vec<(f64, f64)> = rows.iter().map(|r| (r.reading, r.diameter)).collect();
        let (a0, b0) = ols_fit(&pts)?;
        let sumsq: f64 = pts
            .iter()
            .map(|(x, y)| {
                let r = y - (a0 * x + b0);
                r * r
            })
            .sum();
        let rms = (sumsq / pts.len() as f64).sqrt();

        let (a, b) = robust_refit(&pts, a0, b0, rms, 2.0).unwrap_or((a0, b0));
        Ok(Calibration {
            gain_mm_per_unit: a,
            offset_mm: b,
        })
    }

    pub fn apply(&self, reading: f64) -> f64 {
        self.gain_mm_per_unit * reading + self.offset_mm
    }
}

fn ols_fit(pts: &[(f64, f64)]) -> eyre::Result<(f64, f64)> {
    let n = pts.len() as f64;
    let mean_x = pts.iter().map(|p| p.0).sum::<f64>() / n;
    let mean_y = pts.iter().map(|p| p.1).sum::<f64>() / n;
    let mut sxx = 0.0f64;
    let mut sxy = 0.0f64;
    for (x, y) in pts {
        let dx = x - mean_x;
        sxx += dx * dx;
        sxy += dx * (y - mean_y);
    }
    if !sxx.is_finite() || sxx == 0.0 {
        eyre::bail!("calibration cannot determine slope (degenerate reading variance)");
    }
    let a = sxy / sxx;
    if !a.is_finite() {
        eyre::bail!("calibration produced non-finite slope");
    }
    if a == 0.0 {
        eyre::bail!("calibration produced zero slope (readings do not track diameter)");
    }
    Ok((a, mean_y - a * mean_x))
}

/// Single-step robust refit: drop points with |residual| > k * rms around
/// y = a0*x + b0 and refit the inliers with an online covariance update.
/// Returns None when the refit does not apply (no outliers, <2 inliers,
/// degenerate variance); the caller keeps (a0, b0).
fn robust_refit(pts: &[(f64, f64)], a0: f64, b0: f64, rms: f64, k: f64) -> Option<(f64, f64)> {
    if !(rms.is_finite() && rms > 0.0 && k.is_finite() && k > 0.0) {
        return None;
    }
    let thr = k * rms;
    let mut n_in: usize = 0;
    let mut mean_x = 0.0f64;
    let mut mean_y = 0.0f64;
    let mut cxx = 0.0f64;
    let mut cxy = 0.0f64;

    for &(x, y) in pts {
        if (y - (a0 * x + b0)).abs() <= thr {
            n_in += 1;
            let n = n_in as f64;
            let dx = x - mean_x;
            let dy = y - mean_y;
            mean_x += dx / n;
            mean_y += dy / n;
            cxx += dx * (x - mean_x);
            cxy += dx * (y - mean_y);
        }
    }

    if n_in >= 2 && n_in < pts.len() {
        if !cxx.is_finite() || cxx == 0.0 {
            return None;
        }
        let a = cxy / cxx;
        if !a.is_finite() || a == 0.0 {
            return None;
        }
        Some((a, mean_y - a * mean_x))
    } else {
        None
    }
}

impl TryFrom<Vec<CalibrationRow>> for Calibration {
    type Error = eyre::Report;
    fn try_from(rows: Vec<CalibrationRow>) -> Result<Self, Self::Error> {
        Self::from_rows(rows)
    }
}

impl TryFrom<&[CalibrationRow]> for Calibration {
    type Error = eyre::Report;
    fn try_from(rows: &[CalibrationRow]) -> Result<Self, Self::Error> {
        Self::from_rows(rows.to_vec())
    }
}

pub fn load_calibration_csv(path: &std::path::Path) -> eyre::Result<Calibration> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|e| eyre::eyre!("open calibration CSV {:?}: {}", path, e))?;

    let headers = rdr
        .headers()
        .map_err(|e| eyre::eyre!("read CSV headers {:?}: {}", path, e))?
        .clone();
    let expected = ["reading", "diameter"];
    let actual: Vec<String> = headers.iter().map(|s| s.to_string()).collect();
    if actual != expected {
        eyre::bail!(
            "calibration CSV must have headers 'reading,diameter', got: {}",
            actual.join(",")
        );
    }

    let mut rows = Vec::new();
    for (idx, rec) in rdr.deserialize::<CalibrationRow>().enumerate() {
        match rec {
            Ok(row) => rows.push(row),
            Err(e) => {
                eyre::bail!("invalid CSV row {}: {}", idx + 2, e);
            }
        }
    }

    Calibration::try_from(rows)
}

impl Config {
    /// True when a second hall sensor is configured.
    pub fn is_dual(&self) -> bool {
        self.sensor.hall_sensor_2.is_some()
    }

    pub fn validate(&self) -> eyre::Result<()> {
        // Sensor
        let pin1 = self.sensor.hall_sensor_1.trim();
        if pin1.is_empty() {
            eyre::bail!("sensor.hall_sensor_1 must not be empty");
        }
        if let Some(pin2) = &self.sensor.hall_sensor_2 {
            let pin2 = pin2.trim();
            if pin2.is_empty() {
                eyre::bail!("sensor.hall_sensor_2 must not be empty when present");
            }
            if pin1 == pin2 {
                eyre::bail!("Can't use the same pin for hall_sensor_1 and hall_sensor_2");
            }
            if self.sensor.max_pair_skew_ms == 0 {
                eyre::bail!("sensor.max_pair_skew_ms must be >= 1");
            }
        }

        // Filament
        let f = &self.filament;
        if !(f.min_filament_diameter.is_finite()
            && f.nominal_filament_diameter.is_finite()
            && f.max_filament_diameter.is_finite())
        {
            eyre::bail!("filament diameters must be finite");
        }
        if !(f.min_filament_diameter < f.nominal_filament_diameter
            && f.nominal_filament_diameter < f.max_filament_diameter)
        {
            eyre::bail!(
                "Incorrect diameter values in configuration: need min_filament_diameter < nominal_filament_diameter < max_filament_diameter"
            );
        }
        if !(f.measurement_delay.is_finite() && f.measurement_delay > 0.0) {
            eyre::bail!("filament.measurement_delay must be > 0");
        }
        if !(f.measurement_interval_mm.is_finite() && f.measurement_interval_mm >= 0.0) {
            eyre::bail!("filament.measurement_interval_mm must be >= 0");
        }
        if !(f.presence_threshold_mm.is_finite()
            && f.presence_threshold_mm >= 0.0
            && f.presence_threshold_mm < f.min_filament_diameter)
        {
            eyre::bail!("filament.presence_threshold_mm must be in [0, min_filament_diameter)");
        }

        // Sampling
        let s = &self.sampling;
        if s.report_interval_ms == 0 {
            eyre::bail!("sampling.report_interval_ms must be >= 1");
        }
        if s.sample_count == 0 {
            eyre::bail!("sampling.sample_count must be >= 1");
        }
        if s.sample_time_ms.saturating_mul(u64::from(s.sample_count)) > s.report_interval_ms {
            eyre::bail!("sampling window (sample_time_ms * sample_count) exceeds report_interval_ms");
        }
        if s.read_timeout_ms == 0 {
            eyre::bail!("sampling.read_timeout_ms must be >= 1");
        }

        // Control
        if self.control.interval_ms == 0 {
            eyre::bail!("control.interval_ms must be >= 1");
        }
        if self.control.interval_ms > 60 * 60 * 1000 {
            eyre::bail!("control.interval_ms is unreasonably large (>1h)");
        }

        // Calibration
        if let Some(c) = &self.calibration {
            if !c.gain_mm_per_unit.is_finite() || c.gain_mm_per_unit == 0.0 {
                eyre::bail!("calibration.gain_mm_per_unit must be finite and non-zero");
            }
            if !c.offset_mm.is_finite() {
                eyre::bail!("calibration.offset_mm must be finite");
            }
        }

        // Logging
        if let Some(rot) = self.logging.rotation.as_deref()
            && !matches!(rot, "never" | "daily" | "hourly")
        {
            eyre::bail!("logging.rotation must be one of never|daily|hourly");
        }

        // Simulation
        let sim = &self.simulation;
        if !(sim.feed_rate_mm_s.is_finite() && sim.feed_rate_mm_s >= 0.0) {
            eyre::bail!("simulation.feed_rate_mm_s must be >= 0");
        }
        if !(sim.noise_mm.is_finite() && sim.noise_mm >= 0.0) {
            eyre::bail!("simulation.noise_mm must be >= 0");
        }
        if !(sim.base_diameter_mm.is_finite() && sim.base_diameter_mm >= 0.0)
            || sim
                .profile
                .iter()
                .any(|(p, d)| !p.is_finite() || !d.is_finite() || *d < 0.0)
        {
            eyre::bail!("simulation profile diameters must be finite and >= 0");
        }

        Ok(())
    }
}
