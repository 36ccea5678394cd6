//! Device assembly and subcommand execution.
//!
//! The extruder and the extrusion scaler are always simulated here (there is
//! no motion host in this process); hall sensor channels are simulated
//! unless the `hardware` feature is enabled and the pin names an ADS1115.

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::time::Duration;

use crossbeam_channel as xch;
use eyre::{Result, WrapErr};
use fwidth_config::Config;
use fwidth_core::runner::{CommandRequest, RunParams, RunSummary};
use fwidth_core::{
    AdcReport, Calibration, Channel, Command, FilamentWidthSensor, PumpCfg, SamplerCfg,
    SensorError, SensorLayout,
};
use fwidth_hardware::{
    AdcPin, DiameterProfile, FilamentLine, RecordingScaler, SimulatedAdc, SimulatedToolhead,
};
use fwidth_traits::{Adc, MonotonicClock};

pub type BoxedAdc = Box<dyn Adc + Send>;

pub struct Devices {
    pub toolhead: SimulatedToolhead<MonotonicClock>,
    pub scaler: RecordingScaler,
    pub adcs: Vec<(Channel, BoxedAdc)>,
}

/// Pick the calibration: `[calibration]` in the config wins over `--calibration`.
/// The CSV is still loaded (and rejected if malformed) when both are given.
pub fn resolve_calibration(cfg: &Config, csv: Option<&Path>) -> Result<Calibration> {
    let from_csv = csv
        .map(|p| {
            fwidth_config::load_calibration_csv(p)
                .wrap_err_with(|| format!("loading calibration CSV {}", p.display()))
        })
        .transpose()?;
    Ok(match (&cfg.calibration, from_csv) {
        (Some(persisted), Some(_)) => {
            tracing::warn!("config [calibration] takes precedence over --calibration");
            Calibration::from(persisted)
        }
        (Some(persisted), None) => Calibration::from(persisted),
        (None, Some(fitted)) => Calibration::from(&fitted),
        (None, None) => Calibration::default(),
    })
}

fn sensor_pins(cfg: &Config) -> Vec<(Channel, &str)> {
    let mut pins = vec![(Channel::First, cfg.sensor.hall_sensor_1.as_str())];
    if let Some(p) = cfg.sensor.hall_sensor_2.as_deref() {
        pins.push((Channel::Second, p));
    }
    pins
}

/// Parse both pin names without touching any device. Two spellings of the
/// same physical input (`ads1115:0` and `ads1115@0x48:0`) are rejected.
pub fn parse_pins(cfg: &Config) -> Result<Vec<(Channel, AdcPin)>> {
    let pins = sensor_pins(cfg)
        .into_iter()
        .map(|(ch, pin)| {
            let parsed: AdcPin = pin
                .parse()
                .wrap_err_with(|| format!("invalid sensor pin '{pin}'"))?;
            Ok((ch, parsed))
        })
        .collect::<Result<Vec<_>>>()?;
    if let [(_, first), (_, second)] = pins.as_slice()
        && first == second
    {
        return Err(eyre::Report::new(SensorError::Config(format!(
            "Can't use the same pin for hall_sensor_1 and hall_sensor_2 ({first:?})"
        ))));
    }
    Ok(pins)
}

fn open_adc(
    pin: &AdcPin,
    cfg: &Config,
    line: &FilamentLine<MonotonicClock>,
    profile: &DiameterProfile,
    calibration: Calibration,
    index: u32,
) -> Result<BoxedAdc> {
    let report = Duration::from_millis(cfg.sampling.report_interval_ms);
    match pin {
        #[cfg(all(feature = "hardware", target_os = "linux"))]
        AdcPin::Ads1115 { address, channel } => {
            let adc = fwidth_hardware::ads1115::Ads1115::new(
                1,
                *address,
                *channel,
                cfg.sampling.sample_count,
                Duration::from_millis(cfg.sampling.sample_time_ms),
                report,
            )
            .wrap_err_with(|| format!("open ADS1115 at {address:#04x} channel {channel}"))?;
            Ok(Box::new(adc))
        }
        _ => {
            if matches!(pin, AdcPin::Ads1115 { .. }) {
                tracing::warn!(?pin, "built without hardware support; simulating channel");
            }
            let adc = SimulatedAdc::new(line.clone(), profile.clone(), report)
                .with_calibration(calibration.gain_mm_per_unit, calibration.offset_mm)
                .with_noise(cfg.simulation.noise_mm, cfg.simulation.seed.wrapping_add(index));
            Ok(Box::new(adc))
        }
    }
}

pub fn assemble(cfg: &Config, calibration: Calibration) -> Result<Devices> {
    let clock = MonotonicClock::new();
    let line = FilamentLine::new(clock, cfg.simulation.feed_rate_mm_s);
    let profile = DiameterProfile::from_steps(
        cfg.simulation.base_diameter_mm,
        cfg.simulation.profile.clone(),
    );
    let adcs = parse_pins(cfg)?
        .into_iter()
        .zip(0u32..)
        .map(|((ch, pin), i)| Ok((ch, open_adc(&pin, cfg, &line, &profile, calibration, i)?)))
        .collect::<Result<Vec<_>>>()?;
    Ok(Devices {
        toolhead: SimulatedToolhead::new(line),
        scaler: RecordingScaler::new(),
        adcs,
    })
}

pub fn build_sensor(
    cfg: &Config,
    calibration: Calibration,
    toolhead: SimulatedToolhead<MonotonicClock>,
    scaler: RecordingScaler,
) -> Result<FilamentWidthSensor> {
    FilamentWidthSensor::builder()
        .with_toolhead(toolhead)
        .with_scaler(scaler)
        .with_config(cfg)
        .with_sampler(SamplerCfg {
            calibration,
            ..SamplerCfg::from(cfg)
        })
        .build()
        .wrap_err("building filament width sensor")
}

/// Outcome of a `run`: loop summary plus the answers to `--send` commands.
#[derive(Debug)]
pub struct HostReport {
    pub summary: RunSummary,
    pub responses: Vec<(&'static str, std::result::Result<String, String>)>,
    pub scaler_history: Vec<u32>,
}

fn poll_period(cfg: &Config) -> Duration {
    let base = cfg
        .control
        .interval_ms
        .min(cfg.sampling.report_interval_ms)
        / 4;
    Duration::from_millis(base.clamp(1, 20))
}

pub fn run_host(
    cfg: &Config,
    calibration: Calibration,
    duration: Option<Duration>,
    send: &[String],
    shutdown: Arc<AtomicBool>,
) -> Result<HostReport> {
    let commands = send
        .iter()
        .map(|s| s.parse::<Command>().map_err(eyre::Report::new))
        .collect::<Result<Vec<_>>>()?;

    let Devices {
        toolhead,
        scaler,
        adcs,
    } = assemble(cfg, calibration)?;
    let sensor = build_sensor(cfg, calibration, toolhead, scaler.clone())?;

    let (tx, rx) = xch::unbounded();
    let mut pending = Vec::with_capacity(commands.len());
    for c in commands {
        let (req, reply) = CommandRequest::new(c);
        tx.send(req)
            .map_err(|_| eyre::eyre!("command channel closed"))?;
        pending.push((c, reply));
    }

    let params = RunParams {
        duration,
        poll_period: poll_period(cfg),
        pump: PumpCfg::from(&cfg.sampling),
        stall_warn: Duration::from_millis(cfg.sampling.report_interval_ms.saturating_mul(4).max(1000)),
    };
    let mut core = sensor.into_core();
    let summary = fwidth_core::runner::run(
        &mut core,
        adcs,
        MonotonicClock::new(),
        params,
        Some(&rx),
        &shutdown,
    )?;

    let responses = pending
        .into_iter()
        .map(|(c, reply)| {
            let answer = match reply.try_recv() {
                Ok(Ok(msg)) => Ok(msg),
                Ok(Err(e)) => Err(e.to_string()),
                Err(_) => Err("not processed before shutdown".to_string()),
            };
            (c.name(), answer)
        })
        .collect();

    Ok(HostReport {
        summary,
        responses,
        scaler_history: scaler.history(),
    })
}

/// Build a sensor, optionally feed one raw reading, and run one command.
pub fn one_shot(
    cfg: &Config,
    calibration: Calibration,
    name: &str,
    reading: Option<f32>,
) -> Result<String> {
    let cmd: Command = name.parse().map_err(eyre::Report::new)?;
    let Devices {
        toolhead, scaler, ..
    } = assemble(cfg, calibration)?;
    let mut sensor = build_sensor(cfg, calibration, toolhead, scaler)?;
    sensor.handle_ready(0);
    if let Some(value) = reading {
        let channels: &[Channel] = match SamplerCfg::from(cfg).layout {
            SensorLayout::Single => &[Channel::First],
            SensorLayout::Dual { .. } => &[Channel::First, Channel::Second],
        };
        for &channel in channels {
            sensor.on_adc_report(AdcReport {
                channel,
                time_us: 0,
                value,
            });
        }
    }
    sensor.dispatch(cmd, 0)
}

/// One reading per channel, with the configured read timeout.
pub fn probe_channels(cfg: &Config, calibration: Calibration) -> Result<Vec<(Channel, f64)>> {
    let devices = assemble(cfg, calibration)?;
    let timeout = Duration::from_millis(
        cfg.sampling
            .read_timeout_ms
            .max(cfg.sampling.report_interval_ms.saturating_mul(2)),
    );
    devices
        .adcs
        .into_iter()
        .map(|(ch, mut adc)| {
            let raw = adc
                .read(timeout)
                .map_err(|e| eyre::Report::new(fwidth_core::map_hw_error(&*e)))
                .wrap_err_with(|| format!("reading {ch:?} sensor channel"))?;
            Ok((ch, calibration.to_diameter(f64::from(raw))))
        })
        .collect()
}
