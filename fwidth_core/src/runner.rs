//! Host event loop.
//!
//! Owns the controller for the duration of a run: pumps ADC reports into the
//! sampler, answers commands, and fires the controller whenever its wake time
//! is due. Stops when the shutdown flag is raised or the optional duration
//! elapses.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crossbeam_channel as xch;
use fwidth_traits::{Adc, Clock, ExtrusionScaler, Toolhead};
use serde::Serialize;

use crate::command::Command;
use crate::config::PumpCfg;
use crate::controller::FilamentWidthCore;
use crate::error::{Result, SensorError};
use crate::pump::AdcPump;
use crate::sampler::Channel;
use crate::status::TickStatus;
use crate::util::{MICROS_PER_MS, us_to_secs};

/// A command plus the channel its response goes back on.
#[derive(Debug)]
pub struct CommandRequest {
    pub command: Command,
    pub reply: xch::Sender<std::result::Result<String, SensorError>>,
}

impl CommandRequest {
    /// Build a request and the receiver for its reply.
    pub fn new(command: Command) -> (Self, xch::Receiver<std::result::Result<String, SensorError>>) {
        let (reply, rx) = xch::bounded(1);
        (Self { command, reply }, rx)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RunParams {
    /// Stop after this long; `None` runs until shutdown.
    pub duration: Option<Duration>,
    /// Longest wait for an ADC report between loop passes.
    pub poll_period: Duration,
    pub pump: PumpCfg,
    /// Warn when no ADC report arrived for this long.
    pub stall_warn: Duration,
}

impl Default for RunParams {
    fn default() -> Self {
        Self {
            duration: None,
            poll_period: Duration::from_millis(5),
            pump: PumpCfg::default(),
            stall_warn: Duration::from_secs(2),
        }
    }
}

/// What happened during a run.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct RunSummary {
    pub ticks: u64,
    /// Ticks that sent a corrective multiplier.
    pub applied: u64,
    /// Ticks (and commands) that sent the neutral multiplier.
    pub neutral: u64,
    pub host_faults: u64,
    pub last_percent: Option<u32>,
    pub last_diameter_mm: f64,
    pub queue_len: usize,
    pub stale_pairs: u64,
    pub commands: u64,
    pub adc_errors: u64,
    /// Reports discarded because the loop fell behind.
    pub adc_dropped: u64,
    pub elapsed_s: f64,
}

fn to_sensor_error(report: eyre::Report) -> SensorError {
    match report.downcast_ref::<SensorError>() {
        Some(e) => e.clone(),
        None => SensorError::State(format!("{report:#}")),
    }
}

/// Run the host loop with the given ADC channels until shutdown or timeout.
pub fn run<T, X, A, C>(
    core: &mut FilamentWidthCore<T, X>,
    adcs: Vec<(Channel, A)>,
    clock: C,
    params: RunParams,
    commands: Option<&xch::Receiver<CommandRequest>>,
    shutdown: &AtomicBool,
) -> Result<RunSummary>
where
    T: Toolhead,
    X: ExtrusionScaler,
    A: Adc + Send + 'static,
    C: Clock + Clone + Send + 'static,
{
    if params.poll_period.is_zero() {
        return Err(eyre::Report::new(SensorError::Config(
            "poll period must be > 0".into(),
        )));
    }
    if adcs.is_empty() {
        return Err(eyre::Report::new(SensorError::Config(
            "at least one ADC channel is required".into(),
        )));
    }

    let epoch = clock.now();
    let pump = AdcPump::spawn(adcs, clock.clone(), epoch, params.pump);
    let deadline_us = params
        .duration
        .map(|d| d.as_micros().min(u128::from(u64::MAX)) as u64);
    let stall_warn_us = params.stall_warn.as_micros().min(u128::from(u64::MAX)) as u64;

    let mut summary = RunSummary::default();
    let mut stall_reported = false;

    if !core.is_ready() {
        core.handle_ready(0);
    }
    tracing::info!(duration = ?params.duration, "host loop start");

    loop {
        let now_us = clock.us_since(epoch);
        if shutdown.load(Ordering::Relaxed) {
            tracing::info!("shutdown requested");
            break;
        }
        if deadline_us.is_some_and(|d| now_us >= d) {
            break;
        }

        for report in pump.drain() {
            core.on_adc_report(report);
        }

        if let Some(rx) = commands {
            for req in rx.try_iter() {
                summary.commands += 1;
                let emitted_before = core.emitted();
                let result = core.dispatch(req.command, now_us).map_err(to_sensor_error);
                summary.neutral += core.emitted() - emitted_before;
                if req.reply.send(result).is_err() {
                    tracing::debug!(command = %req.command, "command requester went away");
                }
            }
        }

        if core.is_due(now_us) {
            match core.tick(now_us) {
                TickStatus::Applied { percent, .. } => {
                    summary.applied += 1;
                    tracing::debug!(percent, at_s = us_to_secs(now_us), "applied");
                }
                TickStatus::OutOfRange { .. } | TickStatus::NoFilament => summary.neutral += 1,
                TickStatus::HostFault(_) => summary.host_faults += 1,
                TickStatus::Idle | TickStatus::Inactive => {}
            }
        }

        let stalled = pump.stalled_for(now_us);
        if stalled > stall_warn_us && !stall_reported {
            tracing::warn!(stalled_ms = stalled / MICROS_PER_MS, "no ADC reports");
            stall_reported = true;
        } else if stalled <= stall_warn_us {
            stall_reported = false;
        }

        // Wake early when a report arrives; commands and the timer wait at most one poll period.
        if let Some(report) = pump.recv_timeout(params.poll_period) {
            core.on_adc_report(report);
        }
    }

    summary.ticks = core.ticks();
    summary.last_percent = core.last_percent();
    summary.last_diameter_mm = core.latest_diameter();
    summary.queue_len = core.queue().len();
    summary.stale_pairs = core.stale_pairs();
    summary.adc_errors = pump.read_errors();
    summary.adc_dropped = pump.dropped();
    summary.elapsed_s = us_to_secs(clock.us_since(epoch));
    drop(pump);

    tracing::info!(
        ticks = summary.ticks,
        applied = summary.applied,
        neutral = summary.neutral,
        last_percent = ?summary.last_percent,
        "host loop done"
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrapped_sensor_errors_survive_conversion() {
        let e = eyre::Report::new(SensorError::Timeout).wrap_err("ctx");
        // wrap_err keeps the original error reachable by downcast
        assert_eq!(to_sensor_error(e), SensorError::Timeout);
    }

    #[test]
    fn foreign_errors_become_state() {
        let e = eyre::eyre!("boom");
        assert!(matches!(to_sensor_error(e), SensorError::State(m) if m.contains("boom")));
    }
}
