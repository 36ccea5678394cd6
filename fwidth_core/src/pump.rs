//! Background ADC pumping.
//!
//! A single reader thread owns every `Adc` and reads them in a fixed order,
//! first channel then second, once per pass. The devices pace themselves at
//! the report interval. All reports of one pass carry the same timestamp (µs
//! since a shared epoch, taken when the pass's first read completes), so a
//! dual-sensor pair always reaches the host loop in order and close
//! together. Channels on one ADC chip are never converted concurrently.
//! The last-ok time is tracked for stall detection.
//!
//! The thread is stopped and joined when the `AdcPump` is dropped.
use crossbeam_channel as xch;
use fwidth_traits::{Adc, Clock};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crate::config::PumpCfg;
use crate::sampler::{AdcReport, Channel};

pub struct AdcPump {
    rx: xch::Receiver<AdcReport>,
    last_ok_us: Arc<AtomicU64>,
    errors: Arc<AtomicU64>,
    dropped: Arc<AtomicU64>,
    shutdown: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl AdcPump {
    /// Spawn the reader thread for `adcs`. Report timestamps are
    /// microseconds since `epoch` on `clock`.
    pub fn spawn<A, C>(mut adcs: Vec<(Channel, A)>, clock: C, epoch: Instant, cfg: PumpCfg) -> Self
    where
        A: Adc + Send + 'static,
        C: Clock + Clone + Send + 'static,
    {
        let (tx, rx) = xch::bounded(cfg.capacity.max(1));
        let shutdown = Arc::new(AtomicBool::new(false));
        let last_ok_us = Arc::new(AtomicU64::new(0));
        let errors = Arc::new(AtomicU64::new(0));
        let dropped = Arc::new(AtomicU64::new(0));
        let timeout = Duration::from_millis(cfg.read_timeout_ms);
        // stable: first channel before second
        adcs.sort_by_key(|(channel, _)| *channel == Channel::Second);

        // Nothing to read: no thread.
        let handle = (!adcs.is_empty()).then(|| {
            let shutdown = shutdown.clone();
            let last_ok_us = last_ok_us.clone();
            let errors = errors.clone();
            let dropped = dropped.clone();
            std::thread::spawn(move || {
                'passes: while !shutdown.load(Ordering::Relaxed) {
                    let mut pass_us = None;
                    for (channel, adc) in &mut adcs {
                        let channel = *channel;
                        let value = match adc.read(timeout) {
                            Ok(v) => v,
                            Err(e) => {
                                errors.fetch_add(1, Ordering::Relaxed);
                                tracing::debug!(?channel, error = %e, "adc read failed");
                                continue;
                            }
                        };
                        let time_us = *pass_us.get_or_insert_with(|| clock.us_since(epoch));
                        let report = AdcReport {
                            channel,
                            time_us,
                            value,
                        };
                        match tx.try_send(report) {
                            Ok(()) => last_ok_us.store(time_us, Ordering::Relaxed),
                            Err(xch::TrySendError::Full(_)) => {
                                dropped.fetch_add(1, Ordering::Relaxed);
                            }
                            Err(xch::TrySendError::Disconnected(_)) => {
                                tracing::debug!("adc consumer gone, exiting");
                                break 'passes;
                            }
                        }
                    }
                }
                tracing::trace!("adc pump thread exiting");
            })
        });

        Self {
            rx,
            last_ok_us,
            errors,
            dropped,
            shutdown,
            handle,
        }
    }

    /// All reports received so far, oldest first.
    pub fn drain(&self) -> impl Iterator<Item = AdcReport> + '_ {
        self.rx.try_iter()
    }

    /// Wait up to `timeout` for the next report.
    pub fn recv_timeout(&self, timeout: Duration) -> Option<AdcReport> {
        self.rx.recv_timeout(timeout).ok()
    }

    /// Microseconds since the last delivered report.
    pub fn stalled_for(&self, now_us: u64) -> u64 {
        now_us.saturating_sub(self.last_ok_us.load(Ordering::Relaxed))
    }

    pub fn read_errors(&self) -> u64 {
        self.errors.load(Ordering::Relaxed)
    }

    /// Reports discarded because the host loop fell behind.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl Drop for AdcPump {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        // The thread exits after its in-flight pass returns (bounded by the read timeouts).
        if let Some(handle) = self.handle.take()
            && let Err(e) = handle.join()
        {
            tracing::warn!(?e, "adc pump thread panicked during shutdown");
        }
    }
}
