use std::time::{Duration, Instant};

use fwidth_traits::{Clock, MonotonicClock};
use tracing::trace;

use rppal::i2c::I2c;

use crate::error::{HwError, Result};
use crate::util::wait_until_ready_with_timeout;

const REG_CONVERSION: u8 = 0x00;
const REG_CONFIG: u8 = 0x01;

// OS=1 (start), PGA=±4.096 V, MODE=single-shot, DR=860 SPS, comparator off.
const CFG_START: u16 = 0x8000;
const CFG_PGA_4V096: u16 = 0b001 << 9;
const CFG_SINGLE_SHOT: u16 = 0x0100;
const CFG_DR_860: u16 = 0b111 << 5;
const CFG_COMP_DISABLE: u16 = 0x0003;
const FULL_SCALE_V: f32 = 4.096;

/// One single-ended ADS1115 input, averaged over `sample_count` conversions
/// spaced `sample_time` apart. Reads are paced on a fixed report schedule
/// starting at construction.
pub struct Ads1115 {
    i2c: I2c,
    channel: u8,
    sample_count: u32,
    sample_time: Duration,
    report_period: Duration,
    next_due: Instant,
}

impl Ads1115 {
    pub fn new(
        bus: u8,
        address: u16,
        channel: u8,
        sample_count: u32,
        sample_time: Duration,
        report_period: Duration,
    ) -> Result<Self> {
        if channel > 3 {
            return Err(HwError::InvalidPin(format!("ads1115 channel {channel}")));
        }
        let mut i2c = I2c::with_bus(bus).map_err(|e| HwError::I2c(e.to_string()))?;
        i2c.set_slave_address(address)
            .map_err(|e| HwError::I2c(e.to_string()))?;
        Ok(Self {
            i2c,
            channel,
            sample_count: sample_count.max(1),
            sample_time,
            report_period,
            next_due: MonotonicClock::new().now() + report_period,
        })
    }

    fn config_word(&self) -> u16 {
        let mux = u16::from(0b100 | self.channel) << 12;
        CFG_START | mux | CFG_PGA_4V096 | CFG_SINGLE_SHOT | CFG_DR_860 | CFG_COMP_DISABLE
    }

    fn convert_once(&mut self, timeout: Duration) -> Result<f32> {
        let cfg = self.config_word();
        self.i2c
            .block_write(REG_CONFIG, &cfg.to_be_bytes())
            .map_err(|e| HwError::I2c(e.to_string()))?;
        let i2c = &mut self.i2c;
        wait_until_ready_with_timeout(
            || {
                let mut buf = [0u8; 2];
                i2c.block_read(REG_CONFIG, &mut buf)
                    .map_err(|e| HwError::I2c(e.to_string()))?;
                Ok(u16::from_be_bytes(buf) & CFG_START == 0)
            },
            timeout,
            Duration::from_micros(200),
        )?;
        let mut buf = [0u8; 2];
        self.i2c
            .block_read(REG_CONVERSION, &mut buf)
            .map_err(|e| HwError::I2c(e.to_string()))?;
        let raw = i16::from_be_bytes(buf);
        Ok(f32::from(raw) * FULL_SCALE_V / 32768.0)
    }

    /// Averaged reading in volts.
    pub fn read_averaged(&mut self, timeout: Duration) -> Result<f32> {
        let mut sum = 0.0f32;
        for i in 0..self.sample_count {
            if i > 0 {
                std::thread::sleep(self.sample_time);
            }
            sum += self.convert_once(timeout)?;
        }
        let v = sum / self.sample_count as f32;
        trace!(channel = self.channel, volts = v, "ads1115 averaged read");
        Ok(v)
    }
}

impl fwidth_traits::Adc for Ads1115 {
    fn read(
        &mut self,
        timeout: Duration,
    ) -> std::result::Result<f32, Box<dyn std::error::Error + Send + Sync>> {
        self.next_due =
            crate::wait_for_slot(&MonotonicClock::new(), self.next_due, self.report_period);
        let mut attempts = 0;
        let max_attempts = 3;
        loop {
            match self.read_averaged(timeout) {
                Ok(v) => return Ok(v),
                Err(HwError::ConversionTimeout) if attempts < max_attempts => {
                    attempts += 1;
                    tracing::warn!(retries = attempts, "adc conversion timeout, retrying");
                }
                Err(e) => {
                    tracing::error!("ADC read error: {}", e);
                    return Err(Box::new(e));
                }
            }
        }
    }
}
