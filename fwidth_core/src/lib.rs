#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::missing_errors_doc,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! Filament width compensation (hardware-agnostic).
//!
//! A hall-effect sensor upstream of the extruder estimates the filament
//! diameter. Each estimate is held in a delay queue until the measured piece
//! of filament reaches the melt zone, and then the host's extrusion
//! multiplier is set to `(nominal / diameter)^2` so the delivered volume
//! stays constant.
//!
//! ## Architecture
//!
//! - **Sampler**: ADC reports → diameter estimate, single or dual sensor (`sampler`)
//! - **Delay queue**: position-keyed measurements waiting to reach the nozzle (`queue`)
//! - **Controller**: periodic tick, activation state, commands (`FilamentWidthCore`)
//! - **Host loop**: ADC pump threads, command channel, timer (`runner`, `pump`)
//!
//! All host interaction goes through `fwidth_traits::{Adc, Toolhead, ExtrusionScaler}`.

pub mod activation;
pub mod builder;
pub mod calibration;
pub mod command;
pub mod config;
pub mod controller;
pub mod conversions;
pub mod error;
pub mod hw_error;
pub mod mocks;
pub mod multiplier;
pub mod pump;
pub mod queue;
pub mod runner;
pub mod sampler;
pub mod snapshot;
pub mod status;
pub mod util;

pub use activation::{ActivationState, Transition};
pub use builder::{
    FilamentWidthSensor, FilamentWidthSensorG, Missing, SensorBuilder, Set, build_sensor,
};
pub use calibration::Calibration;
pub use command::Command;
pub use config::{
    ControlCfg, DiameterLimits, PumpCfg, QueueCfg, SamplerCfg, SensorLayout, StalePairPolicy,
};
pub use controller::FilamentWidthCore;
pub use error::{BuildError, Result, SensorError};
pub use hw_error::map_hw_error;
pub use multiplier::{NEUTRAL_PERCENT, extrusion_percent};
pub use queue::{DelayQueue, QueuedMeasurement};
pub use runner::{CommandRequest, RunParams, RunSummary};
pub use sampler::{AdcReport, Channel, DiameterSampler, SampleOutcome};
pub use status::{NextWake, TickStatus};
