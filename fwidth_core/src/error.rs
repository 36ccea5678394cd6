use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum SensorError {
    #[error("hardware error: {0}")]
    Hardware(String),
    #[error("hardware fault: {0}")]
    HardwareFault(String),
    #[error("configuration error: {0}")]
    Config(String),
    #[error("timeout waiting for sensor")]
    Timeout,
    #[error("invalid state: {0}")]
    State(String),
    #[error("io error: {0}")]
    Io(String),
    #[error("unknown command: {0}")]
    UnknownCommand(String),
}

#[derive(Debug, Error, Clone)]
pub enum BuildError {
    #[error("missing toolhead")]
    MissingToolhead,
    #[error("missing extrusion scaler")]
    MissingScaler,
    #[error("missing measurement delay")]
    MissingDelay,
    #[error("invalid config: {0}")]
    InvalidConfig(&'static str),
}

pub type Result<T> = eyre::Result<T>;
pub use eyre::Report;
