use thiserror::Error;

#[derive(Debug, Error)]
pub enum HwError {
    #[error("i2c error: {0}")]
    I2c(String),
    #[error("adc timeout")]
    Timeout,
    #[error("adc conversion-ready timeout")]
    ConversionTimeout,
    #[error("invalid adc pin '{0}'")]
    InvalidPin(String),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, HwError>;
