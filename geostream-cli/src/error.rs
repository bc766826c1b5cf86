//! CLI error type.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error("runtime error: {0}")]
    Runtime(#[from] std::io::Error),

    #[error("sensor error: {0}")]
    Sensor(#[from] geostream::error::SensorError),

    #[error("{0}")]
    Other(String),
}
