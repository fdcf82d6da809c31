//! ==============================================================================
//! error.rs - typed failure classes
//! ==============================================================================
//!
//! purpose:
//!     every failure in the control core is per-cycle: it is logged, the input
//!     is dropped and the worker keeps going. these enums name the classes so
//!     the workers can log them consistently.
//!
//! ==============================================================================

use crate::domain::ActuatorId;
use thiserror::Error;

/// a telemetry line from the device could not be turned into a reading
#[derive(Debug, Error, PartialEq)]
pub enum LineError {
    #[error("missing field {0}")]
    MissingField(&'static str),
    #[error("field {field} is not numeric: {value:?}")]
    NotNumeric { field: &'static str, value: String },
    #[error("humidity must be 0 or 1, got {0}")]
    BadHumidity(i64),
}

/// a command token was rejected before reaching the device
#[derive(Debug, Error, PartialEq)]
pub enum CommandError {
    #[error("malformed command {0:?}")]
    Malformed(String),
    #[error("{param} value {value} outside [{min}, {max}]")]
    OutOfRange {
        param: &'static str,
        value: f32,
        min: f32,
        max: f32,
    },
    #[error(transparent)]
    Interlock(#[from] InterlockError),
}

/// heater and cooler may never be ON together
#[derive(Debug, Error, PartialEq)]
#[error("{requested:?} cannot turn ON while {blocking:?} is ON")]
pub struct InterlockError {
    pub requested: ActuatorId,
    pub blocking: ActuatorId,
}

/// a call to the cloud collaborator failed
#[derive(Debug, Error)]
pub enum CloudError {
    #[error("{0} endpoint is not configured")]
    NotConfigured(&'static str),
    #[error("http transport: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("unexpected status {0}")]
    Status(reqwest::StatusCode),
}

/// the serial link to the microcontroller failed
#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("failed to open {port}: {source}")]
    Open {
        port: String,
        #[source]
        source: tokio_serial::Error,
    },
    #[error("device write failed: {0}")]
    Write(#[from] std::io::Error),
}
