//! Error types for the rotation controller.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Failures talking to the pulse-width driver.
#[derive(Debug, Error)]
pub enum DriverError {
    /// The driver could not be reached at startup.
    #[error("pulse driver unavailable at {address}: {source}")]
    Unavailable {
        address: String,
        #[source]
        source: io::Error,
    },

    /// The driver answered a command with a negative status.
    #[error("driver command {command} failed with status {status}")]
    Command { command: u32, status: i32 },

    #[error("driver I/O error: {0}")]
    Io(#[from] io::Error),

    /// Injected by the simulated driver.
    #[error("simulated fault on {pulse_us}us pulse")]
    Simulated { pulse_us: u32 },
}

/// Malformed inbound payloads.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CommandError {
    #[error("payload is not valid UTF-8: {raw:02x?}")]
    NotUtf8 { raw: Vec<u8> },

    #[error("payload {text:?} is not a signed integer")]
    NotInteger { text: String },
}

/// A rotation that did not complete cleanly.
#[derive(Debug, Error)]
pub enum ActuatorError {
    /// The drive pulse was never issued, so no motion happened.
    #[error("failed to start rotation: {0}")]
    Drive(#[source] DriverError),

    /// Motion was issued but the neutral pulse failed.
    #[error("failed to return to neutral: {0}")]
    Stop(#[source] DriverError),
}

impl ActuatorError {
    /// Whether the physical motion for this rotation was issued.
    pub fn motion_issued(&self) -> bool {
        matches!(self, ActuatorError::Stop(_))
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("cannot parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("missing required setting `{0}`")]
    Missing(&'static str),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("command source I/O error: {0}")]
    Io(#[from] io::Error),

    #[cfg(feature = "ble")]
    #[error("bluetooth error: {0}")]
    Bluetooth(#[from] btleplug::Error),

    #[error("no bluetooth adapter found")]
    NoAdapter,

    #[error("peripheral {0:?} not found")]
    PeripheralNotFound(String),

    #[error("command characteristic not found")]
    CharacteristicNotFound,
}

/// Crate-level error.
#[derive(Debug, Error)]
pub enum ServoError {
    #[error(transparent)]
    Driver(#[from] DriverError),

    #[error(transparent)]
    Actuator(#[from] ActuatorError),

    #[error(transparent)]
    Command(#[from] CommandError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Source(#[from] SourceError),

    /// The rotation worker panicked or was cancelled.
    #[error("rotation worker failed: {0}")]
    Worker(String),
}

impl From<tokio::task::JoinError> for ServoError {
    fn from(err: tokio::task::JoinError) -> Self {
        ServoError::Worker(err.to_string())
    }
}
