use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AmcError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Computation fault: {0}")]
    ComputationFault(String),

    #[error("Protocol error: {0}")]
    ProtocolError(String),

    #[error("Worker unavailable: {0}")]
    WorkerUnavailable(String),

    #[error("Date calculation error: {0}")]
    DateError(String),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

/// The three failure classes a caller has to tell apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Bad or missing record fields. Isolated to one record.
    InvalidInput,
    /// Unexpected fault while computing one record's schedule.
    ComputationFault,
    /// Malformed or unrecognised command.
    ProtocolError,
}

impl AmcError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AmcError::InvalidInput(_) => ErrorKind::InvalidInput,
            AmcError::ComputationFault(_) | AmcError::DateError(_) => ErrorKind::ComputationFault,
            AmcError::InvalidConfiguration(_)
            | AmcError::ProtocolError(_)
            | AmcError::WorkerUnavailable(_)
            | AmcError::SerializationError(_) => ErrorKind::ProtocolError,
        }
    }
}

pub type Result<T> = std::result::Result<T, AmcError>;
