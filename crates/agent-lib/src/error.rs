//! Closed error union crossing the cycle boundary
//!
//! Failures are classified as close to their source as possible and carried
//! as one of three kinds; nothing else crosses a component boundary.

use thiserror::Error;

use crate::config::ConfigError;
use crate::speedtest::MeasurementError;
use crate::storage::StorageError;

/// Classification of a failure, used for logging and cycle outcomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Configuration,
    Measurement,
    Storage,
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            FailureKind::Configuration => "configuration",
            FailureKind::Measurement => "measurement",
            FailureKind::Storage => "storage",
        };
        f.write_str(label)
    }
}

/// Every failure the agent can produce, classified at its source.
#[derive(Debug, Error)]
pub enum AgentError {
    #[error(transparent)]
    Configuration(#[from] ConfigError),
    #[error(transparent)]
    Measurement(#[from] MeasurementError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl AgentError {
    /// The failure classification for this error.
    pub fn kind(&self) -> FailureKind {
        match self {
            AgentError::Configuration(_) => FailureKind::Configuration,
            AgentError::Measurement(_) => FailureKind::Measurement,
            AgentError::Storage(_) => FailureKind::Storage,
        }
    }
}
