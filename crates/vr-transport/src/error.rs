//! Reliability and cancellation signals raised by the transport.
//!
//! These are the typed failures that cross from the transport into the
//! dispatcher and on to its callers. Callers use the classifiers to choose
//! between marking a router unhealthy, retrying, or doing nothing.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use vr_types::NetworkElementCommand;

use crate::envelope::InFlightBatch;

/// Result type alias for transport operations.
pub type TransportResult<T> = Result<T, TransportError>;

/// Failure signals raised while talking to a router.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
#[serde(tag = "signal", rename_all = "snake_case")]
pub enum TransportError {
    /// The connection could not be set up, or broke while in use.
    #[error("Connection to {target} failed {}: {message}", phase(.during_setup))]
    Connection {
        target: String,
        message: String,
        /// True if the failure happened while establishing the connection.
        during_setup: bool,
    },

    /// The operation neither completed nor failed within its timeout.
    #[error("Operation timed out: {0}")]
    OperationTimeout(InFlightBatch),

    /// The operation was cancelled before it completed.
    #[error("Operation cancelled: {0}")]
    OperationCancelled(InFlightBatch),

    /// The local transport process could not be started.
    #[error("Failed to execute '{command}': {message}")]
    Exec { command: String, message: String },
}

fn phase(during_setup: &bool) -> &'static str {
    if *during_setup {
        "during setup"
    } else {
        "while in use"
    }
}

impl TransportError {
    /// Creates a connection-setup failure.
    pub fn connection_setup(target: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Connection {
            target: target.into(),
            message: message.into(),
            during_setup: true,
        }
    }

    /// Creates a failure on an already-established connection.
    pub fn connection_in_use(target: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Connection {
            target: target.into(),
            message: message.into(),
            during_setup: false,
        }
    }

    /// Creates a local spawn failure.
    pub fn exec(command: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Exec {
            command: command.into(),
            message: message.into(),
        }
    }

    /// Returns the in-flight envelope for timeouts and cancellations.
    pub fn batch(&self) -> Option<&InFlightBatch> {
        match self {
            TransportError::OperationTimeout(batch) | TransportError::OperationCancelled(batch) => {
                Some(batch)
            }
            _ => None,
        }
    }

    /// Attaches the commands that were in flight to a timeout or cancellation.
    pub fn with_commands(self, commands: Vec<NetworkElementCommand>) -> Self {
        match self {
            TransportError::OperationTimeout(batch) => {
                TransportError::OperationTimeout(batch.with_commands(commands))
            }
            TransportError::OperationCancelled(batch) => {
                TransportError::OperationCancelled(batch.with_commands(commands))
            }
            other => other,
        }
    }

    /// Returns true if the caller should consider the router unhealthy.
    ///
    /// Cancellation never marks a router unhealthy.
    pub fn marks_target_unhealthy(&self) -> bool {
        matches!(
            self,
            TransportError::Connection {
                during_setup: true,
                ..
            } | TransportError::OperationTimeout(_)
        )
    }

    /// Returns true if the failure is transient and a plain retry may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            TransportError::Connection {
                during_setup: false,
                ..
            } | TransportError::OperationCancelled(_)
        )
    }

    pub fn is_cancellation(&self) -> bool {
        matches!(self, TransportError::OperationCancelled(_))
    }
}
