//! Error types for dispatcher operations.
//!
//! These never reach the dispatcher's caller directly: every error is
//! turned into an [`Answer`](crate::Answer) before `dispatch` returns.

use thiserror::Error;
use vr_types::{CommandKind, ValidationError};

/// Result type alias for dispatcher operations.
pub type DispatchResult<T> = Result<T, DispatchError>;

/// Errors that can occur while translating or dispatching a command.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// Malformed or contradictory command arguments.
    #[error("Invalid command arguments: {0}")]
    Validation(#[from] ValidationError),

    /// No facade is registered for the command kind.
    #[error("Unsupported command kind {kind:?}")]
    Unsupported { kind: CommandKind },

    /// Configuration file could not be loaded or is invalid.
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A config payload could not be encoded.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Internal error (unexpected state).
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl DispatchError {
    /// Creates an unsupported-command error.
    pub fn unsupported(kind: CommandKind) -> Self {
        Self::Unsupported { kind }
    }

    /// Creates a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Creates an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns true if the command itself is at fault and resubmitting it
    /// unchanged cannot succeed.
    pub fn is_command_error(&self) -> bool {
        matches!(
            self,
            DispatchError::Validation(_) | DispatchError::Unsupported { .. }
        )
    }
}
