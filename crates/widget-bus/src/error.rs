//! Error types for bus operations
//!
//! Every failure the bus can report is local and recoverable. Unsubscribing an
//! unknown handle is not an error at all; it is reported as `false`.

use crate::registry::ListenerHandle;
use thiserror::Error;

/// Event bus error types.
#[derive(Debug, Error)]
pub enum BusError {
    /// Untyped release input did not describe a valid event
    #[error("Invalid event: {0}")]
    InvalidEvent(String),

    /// Delivery mode code outside the known set (strict mode only)
    #[error("Unknown delivery mode: {0}")]
    UnknownDeliveryMode(u8),

    /// A listener panicked while the bus ran in fail-fast mode
    #[error("Listener {handle} panicked: {message}")]
    ListenerPanicked {
        /// Handle of the failing listener
        handle: ListenerHandle,
        /// Panic message, if it was a string
        message: String,
    },

    /// Invalid configuration value
    #[error("Invalid configuration value for {key}: {message}")]
    Config {
        /// Configuration key
        key: String,
        /// Error message
        message: String,
    },

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Result type for bus operations.
pub type BusResult<T> = Result<T, BusError>;

impl BusError {
    /// Whether the error was caused by the caller's input rather than by a
    /// listener or the environment.
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            BusError::InvalidEvent(_)
                | BusError::UnknownDeliveryMode(_)
                | BusError::Serialization(_)
        )
    }

    /// Get a stable error code.
    pub fn error_code(&self) -> &'static str {
        match self {
            BusError::InvalidEvent(_) => "INVALID_EVENT",
            BusError::UnknownDeliveryMode(_) => "UNKNOWN_DELIVERY_MODE",
            BusError::ListenerPanicked { .. } => "LISTENER_PANICKED",
            BusError::Config { .. } => "CONFIG_ERROR",
            BusError::Serialization(_) => "SERIALIZATION_ERROR",
        }
    }
}

impl From<serde_json::Error> for BusError {
    fn from(err: serde_json::Error) -> Self {
        BusError::Serialization(err.to_string())
    }
}
