//! Error taxonomy for the DAP engine.
//!
//! Every variant maps onto a DAP failure response rather than leaking
//! internal detail to the client.

use thiserror::Error;

/// Errors produced by the engine's own components (not the script host).
#[derive(Debug, Error)]
pub enum DapError {
    /// Unknown command or malformed arguments from the client.
    #[error("client protocol error: {message}")]
    ClientProtocol {
        /// Human-readable detail.
        message: String,
    },

    /// The client referenced state that doesn't exist (goto target, label, jump).
    #[error("invalid state reference: {message}")]
    StateInvalid {
        /// Human-readable detail.
        message: String,
    },

    /// An expression raised while being evaluated.
    #[error("evaluation failed: {message}")]
    EvaluationFailed {
        /// Human-readable detail.
        message: String,
    },

    /// The requested operation has no support from the current host.
    #[error("unsupported: {message}")]
    Unsupported {
        /// Human-readable detail.
        message: String,
    },

    /// A filesystem or I/O operation failed (e.g. source fetch).
    #[error("io error: {message}")]
    Io {
        /// Human-readable detail.
        message: String,
    },
}

impl DapError {
    /// Render as the `message` field of a DAP failure response.
    #[must_use]
    pub fn to_message(&self) -> String {
        self.to_string()
    }

    /// Construct a `ClientProtocol` error.
    pub fn client_protocol(message: impl Into<String>) -> Self {
        Self::ClientProtocol {
            message: message.into(),
        }
    }

    /// Construct a `StateInvalid` error.
    pub fn state_invalid(message: impl Into<String>) -> Self {
        Self::StateInvalid {
            message: message.into(),
        }
    }

    /// Construct an `EvaluationFailed` error.
    pub fn evaluation_failed(message: impl Into<String>) -> Self {
        Self::EvaluationFailed {
            message: message.into(),
        }
    }

    /// Construct an `Unsupported` error.
    pub fn unsupported(message: impl Into<String>) -> Self {
        Self::Unsupported {
            message: message.into(),
        }
    }

    /// Construct an `Io` error.
    pub fn io(message: impl Into<String>) -> Self {
        Self::Io {
            message: message.into(),
        }
    }
}
