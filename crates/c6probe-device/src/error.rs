//! Error types for device sessions.

use std::time::Duration;

use c6probe_model::ModelError;
use c6probe_protocol::ProtocolError;
use thiserror::Error;

use crate::session::SessionState;

/// Errors that can occur while talking to a board.
///
/// Only [`DeviceError::Connection`] ends a session. Everything else is
/// attributed to the key being read or written and recorded in the report.
#[derive(Debug, Error)]
pub enum DeviceError {
    /// The serial port could not be opened (absent, busy, or refused).
    #[error("cannot connect to {endpoint}: {reason}")]
    Connection {
        /// Port or endpoint label.
        endpoint: String,
        /// Reason reported by the OS.
        reason: String,
    },

    /// No complete response line arrived before the deadline.
    #[error("timeout after {after:?} waiting for response to '{command}'")]
    Timeout {
        /// Command that was sent.
        command: String,
        /// Time waited.
        after: Duration,
    },

    /// The firmware does not know the parameter.
    #[error("parameter not supported by firmware: {0}")]
    UnsupportedParameter(String),

    /// A value failed its key's domain check.
    #[error("invalid value for {key}: {reason}")]
    DomainValidation {
        /// Key name.
        key: String,
        /// Domain failure.
        reason: String,
    },

    /// The firmware answered with an error.
    #[error("firmware error: {0}")]
    Firmware(String),

    /// The firmware answered with something the command does not expect.
    #[error("unexpected response to '{command}': {response}")]
    UnexpectedResponse {
        /// Command that was sent.
        command: String,
        /// Response text.
        response: String,
    },

    /// Framing or parse failure.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// I/O error on the link.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Requested keys or change set are inconsistent with the catalog.
    #[error("configuration error: {0}")]
    Model(#[from] ModelError),

    /// Operation attempted in the wrong session state.
    #[error("invalid session transition {from:?} -> {to:?}")]
    InvalidState {
        /// Current state.
        from: SessionState,
        /// Requested state.
        to: SessionState,
    },

    /// The session has been closed.
    #[error("session is closed")]
    Closed,
}

impl DeviceError {
    /// Whether this error prevents a session from being used at all.
    pub fn is_fatal(&self) -> bool {
        matches!(self, DeviceError::Connection { .. })
    }

    /// Whether this is a deadline expiry.
    pub fn is_timeout(&self) -> bool {
        matches!(self, DeviceError::Timeout { .. })
    }
}

/// Result type for device operations.
pub type DeviceResult<T> = Result<T, DeviceError>;
