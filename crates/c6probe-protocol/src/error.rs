//! Protocol errors.

use thiserror::Error;

/// Framing and parsing failures on the console link.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// A line could not be classified.
    #[error("unparseable response: {0}")]
    ParseError(String),

    /// A request could not be built.
    #[error("invalid command: {0}")]
    InvalidCommand(String),

    /// A request or response line exceeded the console's line limit.
    #[error("line too long: {actual} bytes (max {max})")]
    LineTooLong {
        /// Line limit.
        max: usize,
        /// Observed length.
        actual: usize,
    },
}

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;
