//! Requests understood by the configuration console.

use std::fmt;

use crate::codec::{frame_line, MAX_LINE_LENGTH};
use crate::error::{ProtocolError, ProtocolResult};

/// A console request. Build `get`/`set` through [`Command::get`] and
/// [`Command::set`] so the line is known to be well formed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// `get <key>`
    Get(String),
    /// `set <key> <value>`, value in wire form.
    Set(String, String),
    /// `ver`
    Version,
    /// `board`
    Board,
}

impl Command {
    /// `get <key>`; the key must be a single token.
    pub fn get(key: &str) -> ProtocolResult<Command> {
        check_key(key)?;
        Ok(Command::Get(key.to_string()))
    }

    /// `set <key> <value>`; the value may contain spaces but not line breaks.
    pub fn set(key: &str, value: &str) -> ProtocolResult<Command> {
        check_key(key)?;
        if value.trim().is_empty() || value.contains(['\r', '\n']) {
            return Err(ProtocolError::InvalidCommand(format!(
                "bad value for {}: {:?}",
                key, value
            )));
        }
        let command = Command::Set(key.to_string(), value.to_string());
        let len = command.to_string().len();
        if len > MAX_LINE_LENGTH {
            return Err(ProtocolError::LineTooLong {
                max: MAX_LINE_LENGTH,
                actual: len,
            });
        }
        Ok(command)
    }

    /// Key addressed by a `get` or `set`.
    pub fn key(&self) -> Option<&str> {
        match self {
            Command::Get(key) | Command::Set(key, _) => Some(key),
            Command::Version | Command::Board => None,
        }
    }

    /// Wire bytes, terminator included.
    pub fn encode(&self) -> Vec<u8> {
        frame_line(&self.to_string())
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Get(key) => write!(f, "get {}", key),
            Command::Set(key, value) => write!(f, "set {} {}", key, value),
            Command::Version => f.write_str("ver"),
            Command::Board => f.write_str("board"),
        }
    }
}

fn check_key(key: &str) -> ProtocolResult<()> {
    if key.is_empty()
        || key.len() > MAX_LINE_LENGTH / 2
        || key.chars().any(|c| c.is_whitespace() || c.is_control())
    {
        return Err(ProtocolError::InvalidCommand(format!("bad key: {:?}", key)));
    }
    Ok(())
}
