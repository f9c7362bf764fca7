//! Response classification for the configuration console.
//!
//! Every response is one line:
//!
//! | Line | Meaning |
//! |------|---------|
//! | `OK`, `OK - <message>` | `set` accepted |
//! | `> <value>` | value of a `get` |
//! | `ERR: unknown parameter <key>` | the firmware does not know the key |
//! | `ERR: ...`, `Error ...` | any other failure |
//! | `vX.Y.Z (Build: <date>)` | reply to `ver` |
//!
//! Anything else (the `board` reply, for instance) is kept as free text.

use std::str::FromStr;

use crate::error::{ProtocolError, ProtocolResult};

/// One classified response line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    /// `OK`, with the message after `OK - ` if there was one.
    Ack(Option<String>),

    /// Value returned by `get`, without the `> ` prefix.
    Value(String),

    /// The firmware does not know the named parameter.
    UnknownParameter(String),

    /// Failure reported by the firmware, without the `ERR:` prefix.
    Error(String),

    /// Reply to `ver`.
    Version {
        /// Version, e.g. `v1.24.1`.
        version: String,
        /// Build date as printed by the firmware.
        build_date: String,
    },

    /// Any other line.
    Text(String),
}

const ERROR_PREFIXES: [&str; 4] = ["ERROR", "ERR", "Error", "error"];

/// Error details that mean "no such parameter", compared case-insensitively.
const UNKNOWN_PARAMETER_MARKERS: [&str; 3] =
    ["unknown parameter", "unknown config", "unsupported parameter"];

impl Response {
    /// Classify a response line.
    pub fn parse(line: &str) -> ProtocolResult<Response> {
        line.parse()
    }

    /// Whether this is an acknowledgement.
    pub fn is_ack(&self) -> bool {
        matches!(self, Response::Ack(_))
    }

    /// Whether the firmware reported a failure of any kind.
    pub fn is_failure(&self) -> bool {
        matches!(self, Response::Error(_) | Response::UnknownParameter(_))
    }

    /// The value of a `get` reply.
    pub fn value(&self) -> Option<&str> {
        match self {
            Response::Value(v) => Some(v),
            _ => None,
        }
    }
}

impl FromStr for Response {
    type Err = ProtocolError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let line = line.trim();
        if line.is_empty() {
            return Err(ProtocolError::ParseError("empty response".to_string()));
        }

        if line == "OK" {
            return Ok(Response::Ack(None));
        }
        if let Some(message) = line.strip_prefix("OK - ") {
            return Ok(Response::Ack(Some(message.to_string())));
        }
        if let Some(value) = line.strip_prefix("> ") {
            return Ok(Response::Value(value.to_string()));
        }
        if let Some(detail) = ERROR_PREFIXES.iter().find_map(|p| line.strip_prefix(p)) {
            return Ok(classify_error(detail.trim_start_matches(':').trim()));
        }
        if let Some(version) = parse_version(line) {
            return Ok(version);
        }
        Ok(Response::Text(line.to_string()))
    }
}

fn classify_error(detail: &str) -> Response {
    let lowered = detail.to_ascii_lowercase();
    match UNKNOWN_PARAMETER_MARKERS.iter().find(|m| lowered.starts_with(**m)) {
        Some(marker) => {
            let name = detail[marker.len()..].trim().trim_matches(|c| c == '\'' || c == '"');
            Response::UnknownParameter(name.to_string())
        }
        None => Response::Error(detail.to_string()),
    }
}

fn parse_version(line: &str) -> Option<Response> {
    if !line.starts_with('v') {
        return None;
    }
    let (version, rest) = line.split_once(" (Build: ")?;
    Some(Response::Version {
        version: version.trim().to_string(),
        build_date: rest.trim_end_matches(')').trim().to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_acknowledgements() {
        assert_eq!(Response::parse("OK").unwrap(), Response::Ack(None));
        let ack = Response::parse("OK - channel is now 6").unwrap();
        assert_eq!(ack, Response::Ack(Some("channel is now 6".to_string())));
        assert!(ack.is_ack());
    }

    #[test]
    fn test_value_keeps_inner_spaces() {
        let response = Response::parse("> MPY ESP32C6\r").unwrap();
        assert_eq!(response.value(), Some("MPY ESP32C6"));
    }

    #[test]
    fn test_unknown_parameter_variants() {
        for line in [
            "ERR: unknown parameter txpower",
            "Error: Unknown config 'txpower'",
            "error unsupported parameter txpower",
        ] {
            let response = Response::parse(line).unwrap();
            assert_eq!(response, Response::UnknownParameter("txpower".to_string()), "{}", line);
            assert!(response.is_failure());
        }
    }

    #[test]
    fn test_firmware_error_detail() {
        let response = Response::parse("ERR: value out of range").unwrap();
        assert_eq!(response, Response::Error("value out of range".to_string()));
        assert!(!response.is_ack());
    }

    #[test]
    fn test_version() {
        assert_eq!(
            Response::parse("v1.24.1 (Build: 2024-11-29)").unwrap(),
            Response::Version {
                version: "v1.24.1".to_string(),
                build_date: "2024-11-29".to_string(),
            }
        );
        // A 'v' without a build stamp is just text
        assert_eq!(
            Response::parse("valid").unwrap(),
            Response::Text("valid".to_string())
        );
    }

    #[test]
    fn test_board_line_is_text() {
        let response: Response = "ESP32C6 module with ESP32C6".parse().unwrap();
        assert_eq!(response, Response::Text("ESP32C6 module with ESP32C6".to_string()));
    }

    #[test]
    fn test_empty_line_is_error() {
        assert!(Response::parse("  \r").is_err());
    }
}
