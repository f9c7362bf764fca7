//! Configuration value type.
//!
//! This module provides:
//! - [`ConfigValue`] - The dynamic value type read from or written to a board
//! - [`ConfigValue::to_wire`] - Rendering a value in the form the console accepts

use serde::{Deserialize, Serialize};

// ============================================================================
// Config Value Enum
// ============================================================================

/// A configuration value as held by the board.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConfigValue {
    /// Boolean value.
    Bool(bool),
    /// Integer value (i64).
    Integer(i64),
    /// Floating point value (f64).
    Float(f64),
    /// Text value.
    Text(String),
}

impl ConfigValue {
    /// Convert to i64 if possible. Floats convert only when whole.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            ConfigValue::Integer(v) => Some(*v),
            ConfigValue::Float(v) if v.fract() == 0.0 => Some(*v as i64),
            _ => None,
        }
    }

    /// Convert to f64 if possible.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ConfigValue::Float(v) => Some(*v),
            ConfigValue::Integer(v) => Some(*v as f64),
            _ => None,
        }
    }

    /// Convert to string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            ConfigValue::Text(v) => Some(v),
            _ => None,
        }
    }

    /// Convert to bool if possible.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ConfigValue::Bool(v) => Some(*v),
            _ => None,
        }
    }

    /// Short name of the value's kind, for error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            ConfigValue::Bool(_) => "bool",
            ConfigValue::Integer(_) => "integer",
            ConfigValue::Float(_) => "float",
            ConfigValue::Text(_) => "text",
        }
    }

    /// Render the value the way the console expects it in a `set` command.
    ///
    /// Booleans are sent as `1`/`0`.
    pub fn to_wire(&self) -> String {
        match self {
            ConfigValue::Bool(true) => "1".to_string(),
            ConfigValue::Bool(false) => "0".to_string(),
            other => other.to_string(),
        }
    }

    /// Parse a loosely typed literal as typed by a user (`6`, `15.5`, `true`, `esp-c6`).
    ///
    /// Domain-aware parsing lives in [`crate::ValueDomain::parse`]; this is the
    /// fallback used when no domain is known.
    pub fn infer(text: &str) -> ConfigValue {
        let text = text.trim();
        if let Ok(v) = text.parse::<i64>() {
            return ConfigValue::Integer(v);
        }
        if let Ok(v) = text.parse::<f64>() {
            return ConfigValue::Float(v);
        }
        match text {
            "true" | "True" => ConfigValue::Bool(true),
            "false" | "False" => ConfigValue::Bool(false),
            _ => ConfigValue::Text(text.to_string()),
        }
    }
}

impl std::fmt::Display for ConfigValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigValue::Bool(v) => write!(f, "{}", v),
            ConfigValue::Integer(v) => write!(f, "{}", v),
            ConfigValue::Float(v) => write!(f, "{}", v),
            ConfigValue::Text(v) => write!(f, "{}", v),
        }
    }
}

// ============================================================================
// From implementations for ConfigValue
// ============================================================================

impl From<i64> for ConfigValue {
    fn from(v: i64) -> Self {
        ConfigValue::Integer(v)
    }
}

impl From<i32> for ConfigValue {
    fn from(v: i32) -> Self {
        ConfigValue::Integer(v as i64)
    }
}

impl From<u32> for ConfigValue {
    fn from(v: u32) -> Self {
        ConfigValue::Integer(v as i64)
    }
}

impl From<f64> for ConfigValue {
    fn from(v: f64) -> Self {
        ConfigValue::Float(v)
    }
}

impl From<bool> for ConfigValue {
    fn from(v: bool) -> Self {
        ConfigValue::Bool(v)
    }
}

impl From<String> for ConfigValue {
    fn from(v: String) -> Self {
        ConfigValue::Text(v)
    }
}

impl From<&str> for ConfigValue {
    fn from(v: &str) -> Self {
        ConfigValue::Text(v.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_form() {
        assert_eq!(ConfigValue::Bool(true).to_wire(), "1");
        assert_eq!(ConfigValue::Bool(false).to_wire(), "0");
        assert_eq!(ConfigValue::Float(15.5).to_wire(), "15.5");
        assert_eq!(ConfigValue::Float(20.0).to_wire(), "20");
        assert_eq!(ConfigValue::Integer(6).to_wire(), "6");
        assert_eq!(ConfigValue::from("esp-c6").to_wire(), "esp-c6");
    }

    #[test]
    fn test_infer() {
        assert_eq!(ConfigValue::infer("6"), ConfigValue::Integer(6));
        assert_eq!(ConfigValue::infer("15.5"), ConfigValue::Float(15.5));
        assert_eq!(ConfigValue::infer("true"), ConfigValue::Bool(true));
        assert_eq!(ConfigValue::infer(" node-1 "), ConfigValue::from("node-1"));
    }

    #[test]
    fn test_whole_float_as_integer() {
        assert_eq!(ConfigValue::Float(3.0).as_i64(), Some(3));
        assert_eq!(ConfigValue::Float(3.5).as_i64(), None);
        assert_eq!(ConfigValue::Integer(3).as_f64(), Some(3.0));
    }

    #[test]
    fn test_untagged_serde() {
        let json = serde_yaml::to_string(&vec![
            ConfigValue::Integer(3),
            ConfigValue::Bool(true),
            ConfigValue::from("x"),
        ])
        .unwrap();
        let back: Vec<ConfigValue> = serde_yaml::from_str(&json).unwrap();
        assert_eq!(back[0], ConfigValue::Integer(3));
        assert_eq!(back[1], ConfigValue::Bool(true));
        assert_eq!(back[2], ConfigValue::from("x"));
    }
}
