//! Declared value domains for configuration keys.
//!
//! A [`ValueDomain`] decides three things for a key:
//! - how a raw console string is interpreted ([`ValueDomain::parse`])
//! - whether a value may be written ([`ValueDomain::validate`])
//! - whether two values are the same setting ([`ValueDomain::same_value`])

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::value::ConfigValue;

/// Slack added to float comparisons on top of the declared tolerance.
const FLOAT_EPSILON: f64 = 1e-9;

// ============================================================================
// Domain Errors
// ============================================================================

/// Why a value does not belong to a domain.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DomainError {
    /// Value has the wrong kind for the domain.
    #[error("expected {expected}, got {found} '{value}'")]
    WrongKind {
        /// Kind the domain accepts.
        expected: &'static str,
        /// Kind that was supplied.
        found: &'static str,
        /// The offending value.
        value: String,
    },

    /// Numeric value outside the declared range.
    #[error("{value} is outside {min}..={max}")]
    OutOfRange {
        /// The offending value.
        value: String,
        /// Lower bound.
        min: String,
        /// Upper bound.
        max: String,
    },

    /// Value is not one of the enumerated variants.
    #[error("'{value}' is not one of [{}]", .variants.join(", "))]
    NotInEnum {
        /// The offending value.
        value: String,
        /// Accepted variants.
        variants: Vec<String>,
    },

    /// Bitmask sets bits outside the declared mask.
    #[error("{value:#x} sets bits outside mask {mask:#x}")]
    BitsOutsideMask {
        /// The offending value.
        value: i64,
        /// Allowed bits.
        mask: u64,
    },

    /// Text value is empty or too long.
    #[error("text length {len} is outside 1..={max}")]
    BadLength {
        /// Length of the offending value.
        len: usize,
        /// Maximum accepted length.
        max: usize,
    },
}

// ============================================================================
// Value Domain
// ============================================================================

/// The set of values a configuration key accepts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ValueDomain {
    /// Inclusive integer range.
    IntRange {
        /// Lower bound.
        min: i64,
        /// Upper bound.
        max: i64,
    },
    /// Inclusive float range. Reads within `tolerance` of a request confirm it.
    FloatRange {
        /// Lower bound.
        min: f64,
        /// Upper bound.
        max: f64,
        /// Accepted difference between requested and observed values.
        #[serde(default)]
        tolerance: f64,
    },
    /// One of a fixed list of textual variants.
    Enum {
        /// Accepted variants.
        variants: Vec<String>,
    },
    /// Boolean flag.
    Bool,
    /// Non-negative integer whose set bits lie within `mask`.
    Bitmask {
        /// Allowed bits.
        mask: u64,
    },
    /// Free text.
    Text {
        /// Maximum length in bytes.
        #[serde(default = "default_text_len")]
        max_len: usize,
    },
}

fn default_text_len() -> usize {
    64
}

impl ValueDomain {
    /// Interpret a raw console string according to this domain.
    ///
    /// Returns `None` when the text cannot be read as the domain's kind. The
    /// result is not range checked; use [`ValueDomain::validate`] for that.
    pub fn parse(&self, raw: &str) -> Option<ConfigValue> {
        let raw = raw.trim();
        match self {
            ValueDomain::IntRange { .. } => parse_int(raw).map(ConfigValue::Integer),
            ValueDomain::Bitmask { .. } => parse_int(raw).map(ConfigValue::Integer),
            ValueDomain::FloatRange { .. } => raw
                .parse::<f64>()
                .ok()
                .filter(|v| v.is_finite())
                .map(ConfigValue::Float),
            ValueDomain::Bool => parse_bool(raw).map(ConfigValue::Bool),
            ValueDomain::Enum { .. } | ValueDomain::Text { .. } => {
                let unquoted = raw.trim_matches(|c| c == '\'' || c == '"');
                Some(ConfigValue::Text(unquoted.to_string()))
            }
        }
    }

    /// Check a value against the domain, returning it in canonical form.
    ///
    /// Whole floats are accepted by integer domains and integers by float
    /// domains; the returned value has the domain's own kind.
    pub fn validate(&self, value: &ConfigValue) -> Result<ConfigValue, DomainError> {
        match self {
            ValueDomain::IntRange { min, max } => {
                let v = value.as_i64().ok_or_else(|| wrong_kind("integer", value))?;
                if v < *min || v > *max {
                    return Err(DomainError::OutOfRange {
                        value: v.to_string(),
                        min: min.to_string(),
                        max: max.to_string(),
                    });
                }
                Ok(ConfigValue::Integer(v))
            }
            ValueDomain::FloatRange { min, max, .. } => {
                let v = value.as_f64().ok_or_else(|| wrong_kind("float", value))?;
                if !v.is_finite() || v < *min || v > *max {
                    return Err(DomainError::OutOfRange {
                        value: v.to_string(),
                        min: min.to_string(),
                        max: max.to_string(),
                    });
                }
                Ok(ConfigValue::Float(v))
            }
            ValueDomain::Enum { variants } => {
                let text = match value {
                    ConfigValue::Bool(_) | ConfigValue::Float(_) => {
                        return Err(wrong_kind("text", value))
                    }
                    other => other.to_string(),
                };
                if !variants.iter().any(|v| *v == text) {
                    return Err(DomainError::NotInEnum {
                        value: text,
                        variants: variants.clone(),
                    });
                }
                Ok(ConfigValue::Text(text))
            }
            ValueDomain::Bool => value
                .as_bool()
                .map(ConfigValue::Bool)
                .ok_or_else(|| wrong_kind("bool", value)),
            ValueDomain::Bitmask { mask } => {
                let v = value.as_i64().ok_or_else(|| wrong_kind("integer", value))?;
                if v < 0 || (v as u64) & !*mask != 0 {
                    return Err(DomainError::BitsOutsideMask { value: v, mask: *mask });
                }
                Ok(ConfigValue::Integer(v))
            }
            ValueDomain::Text { max_len } => {
                let text = match value {
                    ConfigValue::Text(t) => t.clone(),
                    ConfigValue::Integer(i) => i.to_string(),
                    other => return Err(wrong_kind("text", other)),
                };
                if text.is_empty() || text.len() > *max_len {
                    return Err(DomainError::BadLength {
                        len: text.len(),
                        max: *max_len,
                    });
                }
                Ok(ConfigValue::Text(text))
            }
        }
    }

    /// Whether two values denote the same setting in this domain.
    pub fn same_value(&self, a: &ConfigValue, b: &ConfigValue) -> bool {
        match self {
            ValueDomain::FloatRange { tolerance, .. } => match (a.as_f64(), b.as_f64()) {
                (Some(x), Some(y)) => (x - y).abs() <= tolerance + FLOAT_EPSILON,
                _ => false,
            },
            ValueDomain::IntRange { .. } | ValueDomain::Bitmask { .. } => {
                matches!((a.as_i64(), b.as_i64()), (Some(x), Some(y)) if x == y)
            }
            ValueDomain::Bool => matches!((a.as_bool(), b.as_bool()), (Some(x), Some(y)) if x == y),
            ValueDomain::Enum { .. } | ValueDomain::Text { .. } => a.to_string() == b.to_string(),
        }
    }

    /// Tolerance used when comparing values, zero for exact domains.
    pub fn tolerance(&self) -> f64 {
        match self {
            ValueDomain::FloatRange { tolerance, .. } => *tolerance,
            _ => 0.0,
        }
    }
}

impl std::fmt::Display for ValueDomain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValueDomain::IntRange { min, max } => write!(f, "int {}..={}", min, max),
            ValueDomain::FloatRange { min, max, tolerance } if *tolerance > 0.0 => {
                write!(f, "float {}..={} (±{})", min, max, tolerance)
            }
            ValueDomain::FloatRange { min, max, .. } => write!(f, "float {}..={}", min, max),
            ValueDomain::Enum { variants } => write!(f, "one of [{}]", variants.join(", ")),
            ValueDomain::Bool => write!(f, "bool"),
            ValueDomain::Bitmask { mask } => write!(f, "bitmask {:#x}", mask),
            ValueDomain::Text { max_len } => write!(f, "text (max {})", max_len),
        }
    }
}

fn wrong_kind(expected: &'static str, value: &ConfigValue) -> DomainError {
    DomainError::WrongKind {
        expected,
        found: value.kind(),
        value: value.to_string(),
    }
}

fn parse_int(raw: &str) -> Option<i64> {
    if let Some(hex) = raw.strip_prefix("0x").or_else(|| raw.strip_prefix("0X")) {
        return i64::from_str_radix(hex, 16).ok();
    }
    if let Ok(v) = raw.parse::<i64>() {
        return Some(v);
    }
    // Some firmwares print integers as "3.0"
    raw.parse::<f64>()
        .ok()
        .filter(|v| v.fract() == 0.0 && v.is_finite())
        .map(|v| v as i64)
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw {
        "1" | "true" | "True" | "on" | "ON" => Some(true),
        "0" | "false" | "False" | "off" | "OFF" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn txpower() -> ValueDomain {
        ValueDomain::FloatRange {
            min: 2.0,
            max: 21.0,
            tolerance: 0.25,
        }
    }

    #[test]
    fn test_int_range() {
        let domain = ValueDomain::IntRange { min: 1, max: 13 };
        assert_eq!(domain.validate(&ConfigValue::Integer(6)), Ok(ConfigValue::Integer(6)));
        assert_eq!(domain.validate(&ConfigValue::Float(6.0)), Ok(ConfigValue::Integer(6)));
        assert!(matches!(
            domain.validate(&ConfigValue::Integer(14)),
            Err(DomainError::OutOfRange { .. })
        ));
        assert!(matches!(
            domain.validate(&ConfigValue::Float(6.5)),
            Err(DomainError::WrongKind { .. })
        ));
    }

    #[test]
    fn test_float_range_accepts_integers() {
        assert_eq!(txpower().validate(&ConfigValue::Integer(15)), Ok(ConfigValue::Float(15.0)));
        assert!(txpower().validate(&ConfigValue::Float(21.5)).is_err());
    }

    #[test]
    fn test_float_tolerance() {
        let domain = txpower();
        assert!(domain.same_value(&ConfigValue::Float(15.0), &ConfigValue::Float(15.25)));
        assert!(!domain.same_value(&ConfigValue::Float(15.0), &ConfigValue::Float(15.5)));
        assert!(domain.same_value(&ConfigValue::Integer(15), &ConfigValue::Float(15.0)));
    }

    #[test]
    fn test_bitmask() {
        let domain = ValueDomain::Bitmask { mask: 0x1f };
        assert!(domain.validate(&ConfigValue::Integer(0b10111)).is_ok());
        assert!(matches!(
            domain.validate(&ConfigValue::Integer(0x20)),
            Err(DomainError::BitsOutsideMask { .. })
        ));
        assert!(domain.validate(&ConfigValue::Integer(-1)).is_err());
        assert_eq!(domain.parse("0x17"), Some(ConfigValue::Integer(0x17)));
    }

    #[test]
    fn test_enum() {
        let domain = ValueDomain::Enum {
            variants: vec!["public".to_string(), "random".to_string()],
        };
        assert!(domain.validate(&ConfigValue::from("random")).is_ok());
        let err = domain.validate(&ConfigValue::from("static")).unwrap_err();
        assert_eq!(err.to_string(), "'static' is not one of [public, random]");
    }

    #[test]
    fn test_bool_parse() {
        assert_eq!(ValueDomain::Bool.parse("1"), Some(ConfigValue::Bool(true)));
        assert_eq!(ValueDomain::Bool.parse("False"), Some(ConfigValue::Bool(false)));
        assert_eq!(ValueDomain::Bool.parse("maybe"), None);
    }

    #[test]
    fn test_int_parse_accepts_whole_float_text() {
        let domain = ValueDomain::IntRange { min: 0, max: 3 };
        assert_eq!(domain.parse("1.0"), Some(ConfigValue::Integer(1)));
        assert_eq!(domain.parse("1.5"), None);
    }

    #[test]
    fn test_text_length() {
        let domain = ValueDomain::Text { max_len: 4 };
        assert!(domain.validate(&ConfigValue::from("c6")).is_ok());
        assert!(domain.validate(&ConfigValue::from("toolong")).is_err());
        assert!(domain.validate(&ConfigValue::from("")).is_err());
    }

    #[test]
    fn test_domain_yaml() {
        let domain: ValueDomain =
            serde_yaml::from_str("type: float_range\nmin: 2.0\nmax: 21.0\ntolerance: 0.25\n")
                .unwrap();
        assert_eq!(domain, txpower());
        let domain: ValueDomain = serde_yaml::from_str("type: text\n").unwrap();
        assert_eq!(domain, ValueDomain::Text { max_len: 64 });
    }
}
