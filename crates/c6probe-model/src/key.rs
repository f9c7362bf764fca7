//! Configuration key definitions.

use serde::{Deserialize, Serialize};

use crate::domain::ValueDomain;

/// Whether a key may be written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Access {
    /// The key can only be read.
    ReadOnly,
    /// The key can be read and written.
    #[default]
    ReadWrite,
}

impl std::fmt::Display for Access {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Access::ReadOnly => write!(f, "ro"),
            Access::ReadWrite => write!(f, "rw"),
        }
    }
}

/// A named configuration parameter the board may expose.
///
/// Keys are immutable once built; the catalog hands out shared references.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigKey {
    name: String,
    domain: ValueDomain,
    #[serde(default)]
    access: Access,
    /// Keys that must be applied before this one.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    requires: Vec<String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    description: String,
}

impl ConfigKey {
    /// Create a read-write key.
    pub fn new(name: impl Into<String>, domain: ValueDomain) -> Self {
        ConfigKey {
            name: name.into(),
            domain,
            access: Access::ReadWrite,
            requires: Vec::new(),
            description: String::new(),
        }
    }

    /// Mark the key read-only.
    pub fn read_only(mut self) -> Self {
        self.access = Access::ReadOnly;
        self
    }

    /// Declare a prerequisite key.
    pub fn requires(mut self, prerequisite: impl Into<String>) -> Self {
        self.requires.push(prerequisite.into());
        self
    }

    /// Attach a human readable description.
    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// The key name used on the wire.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The declared value domain.
    pub fn domain(&self) -> &ValueDomain {
        &self.domain
    }

    /// The key's access mode.
    pub fn access(&self) -> Access {
        self.access
    }

    /// Whether the key can be written.
    pub fn is_writable(&self) -> bool {
        self.access == Access::ReadWrite
    }

    /// Prerequisite key names.
    pub fn prerequisites(&self) -> &[String] {
        &self.requires
    }

    /// Human readable description.
    pub fn description(&self) -> &str {
        &self.description
    }
}
