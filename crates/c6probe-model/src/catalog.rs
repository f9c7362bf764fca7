//! The candidate key catalog.
//!
//! The board offers no enumeration command, so the tool ships a static,
//! versioned list of the keys it knows how to ask for. A catalog can also be
//! loaded from YAML to track newer firmware without rebuilding:
//!
//! ```yaml
//! version: 2
//! keys:
//!   - name: channel
//!     domain: { type: int_range, min: 1, max: 13 }
//!     requires: [protocol]
//!   - name: mac
//!     domain: { type: text, max_len: 17 }
//!     access: read_only
//! ```

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::domain::ValueDomain;
use crate::error::{ModelError, Result};
use crate::key::ConfigKey;

/// Version of the built-in catalog.
pub const CATALOG_VERSION: u32 = 1;

/// An ordered, versioned set of candidate configuration keys.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyCatalog {
    version: u32,
    keys: Vec<ConfigKey>,
}

impl Default for KeyCatalog {
    fn default() -> Self {
        KeyCatalog::esp32c6()
    }
}

impl KeyCatalog {
    /// Build a catalog, checking names are unique and prerequisites exist.
    pub fn new(version: u32, keys: Vec<ConfigKey>) -> Result<Self> {
        let mut seen = HashSet::new();
        for key in &keys {
            if !seen.insert(key.name()) {
                return Err(ModelError::DuplicateKey(key.name().to_string()));
            }
        }
        for key in &keys {
            for prerequisite in key.prerequisites() {
                if !seen.contains(prerequisite.as_str()) {
                    return Err(ModelError::Catalog(format!(
                        "{} requires unknown key {}",
                        key.name(),
                        prerequisite
                    )));
                }
            }
        }
        Ok(KeyCatalog { version, keys })
    }

    /// The built-in catalog for ESP32-C6 boards running the scripting runtime.
    pub fn esp32c6() -> Self {
        let keys = vec![
            // WiFi station
            ConfigKey::new("mac", ValueDomain::Text { max_len: 17 })
                .read_only()
                .describe("Station MAC address"),
            ConfigKey::new("hostname", ValueDomain::Text { max_len: 32 })
                .describe("DHCP hostname"),
            ConfigKey::new("protocol", ValueDomain::Bitmask { mask: 0x2f })
                .describe("PHY modes: 0x1 11b, 0x2 11g, 0x4 11n, 0x8 LR, 0x20 11ax"),
            ConfigKey::new("channel", ValueDomain::IntRange { min: 1, max: 13 })
                .requires("protocol")
                .describe("Primary 2.4 GHz channel"),
            ConfigKey::new(
                "txpower",
                ValueDomain::FloatRange {
                    min: 2.0,
                    max: 21.0,
                    tolerance: 0.25,
                },
            )
            .describe("Maximum TX power in dBm (0.25 dBm steps)"),
            ConfigKey::new("pm", ValueDomain::IntRange { min: 0, max: 2 })
                .describe("Power management: 0 none, 1 performance, 2 power save"),
            ConfigKey::new("reconnects", ValueDomain::IntRange { min: -1, max: 100 })
                .describe("Reconnect attempts, -1 for unlimited"),
            // Bluetooth LE
            ConfigKey::new("ble.active", ValueDomain::Bool).describe("BLE controller enabled"),
            ConfigKey::new("gap_name", ValueDomain::Text { max_len: 32 })
                .requires("ble.active")
                .describe("Advertised GAP device name"),
            ConfigKey::new("mtu", ValueDomain::IntRange { min: 23, max: 517 })
                .requires("ble.active")
                .describe("Preferred ATT MTU"),
            ConfigKey::new("addr_mode", ValueDomain::IntRange { min: 0, max: 3 })
                .requires("ble.active")
                .describe("BLE address mode"),
            // System
            ConfigKey::new(
                "cpu_freq",
                ValueDomain::Enum {
                    variants: vec!["80".to_string(), "160".to_string()],
                },
            )
            .describe("CPU frequency in MHz"),
        ];

        KeyCatalog {
            version: CATALOG_VERSION,
            keys,
        }
    }

    /// Parse a catalog from YAML text.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let raw: KeyCatalog = serde_yaml::from_str(yaml)?;
        KeyCatalog::new(raw.version, raw.keys)
    }

    /// Load a catalog from a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        KeyCatalog::from_yaml_str(&text)
    }

    /// Catalog version.
    pub fn version(&self) -> u32 {
        self.version
    }

    /// Look up a key by name.
    pub fn get(&self, name: &str) -> Option<&ConfigKey> {
        self.keys.iter().find(|k| k.name() == name)
    }

    /// Whether the catalog declares a key.
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// All keys in declaration order.
    pub fn keys(&self) -> &[ConfigKey] {
        &self.keys
    }

    /// All key names in declaration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.keys.iter().map(|k| k.name())
    }

    /// Number of keys.
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Whether the catalog is empty.
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Select keys by name, in the caller's order.
    ///
    /// Unknown or repeated names are errors, so the result can be probed
    /// without producing duplicate or foreign entries.
    pub fn subset<S: AsRef<str>>(&self, names: &[S]) -> Result<Vec<ConfigKey>> {
        let mut seen = HashSet::new();
        let mut selected = Vec::with_capacity(names.len());
        for name in names {
            let name = name.as_ref();
            let key = self
                .get(name)
                .ok_or_else(|| ModelError::UnknownKey(name.to_string()))?;
            if !seen.insert(name) {
                return Err(ModelError::DuplicateKey(name.to_string()));
            }
            selected.push(key.clone());
        }
        Ok(selected)
    }
}
