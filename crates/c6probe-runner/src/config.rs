//! Run configuration.
//!
//! A run can be described in a YAML file and adjusted from the command line:
//!
//! ```yaml
//! port: /dev/ttyACM0
//! baud: 115200
//! timeout_ms: 1500
//! read_retries: 2
//! keys: [channel, txpower, pm]
//! ordering: dependencies
//! format: json
//! set:
//!   ble.active: on
//!   gap_name: sensor-7
//! ```
//!
//! Values given on the command line take precedence over the file.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use c6probe_device::{
    Endpoint, OrderingPolicy, RunPlan, SessionConfig, SimulatedDevice, DEFAULT_BAUD,
};
use c6probe_model::{ChangeRequest, ConfigValue, KeyCatalog};
use serde::Deserialize;
use serde_yaml::{Mapping, Value};
use tracing::debug;

use crate::error::{Result, RunnerError};
use crate::output::OutputFormat;

/// Run settings as read from a file or collected from flags. Every field is optional.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RunConfig {
    /// Serial port name.
    pub port: Option<String>,
    /// Baud rate.
    pub baud: Option<u32>,
    /// Per-command timeout in milliseconds.
    pub timeout_ms: Option<u64>,
    /// Overall deadline for the run in milliseconds.
    pub deadline_ms: Option<u64>,
    /// Retries for reads that time out.
    pub read_retries: Option<u32>,
    /// Keys to probe; all catalog keys when absent.
    pub keys: Option<Vec<String>>,
    /// Values to apply, in file order.
    pub set: Mapping,
    /// Write ordering.
    pub ordering: Option<OrderingPolicy>,
    /// Output format.
    pub format: Option<OutputFormat>,
    /// Catalog file replacing the built-in key set.
    pub catalog: Option<PathBuf>,
    /// Talk to a simulated board instead of a serial port.
    pub simulate: bool,
}

/// Fully resolved settings for one run.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Where to connect.
    pub endpoint: Endpoint,
    /// Timing policy.
    pub session: SessionConfig,
    /// What to do.
    pub plan: RunPlan,
    /// How to print the outcome.
    pub format: OutputFormat,
}

impl RunConfig {
    /// Parse a run configuration from YAML.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Load a run configuration file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| RunnerError::Config(format!("cannot read {}: {}", path.display(), e)))?;
        let config = Self::from_yaml_str(&text)?;
        debug!("Loaded run configuration from {}", path.display());
        Ok(config)
    }

    /// Layer `overrides` on top of `self`. Set fields in `overrides` win;
    /// `set` entries are merged key by key.
    pub fn overlay(self, overrides: RunConfig) -> RunConfig {
        let mut set = self.set;
        for (key, value) in overrides.set {
            set.insert(key, value);
        }
        RunConfig {
            port: overrides.port.or(self.port),
            baud: overrides.baud.or(self.baud),
            timeout_ms: overrides.timeout_ms.or(self.timeout_ms),
            deadline_ms: overrides.deadline_ms.or(self.deadline_ms),
            read_retries: overrides.read_retries.or(self.read_retries),
            keys: overrides.keys.or(self.keys),
            set,
            ordering: overrides.ordering.or(self.ordering),
            format: overrides.format.or(self.format),
            catalog: overrides.catalog.or(self.catalog),
            simulate: overrides.simulate || self.simulate,
        }
    }

    /// Load the catalog named by this configuration, or the built-in one.
    pub fn load_catalog(&self) -> Result<KeyCatalog> {
        load_catalog(self.catalog.as_deref())
    }

    /// Resolve into settings for a run.
    ///
    /// `assignments` are `key=value` strings from the command line; they are
    /// applied after the file's `set` entries and override them.
    pub fn resolve(&self, catalog: &KeyCatalog, assignments: &[String]) -> Result<Settings> {
        let endpoint = if self.simulate {
            Endpoint::Simulated(SimulatedDevice::esp32c6())
        } else {
            let port = self.port.clone().ok_or_else(|| {
                RunnerError::Config(
                    "no serial port given (use --port, or `port` in the run file)".to_string(),
                )
            })?;
            Endpoint::Serial {
                port,
                baud: self.baud.unwrap_or(DEFAULT_BAUD),
            }
        };

        let mut session = SessionConfig::default();
        if let Some(ms) = self.timeout_ms {
            if ms == 0 {
                return Err(RunnerError::Config("timeout_ms must be greater than zero".to_string()));
            }
            session.command_timeout = Duration::from_millis(ms);
        }
        if let Some(retries) = self.read_retries {
            session.read_retries = retries;
        }
        session.deadline = self.deadline_ms.map(|ms| Instant::now() + Duration::from_millis(ms));

        let from_file = change_pairs(catalog, &self.set)?;
        let from_flags = ChangeRequest::parse_assignments(catalog, assignments)?;
        let changes = ChangeRequest::from_pairs(
            from_file
                .into_iter()
                .chain(from_flags.changes().iter().map(|c| (c.key.clone(), c.value.clone()))),
        );

        let mut plan = RunPlan::probe_all()
            .with_changes(changes)
            .with_ordering(self.ordering.unwrap_or_default());
        plan.keys = self.keys.clone();

        Ok(Settings {
            endpoint,
            session,
            plan,
            format: self.format.unwrap_or_default(),
        })
    }
}

/// Load a catalog file, or the built-in catalog when no path is given.
pub fn load_catalog(path: Option<&Path>) -> Result<KeyCatalog> {
    match path {
        Some(path) => {
            let catalog = KeyCatalog::from_file(path)?;
            debug!(
                "Loaded catalog v{} ({} keys) from {}",
                catalog.version(),
                catalog.len(),
                path.display()
            );
            Ok(catalog)
        }
        None => Ok(KeyCatalog::esp32c6()),
    }
}

/// Turn a YAML `set` mapping into typed pairs.
///
/// Strings for catalog keys go through the key's domain, so `on` becomes a
/// boolean for a bool key and `"6"` an integer for an integer key.
fn change_pairs(catalog: &KeyCatalog, set: &Mapping) -> Result<Vec<(String, ConfigValue)>> {
    let mut pairs = Vec::with_capacity(set.len());
    for (key, value) in set {
        let key = match key {
            Value::String(s) => s.clone(),
            other => {
                return Err(RunnerError::Config(format!(
                    "`set` key must be a string, got {:?}",
                    other
                )));
            }
        };
        let value = match value {
            Value::String(s) => catalog
                .get(&key)
                .and_then(|k| k.domain().parse(s))
                .unwrap_or_else(|| ConfigValue::infer(s)),
            Value::Bool(_) | Value::Number(_) => serde_yaml::from_value(value.clone())?,
            other => {
                return Err(RunnerError::Config(format!(
                    "`set.{}` must be a scalar, got {:?}",
                    key, other
                )));
            }
        };
        pairs.push((key, value));
    }
    Ok(pairs)
}
