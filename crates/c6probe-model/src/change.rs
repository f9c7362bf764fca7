//! Requested configuration changes.

use serde::{Deserialize, Serialize};

use crate::catalog::KeyCatalog;
use crate::error::{ModelError, Result};
use crate::value::ConfigValue;

/// One requested key/value pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestedChange {
    /// Key name.
    pub key: String,
    /// Desired value.
    pub value: ConfigValue,
}

/// An ordered set of desired key values.
///
/// Values are not checked here; the applier validates each one against the
/// key's domain before touching the board.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChangeRequest {
    changes: Vec<RequestedChange>,
}

impl ChangeRequest {
    /// Create an empty request.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request a value for a key.
    ///
    /// Setting a key twice keeps its original position with the newer value.
    pub fn set(mut self, key: impl Into<String>, value: impl Into<ConfigValue>) -> Self {
        self.insert(key.into(), value.into());
        self
    }

    fn insert(&mut self, key: String, value: ConfigValue) {
        match self.changes.iter_mut().find(|c| c.key == key) {
            Some(existing) => existing.value = value,
            None => self.changes.push(RequestedChange { key, value }),
        }
    }

    /// Parse `key=value` assignments.
    ///
    /// Values for catalog keys are read through the key's domain, so
    /// `ble.active=on` becomes a boolean. Values the domain cannot read, and
    /// values for keys outside the catalog, are kept as inferred literals and
    /// left for the applier to reject.
    pub fn parse_assignments<S: AsRef<str>>(
        catalog: &KeyCatalog,
        assignments: &[S],
    ) -> Result<Self> {
        let mut request = ChangeRequest::new();
        for assignment in assignments {
            let assignment = assignment.as_ref();
            let (key, raw) = assignment
                .split_once('=')
                .ok_or_else(|| ModelError::InvalidAssignment(assignment.to_string()))?;
            let key = key.trim();
            if key.is_empty() {
                return Err(ModelError::InvalidAssignment(assignment.to_string()));
            }
            let value = catalog
                .get(key)
                .and_then(|k| k.domain().parse(raw))
                .unwrap_or_else(|| ConfigValue::infer(raw));
            request.insert(key.to_string(), value);
        }
        Ok(request)
    }

    /// Build a request from already typed pairs.
    pub fn from_pairs<I, K>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, ConfigValue)>,
        K: Into<String>,
    {
        let mut request = ChangeRequest::new();
        for (key, value) in pairs {
            request.insert(key.into(), value);
        }
        request
    }

    /// Requested changes in request order.
    pub fn changes(&self) -> &[RequestedChange] {
        &self.changes
    }

    /// Requested value for a key.
    pub fn get(&self, key: &str) -> Option<&ConfigValue> {
        self.changes.iter().find(|c| c.key == key).map(|c| &c.value)
    }

    /// Number of requested keys.
    pub fn len(&self) -> usize {
        self.changes.len()
    }

    /// Whether nothing was requested.
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }
}
