//! Point-in-time views of a board's configuration.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{ModelError, Result};
use crate::key::ConfigKey;
use crate::value::ConfigValue;

/// A single key/value pair in a snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotEntry {
    /// Key name.
    pub key: String,
    /// Value read from the board.
    pub value: ConfigValue,
}

/// The configuration values read from a board at one moment.
///
/// Snapshots are immutable. Each read produces a new one. A snapshot only ever
/// holds keys from the candidate set it was captured against, in candidate order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigSnapshot {
    captured_at: DateTime<Utc>,
    entries: Vec<SnapshotEntry>,
}

/// Difference for one key between two snapshots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotChange {
    /// Key name.
    pub key: String,
    /// Value in the earlier snapshot, if present.
    pub before: Option<ConfigValue>,
    /// Value in the later snapshot, if present.
    pub after: Option<ConfigValue>,
}

impl ConfigSnapshot {
    /// Capture a snapshot stamped with the current time.
    pub fn capture<I>(candidates: &[ConfigKey], values: I) -> Result<Self>
    where
        I: IntoIterator<Item = (String, ConfigValue)>,
    {
        Self::capture_at(Utc::now(), candidates, values)
    }

    /// Capture a snapshot with an explicit timestamp.
    ///
    /// Values for keys outside `candidates`, or repeated keys, are errors.
    pub fn capture_at<I>(
        captured_at: DateTime<Utc>,
        candidates: &[ConfigKey],
        values: I,
    ) -> Result<Self>
    where
        I: IntoIterator<Item = (String, ConfigValue)>,
    {
        let mut seen = HashSet::new();
        let mut found: Vec<(String, ConfigValue)> = Vec::new();
        for (key, value) in values {
            if !candidates.iter().any(|k| k.name() == key) {
                return Err(ModelError::UnknownKey(key));
            }
            if !seen.insert(key.clone()) {
                return Err(ModelError::DuplicateKey(key));
            }
            found.push((key, value));
        }

        // Keep candidate order regardless of the order values arrived in
        let entries = candidates
            .iter()
            .filter_map(|k| {
                found
                    .iter()
                    .position(|(name, _)| name == k.name())
                    .map(|i| SnapshotEntry {
                        key: k.name().to_string(),
                        value: found[i].1.clone(),
                    })
            })
            .collect();

        Ok(ConfigSnapshot { captured_at, entries })
    }

    /// When the snapshot was taken.
    pub fn captured_at(&self) -> DateTime<Utc> {
        self.captured_at
    }

    /// Value of a key, if the board reported one.
    pub fn get(&self, key: &str) -> Option<&ConfigValue> {
        self.entries.iter().find(|e| e.key == key).map(|e| &e.value)
    }

    /// Entries in candidate order.
    pub fn entries(&self) -> &[SnapshotEntry] {
        &self.entries
    }

    /// Number of keys with values.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no key had a value.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Keys whose value differs between `self` and a `later` snapshot.
    ///
    /// Keys present in only one of the snapshots are reported with `None` on
    /// the missing side.
    pub fn diff(&self, later: &ConfigSnapshot) -> Vec<SnapshotChange> {
        let mut changes = Vec::new();
        for entry in &self.entries {
            let after = later.get(&entry.key);
            if after != Some(&entry.value) {
                changes.push(SnapshotChange {
                    key: entry.key.clone(),
                    before: Some(entry.value.clone()),
                    after: after.cloned(),
                });
            }
        }
        for entry in &later.entries {
            if self.get(&entry.key).is_none() {
                changes.push(SnapshotChange {
                    key: entry.key.clone(),
                    before: None,
                    after: Some(entry.value.clone()),
                });
            }
        }
        changes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::KeyCatalog;

    fn candidates() -> Vec<ConfigKey> {
        KeyCatalog::esp32c6().subset(&["channel", "txpower", "pm"]).unwrap()
    }

    #[test]
    fn test_capture_orders_by_candidates() {
        let snapshot = ConfigSnapshot::capture(
            &candidates(),
            vec![
                ("pm".to_string(), ConfigValue::Integer(1)),
                ("channel".to_string(), ConfigValue::Integer(3)),
            ],
        )
        .unwrap();

        let keys: Vec<&str> = snapshot.entries().iter().map(|e| e.key.as_str()).collect();
        assert_eq!(keys, ["channel", "pm"]);
        assert_eq!(snapshot.get("channel"), Some(&ConfigValue::Integer(3)));
        assert_eq!(snapshot.get("txpower"), None);
    }

    #[test]
    fn test_capture_rejects_foreign_key() {
        let result = ConfigSnapshot::capture(
            &candidates(),
            vec![("hostname".to_string(), ConfigValue::from("c6"))],
        );
        assert!(matches!(result, Err(ModelError::UnknownKey(k)) if k == "hostname"));
    }

    #[test]
    fn test_diff() {
        let before = ConfigSnapshot::capture(
            &candidates(),
            vec![
                ("channel".to_string(), ConfigValue::Integer(3)),
                ("pm".to_string(), ConfigValue::Integer(1)),
            ],
        )
        .unwrap();
        let after = ConfigSnapshot::capture(
            &candidates(),
            vec![
                ("channel".to_string(), ConfigValue::Integer(6)),
                ("txpower".to_string(), ConfigValue::Float(15.0)),
                ("pm".to_string(), ConfigValue::Integer(1)),
            ],
        )
        .unwrap();

        let changes = before.diff(&after);
        assert_eq!(changes.len(), 2);
        assert_eq!(changes[0].key, "channel");
        assert_eq!(changes[0].after, Some(ConfigValue::Integer(6)));
        assert_eq!(changes[1].key, "txpower");
        assert_eq!(changes[1].before, None);
        assert!(before.diff(&before).is_empty());
    }
}
