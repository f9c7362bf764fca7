//! Capability probing.
//!
//! Each candidate key is read once and classified. A failure on one key is
//! recorded against that key and probing moves on; a firmware that lacks a
//! parameter is an ordinary outcome, not an error.

use c6probe_model::{ConfigKey, ConfigSnapshot, ConfigValue};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{DeviceError, DeviceResult};
use crate::session::{Session, SessionState};

/// Outcome of reading one candidate key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", content = "detail", rename_all = "snake_case")]
pub enum ProbeOutcome {
    /// The firmware reported a value inside the declared domain.
    Supported(ConfigValue),
    /// The firmware does not know the key.
    Unsupported,
    /// Anything else: timeout, firmware error, unreadable or out-of-domain value.
    Errored(String),
}

impl ProbeOutcome {
    /// The value, when supported.
    pub fn value(&self) -> Option<&ConfigValue> {
        match self {
            ProbeOutcome::Supported(v) => Some(v),
            _ => None,
        }
    }

    /// Whether the key is supported.
    pub fn is_supported(&self) -> bool {
        matches!(self, ProbeOutcome::Supported(_))
    }
}

/// Probe outcome for one key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbeResult {
    /// Key name.
    pub key: String,
    /// Classification.
    pub outcome: ProbeOutcome,
}

/// Read every candidate key, returning one result per key in input order.
///
/// The only error is a session that is not `Ready`; per-key failures are
/// captured in the results.
pub fn probe(session: &mut Session, candidates: &[ConfigKey]) -> DeviceResult<Vec<ProbeResult>> {
    session.begin(SessionState::Probing)?;

    let results: Vec<ProbeResult> = candidates
        .iter()
        .map(|key| {
            let outcome = classify(session.read_value(key));
            debug!("Probe[{}]: {} -> {:?}", session.label(), key.name(), outcome);
            ProbeResult {
                key: key.name().to_string(),
                outcome,
            }
        })
        .collect();

    session.end();

    let supported = results.iter().filter(|r| r.outcome.is_supported()).count();
    info!(
        "Probe[{}]: {}/{} keys supported",
        session.label(),
        supported,
        results.len()
    );
    Ok(results)
}

fn classify(read: DeviceResult<ConfigValue>) -> ProbeOutcome {
    match read {
        Ok(value) => ProbeOutcome::Supported(value),
        Err(DeviceError::UnsupportedParameter(_)) => ProbeOutcome::Unsupported,
        Err(e) => ProbeOutcome::Errored(e.to_string()),
    }
}

/// Build a snapshot from the supported keys of a probe.
pub fn snapshot(
    candidates: &[ConfigKey],
    results: &[ProbeResult],
) -> c6probe_model::Result<ConfigSnapshot> {
    ConfigSnapshot::capture(
        candidates,
        results
            .iter()
            .filter_map(|r| r.outcome.value().map(|v| (r.key.clone(), v.clone()))),
    )
}
