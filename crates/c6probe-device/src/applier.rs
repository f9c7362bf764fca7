//! Applying a change request.
//!
//! 1. Every requested value is checked against the catalog before anything is
//!    sent. Unknown keys, read-only keys and out-of-domain values are rejected
//!    locally with no device I/O.
//! 2. The remaining keys are ordered (prerequisites first, per
//!    [`OrderingPolicy`]) and each one is read, written if it differs, and read
//!    back. Only a matching read-back counts as applied.
//! 3. A write that is not confirmed is rolled back to the previous value when
//!    one is known.
//!
//! Nothing is retried; the caller decides whether to try again.

use std::collections::HashSet;

use c6probe_model::{ChangeRequest, ConfigKey, ConfigValue, KeyCatalog};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{DeviceError, DeviceResult};
use crate::session::{Session, SessionState};

// ============================================================================
// Outcome Types
// ============================================================================

/// Why a requested change was not applied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "reason", content = "detail", rename_all = "snake_case")]
pub enum RejectReason {
    /// Value outside the key's declared domain. Never sent.
    OutOfDomain(String),
    /// Key is not in the catalog. Never sent.
    UnknownKey,
    /// Key is declared read-only. Never sent.
    ReadOnly,
    /// The firmware does not know the key.
    ParameterUnsupported,
    /// The read-back did not match the request.
    NotConfirmed {
        /// Value read back, if the read succeeded.
        observed: Option<ConfigValue>,
    },
    /// The board did not answer in time.
    Timeout,
    /// The firmware reported an error, or the link failed.
    DeviceError(String),
}

impl RejectReason {
    /// Stable short code for reports.
    pub fn code(&self) -> &'static str {
        match self {
            RejectReason::OutOfDomain(_) => "out_of_domain",
            RejectReason::UnknownKey => "unknown_key",
            RejectReason::ReadOnly => "read_only",
            RejectReason::ParameterUnsupported => "parameter_unsupported",
            RejectReason::NotConfirmed { .. } => "not_confirmed",
            RejectReason::Timeout => "timeout",
            RejectReason::DeviceError(_) => "device_error",
        }
    }

    fn from_device_error(error: DeviceError) -> Self {
        match error {
            DeviceError::UnsupportedParameter(_) => RejectReason::ParameterUnsupported,
            DeviceError::Timeout { .. } => RejectReason::Timeout,
            other => RejectReason::DeviceError(other.to_string()),
        }
    }
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RejectReason::OutOfDomain(detail) | RejectReason::DeviceError(detail) => {
                write!(f, "{}: {}", self.code(), detail)
            }
            RejectReason::NotConfirmed { observed: Some(v) } => {
                write!(f, "{}: read back {}", self.code(), v)
            }
            other => write!(f, "{}", other.code()),
        }
    }
}

/// Result of applying one key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", content = "detail", rename_all = "snake_case")]
pub enum ApplyOutcome {
    /// Written and confirmed by a read-back.
    Applied,
    /// Already at the requested value; nothing written.
    Unchanged,
    /// Not applied.
    Rejected(RejectReason),
}

/// Full record of applying one key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplyResult {
    /// Key name.
    pub key: String,
    /// Requested value (canonical form when it passed validation).
    pub requested: ConfigValue,
    /// Value read before writing.
    pub previous: Option<ConfigValue>,
    /// Value read after writing.
    pub observed: Option<ConfigValue>,
    /// Outcome.
    pub outcome: ApplyOutcome,
    /// Whether an unconfirmed write was rolled back; `None` if no rollback was attempted.
    pub rolled_back: Option<bool>,
}

impl ApplyResult {
    fn local_reject(key: &str, requested: &ConfigValue, reason: RejectReason) -> Self {
        ApplyResult {
            key: key.to_string(),
            requested: requested.clone(),
            previous: None,
            observed: None,
            outcome: ApplyOutcome::Rejected(reason),
            rolled_back: None,
        }
    }
}

// ============================================================================
// Ordering
// ============================================================================

/// How to order the writes of a change request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OrderingPolicy {
    /// Apply declared prerequisites before their dependants; otherwise request order.
    #[default]
    Dependencies,
    /// Apply in request order, ignoring declared prerequisites.
    RequestOrder,
}

impl std::str::FromStr for OrderingPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "dependencies" => Ok(OrderingPolicy::Dependencies),
            "request-order" => Ok(OrderingPolicy::RequestOrder),
            other => Err(format!("unknown ordering policy: {}", other)),
        }
    }
}

/// Order keys so that each comes after any of its prerequisites that are
/// also being applied. Ties keep request order. Cycles fall back to request
/// order for the keys involved.
fn order_by_dependencies<'a>(
    keys: Vec<(&'a ConfigKey, ConfigValue)>,
) -> Vec<(&'a ConfigKey, ConfigValue)> {
    let requested: HashSet<&str> = keys.iter().map(|&(k, _)| k.name()).collect();
    let mut placed: HashSet<&str> = HashSet::new();
    let mut pending = keys;
    let mut ordered = Vec::with_capacity(pending.len());

    while !pending.is_empty() {
        let ready = pending.iter().position(|(k, _)| {
            k.prerequisites()
                .iter()
                .all(|p| !requested.contains(p.as_str()) || placed.contains(p.as_str()))
        });
        match ready {
            Some(i) => {
                let (key, value) = pending.remove(i);
                placed.insert(key.name());
                ordered.push((key, value));
            }
            None => {
                let names: Vec<&str> = pending.iter().map(|&(k, _)| k.name()).collect();
                warn!("Dependency cycle among {:?}; applying in request order", names);
                ordered.append(&mut pending);
            }
        }
    }
    ordered
}

// ============================================================================
// Apply
// ============================================================================

/// Apply a change request.
///
/// Results come back with local rejections first (in request order), then
/// the keys that reached the board in the order they were applied.
pub fn apply(
    session: &mut Session,
    catalog: &KeyCatalog,
    request: &ChangeRequest,
    policy: OrderingPolicy,
) -> DeviceResult<Vec<ApplyResult>> {
    session.begin(SessionState::Applying)?;

    let mut results = Vec::with_capacity(request.len());
    let mut accepted = Vec::new();

    for change in request.changes() {
        let Some(key) = catalog.get(&change.key) else {
            warn!("Apply[{}]: {} rejected: not in catalog", session.label(), change.key);
            results.push(ApplyResult::local_reject(
                &change.key,
                &change.value,
                RejectReason::UnknownKey,
            ));
            continue;
        };
        if !key.is_writable() {
            warn!("Apply[{}]: {} rejected: read-only", session.label(), change.key);
            results.push(ApplyResult::local_reject(
                &change.key,
                &change.value,
                RejectReason::ReadOnly,
            ));
            continue;
        }
        match key.domain().validate(&change.value) {
            Ok(value) => accepted.push((key, value)),
            Err(e) => {
                warn!("Apply[{}]: {} rejected: {}", session.label(), change.key, e);
                results.push(ApplyResult::local_reject(
                    &change.key,
                    &change.value,
                    RejectReason::OutOfDomain(e.to_string()),
                ));
            }
        }
    }

    let ordered = match policy {
        OrderingPolicy::Dependencies => order_by_dependencies(accepted),
        OrderingPolicy::RequestOrder => accepted,
    };

    for (key, value) in ordered {
        let result = apply_one(session, key, value);
        debug!("Apply[{}]: {} -> {:?}", session.label(), result.key, result.outcome);
        results.push(result);
    }

    session.end();

    let applied = results.iter().filter(|r| r.outcome == ApplyOutcome::Applied).count();
    info!("Apply[{}]: {}/{} keys applied", session.label(), applied, results.len());
    Ok(results)
}

fn apply_one(session: &mut Session, key: &ConfigKey, requested: ConfigValue) -> ApplyResult {
    let mut result = ApplyResult {
        key: key.name().to_string(),
        requested,
        previous: None,
        observed: None,
        outcome: ApplyOutcome::Unchanged,
        rolled_back: None,
    };

    match session.read_value(key) {
        Ok(current) => result.previous = Some(current),
        // The board holds something odd; overwriting it is still meaningful
        Err(DeviceError::DomainValidation { reason, .. }) => {
            debug!(
                "Apply[{}]: {} current value unreadable: {}",
                session.label(),
                key.name(),
                reason
            );
        }
        Err(e) => {
            result.outcome = ApplyOutcome::Rejected(RejectReason::from_device_error(e));
            return result;
        }
    }

    if let Some(previous) = &result.previous {
        if key.domain().same_value(previous, &result.requested) {
            result.observed = Some(previous.clone());
            return result;
        }
    }

    if let Err(e) = session.write_value(key, &result.requested) {
        warn!("Apply[{}]: write {} failed: {}", session.label(), key.name(), e);
        result.outcome = ApplyOutcome::Rejected(RejectReason::from_device_error(e));
        return result;
    }

    result.observed = session.read_value(key).ok();
    let confirmed = result
        .observed
        .as_ref()
        .is_some_and(|observed| key.domain().same_value(observed, &result.requested));

    if confirmed {
        result.outcome = ApplyOutcome::Applied;
        return result;
    }

    warn!(
        "Apply[{}]: {} not confirmed (requested {}, read {:?})",
        session.label(),
        key.name(),
        result.requested,
        result.observed
    );
    result.outcome = ApplyOutcome::Rejected(RejectReason::NotConfirmed {
        observed: result.observed.clone(),
    });
    if let Some(previous) = result.previous.clone() {
        result.rolled_back = Some(roll_back(session, key, &previous));
    }
    result
}

/// Restore a previous value, returning whether the board confirms it.
fn roll_back(session: &mut Session, key: &ConfigKey, previous: &ConfigValue) -> bool {
    if let Err(e) = session.write_value(key, previous) {
        warn!("Apply[{}]: rollback of {} failed: {}", session.label(), key.name(), e);
        return false;
    }
    match session.read_value(key) {
        Ok(v) if key.domain().same_value(&v, previous) => true,
        Ok(v) => {
            warn!("Apply[{}]: rollback of {} left {}", session.label(), key.name(), v);
            false
        }
        Err(e) => {
            warn!("Apply[{}]: rollback of {} unconfirmed: {}", session.label(), key.name(), e);
            false
        }
    }
}
