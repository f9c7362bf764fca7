//! Session controller.
//!
//! Drives one complete run against one board: connect, identify, probe,
//! optionally apply a change request and probe again, then close. The
//! controller owns the session for the length of the run.

use std::collections::HashSet;

use c6probe_model::{ChangeRequest, ConfigKey, ConfigSnapshot, KeyCatalog, SnapshotChange};
use serde::Serialize;
use tracing::{info, warn};

use crate::applier::{apply, OrderingPolicy};
use crate::error::DeviceResult;
use crate::prober::{probe, snapshot, ProbeOutcome, ProbeResult};
use crate::report::Report;
use crate::session::{DeviceInfo, Endpoint, Session, SessionConfig};

/// What a run should do.
#[derive(Debug, Clone, Default)]
pub struct RunPlan {
    /// Keys to probe, in order. `None` probes the whole catalog.
    pub keys: Option<Vec<String>>,
    /// Changes to apply after the first probe.
    pub changes: Option<ChangeRequest>,
    /// Write ordering for the changes.
    pub ordering: OrderingPolicy,
}

impl RunPlan {
    /// Probe every catalog key, change nothing.
    pub fn probe_all() -> Self {
        RunPlan::default()
    }

    /// Restrict the probe to named keys.
    pub fn with_keys<S: Into<String>>(mut self, keys: impl IntoIterator<Item = S>) -> Self {
        self.keys = Some(keys.into_iter().map(Into::into).collect());
        self
    }

    /// Apply a change request.
    pub fn with_changes(mut self, changes: ChangeRequest) -> Self {
        self.changes = Some(changes).filter(|c| !c.is_empty());
        self
    }

    /// Set the write ordering.
    pub fn with_ordering(mut self, ordering: OrderingPolicy) -> Self {
        self.ordering = ordering;
        self
    }
}

/// Everything a run produced.
#[derive(Debug, Clone, Serialize)]
pub struct RunOutcome {
    /// Endpoint label.
    pub endpoint: String,
    /// Catalog version the keys were taken from.
    pub catalog_version: u32,
    /// Firmware identification.
    pub device: DeviceInfo,
    /// Values before any change.
    pub before: ConfigSnapshot,
    /// Values after applying, when changes were requested.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub after: Option<ConfigSnapshot>,
    /// Keys whose value moved between `before` and `after`. Keys that could
    /// not be read the second time are left out.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub changes: Vec<SnapshotChange>,
    /// Per-key report.
    pub report: Report,
}

impl RunOutcome {
    /// Whether any key errored or was rejected.
    pub fn has_failures(&self) -> bool {
        self.report.has_failures()
    }
}

/// Runs plans against boards using one catalog and one session policy.
#[derive(Debug, Clone)]
pub struct SessionController {
    catalog: KeyCatalog,
    config: SessionConfig,
}

impl SessionController {
    /// Create a controller.
    pub fn new(catalog: KeyCatalog, config: SessionConfig) -> Self {
        SessionController { catalog, config }
    }

    /// The catalog in use.
    pub fn catalog(&self) -> &KeyCatalog {
        &self.catalog
    }

    /// Execute a plan.
    ///
    /// Errors are limited to an unusable plan (unknown or repeated probe keys)
    /// and a failed connection. Everything per-key ends up in the report.
    pub fn run(&self, endpoint: &Endpoint, plan: &RunPlan) -> DeviceResult<RunOutcome> {
        let candidates = self.candidates(plan)?;
        let mut session = Session::connect(endpoint, self.config.clone())?;

        let device = session.identify();
        if let Some(version) = &device.version {
            info!("Session[{}]: firmware {}", session.label(), version);
        }

        let probed = probe(&mut session, &candidates)?;
        let before = snapshot(&candidates, &probed)?;

        let (applied, reprobed) = match &plan.changes {
            Some(changes) => {
                let applied = apply(&mut session, &self.catalog, changes, plan.ordering)?;
                (applied, Some(probe(&mut session, &candidates)?))
            }
            None => (Vec::new(), None),
        };

        let mut report = Report::build(&probed, &applied);
        let mut after = None;
        let mut changes = Vec::new();
        if let Some(reprobed) = &reprobed {
            let later = snapshot(&candidates, reprobed)?;
            changes = readable_changes(&before, &later, reprobed);
            after = Some(later);
            report = report.with_recheck(reprobed);
        }
        if report.has_failures() {
            warn!("Session[{}]: run finished with failures", session.label());
        }

        session.close();

        Ok(RunOutcome {
            endpoint: endpoint.to_string(),
            catalog_version: self.catalog.version(),
            device,
            before,
            after,
            changes,
            report,
        })
    }

    fn candidates(&self, plan: &RunPlan) -> DeviceResult<Vec<ConfigKey>> {
        match &plan.keys {
            Some(names) => Ok(self.catalog.subset(names)?),
            None => Ok(self.catalog.keys().to_vec()),
        }
    }
}

/// Diff two snapshots, leaving out keys whose second read failed.
///
/// Such a key is absent from `after` without having gone anywhere; it is
/// reported under [`Phase::Recheck`](crate::report::Phase::Recheck) instead.
fn readable_changes(
    before: &ConfigSnapshot,
    after: &ConfigSnapshot,
    reprobed: &[ProbeResult],
) -> Vec<SnapshotChange> {
    let unread: HashSet<&str> = reprobed
        .iter()
        .filter(|r| matches!(r.outcome, ProbeOutcome::Errored(_)))
        .map(|r| r.key.as_str())
        .collect();
    before
        .diff(after)
        .into_iter()
        .filter(|change| !unread.contains(change.key.as_str()))
        .collect()
}
