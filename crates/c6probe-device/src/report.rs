//! Report model.
//!
//! [`Report::build`] flattens probe and apply results into one ordered list of
//! entries. It is a pure function of its inputs. Keys that could not be read
//! again after applying are appended with [`Report::with_recheck`].

use c6probe_model::ConfigValue;
use serde::{Deserialize, Serialize};

use crate::applier::{ApplyOutcome, ApplyResult};
use crate::prober::{ProbeOutcome, ProbeResult};

/// Which step produced an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Capability probe.
    Probe,
    /// Change application.
    Apply,
    /// Second read after applying.
    Recheck,
}

impl Phase {
    fn as_str(self) -> &'static str {
        match self {
            Phase::Probe => "probe",
            Phase::Apply => "apply",
            Phase::Recheck => "recheck",
        }
    }
}

/// Status of an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryStatus {
    /// Probe: key supported.
    Supported,
    /// Probe: key unknown to the firmware.
    Unsupported,
    /// Probe: read failed.
    Errored,
    /// Apply: written and confirmed.
    Applied,
    /// Apply: already at the requested value.
    Unchanged,
    /// Apply: not applied.
    Rejected,
}

impl EntryStatus {
    /// Whether this status makes the run unsuccessful.
    pub fn is_failure(self) -> bool {
        matches!(self, EntryStatus::Errored | EntryStatus::Rejected)
    }

    fn as_str(self) -> &'static str {
        match self {
            EntryStatus::Supported => "supported",
            EntryStatus::Unsupported => "unsupported",
            EntryStatus::Errored => "errored",
            EntryStatus::Applied => "applied",
            EntryStatus::Unchanged => "unchanged",
            EntryStatus::Rejected => "rejected",
        }
    }
}

/// One line of a report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportEntry {
    /// Key name.
    pub key: String,
    /// Producing step.
    pub phase: Phase,
    /// Status.
    pub status: EntryStatus,
    /// Value read (probe) or read back (apply).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<ConfigValue>,
    /// Requested value (apply only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub requested: Option<ConfigValue>,
    /// Value before writing (apply only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous: Option<ConfigValue>,
    /// Error or rejection detail.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Flat, ordered record of a run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Report {
    entries: Vec<ReportEntry>,
}

impl Report {
    /// Aggregate results: probe entries in probe order, then apply entries in
    /// application order.
    pub fn build(probe: &[ProbeResult], apply: &[ApplyResult]) -> Report {
        let mut entries: Vec<ReportEntry> =
            probe.iter().map(|r| probe_entry(r, Phase::Probe)).collect();
        entries.reserve(apply.len());

        for result in apply {
            let (status, detail) = match &result.outcome {
                ApplyOutcome::Applied => (EntryStatus::Applied, None),
                ApplyOutcome::Unchanged => (EntryStatus::Unchanged, None),
                ApplyOutcome::Rejected(reason) => {
                    let detail = match result.rolled_back {
                        Some(true) => format!("{} (rolled back)", reason),
                        Some(false) => format!("{} (rollback failed)", reason),
                        None => reason.to_string(),
                    };
                    (EntryStatus::Rejected, Some(detail))
                }
            };
            entries.push(ReportEntry {
                key: result.key.clone(),
                phase: Phase::Apply,
                status,
                value: result.observed.clone(),
                requested: Some(result.requested.clone()),
                previous: result.previous.clone(),
                detail,
            });
        }

        Report { entries }
    }

    /// Append keys that were not read back as supported on the second probe.
    pub fn with_recheck(mut self, recheck: &[ProbeResult]) -> Report {
        self.entries.extend(
            recheck
                .iter()
                .filter(|r| !r.outcome.is_supported())
                .map(|r| probe_entry(r, Phase::Recheck)),
        );
        self
    }

    /// Entries in report order.
    pub fn entries(&self) -> &[ReportEntry] {
        &self.entries
    }

    /// Entries for one phase.
    pub fn phase(&self, phase: Phase) -> impl Iterator<Item = &ReportEntry> {
        self.entries.iter().filter(move |e| e.phase == phase)
    }

    /// Number of entries with a status.
    pub fn count(&self, status: EntryStatus) -> usize {
        self.entries.iter().filter(|e| e.status == status).count()
    }

    /// Whether any entry is errored or rejected.
    pub fn has_failures(&self) -> bool {
        self.entries.iter().any(|e| e.status.is_failure())
    }

    /// Render as an aligned plain-text table.
    pub fn render_text(&self) -> String {
        let width = self.entries.iter().map(|e| e.key.len()).max().unwrap_or(3).max(3);
        let mut out = format!(
            "{:<7}  {:<width$}  {:<11}  {}\n",
            "PHASE",
            "KEY",
            "STATUS",
            "DETAIL",
            width = width
        );

        for entry in &self.entries {
            let mut detail = Vec::new();
            match (entry.phase, &entry.previous, &entry.requested) {
                (Phase::Apply, Some(prev), Some(req)) => {
                    detail.push(format!("{} -> {}", prev, req))
                }
                (Phase::Apply, None, Some(req)) => detail.push(format!("-> {}", req)),
                (Phase::Apply, _, None) => {}
                (_, _, _) => {
                    if let Some(v) = &entry.value {
                        detail.push(v.to_string());
                    }
                }
            }
            if let Some(d) = &entry.detail {
                detail.push(d.clone());
            }
            out.push_str(&format!(
                "{:<7}  {:<width$}  {:<11}  {}\n",
                entry.phase.as_str(),
                entry.key,
                entry.status.as_str(),
                detail.join("  "),
                width = width
            ));
        }
        out
    }
}

fn probe_entry(result: &ProbeResult, phase: Phase) -> ReportEntry {
    let (status, value, detail) = match &result.outcome {
        ProbeOutcome::Supported(v) => (EntryStatus::Supported, Some(v.clone()), None),
        ProbeOutcome::Unsupported => (EntryStatus::Unsupported, None, None),
        ProbeOutcome::Errored(reason) => (EntryStatus::Errored, None, Some(reason.clone())),
    };
    ReportEntry {
        key: result.key.clone(),
        phase,
        status,
        value,
        requested: None,
        previous: None,
        detail,
    }
}
