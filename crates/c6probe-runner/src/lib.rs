//! # c6probe-runner
//!
//! Library side of the `c6probe` command-line tool: run configuration,
//! output rendering and log setup. The binary in `main.rs` only parses flags
//! and maps results to exit codes.
//!
//! ## Exit codes
//!
//! | Code | Meaning |
//! |------|---------|
//! | 0 | Every key probed or applied cleanly |
//! | 1 | The report holds errored or rejected keys |
//! | 2 | Nothing ran: bad configuration or no connection |

pub mod config;
pub mod error;
pub mod logging;
pub mod output;

use std::path::Path;

use c6probe_device::{list_ports, RunOutcome, SessionController};
use tracing::info;

pub use config::{load_catalog, RunConfig, Settings};
pub use error::{Result, RunnerError};
pub use logging::init_logging;
pub use output::{render_catalog, render_outcome, render_ports, OutputFormat};

/// Clean run.
pub const EXIT_OK: u8 = 0;
/// Run completed with per-key failures.
pub const EXIT_FAILURES: u8 = 1;
/// Run could not start.
pub const EXIT_FATAL: u8 = 2;

/// A finished probe run and its rendered output.
#[derive(Debug)]
pub struct ProbeRun {
    /// Everything the run produced.
    pub outcome: RunOutcome,
    /// Rendered output in the requested format.
    pub output: String,
}

impl ProbeRun {
    /// Process exit code for this run.
    pub fn exit_code(&self) -> u8 {
        if self.outcome.has_failures() {
            EXIT_FAILURES
        } else {
            EXIT_OK
        }
    }
}

/// Probe a board (and apply changes, if any) as described by `config`.
pub fn run_probe(config: &RunConfig, assignments: &[String]) -> Result<ProbeRun> {
    let catalog = config.load_catalog()?;
    let settings = config.resolve(&catalog, assignments)?;
    info!(
        "Probing {} ({} change(s), ordering {:?})",
        settings.endpoint,
        settings.plan.changes.as_ref().map_or(0, |c| c.len()),
        settings.plan.ordering
    );

    let controller = SessionController::new(catalog, settings.session);
    let outcome = controller.run(&settings.endpoint, &settings.plan)?;
    let output = render_outcome(&outcome, settings.format)?;
    Ok(ProbeRun { outcome, output })
}

/// Render the candidate key catalog.
pub fn list_keys(catalog: Option<&Path>, format: OutputFormat) -> Result<String> {
    render_catalog(&load_catalog(catalog)?, format)
}

/// Render the serial ports on this machine.
pub fn list_serial_ports(espressif_only: bool, format: OutputFormat) -> Result<String> {
    let mut ports = list_ports()?;
    if espressif_only {
        ports.retain(|p| p.is_espressif());
    }
    render_ports(&ports, format)
}
