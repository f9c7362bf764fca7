//! # c6probe-device
//!
//! Sessions with an ESP32-C6 board over its serial configuration console.
//!
//! ## Overview
//!
//! - [`Transport`] sends one command and waits for one response line.
//!   [`StreamTransport`] implements it over any blocking byte stream: a
//!   serial port from [`open_serial`], or a [`SimulatedDevice`].
//! - [`Session`] owns a transport, enforces the lifecycle and the timeout
//!   policy, and interprets values through each key's declared domain.
//! - [`probe`] reads a list of candidate keys and classifies each one as
//!   supported, unsupported, or errored.
//! - [`apply`] validates a change request against the catalog, writes what
//!   passes and confirms every write by reading it back.
//! - [`Report`] flattens probe and apply results for output.
//! - [`SessionController`] drives a whole run.
//!
//! A missing parameter is a normal probe outcome. Only a failed connection
//! aborts a run; every other failure is recorded against its key.
//!
//! ## Example
//!
//! ```
//! use c6probe_device::{Endpoint, RunPlan, SessionConfig, SessionController, SimulatedDevice};
//! use c6probe_model::{ChangeRequest, KeyCatalog};
//!
//! let board = SimulatedDevice::esp32c6().without("txpower");
//! let controller = SessionController::new(KeyCatalog::esp32c6(), SessionConfig::default());
//!
//! let plan = RunPlan::probe_all()
//!     .with_keys(["channel", "txpower", "pm"])
//!     .with_changes(ChangeRequest::new().set("channel", 6));
//! let outcome = controller.run(&Endpoint::Simulated(board), &plan)?;
//!
//! assert_eq!(outcome.before.len(), 2);
//! assert_eq!(outcome.changes.len(), 1);
//! print!("{}", outcome.report.render_text());
//! # Ok::<(), c6probe_device::DeviceError>(())
//! ```

mod applier;
mod controller;
mod error;
mod prober;
mod report;
mod session;
mod simulated;
mod transport;

pub use applier::{apply, ApplyOutcome, ApplyResult, OrderingPolicy, RejectReason};
pub use controller::{RunOutcome, RunPlan, SessionController};
pub use error::{DeviceError, DeviceResult};
pub use prober::{probe, snapshot, ProbeOutcome, ProbeResult};
pub use report::{EntryStatus, Phase, Report, ReportEntry};
pub use session::{
    DeviceInfo, Endpoint, Session, SessionConfig, SessionState, DEFAULT_BAUD,
    DEFAULT_COMMAND_TIMEOUT,
};
pub use simulated::{KeyCalls, SimulatedDevice, SIMULATED_BOARD, SIMULATED_VERSION};
pub use transport::{
    list_ports, open_serial, SerialPortInfo, StreamTransport, Transport, ESPRESSIF_VID,
};
