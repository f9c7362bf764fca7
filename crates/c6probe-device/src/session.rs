//! A single connection to a board.
//!
//! The session owns the transport and enforces the lifecycle
//!
//! ```text
//! Disconnected → Connecting → Ready
//!     → (Probing → Ready)* → (Applying → Ready)*
//!     → Closing → Disconnected
//! ```
//!
//! Device state is never cached here: every read goes to the board, since the
//! board can be reconfigured out-of-band at any time.

use std::time::{Duration, Instant};

use c6probe_model::{ConfigKey, ConfigValue};
use c6probe_protocol::{Command, Response};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, trace, warn};

use crate::error::{DeviceError, DeviceResult};
use crate::simulated::SimulatedDevice;
use crate::transport::{open_serial, StreamTransport, Transport};

/// Default per-command response deadline.
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(2);

/// Default baud rate of the board's USB console.
pub const DEFAULT_BAUD: u32 = 115_200;

// ============================================================================
// Configuration
// ============================================================================

/// Timing and retry policy for a session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Deadline for each command's response.
    pub command_timeout: Duration,
    /// Extra attempts for a read that timed out. Reads are idempotent.
    pub read_retries: u32,
    /// Overall deadline. Commands are cut short at this instant and commands
    /// issued after it fail immediately with a timeout.
    pub deadline: Option<Instant>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
            read_retries: 1,
            deadline: None,
        }
    }
}

// ============================================================================
// Endpoint
// ============================================================================

/// Where to connect.
#[derive(Debug, Clone)]
pub enum Endpoint {
    /// A serial port.
    Serial {
        /// OS port name.
        port: String,
        /// Baud rate.
        baud: u32,
    },
    /// An in-memory simulated board.
    Simulated(SimulatedDevice),
}

impl Endpoint {
    /// A serial endpoint at the default baud rate.
    pub fn serial(port: impl Into<String>) -> Self {
        Endpoint::Serial {
            port: port.into(),
            baud: DEFAULT_BAUD,
        }
    }
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Endpoint::Serial { port, baud } => write!(f, "{}@{}", port, baud),
            Endpoint::Simulated(_) => write!(f, "simulated"),
        }
    }
}

// ============================================================================
// Session State
// ============================================================================

/// Lifecycle state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// No transport.
    Disconnected,
    /// Opening the transport.
    Connecting,
    /// Idle and usable.
    Ready,
    /// Reading candidate keys.
    Probing,
    /// Writing a change set.
    Applying,
    /// Releasing the transport.
    Closing,
}

/// Firmware identification reported by `ver` and `board`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceInfo {
    /// Firmware version, e.g. `v1.24.1`.
    pub version: Option<String>,
    /// Firmware build date.
    pub build_date: Option<String>,
    /// Board description.
    pub board: Option<String>,
}

// ============================================================================
// Session
// ============================================================================

/// An open connection to one board. Not shared between callers.
pub struct Session {
    label: String,
    transport: Option<Box<dyn Transport>>,
    state: SessionState,
    config: SessionConfig,
    commands_sent: u64,
}

impl Session {
    /// Open a session. Any failure here is fatal; no partial session is returned.
    pub fn connect(endpoint: &Endpoint, config: SessionConfig) -> DeviceResult<Session> {
        let mut session = Session {
            label: endpoint.to_string(),
            transport: None,
            state: SessionState::Disconnected,
            config,
            commands_sent: 0,
        };
        session.open(endpoint)?;
        Ok(session)
    }

    /// Wrap an already open transport in a ready session.
    pub fn with_transport(
        label: impl Into<String>,
        transport: Box<dyn Transport>,
        config: SessionConfig,
    ) -> Self {
        Session {
            label: label.into(),
            transport: Some(transport),
            state: SessionState::Ready,
            config,
            commands_sent: 0,
        }
    }

    /// `Disconnected -> Connecting -> Ready`, or back to `Disconnected` on failure.
    fn open(&mut self, endpoint: &Endpoint) -> DeviceResult<()> {
        if self.state != SessionState::Disconnected {
            return Err(DeviceError::InvalidState {
                from: self.state,
                to: SessionState::Connecting,
            });
        }
        debug!("Session[{}]: {:?} -> Connecting", self.label, self.state);
        self.state = SessionState::Connecting;

        let opened: DeviceResult<Box<dyn Transport>> = match endpoint {
            Endpoint::Serial { port, baud } => {
                open_serial(port, *baud).map(|t| Box::new(t) as Box<dyn Transport>)
            }
            Endpoint::Simulated(device) => Ok(Box::new(StreamTransport::new(device.clone()))),
        };
        match opened {
            Ok(transport) => {
                self.transport = Some(transport);
                self.state = SessionState::Ready;
                info!("Session[{}]: connected", self.label);
                Ok(())
            }
            Err(e) => {
                self.state = SessionState::Disconnected;
                Err(e)
            }
        }
    }

    /// Endpoint label.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Session configuration.
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Number of commands handed to the transport.
    pub fn commands_sent(&self) -> u64 {
        self.commands_sent
    }

    /// Move from `Ready` into a working state (`Probing` or `Applying`).
    pub fn begin(&mut self, next: SessionState) -> DeviceResult<()> {
        let allowed = self.state == SessionState::Ready
            && matches!(next, SessionState::Probing | SessionState::Applying);
        if !allowed {
            return Err(DeviceError::InvalidState {
                from: self.state,
                to: next,
            });
        }
        trace!("Session[{}]: {:?} -> {:?}", self.label, self.state, next);
        self.state = next;
        Ok(())
    }

    /// Return to `Ready` after probing or applying.
    pub fn end(&mut self) {
        if matches!(self.state, SessionState::Probing | SessionState::Applying) {
            trace!("Session[{}]: {:?} -> Ready", self.label, self.state);
            self.state = SessionState::Ready;
        }
    }

    /// Send one command, bounded by the command timeout and the overall deadline.
    pub fn command(&mut self, command: &Command) -> DeviceResult<Response> {
        if !matches!(
            self.state,
            SessionState::Ready | SessionState::Probing | SessionState::Applying
        ) {
            return Err(DeviceError::Closed);
        }

        let mut timeout = self.config.command_timeout;
        if let Some(deadline) = self.config.deadline {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(DeviceError::Timeout {
                    command: command.to_string(),
                    after: Duration::ZERO,
                });
            }
            timeout = timeout.min(remaining);
        }

        let transport = self.transport.as_mut().ok_or(DeviceError::Closed)?;
        self.commands_sent += 1;
        transport.exchange(command, timeout)
    }

    /// Read a key's raw wire value, retrying timeouts per the read policy.
    pub fn read_raw(&mut self, key: &str) -> DeviceResult<String> {
        let command = Command::get(key)?;
        let mut attempt = 0;
        loop {
            match self.command(&command) {
                Ok(response) => return classify_read(&command, response),
                Err(e) if e.is_timeout() && attempt < self.config.read_retries => {
                    attempt += 1;
                    warn!(
                        "Session[{}]: {} (retry {}/{})",
                        self.label, e, attempt, self.config.read_retries
                    );
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Write a key's raw wire value. Writes are never retried here.
    pub fn write_raw(&mut self, key: &str, value: &str) -> DeviceResult<()> {
        let command = Command::set(key, value)?;
        match self.command(&command)? {
            Response::Ack(_) => Ok(()),
            Response::UnknownParameter(_) => {
                Err(DeviceError::UnsupportedParameter(key.to_string()))
            }
            Response::Error(message) => Err(DeviceError::Firmware(message)),
            other => Err(unexpected(&command, &other)),
        }
    }

    /// Read a key and interpret it through its declared domain.
    ///
    /// Values that do not parse, or fall outside the domain, are
    /// [`DeviceError::DomainValidation`] errors.
    pub fn read_value(&mut self, key: &ConfigKey) -> DeviceResult<ConfigValue> {
        let raw = self.read_raw(key.name())?;
        let value = key.domain().parse(&raw).ok_or_else(|| DeviceError::DomainValidation {
            key: key.name().to_string(),
            reason: format!("cannot read '{}' as {}", raw, key.domain()),
        })?;
        key.domain()
            .validate(&value)
            .map_err(|e| DeviceError::DomainValidation {
                key: key.name().to_string(),
                reason: e.to_string(),
            })
    }

    /// Write a value in the key's wire form.
    pub fn write_value(&mut self, key: &ConfigKey, value: &ConfigValue) -> DeviceResult<()> {
        self.write_raw(key.name(), &value.to_wire())
    }

    /// Ask the firmware to identify itself. Failures leave fields empty.
    pub fn identify(&mut self) -> DeviceInfo {
        let mut info = DeviceInfo::default();
        match self.command(&Command::Version) {
            Ok(Response::Version { version, build_date }) => {
                info.version = Some(version);
                info.build_date = Some(build_date);
            }
            Ok(Response::Text(text)) | Ok(Response::Value(text)) => info.version = Some(text),
            Ok(other) => debug!("Session[{}]: unexpected version reply {:?}", self.label, other),
            Err(e) => debug!("Session[{}]: version query failed: {}", self.label, e),
        }
        match self.command(&Command::Board) {
            Ok(Response::Text(text)) | Ok(Response::Value(text)) => info.board = Some(text),
            Ok(other) => debug!("Session[{}]: unexpected board reply {:?}", self.label, other),
            Err(e) => debug!("Session[{}]: board query failed: {}", self.label, e),
        }
        info
    }

    /// Close the session and release the transport.
    pub fn close(&mut self) {
        if self.state == SessionState::Disconnected {
            return;
        }
        self.state = SessionState::Closing;
        if let Some(mut transport) = self.transport.take() {
            transport.close();
        }
        self.state = SessionState::Disconnected;
        info!("Session[{}]: closed after {} commands", self.label, self.commands_sent);
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.close();
    }
}

fn classify_read(command: &Command, response: Response) -> DeviceResult<String> {
    match response {
        Response::Value(value) => Ok(value),
        Response::UnknownParameter(_) => Err(DeviceError::UnsupportedParameter(
            command.key().unwrap_or_default().to_string(),
        )),
        Response::Error(message) => Err(DeviceError::Firmware(message)),
        other => Err(unexpected(command, &other)),
    }
}

fn unexpected(command: &Command, response: &Response) -> DeviceError {
    DeviceError::UnexpectedResponse {
        command: command.to_string(),
        response: format!("{:?}", response),
    }
}
