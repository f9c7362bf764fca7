//! Simulated ESP32-C6 configuration console.
//!
//! [`SimulatedDevice`] speaks the same byte-level protocol as a real board: it
//! echoes each request line and answers with one response line. It implements
//! [`Read`] and [`Write`] so it can sit under a [`StreamTransport`] exactly
//! where a serial port would, which keeps the codec and timeout paths honest
//! in dry runs and tests.
//!
//! Faults can be scripted per key: silence (timeouts), replies that only
//! arrive once the next command has been sent, firmware errors, writes that
//! are acknowledged but not applied, and quantized writes.
//!
//! [`StreamTransport`]: crate::transport::StreamTransport

use std::collections::{HashMap, HashSet, VecDeque};
use std::io::{self, Read, Write};
use std::sync::Arc;
use std::time::Duration;

use c6probe_protocol::LINE_TERMINATOR;
use parking_lot::Mutex;
use tracing::trace;

/// How long a read blocks when there is nothing to return.
const READ_POLL_INTERVAL: Duration = Duration::from_millis(2);

/// Version line returned by `ver`.
pub const SIMULATED_VERSION: &str = "v1.24.1 (Build: 2024-11-29)";

/// Board line returned by `board`.
pub const SIMULATED_BOARD: &str = "ESP32C6 module with ESP32C6";

/// Per-key command counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KeyCalls {
    /// Number of `get` commands received.
    pub gets: u32,
    /// Number of `set` commands received.
    pub sets: u32,
}

#[derive(Debug)]
enum Silence {
    Always,
    Times(u32),
    After(u32),
}

#[derive(Debug, Default)]
struct BoardState {
    /// Current values in wire form, in insertion order.
    values: Vec<(String, String)>,
    read_only: HashSet<String>,
    silent: HashMap<String, Silence>,
    failing: HashMap<String, String>,
    ignored_writes: HashSet<String>,
    quantized: HashMap<String, f64>,
    late: HashSet<String>,
    deferred: Option<String>,
    echo: bool,
    input: Vec<u8>,
    output: VecDeque<u8>,
    calls: HashMap<String, KeyCalls>,
    total_commands: u32,
}

impl BoardState {
    fn value(&self, key: &str) -> Option<&str> {
        self.values.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str())
    }

    fn store(&mut self, key: &str, value: String) {
        if let Some(slot) = self.values.iter_mut().find(|(k, _)| k == key) {
            slot.1 = value;
        }
    }

    /// Whether the board stays silent for this key, consuming one scripted silence.
    fn stays_silent(&mut self, key: &str) -> bool {
        match self.silent.get_mut(key) {
            Some(Silence::Always) => true,
            Some(Silence::Times(0)) | None => false,
            Some(Silence::Times(n)) => {
                *n -= 1;
                true
            }
            Some(Silence::After(0)) => true,
            Some(Silence::After(n)) => {
                *n -= 1;
                false
            }
        }
    }

    fn handle_line(&mut self, line: &str) {
        self.total_commands += 1;
        if let Some(reply) = self.deferred.take() {
            self.output.extend(reply.as_bytes());
            self.output.extend(b"\r\n");
        }
        if self.echo {
            self.output.extend(line.as_bytes());
            self.output.extend(b"\r\n");
        }

        let mut parts = line.trim().splitn(3, ' ');
        let verb = parts.next().unwrap_or_default();
        let key = parts.next().unwrap_or_default().to_string();
        let arg = parts.next().map(str::to_string);

        let reply = match verb {
            "ver" => Some(SIMULATED_VERSION.to_string()),
            "board" => Some(SIMULATED_BOARD.to_string()),
            "get" => {
                self.calls.entry(key.clone()).or_default().gets += 1;
                self.reply_get(&key)
            }
            "set" => {
                self.calls.entry(key.clone()).or_default().sets += 1;
                self.reply_set(&key, arg.as_deref().unwrap_or_default())
            }
            _ => Some(format!("ERR: unknown command {}", verb)),
        };

        match reply {
            Some(reply) if self.late.contains(key.as_str()) => {
                trace!("simulated board: {} -> {} (held back)", line, reply);
                self.deferred = Some(reply);
            }
            Some(reply) => {
                trace!("simulated board: {} -> {}", line, reply);
                self.output.extend(reply.as_bytes());
                self.output.extend(b"\r\n");
            }
            None => trace!("simulated board: {} -> (no reply)", line),
        }
    }

    fn reply_get(&mut self, key: &str) -> Option<String> {
        if self.stays_silent(key) {
            return None;
        }
        if let Some(message) = self.failing.get(key) {
            return Some(format!("ERR: {}", message));
        }
        Some(match self.value(key) {
            Some(value) => format!("> {}", value),
            None => format!("ERR: unknown parameter {}", key),
        })
    }

    fn reply_set(&mut self, key: &str, raw: &str) -> Option<String> {
        if self.stays_silent(key) {
            return None;
        }
        if let Some(message) = self.failing.get(key) {
            return Some(format!("ERR: {}", message));
        }
        if self.value(key).is_none() {
            return Some(format!("ERR: unknown parameter {}", key));
        }
        if self.read_only.contains(key) {
            return Some(format!("ERR: {} is read-only", key));
        }
        if raw.is_empty() {
            return Some("ERR: missing value".to_string());
        }
        if self.ignored_writes.contains(key) {
            return Some("OK".to_string());
        }

        let stored = match self.quantized.get(key) {
            Some(step) => match raw.parse::<f64>() {
                Ok(v) => format!("{}", (v / step).round() * step),
                Err(_) => return Some(format!("ERR: invalid value {}", raw)),
            },
            None => raw.to_string(),
        };
        self.store(key, stored);
        Some("OK".to_string())
    }
}

/// An in-memory board answering the configuration console protocol.
///
/// Clones share state, so a test can keep one handle for assertions while the
/// session owns another.
#[derive(Debug, Clone)]
pub struct SimulatedDevice {
    state: Arc<Mutex<BoardState>>,
}

impl Default for SimulatedDevice {
    fn default() -> Self {
        SimulatedDevice::new()
    }
}

impl SimulatedDevice {
    /// A board with no parameters that echoes its input.
    pub fn new() -> Self {
        SimulatedDevice {
            state: Arc::new(Mutex::new(BoardState {
                echo: true,
                ..BoardState::default()
            })),
        }
    }

    /// A board preloaded with typical ESP32-C6 runtime settings.
    ///
    /// TX power is quantized to 0.25 dBm as the radio does.
    pub fn esp32c6() -> Self {
        SimulatedDevice::new()
            .with_read_only_value("mac", "40:4c:ca:5b:1e:90")
            .with_value("hostname", "esp32c6")
            .with_value("protocol", "39")
            .with_value("channel", "1")
            .with_value("txpower", "20")
            .with_value("pm", "1")
            .with_value("reconnects", "-1")
            .with_value("ble.active", "0")
            .with_value("gap_name", "MPY ESP32C6")
            .with_value("mtu", "23")
            .with_value("addr_mode", "0")
            .with_value("cpu_freq", "160")
            .quantize("txpower", 0.25)
    }

    /// Declare a parameter with its current wire value.
    pub fn with_value(self, key: &str, value: &str) -> Self {
        {
            let mut state = self.state.lock();
            match state.values.iter_mut().find(|(k, _)| k == key) {
                Some(slot) => slot.1 = value.to_string(),
                None => state.values.push((key.to_string(), value.to_string())),
            }
        }
        self
    }

    /// Declare a parameter that rejects writes.
    pub fn with_read_only_value(self, key: &str, value: &str) -> Self {
        let device = self.with_value(key, value);
        device.state.lock().read_only.insert(key.to_string());
        device
    }

    /// Forget a parameter, so the board reports it as unknown.
    pub fn without(self, key: &str) -> Self {
        self.state.lock().values.retain(|(k, _)| k != key);
        self
    }

    /// Never answer commands for this key.
    pub fn silent_on(self, key: &str) -> Self {
        self.state.lock().silent.insert(key.to_string(), Silence::Always);
        self
    }

    /// Ignore the next `times` commands for this key, then answer normally.
    pub fn silent_for(self, key: &str, times: u32) -> Self {
        self.state.lock().silent.insert(key.to_string(), Silence::Times(times));
        self
    }

    /// Hold back replies for this key until the next command arrives.
    pub fn answering_late_on(self, key: &str) -> Self {
        self.state.lock().late.insert(key.to_string());
        self
    }

    /// Answer the next `times` commands for this key, then fall silent.
    pub fn silent_after(self, key: &str, times: u32) -> Self {
        self.state.lock().silent.insert(key.to_string(), Silence::After(times));
        self
    }

    /// Answer every command for this key with `ERR: <message>`.
    pub fn failing_on(self, key: &str, message: &str) -> Self {
        self.state.lock().failing.insert(key.to_string(), message.to_string());
        self
    }

    /// Acknowledge writes to this key without changing its value.
    pub fn ignoring_writes_to(self, key: &str) -> Self {
        self.state.lock().ignored_writes.insert(key.to_string());
        self
    }

    /// Round written values for this key to a multiple of `step`.
    pub fn quantize(self, key: &str, step: f64) -> Self {
        self.state.lock().quantized.insert(key.to_string(), step);
        self
    }

    /// Turn request echo on or off.
    pub fn echo(self, enabled: bool) -> Self {
        self.state.lock().echo = enabled;
        self
    }

    /// Current wire value of a parameter.
    pub fn value(&self, key: &str) -> Option<String> {
        self.state.lock().value(key).map(str::to_string)
    }

    /// Change a value out-of-band, as another tool on the board would.
    pub fn set_value(&self, key: &str, value: &str) {
        self.state.lock().store(key, value.to_string());
    }

    /// Command counters for a key.
    pub fn calls_for(&self, key: &str) -> KeyCalls {
        self.state.lock().calls.get(key).copied().unwrap_or_default()
    }

    /// Total commands received.
    pub fn total_commands(&self) -> u32 {
        self.state.lock().total_commands
    }
}

impl Write for SimulatedDevice {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut state = self.state.lock();
        for &byte in buf {
            if byte == LINE_TERMINATOR {
                let line = String::from_utf8_lossy(&state.input).trim_end_matches('\r').to_string();
                state.input.clear();
                if !line.trim().is_empty() {
                    state.handle_line(&line);
                }
            } else {
                state.input.push(byte);
            }
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Read for SimulatedDevice {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        {
            let mut state = self.state.lock();
            if !state.output.is_empty() {
                let n = buf.len().min(state.output.len());
                for (slot, byte) in buf.iter_mut().zip(state.output.drain(..n)) {
                    *slot = byte;
                }
                return Ok(n);
            }
        }
        std::thread::sleep(READ_POLL_INTERVAL);
        Err(io::Error::new(io::ErrorKind::TimedOut, "no data"))
    }
}
