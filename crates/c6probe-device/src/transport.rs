//! Line transport over a byte stream.
//!
//! A [`Transport`] sends one command and waits for one response line. The
//! serial implementation wraps a [`serialport`] handle in a [`StreamTransport`],
//! which owns the [`LineCodec`] that buffers partial reads.

use std::io::{self, Read, Write};
use std::time::{Duration, Instant};

use c6probe_protocol::{Command, LineCodec, Response};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::error::{DeviceError, DeviceResult};

/// Read timeout for a single poll of the serial port.
const SERIAL_POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Size of the read buffer.
const READ_CHUNK: usize = 256;

/// A request/response channel to one board.
///
/// Exactly one command is outstanding at a time.
pub trait Transport: Send {
    /// Send `command` and wait up to `timeout` for its response line.
    fn exchange(&mut self, command: &Command, timeout: Duration) -> DeviceResult<Response>;

    /// Release the underlying handle. Further exchanges fail with [`DeviceError::Closed`].
    fn close(&mut self);
}

// ============================================================================
// Stream Transport
// ============================================================================

/// Transport over any blocking byte stream whose reads time out.
///
/// Reads returning [`io::ErrorKind::TimedOut`] or [`io::ErrorKind::WouldBlock`]
/// are treated as "no data yet" and the overall deadline is checked again.
///
/// A failed exchange leaves the transport out of step with the board: the
/// missing reply can still arrive later. The next exchange first drains
/// whatever input is waiting and, if the board is known to echo, ignores
/// every line received before the echo of its own request.
pub struct StreamTransport<S> {
    stream: Option<S>,
    codec: LineCodec,
    resync: bool,
}

impl<S: Read + Write + Send> StreamTransport<S> {
    /// Wrap an open stream.
    pub fn new(stream: S) -> Self {
        StreamTransport {
            stream: Some(stream),
            codec: LineCodec::new(),
            resync: false,
        }
    }

    fn round_trip(&mut self, command: &Command, timeout: Duration) -> DeviceResult<Response> {
        let stream = self.stream.as_mut().ok_or(DeviceError::Closed)?;
        let cmd_str = command.to_string();
        let started = Instant::now();
        let deadline = started + timeout;

        let stale = self.codec.reset();
        if !stale.is_empty() {
            trace!("Discarding stale input: {:?}", stale);
        }
        if self.resync {
            let drained = drain_input(&mut *stream, deadline)?;
            if drained > 0 {
                debug!("Discarded {} bytes of late input before '{}'", drained, cmd_str);
            }
        }
        if self.resync && self.codec.echoes_seen() > 0 {
            self.codec.require_echo(&cmd_str);
        } else {
            self.codec.expect_echo(&cmd_str);
        }

        trace!("-> {}", cmd_str);
        stream.write_all(&command.encode())?;
        stream.flush()?;

        let mut buf = [0u8; READ_CHUNK];
        loop {
            if let Some(line) = self.codec.next_line()? {
                for late in self.codec.take_skipped() {
                    debug!("Dropped late reply {:?} ahead of '{}'", late, cmd_str);
                }
                trace!("<- {}", line);
                return Ok(Response::parse(&line)?);
            }

            if Instant::now() >= deadline {
                return Err(DeviceError::Timeout {
                    command: cmd_str,
                    after: started.elapsed(),
                });
            }

            match stream.read(&mut buf) {
                Ok(0) => {}
                Ok(n) => self.codec.feed(&buf[..n]),
                Err(e) if is_idle(&e) => {}
                Err(e) => return Err(DeviceError::Io(e)),
            }
        }
    }
}

impl<S: Read + Write + Send> Transport for StreamTransport<S> {
    fn exchange(&mut self, command: &Command, timeout: Duration) -> DeviceResult<Response> {
        let result = self.round_trip(command, timeout);
        self.resync = result.is_err();
        result
    }

    fn close(&mut self) {
        self.stream = None;
        self.resync = false;
        self.codec.reset();
    }
}

fn is_idle(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
    )
}

/// Read and drop input until the stream has nothing more to give.
fn drain_input<S: Read>(stream: &mut S, deadline: Instant) -> io::Result<usize> {
    let mut buf = [0u8; READ_CHUNK];
    let mut drained = 0;
    while Instant::now() < deadline {
        match stream.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => drained += n,
            Err(e) if is_idle(&e) => break,
            Err(e) => return Err(e),
        }
    }
    Ok(drained)
}

// ============================================================================
// Serial Port
// ============================================================================

/// Open a serial port exclusively and wrap it in a transport.
///
/// Fails with [`DeviceError::Connection`] when the port is absent or busy.
pub fn open_serial(
    port: &str,
    baud: u32,
) -> DeviceResult<StreamTransport<Box<dyn serialport::SerialPort>>> {
    let handle = serialport::new(port, baud)
        .timeout(SERIAL_POLL_INTERVAL)
        .open()
        .map_err(|e| DeviceError::Connection {
            endpoint: port.to_string(),
            reason: e.to_string(),
        })?;

    // Drop whatever the board printed before we attached
    if let Err(e) = handle.clear(serialport::ClearBuffer::All) {
        trace!("Could not clear {} buffers: {}", port, e);
    }

    Ok(StreamTransport::new(handle))
}

/// Information about a serial port present on this machine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SerialPortInfo {
    /// OS port name (e.g. `/dev/ttyACM0`, `COM4`).
    pub port_name: String,
    /// USB vendor ID, if a USB device.
    pub vid: Option<u16>,
    /// USB product ID, if a USB device.
    pub pid: Option<u16>,
    /// USB serial number.
    pub serial_number: Option<String>,
    /// Manufacturer string.
    pub manufacturer: Option<String>,
    /// Product string.
    pub product: Option<String>,
}

/// Espressif's USB vendor ID, used by the C6 built-in USB-Serial/JTAG.
pub const ESPRESSIF_VID: u16 = 0x303a;

impl SerialPortInfo {
    /// Whether the port looks like an Espressif built-in USB console.
    pub fn is_espressif(&self) -> bool {
        self.vid == Some(ESPRESSIF_VID)
    }
}

/// List serial ports present on this machine.
pub fn list_ports() -> DeviceResult<Vec<SerialPortInfo>> {
    let ports = serialport::available_ports()
        .map_err(|e| DeviceError::Io(io::Error::new(io::ErrorKind::Other, e)))?;
    Ok(ports
        .into_iter()
        .map(|p| match p.port_type {
            serialport::SerialPortType::UsbPort(usb) => SerialPortInfo {
                port_name: p.port_name,
                vid: Some(usb.vid),
                pid: Some(usb.pid),
                serial_number: usb.serial_number,
                manufacturer: usb.manufacturer,
                product: usb.product,
            },
            _ => SerialPortInfo {
                port_name: p.port_name,
                vid: None,
                pid: None,
                serial_number: None,
                manufacturer: None,
                product: None,
            },
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulated::SimulatedDevice;
    use std::collections::VecDeque;

    /// A stream that replays scripted chunks, one per read.
    struct Scripted {
        reads: VecDeque<Vec<u8>>,
        written: Vec<u8>,
    }

    impl Read for Scripted {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            match self.reads.pop_front() {
                Some(chunk) => {
                    buf[..chunk.len()].copy_from_slice(&chunk);
                    Ok(chunk.len())
                }
                None => {
                    std::thread::sleep(Duration::from_millis(1));
                    Err(io::Error::new(io::ErrorKind::TimedOut, "no data"))
                }
            }
        }
    }

    impl Write for Scripted {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.written.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn scripted(chunks: &[&[u8]]) -> Scripted {
        Scripted {
            reads: chunks.iter().map(|c| c.to_vec()).collect(),
            written: Vec::new(),
        }
    }

    #[test]
    fn test_exchange_assembles_partial_reads() {
        let mut transport = StreamTransport::new(scripted(&[b"get chan", b"nel\r\n> ", b"6\r\n"]));
        let cmd = Command::get("channel").unwrap();

        let response = transport.exchange(&cmd, Duration::from_secs(1)).unwrap();
        assert_eq!(response, Response::Value("6".to_string()));
        assert_eq!(transport.stream.as_ref().unwrap().written, b"get channel\n");
    }

    #[test]
    fn test_exchange_times_out_on_partial_line() {
        let mut transport = StreamTransport::new(scripted(&[b"> 1"]));
        let cmd = Command::get("pm").unwrap();

        let err = transport.exchange(&cmd, Duration::from_millis(30)).unwrap_err();
        assert!(err.is_timeout());
    }

    #[test]
    fn test_late_reply_is_not_taken_for_the_next_one() {
        let device = SimulatedDevice::new()
            .with_value("pm", "2")
            .with_value("channel", "7")
            .answering_late_on("pm");
        let mut transport = StreamTransport::new(device);

        let err = transport
            .exchange(&Command::get("pm").unwrap(), Duration::from_millis(30))
            .unwrap_err();
        assert!(err.is_timeout());

        let response = transport
            .exchange(&Command::get("channel").unwrap(), Duration::from_secs(1))
            .unwrap();
        assert_eq!(response, Response::Value("7".to_string()));
    }

    #[test]
    fn test_waiting_input_is_drained_after_timeout() {
        // No echo; the reply to `get pm` lands after its deadline
        let mut transport = StreamTransport::new(scripted(&[]));
        let err = transport
            .exchange(&Command::get("pm").unwrap(), Duration::from_millis(10))
            .unwrap_err();
        assert!(err.is_timeout());

        let stream = transport.stream.as_mut().unwrap();
        stream.reads.push_back(b"> 2\r\n".to_vec());
        stream.reads.push_back(Vec::new());
        stream.reads.push_back(b"> 7\r\n".to_vec());

        let response = transport
            .exchange(&Command::get("channel").unwrap(), Duration::from_secs(1))
            .unwrap();
        assert_eq!(response, Response::Value("7".to_string()));
    }

    #[test]
    fn test_closed_transport() {
        let mut transport = StreamTransport::new(scripted(&[]));
        transport.close();
        let err = transport.exchange(&Command::Version, Duration::from_millis(10)).unwrap_err();
        assert!(matches!(err, DeviceError::Closed));
    }

    #[test]
    fn test_open_missing_port_is_connection_error() {
        let err = open_serial("/dev/c6probe-does-not-exist", 115_200).err().unwrap();
        assert!(err.is_fatal());
    }
}
