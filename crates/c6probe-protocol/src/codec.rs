//! Line framing for the configuration console.
//!
//! Requests are single lines terminated with `\n`. Every response is a single
//! line terminated with `\n`, optionally preceded by `\r`. The console echoes
//! each request before answering; [`LineCodec::expect_echo`] arms the codec to
//! drop that copy.

use bytes::{Buf, BytesMut};

use crate::error::{ProtocolError, ProtocolResult};

/// Maximum request/response line length.
pub const MAX_LINE_LENGTH: usize = 256;

/// Line terminator appended to every request.
pub const LINE_TERMINATOR: u8 = b'\n';

/// Frame a request line for the wire.
pub fn frame_line(line: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(line.len() + 1);
    out.extend_from_slice(line.as_bytes());
    out.push(LINE_TERMINATOR);
    out
}

/// Splits received bytes into response lines.
///
/// Blank lines are skipped. The echo of the last request is dropped once,
/// whether it arrives on its own line or glued to the front of the reply.
///
/// After a request has timed out its reply may still arrive, ahead of the
/// echo of the next request. [`LineCodec::require_echo`] drops every line
/// until the echo shows up; the dropped lines are kept for
/// [`LineCodec::take_skipped`].
#[derive(Debug, Default)]
pub struct LineCodec {
    pending: BytesMut,
    echo: Option<String>,
    echo_required: bool,
    echoes_seen: u64,
    skipped: Vec<String>,
}

impl LineCodec {
    /// Create an empty codec.
    pub fn new() -> Self {
        LineCodec {
            pending: BytesMut::with_capacity(MAX_LINE_LENGTH),
            ..LineCodec::default()
        }
    }

    /// Expect `request` to be echoed back before the reply.
    pub fn expect_echo(&mut self, request: &str) {
        self.echo = Some(request.trim_end().to_string());
        self.echo_required = false;
    }

    /// Expect `request` to be echoed back, and drop any line that arrives first.
    pub fn require_echo(&mut self, request: &str) {
        self.expect_echo(request);
        self.echo_required = true;
    }

    /// How many request echoes have been stripped so far.
    pub fn echoes_seen(&self) -> u64 {
        self.echoes_seen
    }

    /// Lines dropped while waiting for a required echo.
    pub fn take_skipped(&mut self) -> Vec<String> {
        std::mem::take(&mut self.skipped)
    }

    /// Append received bytes.
    pub fn feed(&mut self, data: &[u8]) {
        self.pending.extend_from_slice(data);
    }

    /// Take the next complete response line, or `Ok(None)` if more bytes are needed.
    ///
    /// Lines longer than [`MAX_LINE_LENGTH`] are discarded with
    /// [`ProtocolError::LineTooLong`]. An unterminated run past that length
    /// is discarded the same way.
    pub fn next_line(&mut self) -> ProtocolResult<Option<String>> {
        while let Some(end) = self.pending.iter().position(|&b| b == LINE_TERMINATOR) {
            let raw = self.pending.split_to(end);
            self.pending.advance(1);

            if raw.len() > MAX_LINE_LENGTH {
                return Err(ProtocolError::LineTooLong {
                    max: MAX_LINE_LENGTH,
                    actual: raw.len(),
                });
            }

            let text = String::from_utf8_lossy(&raw);
            let text = text.trim_end_matches('\r');
            if let Some(line) = self.strip_echo(text) {
                return Ok(Some(line));
            }
        }

        if self.pending.len() > MAX_LINE_LENGTH {
            let actual = self.pending.len();
            self.pending.clear();
            return Err(ProtocolError::LineTooLong {
                max: MAX_LINE_LENGTH,
                actual,
            });
        }
        Ok(None)
    }

    /// Remove the expected echo from a line. `None` means nothing is left.
    fn strip_echo(&mut self, text: &str) -> Option<String> {
        let rest = match self.echo.as_deref() {
            Some(echo) if text.starts_with(echo) => {
                let rest = text[echo.len()..].trim_start().to_string();
                self.echo = None;
                self.echo_required = false;
                self.echoes_seen += 1;
                rest
            }
            Some(_) if self.echo_required => {
                if !text.trim().is_empty() {
                    self.skipped.push(text.to_string());
                }
                return None;
            }
            _ => text.to_string(),
        };
        if rest.trim().is_empty() {
            None
        } else {
            Some(rest)
        }
    }

    /// Number of received bytes not yet returned as a line.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Discard buffered bytes and any expected echo, returning what was buffered.
    pub fn reset(&mut self) -> String {
        let leftover = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        self.echo = None;
        self.echo_required = false;
        self.skipped.clear();
        leftover
    }
}
