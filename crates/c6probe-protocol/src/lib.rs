//! ESP32-C6 Configuration Console Protocol
//!
//! This crate provides types and utilities for talking to the configuration
//! console exposed by the scripting runtime on an ESP32-C6 board over its
//! USB/serial link. The console is a simple line-based text interface.
//!
//! # Protocol Overview
//!
//! - **Commands** (host → board): Text commands terminated with `\n`
//! - **Responses** (board → host): One line per command, terminated with `\n`
//! - **Echo**: Characters are echoed back as they are received
//!
//! # Command Types
//!
//! - **Get commands**: `get <key>` - Returns the value prefixed with `> `
//! - **Set commands**: `set <key> <value>` - Sets the value, returns `OK`
//! - **Info commands**: `ver`, `board`
//!
//! Keys the firmware does not know are answered with
//! `ERR: unknown parameter <key>`, which parses to
//! [`Response::UnknownParameter`] rather than a generic error.
//!
//! # Example
//!
//! ```rust
//! use c6probe_protocol::{Command, LineCodec, Response};
//!
//! let cmd = Command::get("channel")?;
//! assert_eq!(cmd.encode(), b"get channel\n");
//!
//! let mut codec = LineCodec::new();
//! codec.expect_echo("get channel");
//! codec.feed(b"get channel\r\n> 6\r\n");
//! let line = codec.next_line()?.unwrap_or_default();
//! assert_eq!(Response::parse(&line)?, Response::Value("6".to_string()));
//! # Ok::<(), c6probe_protocol::ProtocolError>(())
//! ```

mod codec;
mod commands;
mod error;
mod responses;

pub use codec::*;
pub use commands::*;
pub use error::*;
pub use responses::*;
