//! # c6probe-model
//!
//! Configuration model shared by the c6probe crates.
//!
//! This crate provides:
//! - [`ConfigValue`] - Dynamic value read from or written to a board
//! - [`ValueDomain`] - Declared set of values a key accepts, with tolerance
//! - [`ConfigKey`] / [`KeyCatalog`] - The static, versioned candidate key set
//! - [`ConfigSnapshot`] - Immutable, timestamped view of a board's values
//! - [`ChangeRequest`] - Ordered set of desired values
//!
//! Nothing in this crate talks to a board; see `c6probe-device` for that.

mod catalog;
mod change;
mod domain;
mod error;
mod key;
mod snapshot;
mod value;

pub use catalog::{KeyCatalog, CATALOG_VERSION};
pub use change::{ChangeRequest, RequestedChange};
pub use domain::{DomainError, ValueDomain};
pub use error::{ModelError, Result};
pub use key::{Access, ConfigKey};
pub use snapshot::{ConfigSnapshot, SnapshotChange, SnapshotEntry};
pub use value::ConfigValue;
