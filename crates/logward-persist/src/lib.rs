//! # logward-persist
//!
//! Plain-file persistence primitives shared by the tailer and the spool.
//!
//! This crate provides:
//!
//! - [`replace_file`] / [`replace_with`]: Atomic whole-file replacement
//!   (temp file, fsync, rename, delete-then-rename fallback)
//! - [`KvFile`]: A shared, line-oriented `key=value` state file
//! - [`KvMap`]: The ordered in-memory view of a state file
//!
//! ## Example
//!
//! ```rust
//! use logward_persist::KvFile;
//!
//! # fn main() -> logward_persist::Result<()> {
//! let dir = tempfile::tempdir()?;
//! let state = KvFile::new(dir.path().join("reader.state"));
//!
//! state.update(|map| {
//!     map.set("syslog.offset", "42");
//! })?;
//!
//! let map = state.load()?;
//! assert_eq!(map.get("syslog.offset"), Some("42"));
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod atomic;
pub mod error;
pub mod kv;

pub use atomic::{replace_file, replace_with, temp_path};
pub use error::{PersistError, Result};
pub use kv::{KvFile, KvMap};
