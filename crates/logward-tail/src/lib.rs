//! # logward-tail
//!
//! Incremental, restart-safe reading of growing log files.
//!
//! This crate provides:
//!
//! - [`PositionedTailer`]: Yields newly appended lines, surviving restarts,
//!   rotation and in-place truncation
//! - [`TailPosition`]: The durable `(path, inode, offset)` triple
//! - [`PositionStore`]: Per-tailer namespace inside a shared state file
//! - [`TruncationPolicy`]: What to do when a file shrinks or is replaced
//! - [`PartialLinePolicy`]: What to do with bytes after the last newline
//! - [`FileWatcher`]: Bounded blocking wait for file-change notifications
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use logward_tail::{PositionedTailer, TruncationPolicy};
//!
//! let mut tailer = PositionedTailer::new(
//!     "/var/log/syslog",
//!     "syslog",
//!     "/var/lib/logward/state/reader.state",
//!     TruncationPolicy::ResetToZero,
//! );
//!
//! for line in tailer.read_new_lines(Duration::from_millis(250)) {
//!     println!("{line}");
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod position;
pub mod tailer;
pub mod watcher;

pub use error::{Result, TailError};
pub use position::{PartialLinePolicy, PositionStore, TailPosition, TruncationPolicy};
pub use tailer::PositionedTailer;
pub use watcher::FileWatcher;
