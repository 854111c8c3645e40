//! # logward-spool
//!
//! At-least-once delivery of opaque payload lines to a remote collector.
//!
//! Payloads move through three tiers:
//!
//! - a RAM [`BoundedQueue`] that absorbs the common case cheaply
//! - an on-disk queue file (`queue.log`) that takes RAM overflow and
//!   survives restarts
//! - a single-slot inflight file (`inflight.log`) holding the payload
//!   currently being sent from disk
//!
//! A payload accepted by [`Spool::enqueue`] lives in exactly one tier until
//! a success acknowledgement is read back from the [`Transport`]. Flushing
//! resolves the inflight slot first, then RAM, then disk.
//!
//! ## Example
//!
//! ```rust,no_run
//! use logward_spool::{Spool, Transport};
//!
//! fn deliver(transport: &mut impl Transport) -> logward_spool::Result<()> {
//!     let mut spool = Spool::open("/var/lib/logward/spool", 256)?;
//!     spool.enqueue(r#"{"operation":"insert","data":[]}"#)?;
//!
//!     let outcome = spool.flush_some(transport, 800);
//!     println!("delivered {} payloads", outcome.delivered);
//!     Ok(())
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod ack;
pub mod error;
pub mod queue;
pub mod spool;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
pub mod transport;

pub use ack::is_success_ack;
pub use error::{DeliveryError, Result, SpoolError, TransportError};
pub use queue::BoundedQueue;
pub use spool::{
    FlushOutcome, INFLIGHT_FILE, Placement, QUEUE_FILE, SharedSpool, Spool, SpoolStatus,
};
pub use transport::Transport;
