//! A wait-free, single-producer/single-consumer byte ring buffer backed by
//! a double-mapped shared-memory segment.
//!
//! A queue is a fixed-capacity ring of bytes, mapped twice in a row in
//! virtual memory so that a read or write spanning the physical wrap point
//! is always one contiguous slice — callers never see a split buffer. The
//! same crate serves two deployment shapes:
//!
//! - **Named, shared**: created by one process under a POSIX shared-memory
//!   name, opened by others under the same name. [`Builder::create_shared`]
//!   / [`Builder::open_shared`].
//! - **Private**: a queue used only within one process (e.g. between two
//!   threads), backed by the same shared-memory machinery but never
//!   visible under a discoverable name. [`Builder::create_private`].
//!
//! ```no_run
//! use shqueue::Builder;
//!
//! let mut builder = Builder::create_private(1 << 16);
//! let queue = builder.get().expect("create private queue");
//! assert!(queue.push(b"hello"));
//! assert_eq!(queue.peek(5), Some(&b"hello"[..]));
//! assert!(queue.pop(5));
//! ```
//!
//! See `DESIGN.md` for the protocol's invariants and the prior art each
//! module is grounded on.

mod backoff;
mod builder;
mod config;
mod control;
mod error;
mod invariants;
mod mapping;
mod metrics;
mod private;
mod ring;
mod shared;

pub use builder::{Builder, Consumer, Producer, PushGuard, Queue};
pub use config::{NamePrefix, OpenRetry};
pub use error::Error;
pub use metrics::{Metrics, MetricsSnapshot};
pub use shared::{can_get, delete_shared};
