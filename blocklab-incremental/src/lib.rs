//! Blocklab Single-Flight Resolution Engine
//!
//! This crate provides the machinery that makes content resolution look
//! synchronous when it is ready and suspend-friendly when it is not.
//!
//! # Architecture
//!
//! - [`RenderFuture`]: an identity-stable handle on one resolution. It
//!   settles once, can be awaited by tasks and read by consumers.
//! - [`FutureTable`]: memoizes one future per key per [`Generation`], so
//!   every caller asking for the same key observes the same instance.
//! - [`Scheduler`]: a single-threaded cooperative driver. Consumers that
//!   read a pending future yield a [`Suspend`] and are re-invoked once the
//!   future settles.
//!
//! ```text
//! consumer ──read──▶ RenderFuture ◀──settle── resolution task
//!     ▲                   │                        ▲
//!     └──── re-drive ─────┴──── Scheduler ─────────┘
//! ```
//!
//! # Example
//!
//! ```rust
//! use blocklab_incremental::{Entry, FutureTable, Generation, Scheduler};
//!
//! let scheduler = Scheduler::new();
//! let table: FutureTable<&str, Option<u32>, String> = FutureTable::new(None);
//!
//! let entry = table.entry(Generation(1), "answer");
//! if let Entry::Created(fut) = &entry {
//!     let fut = fut.clone();
//!     scheduler.spawn(async move {
//!         fut.resolve(Some(42));
//!     });
//! }
//!
//! let fut = entry.into_future();
//! let value = scheduler.drive(|| fut.read()).unwrap();
//! assert_eq!(value, std::task::Poll::Ready(Ok(Some(42))));
//! ```

#![warn(missing_debug_implementations)]

pub mod cache;
pub mod future;
pub mod generation;
pub mod metrics;
pub mod scheduler;

pub use cache::{Entry, FutureTable};
pub use future::{RenderFuture, Settled};
pub use generation::{Generation, GenerationCounter};
pub use metrics::{CacheMetrics, MetricsSnapshot};
pub use scheduler::{spawn_on, Scheduler, Suspend, SuspenseError, DEFAULT_MAX_REDRIVES};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::cache::{Entry, FutureTable};
    pub use crate::future::RenderFuture;
    pub use crate::generation::Generation;
    pub use crate::scheduler::{Scheduler, Suspend};
}
