//! # feed-core
//!
//! Pure logic for tideline (no I/O, instant tests).
//!
//! This crate implements the data structures and state machines that
//! reconcile an initial fetch, backward pagination and a live push stream
//! into one deduplicated, strictly ordered feed, without any network I/O.
//!
//! ## Design Philosophy
//!
//! Every mutation here is synchronous and completes without yielding, so a
//! merge can never be observed half-applied. The async engine in
//! `feed-client` performs the fetches and hands results back to a
//! [`Timeline`], which owns the store, cursor and pending buffer for the
//! active filter.
//!
//! ```text
//! fetch results ──┐
//!                 ├─> Timeline ─> EntryStore ─> TimelineSnapshot
//! stream events ──┘      │
//!                        ├─> CursorManager (boundaries, in-flight loads)
//!                        ├─> PendingBuffer (withheld stream creates)
//!                        └─> Prefetcher    (load-older trigger)
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod cursor;
pub mod ingest;
pub mod pending;
pub mod prefetch;
pub mod state;
pub mod store;
pub mod timeline;

pub use cursor::{CursorError, CursorManager, LoadPhase, LoadTicket};
pub use ingest::{IngestAction, StreamIngest};
pub use pending::{EnqueueOutcome, PendingBuffer, DEFAULT_PENDING_CAPACITY};
pub use prefetch::{PrefetchDecision, Prefetcher};
pub use state::{Action, Event, ReconnectPolicy, StreamNotice, StreamState};
pub use store::{EntryStore, MergeReport};
pub use timeline::{
    FlushOutcome, PageApplied, RangeChanged, ScrollAnchor, StreamApplied, Timeline,
    TimelineConfig, TimelineSnapshot,
};
