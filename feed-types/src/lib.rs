//! # feed-types
//!
//! Shared types for the tideline feed synchronization engine.
//!
//! This crate provides the foundational types used across all tideline crates:
//! - [`EntryId`] - Orderable identity of a feed entry
//! - [`Entry`] - One feed item (post or boost)
//! - [`Filter`] - Which entries belong to a feed (home, list, hashtag, ...)
//! - [`StreamEvent`] - Decoded push events from the streaming collaborator
//! - [`FeedError`] - Error taxonomy shared by the core and the client

#![warn(missing_docs)]
#![warn(clippy::all)]

mod entry;
mod error;
mod events;
mod filter;
mod ids;

pub use entry::Entry;
pub use error::{DecodeError, FeedError, LoadKind};
pub use events::{RawFrame, StreamEvent};
pub use filter::Filter;
pub use ids::EntryId;
