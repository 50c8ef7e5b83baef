//! Error types for tideline.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::ids::EntryId;

/// The kind of page load a cursor operation refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadKind {
    /// Initial load or pull-to-refresh (replaces the store).
    Initial,
    /// Backward pagination ("load older").
    Older,
    /// Forward pagination (catch up on newer entries).
    Newer,
}

impl fmt::Display for LoadKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoadKind::Initial => write!(f, "initial"),
            LoadKind::Older => write!(f, "older"),
            LoadKind::Newer => write!(f, "newer"),
        }
    }
}

/// Errors from decoding a single stream frame.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// The frame or its payload was not valid JSON of the expected shape.
    #[error("malformed frame: {0}")]
    Json(String),

    /// The frame named an event kind the engine does not handle.
    #[error("unknown event kind: {0}")]
    UnknownEvent(String),

    /// An entry id was not a decimal integer.
    #[error("invalid entry id: {0:?}")]
    InvalidId(String),

    /// The frame carried no payload.
    #[error("missing payload for event {0}")]
    MissingPayload(String),
}

impl From<serde_json::Error> for DecodeError {
    fn from(err: serde_json::Error) -> Self {
        DecodeError::Json(err.to_string())
    }
}

/// Errors that can occur in tideline operations.
///
/// Nothing here is fatal to the process. Only [`FeedError::NetworkFailure`]
/// is surfaced to the consumer as a failure; the other variants describe
/// outcomes that are absorbed or reported as benign no-ops.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FeedError {
    /// A fetch failed. Transient; previous state is retained.
    #[error("network failure: {0}")]
    NetworkFailure(String),

    /// A single stream frame could not be decoded. Dropped and counted.
    #[error("stream decode failure: {0}")]
    StreamDecodeFailure(#[from] DecodeError),

    /// An entry was already present. Absorbed by deduplication.
    #[error("duplicate entry ignored: {0}")]
    DuplicateIgnored(EntryId),

    /// A result arrived for a filter that is no longer active.
    #[error("stale result (generation {captured}, current {current})")]
    StaleResult {
        /// Generation captured when the operation started.
        captured: u64,
        /// Generation at the time the result arrived.
        current: u64,
    },

    /// A load of the same kind is already in flight.
    #[error("{0} load already in progress")]
    ConcurrentLoadRejected(LoadKind),
}

impl FeedError {
    /// Whether this error should be shown to the consumer.
    ///
    /// Only network failures surface; everything else is benign.
    pub fn is_surfaced(&self) -> bool {
        matches!(self, FeedError::NetworkFailure(_))
    }
}
