//! Stream ingest for tideline.
//!
//! Turns raw push frames into routing decisions. Decoding failures are
//! dropped and counted here; they never reach the store and never end the
//! connection.

use feed_types::{DecodeError, Entry, EntryId, Filter, StreamEvent};

/// Where a decoded stream event should go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestAction {
    /// Withhold in the pending buffer.
    Enqueue(Entry),
    /// Merge into the store right away.
    Merge(Entry),
    /// Edit an existing entry in place.
    Update(Entry),
    /// Delete an entry.
    Remove(EntryId),
    /// Not part of this feed.
    Ignore,
}

/// Decoder and router for push frames.
#[derive(Debug, Clone, Default)]
pub struct StreamIngest {
    processed: u64,
    dropped: u64,
    last_failure: Option<DecodeError>,
}

impl StreamIngest {
    /// Create an ingest with zeroed counters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Frames decoded successfully.
    pub fn processed(&self) -> u64 {
        self.processed
    }

    /// Frames dropped because they could not be decoded.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    /// The most recent decode failure.
    pub fn last_failure(&self) -> Option<&DecodeError> {
        self.last_failure.as_ref()
    }

    /// Decode one frame, counting the outcome.
    pub fn decode(&mut self, text: &str) -> Result<StreamEvent, DecodeError> {
        match StreamEvent::decode(text) {
            Ok(event) => {
                self.processed += 1;
                Ok(event)
            }
            Err(err) => {
                self.dropped += 1;
                self.last_failure = Some(err.clone());
                Err(err)
            }
        }
    }

    /// Decide where an event goes.
    ///
    /// Creates are withheld only when the feed is on screen and its filter
    /// supports newest pagination; otherwise they merge directly.
    pub fn route(event: StreamEvent, filter: &Filter, visible: bool) -> IngestAction {
        match event {
            StreamEvent::Create(entry) => {
                if !filter.admits(&entry) {
                    IngestAction::Ignore
                } else if visible && filter.supports_newest_pagination() {
                    IngestAction::Enqueue(entry)
                } else {
                    IngestAction::Merge(entry)
                }
            }
            StreamEvent::Update(entry) => IngestAction::Update(entry),
            StreamEvent::Delete(id) => IngestAction::Remove(id),
        }
    }
}
