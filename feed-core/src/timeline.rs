//! The timeline: single owner of one feed's store, cursor and pending buffer.
//!
//! Every mutation of the triple goes through a [`Timeline`] method, and every
//! method completes synchronously. Fetch results come back with the
//! [`LoadTicket`] they were started with; a ticket whose generation no
//! longer matches is rejected with [`FeedError::StaleResult`] and leaves the
//! timeline untouched.
//!
//! The generation is bumped by every filter change and by every completed
//! replace, so an older or newer page started against contents that have
//! since been replaced can never be stitched onto the new contents.

use std::sync::Arc;

use feed_types::{DecodeError, Entry, EntryId, FeedError, Filter, LoadKind, StreamEvent};

use crate::cursor::{CursorError, CursorManager, LoadPhase, LoadTicket};
use crate::ingest::{IngestAction, StreamIngest};
use crate::pending::{EnqueueOutcome, PendingBuffer, DEFAULT_PENDING_CAPACITY};
use crate::prefetch::Prefetcher;
use crate::state::StreamState;
use crate::store::{EntryStore, MergeReport};

/// Tunables for a [`Timeline`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimelineConfig {
    /// Limit passed with every page request.
    pub page_size: usize,
    /// Prefetch trigger margin.
    pub prefetch_margin: usize,
    /// Entries below the visible range reported for warm-loading.
    pub warm_ahead: usize,
    /// Pending buffer cap.
    pub pending_capacity: usize,
}

impl Default for TimelineConfig {
    fn default() -> Self {
        Self {
            page_size: 20,
            prefetch_margin: 5,
            warm_ahead: 5,
            pending_capacity: DEFAULT_PENDING_CAPACITY,
        }
    }
}

/// Where to scroll after a flush so the reading position does not jump.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScrollAnchor {
    /// The entry that was topmost before the flush.
    pub entry_id: EntryId,
    /// Its index after the flush.
    pub offset_index: usize,
}

/// Result of revealing the pending buffer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlushOutcome {
    /// Entries moved into the store.
    pub count: usize,
    /// Scroll target keeping the previous top entry in place.
    pub anchor: Option<ScrollAnchor>,
}

/// Result of applying a fetched page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageApplied {
    /// Which load completed.
    pub kind: LoadKind,
    /// Raw page length before dedup.
    pub returned: usize,
    /// What the merge did.
    pub report: MergeReport,
    /// Whether older pages may exist.
    pub has_more: bool,
    /// An older load the prefetcher started because the viewport is still
    /// near the end. The caller must fetch it.
    pub next_older: Option<LoadTicket>,
}

/// Result of applying one stream frame or event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamApplied {
    /// Withheld in the pending buffer.
    Queued {
        /// Pending count after the enqueue.
        pending: usize,
    },
    /// Merged into the store.
    Merged {
        /// Entries inserted (more than one when the pending cap overflowed).
        count: usize,
    },
    /// An entry was edited in place.
    Updated(EntryId),
    /// An entry was deleted.
    Removed(EntryId),
    /// The entry was already present.
    Duplicate(EntryId),
    /// The event does not concern this feed.
    Ignored,
    /// The frame could not be decoded and was dropped.
    Dropped(DecodeError),
}

impl StreamApplied {
    /// The absorbed condition in error-taxonomy form, if any.
    pub fn as_feed_error(&self) -> Option<FeedError> {
        match self {
            Self::Duplicate(id) => Some(FeedError::DuplicateIgnored(*id)),
            Self::Dropped(err) => Some(FeedError::StreamDecodeFailure(err.clone())),
            _ => None,
        }
    }
}

/// Result of a visible range report.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RangeChanged {
    /// An older load that was started. The caller must fetch it.
    pub older: Option<LoadTicket>,
    /// Entries just below the visible range, for warm-loading.
    pub warm: Vec<EntryId>,
}

/// Immutable view of a timeline handed to the display layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimelineSnapshot {
    /// Active filter.
    pub filter: Filter,
    /// Current generation.
    pub generation: u64,
    /// Entries, newest first.
    pub entries: Arc<Vec<Entry>>,
    /// Cursor phase.
    pub phase: LoadPhase,
    /// An initial load or refresh is in flight.
    pub is_loading_initial: bool,
    /// An older page is in flight.
    pub is_loading_older: bool,
    /// A newer page is in flight.
    pub is_loading_newer: bool,
    /// Older pages may exist.
    pub has_more: bool,
    /// Withheld entries ("N new posts").
    pub pending_count: usize,
    /// Last network failure, for a non-fatal banner.
    pub last_error: Option<String>,
    /// Stream frames decoded successfully.
    pub processed_events: u64,
    /// Stream frames dropped because they could not be decoded.
    pub dropped_events: u64,
    /// Stream connection state.
    pub stream: StreamState,
}

impl TimelineSnapshot {
    /// Entry ids in display order.
    pub fn ids(&self) -> Vec<EntryId> {
        self.entries.iter().map(|e| e.id).collect()
    }

    /// Check if there are no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// One feed's store, cursor and pending buffer under a single owner.
#[derive(Debug, Clone)]
pub struct Timeline {
    config: TimelineConfig,
    filter: Filter,
    generation: u64,
    store: EntryStore,
    cursor: CursorManager,
    pending: PendingBuffer,
    prefetcher: Prefetcher,
    ingest: StreamIngest,
    visible: bool,
    top_visible: Option<EntryId>,
    stream: StreamState,
}

impl Timeline {
    /// Create an empty timeline for `filter`.
    pub fn new(filter: Filter, config: TimelineConfig) -> Self {
        Self {
            config,
            filter: filter.resolved(),
            generation: 0,
            store: EntryStore::new(),
            cursor: CursorManager::new(),
            pending: PendingBuffer::new(config.pending_capacity),
            prefetcher: Prefetcher::new(config.prefetch_margin, config.warm_ahead),
            ingest: StreamIngest::new(),
            visible: false,
            top_visible: None,
            stream: StreamState::Disconnected,
        }
    }

    /// Active filter.
    pub fn filter(&self) -> &Filter {
        &self.filter
    }

    /// Current generation.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Tunables.
    pub fn config(&self) -> &TimelineConfig {
        &self.config
    }

    /// The entry store.
    pub fn store(&self) -> &EntryStore {
        &self.store
    }

    /// The pagination cursor.
    pub fn cursor(&self) -> &CursorManager {
        &self.cursor
    }

    /// The pending buffer.
    pub fn pending(&self) -> &PendingBuffer {
        &self.pending
    }

    /// Stream ingest counters.
    pub fn ingest(&self) -> &StreamIngest {
        &self.ingest
    }

    /// Whether the timeline is on screen and focused.
    pub fn is_visible(&self) -> bool {
        self.visible
    }

    /// Switch filters.
    ///
    /// Bumps the generation and discards the store, cursor and pending
    /// buffer. `Latest` is resolved to the feed it reloads. Returns the new
    /// generation.
    pub fn set_filter(&mut self, filter: Filter) -> u64 {
        self.filter = filter.resolved();
        self.generation += 1;
        self.store.clear();
        self.cursor = CursorManager::new();
        self.pending.discard();
        self.prefetcher.reset();
        self.top_visible = None;
        self.generation
    }

    /// Start a load of `kind` for the current generation.
    pub fn begin_load(&mut self, kind: LoadKind) -> Result<LoadTicket, CursorError> {
        self.cursor
            .begin(kind, self.generation, self.config.page_size)
    }

    /// Apply a fetched page.
    pub fn apply_page(
        &mut self,
        ticket: &LoadTicket,
        entries: Vec<Entry>,
    ) -> Result<PageApplied, FeedError> {
        self.check_generation(ticket)?;

        let returned = entries.len();
        let report = match ticket.kind {
            LoadKind::Initial => {
                let report = self.store.replace(entries);
                self.generation += 1;
                // Indices reported against the old contents no longer apply.
                self.prefetcher.reset();
                self.top_visible = None;
                report
            }
            LoadKind::Older => self.store.append_older(entries),
            LoadKind::Newer => self.store.merge_newer(entries),
        };

        self.cursor.complete(ticket, returned, &self.store);
        if ticket.kind != LoadKind::Older {
            self.pending.prune(&self.store);
        }

        Ok(PageApplied {
            kind: ticket.kind,
            returned,
            report,
            has_more: self.cursor.has_more(),
            next_older: self.prefetch_older(),
        })
    }

    /// Record a failed load. Current contents are retained.
    pub fn fail_load(&mut self, ticket: &LoadTicket, message: &str) -> Result<(), FeedError> {
        self.check_generation(ticket)?;
        self.cursor.fail(ticket.kind, message);
        Ok(())
    }

    /// Clear the failure banner.
    pub fn clear_error(&mut self) {
        self.cursor.clear_error();
    }

    /// Decode and apply one raw stream frame.
    pub fn apply_frame(&mut self, text: &str) -> StreamApplied {
        match self.ingest.decode(text) {
            Ok(event) => self.apply_stream_event(event),
            Err(err) => StreamApplied::Dropped(err),
        }
    }

    /// Apply one decoded stream event.
    pub fn apply_stream_event(&mut self, event: StreamEvent) -> StreamApplied {
        match StreamIngest::route(event, &self.filter, self.visible) {
            IngestAction::Enqueue(entry) => {
                let id = entry.id;
                match self.pending.enqueue(entry, &self.store) {
                    EnqueueOutcome::Queued => StreamApplied::Queued {
                        pending: self.pending.len(),
                    },
                    EnqueueOutcome::Duplicate => StreamApplied::Duplicate(id),
                    EnqueueOutcome::NotNewer(entry) => self.merge_streamed(vec![entry]),
                    EnqueueOutcome::Overflowed(evicted) => self.merge_streamed(evicted),
                }
            }
            IngestAction::Merge(entry) => self.merge_streamed(vec![entry]),
            IngestAction::Update(entry) => {
                let id = entry.id;
                if self.store.update_in_place(entry.clone()) || self.pending.update(entry).is_ok()
                {
                    StreamApplied::Updated(id)
                } else {
                    StreamApplied::Ignored
                }
            }
            IngestAction::Remove(id) => {
                let in_store = self.store.remove(id).is_some();
                let in_pending = self.pending.remove(id);
                if in_store || in_pending {
                    StreamApplied::Removed(id)
                } else {
                    StreamApplied::Ignored
                }
            }
            IngestAction::Ignore => StreamApplied::Ignored,
        }
    }

    /// Reveal every withheld entry.
    ///
    /// Entries merge in arrival order. Flushing an empty buffer is a no-op.
    pub fn flush_pending(&mut self) -> FlushOutcome {
        let entries = self.pending.flush();
        if entries.is_empty() {
            return FlushOutcome::default();
        }

        let anchor_id = self
            .top_visible
            .filter(|id| self.store.contains(*id))
            .or_else(|| self.store.max_id());
        let report = self.store.merge_newer(entries);
        self.cursor.observe(&self.store);

        let anchor = anchor_id.and_then(|entry_id| {
            self.store.index_of(entry_id).map(|offset_index| ScrollAnchor {
                entry_id,
                offset_index,
            })
        });

        FlushOutcome {
            count: report.inserted,
            anchor,
        }
    }

    /// Record the consumer's visible index range.
    ///
    /// Starts an older load when the range is within the prefetch margin of
    /// the end.
    pub fn visible_range_changed(&mut self, lo: usize, hi: usize) -> RangeChanged {
        self.top_visible = self.store.entries().get(lo.min(hi)).map(|e| e.id);

        let decision = self
            .prefetcher
            .on_visible_range(lo, hi, &self.store, &self.cursor);
        let older = if decision.load_older {
            self.begin_load(LoadKind::Older).ok()
        } else {
            None
        };

        RangeChanged {
            older,
            warm: decision.warm,
        }
    }

    /// Record whether the timeline is on screen and focused.
    pub fn set_visible(&mut self, visible: bool) {
        self.visible = visible;
    }

    /// Stream connection state.
    pub fn stream_state(&self) -> StreamState {
        self.stream
    }

    /// Record the stream connection state.
    pub fn set_stream_state(&mut self, state: StreamState) {
        self.stream = state;
    }

    /// Immutable view for the display layer.
    pub fn snapshot(&self) -> TimelineSnapshot {
        TimelineSnapshot {
            filter: self.filter.clone(),
            generation: self.generation,
            entries: self.store.shared(),
            phase: self.cursor.phase(),
            is_loading_initial: self.cursor.is_loading(LoadKind::Initial),
            is_loading_older: self.cursor.is_loading(LoadKind::Older),
            is_loading_newer: self.cursor.is_loading(LoadKind::Newer),
            has_more: self.cursor.has_more(),
            pending_count: self.pending.len(),
            last_error: self.cursor.last_error().map(str::to_string),
            processed_events: self.ingest.processed(),
            dropped_events: self.ingest.dropped(),
            stream: self.stream,
        }
    }

    fn check_generation(&self, ticket: &LoadTicket) -> Result<(), FeedError> {
        if ticket.generation == self.generation {
            Ok(())
        } else {
            Err(FeedError::StaleResult {
                captured: ticket.generation,
                current: self.generation,
            })
        }
    }

    fn merge_streamed(&mut self, entries: Vec<Entry>) -> StreamApplied {
        let first = entries.first().map(|e| e.id);
        let report = self.store.merge_newer(entries);
        self.cursor.observe(&self.store);

        match (report.inserted, first) {
            (0, Some(id)) => StreamApplied::Duplicate(id),
            (0, None) => StreamApplied::Ignored,
            (count, _) => StreamApplied::Merged { count },
        }
    }

    fn prefetch_older(&mut self) -> Option<LoadTicket> {
        if self.prefetcher.recompute(&self.store, &self.cursor).load_older {
            self.begin_load(LoadKind::Older).ok()
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: u64) -> Entry {
        Entry::new(EntryId::new(id), "alice", id, &format!("content:{}", id))
    }

    fn entries(ids: impl IntoIterator<Item = u64>) -> Vec<Entry> {
        ids.into_iter().map(entry).collect()
    }

    fn ids(timeline: &Timeline) -> Vec<u64> {
        timeline
            .store()
            .entries()
            .iter()
            .map(|e| e.id.value())
            .collect()
    }

    fn config(page_size: usize) -> TimelineConfig {
        TimelineConfig {
            page_size,
            ..TimelineConfig::default()
        }
    }

    fn loaded(page: impl IntoIterator<Item = u64>, page_size: usize) -> Timeline {
        let mut timeline = Timeline::new(Filter::Home, config(page_size));
        let ticket = timeline.begin_load(LoadKind::Initial).unwrap();
        timeline.apply_page(&ticket, entries(page)).unwrap();
        timeline
    }

    fn create(id: u64) -> StreamEvent {
        StreamEvent::Create(entry(id))
    }

    // ===========================================
    // Pagination
    // ===========================================

    #[test]
    fn initial_then_older_scenario() {
        let mut timeline = loaded((91..=100).rev(), 10);
        assert_eq!(timeline.store().len(), 10);

        let ticket = timeline.begin_load(LoadKind::Older).unwrap();
        assert_eq!(ticket.max_id, Some(EntryId::new(91)));
        let applied = timeline
            .apply_page(&ticket, entries((81..=90).rev()))
            .unwrap();

        assert_eq!(applied.report.inserted, 10);
        assert_eq!(timeline.store().len(), 20);
        assert_eq!(timeline.cursor().min_id(), Some(EntryId::new(81)));

        // An overlapping page must not duplicate id 85.
        let ticket = timeline.begin_load(LoadKind::Older).unwrap();
        let applied = timeline.apply_page(&ticket, entries([85, 80])).unwrap();
        assert_eq!(applied.report.duplicates, vec![EntryId::new(85)]);
        assert_eq!(
            timeline
                .store()
                .entries()
                .iter()
                .filter(|e| e.id.value() == 85)
                .count(),
            1
        );
        assert!(!applied.has_more);
    }

    #[test]
    fn replace_bumps_generation() {
        let mut timeline = Timeline::new(Filter::Home, config(10));
        let ticket = timeline.begin_load(LoadKind::Initial).unwrap();
        assert_eq!(ticket.generation, 0);
        timeline.apply_page(&ticket, entries([3, 2, 1])).unwrap();
        assert_eq!(timeline.generation(), 1);
    }

    #[test]
    fn older_page_started_before_refresh_is_stale() {
        let mut timeline = loaded(91..=100, 10);
        let older = timeline.begin_load(LoadKind::Older).unwrap();
        let refresh = timeline.begin_load(LoadKind::Initial).unwrap();
        timeline.apply_page(&refresh, entries(191..=200)).unwrap();

        let result = timeline.apply_page(&older, entries(81..=90));
        assert!(matches!(result, Err(FeedError::StaleResult { .. })));
        assert_eq!(timeline.store().min_id(), Some(EntryId::new(191)));
        assert!(!timeline.cursor().is_loading(LoadKind::Older));
    }

    #[test]
    fn failed_load_keeps_contents() {
        let mut timeline = loaded(91..=100, 10);
        let ticket = timeline.begin_load(LoadKind::Initial).unwrap();
        timeline.fail_load(&ticket, "offline").unwrap();

        assert_eq!(timeline.store().len(), 10);
        let snapshot = timeline.snapshot();
        assert_eq!(snapshot.last_error.as_deref(), Some("offline"));
        assert_eq!(snapshot.phase, LoadPhase::Error);
        assert!(!snapshot.is_loading_initial);
    }

    #[test]
    fn newer_page_merges_at_head() {
        let mut timeline = loaded(91..=100, 10);
        let ticket = timeline.begin_load(LoadKind::Newer).unwrap();
        assert_eq!(ticket.min_id, Some(EntryId::new(100)));

        let applied = timeline.apply_page(&ticket, entries([102, 101])).unwrap();
        assert_eq!(applied.report.inserted_at_head, 2);
        assert_eq!(timeline.cursor().max_id(), Some(EntryId::new(102)));
        assert!(timeline.cursor().has_more());
    }

    // ===========================================
    // Filter Changes
    // ===========================================

    #[test]
    fn stale_generation_is_discarded() {
        let mut timeline = loaded(91..=100, 10);
        let ticket = timeline.begin_load(LoadKind::Older).unwrap();

        timeline.set_filter(Filter::Local);
        let result = timeline.apply_page(&ticket, entries(81..=90));

        assert!(matches!(result, Err(FeedError::StaleResult { .. })));
        assert!(timeline.store().is_empty());
        assert!(timeline.fail_load(&ticket, "late").is_err());
        assert_eq!(timeline.snapshot().last_error, None);
    }

    #[test]
    fn set_filter_resets_everything() {
        let mut timeline = loaded(91..=100, 10);
        timeline.set_visible(true);
        timeline.apply_stream_event(create(101));
        let before = timeline.generation();

        let generation = timeline.set_filter(Filter::hashtag("rust"));

        assert_eq!(generation, before + 1);
        assert!(timeline.store().is_empty());
        assert!(timeline.pending().is_empty());
        assert!(!timeline.cursor().is_populated());
        assert_eq!(timeline.filter(), &Filter::hashtag("rust"));
    }

    #[test]
    fn latest_resolves_to_home() {
        let mut timeline = Timeline::new(Filter::Local, TimelineConfig::default());
        timeline.set_filter(Filter::Latest);
        assert_eq!(timeline.filter(), &Filter::Home);
        assert_eq!(Timeline::new(Filter::Latest, TimelineConfig::default()).filter(), &Filter::Home);
    }

    // ===========================================
    // Stream Routing
    // ===========================================

    #[test]
    fn pending_flush_scenario() {
        let mut timeline = loaded(191..=200, 10);
        timeline.set_visible(true);

        for id in [201, 202, 203] {
            assert!(matches!(
                timeline.apply_stream_event(create(id)),
                StreamApplied::Queued { .. }
            ));
        }
        assert_eq!(timeline.snapshot().pending_count, 3);
        assert_eq!(ids(&timeline)[0], 200);

        let outcome = timeline.flush_pending();
        assert_eq!(outcome.count, 3);
        assert_eq!(&ids(&timeline)[..4], &[203, 202, 201, 200]);
        assert_eq!(timeline.snapshot().pending_count, 0);
    }

    #[test]
    fn flush_is_idempotent() {
        let mut timeline = loaded(191..=200, 10);
        timeline.set_visible(true);
        timeline.apply_stream_event(create(201));

        timeline.flush_pending();
        let after_first = ids(&timeline);
        assert_eq!(timeline.flush_pending(), FlushOutcome::default());
        assert_eq!(ids(&timeline), after_first);
    }

    #[test]
    fn flush_anchors_on_top_visible_entry() {
        let mut timeline = loaded(191..=200, 10);
        timeline.set_visible(true);
        timeline.visible_range_changed(2, 6);
        for id in [201, 202, 203] {
            timeline.apply_stream_event(create(id));
        }

        let outcome = timeline.flush_pending();
        assert_eq!(
            outcome.anchor,
            Some(ScrollAnchor {
                entry_id: EntryId::new(198),
                offset_index: 5,
            })
        );
    }

    #[test]
    fn flush_anchors_on_previous_head_without_range() {
        let mut timeline = loaded(191..=200, 10);
        timeline.set_visible(true);
        timeline.apply_stream_event(create(201));

        let anchor = timeline.flush_pending().anchor;
        assert_eq!(anchor.map(|a| (a.entry_id.value(), a.offset_index)), Some((200, 1)));
    }

    #[test]
    fn hidden_timeline_merges_creates_directly() {
        let mut timeline = loaded(191..=200, 10);
        assert_eq!(
            timeline.apply_stream_event(create(201)),
            StreamApplied::Merged { count: 1 }
        );
        assert_eq!(ids(&timeline)[0], 201);
        assert_eq!(timeline.cursor().max_id(), Some(EntryId::new(201)));
    }

    #[test]
    fn duplicate_create_is_absorbed() {
        let mut timeline = loaded(191..=200, 10);
        assert_eq!(
            timeline.apply_stream_event(create(200)),
            StreamApplied::Duplicate(EntryId::new(200))
        );
        timeline.set_visible(true);
        let applied = timeline.apply_stream_event(create(199));
        assert_eq!(applied, StreamApplied::Duplicate(EntryId::new(199)));
        assert_eq!(
            applied.as_feed_error(),
            Some(FeedError::DuplicateIgnored(EntryId::new(199)))
        );
        assert!(!applied.as_feed_error().is_some_and(|e| e.is_surfaced()));
        assert_eq!(timeline.store().len(), 10);
        assert!(timeline.pending().is_empty());
    }

    #[test]
    fn absorbed_conditions_map_to_feed_errors() {
        let mut timeline = loaded(191..=200, 10);
        let dropped = timeline.apply_frame("not json");
        assert!(matches!(
            dropped.as_feed_error(),
            Some(FeedError::StreamDecodeFailure(_))
        ));
        assert_eq!(StreamApplied::Merged { count: 1 }.as_feed_error(), None);
        assert_eq!(StreamApplied::Ignored.as_feed_error(), None);
    }

    #[test]
    fn pending_overflow_merges_oldest() {
        let mut timeline = Timeline::new(
            Filter::Home,
            TimelineConfig {
                pending_capacity: 2,
                ..config(10)
            },
        );
        let ticket = timeline.begin_load(LoadKind::Initial).unwrap();
        timeline.apply_page(&ticket, entries(191..=200)).unwrap();
        timeline.set_visible(true);

        timeline.apply_stream_event(create(201));
        timeline.apply_stream_event(create(202));
        assert_eq!(
            timeline.apply_stream_event(create(203)),
            StreamApplied::Merged { count: 1 }
        );
        assert_eq!(ids(&timeline)[0], 201);
        assert_eq!(timeline.pending().len(), 2);
    }

    #[test]
    fn edits_and_deletes_apply_immediately() {
        let mut timeline = loaded(191..=200, 10);
        timeline.set_visible(true);

        let mut edited = entry(195);
        edited.content_ref = "edited".into();
        assert_eq!(
            timeline.apply_stream_event(StreamEvent::Update(edited)),
            StreamApplied::Updated(EntryId::new(195))
        );
        assert_eq!(
            timeline.store().get(EntryId::new(195)).map(|e| e.content_ref.as_str()),
            Some("edited")
        );

        assert_eq!(
            timeline.apply_stream_event(StreamEvent::Delete(EntryId::new(195))),
            StreamApplied::Removed(EntryId::new(195))
        );
        assert!(!timeline.store().contains(EntryId::new(195)));
        assert_eq!(
            timeline.apply_stream_event(StreamEvent::Delete(EntryId::new(5))),
            StreamApplied::Ignored
        );
    }

    #[test]
    fn delete_reaches_pending_entries() {
        let mut timeline = loaded(191..=200, 10);
        timeline.set_visible(true);
        timeline.apply_stream_event(create(201));

        assert_eq!(
            timeline.apply_stream_event(StreamEvent::Delete(EntryId::new(201))),
            StreamApplied::Removed(EntryId::new(201))
        );
        assert_eq!(timeline.flush_pending().count, 0);
    }

    #[test]
    fn malformed_frames_are_counted() {
        let mut timeline = loaded(191..=200, 10);
        assert!(matches!(
            timeline.apply_frame("not json"),
            StreamApplied::Dropped(_)
        ));

        let good = create(201).encode().unwrap();
        assert_eq!(
            timeline.apply_frame(&good),
            StreamApplied::Merged { count: 1 }
        );
        let snapshot = timeline.snapshot();
        assert_eq!(snapshot.dropped_events, 1);
        assert_eq!(snapshot.processed_events, 1);
    }

    #[test]
    fn newer_page_prunes_pending() {
        let mut timeline = loaded(191..=200, 10);
        timeline.set_visible(true);
        timeline.apply_stream_event(create(201));
        timeline.apply_stream_event(create(205));

        let ticket = timeline.begin_load(LoadKind::Newer).unwrap();
        timeline.apply_page(&ticket, entries([203, 202, 201])).unwrap();
        assert_eq!(timeline.pending().ids().collect::<Vec<_>>(), vec![EntryId::new(205)]);
    }

    // ===========================================
    // Prefetch
    // ===========================================

    #[test]
    fn prefetch_scenario_fires_once() {
        let mut timeline = loaded((1..=18).rev(), 18);

        let first = timeline.visible_range_changed(0, 14);
        let ticket = first.older.expect("older load should start");
        assert_eq!(ticket.max_id, Some(EntryId::new(1)));
        assert!(timeline.snapshot().is_loading_older);

        let second = timeline.visible_range_changed(0, 14);
        assert!(second.older.is_none());
    }

    #[test]
    fn prefetch_chains_while_still_near_end() {
        let mut timeline = loaded(101..=118, 18);
        let ticket = timeline.visible_range_changed(10, 17).older.unwrap();

        // A short page ends pagination.
        let applied = timeline.apply_page(&ticket, entries([100, 99])).unwrap();
        assert!(applied.next_older.is_none());
        assert!(!applied.has_more);
    }

    #[test]
    fn prefetch_follow_up_after_full_page() {
        let mut timeline = loaded(101..=104, 2);
        let ticket = timeline.visible_range_changed(0, 3).older.unwrap();

        let applied = timeline.apply_page(&ticket, entries([100, 99])).unwrap();
        assert!(applied.has_more);
        let next = applied.next_older.expect("still within margin");
        assert_eq!(next.max_id, Some(EntryId::new(99)));
    }

    #[test]
    fn refresh_forgets_reported_range() {
        let mut timeline = loaded((1..=60).rev(), 20);
        let reported = timeline.visible_range_changed(5, 50);
        assert!(reported.older.is_none());

        let ticket = timeline.begin_load(LoadKind::Initial).unwrap();
        let applied = timeline.apply_page(&ticket, entries((51..=70).rev())).unwrap();
        assert!(applied.has_more);
        assert!(applied.next_older.is_none());
        assert!(!timeline.snapshot().is_loading_older);

        // Entry 55 survived the refresh but is no longer known to be on screen.
        timeline.set_visible(true);
        timeline.apply_stream_event(create(71));
        let anchor = timeline.flush_pending().anchor;
        assert_eq!(anchor.map(|a| (a.entry_id.value(), a.offset_index)), Some((70, 1)));
    }

    #[test]
    fn snapshot_shares_entries() {
        let timeline = loaded(1..=5, 10);
        let a = timeline.snapshot();
        let b = timeline.snapshot();
        assert!(Arc::ptr_eq(&a.entries, &b.entries));
        assert_eq!(a.ids().len(), 5);
    }
}
