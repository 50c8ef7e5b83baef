//! TimelineEngine - the main interface for tideline.
//!
//! This module provides [`TimelineEngine`], the API the display layer uses
//! to drive one feed.
//!
//! # Architecture
//!
//! The engine owns a pure [`Timeline`] (from feed-core) behind a single
//! mutex, performs fetches through [`FeedSource`] and runs one stream task
//! per `(server, channel)` pair through [`StreamSource`]. Fetches suspend
//! outside the lock; merges happen inside it and never yield.
//!
//! ```text
//! Display layer → TimelineEngine → FeedSource / StreamSource → Network
//!                       ↓
//!                 feed-core Timeline (pure)
//!                       ↓
//!            watch::Receiver<TimelineSnapshot>
//! ```
//!
//! # Example
//!
//! ```ignore
//! use feed_client::{EngineConfig, MockFeedSource, MockStreamSource, TimelineEngine};
//!
//! let engine = TimelineEngine::new(EngineConfig::default(), feed, stream, Filter::Home);
//! engine.start().await?;
//!
//! let mut changes = engine.subscribe_changes();
//! engine.set_visible(true).await;
//! engine.visible_range_changed(0, 14).await;
//! let revealed = engine.flush_pending().await;
//! ```

use std::sync::Arc;

use feed_core::{
    Action, CursorError, Event, FlushOutcome, LoadTicket, StreamNotice, StreamState, Timeline,
    TimelineSnapshot,
};
use feed_types::{EntryId, FeedError, Filter, LoadKind};
use futures::future::{BoxFuture, FutureExt, Shared};
use futures::StreamExt;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;

use crate::config::EngineConfig;
use crate::source::{FeedSource, FrameStream, PageRequest, SourceError, StreamSource};

/// Outcome of a load that did not fail.
///
/// Everything except `Applied` is a benign no-op.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadOutcome {
    /// The page was merged.
    Applied {
        /// Which load completed.
        kind: LoadKind,
        /// Raw entries returned by the source.
        returned: usize,
        /// Entries inserted after dedup.
        inserted: usize,
    },
    /// A conflicting load is in flight.
    AlreadyInProgress(LoadKind),
    /// The older end of the feed has been reached.
    NoMoreData,
    /// No initial load has completed yet.
    NotLoaded,
    /// The filter changed or the feed was replaced while the load was in
    /// flight; the result was discarded.
    Stale {
        /// Generation the load started in.
        captured: u64,
        /// Generation when the result arrived.
        current: u64,
    },
}

impl LoadOutcome {
    /// Check if the page was merged.
    pub fn is_applied(&self) -> bool {
        matches!(self, Self::Applied { .. })
    }

    /// The benign condition in error-taxonomy form, if any.
    pub fn as_feed_error(&self) -> Option<FeedError> {
        match self {
            Self::AlreadyInProgress(kind) => Some(FeedError::ConcurrentLoadRejected(*kind)),
            Self::Stale { captured, current } => Some(FeedError::StaleResult {
                captured: *captured,
                current: *current,
            }),
            _ => None,
        }
    }
}

impl From<CursorError> for LoadOutcome {
    fn from(err: CursorError) -> Self {
        match err {
            CursorError::AlreadyInProgress(kind) => Self::AlreadyInProgress(kind),
            CursorError::NoMoreData => Self::NoMoreData,
            CursorError::NotLoaded => Self::NotLoaded,
        }
    }
}

/// Result of a visible range report.
#[derive(Debug)]
pub struct Prefetch {
    /// Entries just below the visible range, for warm-loading.
    pub warm: Vec<EntryId>,
    /// The older load that was started, if any.
    pub load: Option<JoinHandle<Result<LoadOutcome, FeedError>>>,
}

type LoadFuture = Shared<BoxFuture<'static, Result<LoadOutcome, FeedError>>>;

/// An in-flight refresh shared by every caller in the same generation.
struct Flight {
    generation: u64,
    future: LoadFuture,
}

/// Connection identity of a stream: effective server and channel.
type StreamKey = (Option<String>, String);

fn stream_key(filter: &Filter) -> StreamKey {
    (filter.server().map(str::to_string), filter.stream_channel())
}

/// The running stream task and the connection identity it serves.
struct StreamTask {
    key: StreamKey,
    handle: JoinHandle<()>,
}

struct Inner<F, S> {
    config: EngineConfig,
    feed: F,
    stream: S,
    timeline: Mutex<Timeline>,
    changes: watch::Sender<TimelineSnapshot>,
    refresh: Mutex<Option<Flight>>,
    stream_task: Mutex<Option<StreamTask>>,
}

/// The feed engine.
///
/// Cheap to clone; clones share the same feed. Call [`shutdown`](Self::shutdown)
/// to stop the stream task.
pub struct TimelineEngine<F, S> {
    inner: Arc<Inner<F, S>>,
}

impl<F, S> Clone for TimelineEngine<F, S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<F, S> TimelineEngine<F, S>
where
    F: FeedSource + 'static,
    S: StreamSource + 'static,
{
    /// Create an engine for `filter`. Nothing is fetched until
    /// [`start`](Self::start).
    pub fn new(config: EngineConfig, feed: F, stream: S, filter: Filter) -> Self {
        let timeline = Timeline::new(filter, config.timeline());
        let (changes, _) = watch::channel(timeline.snapshot());
        Self {
            inner: Arc::new(Inner {
                config,
                feed,
                stream,
                timeline: Mutex::new(timeline),
                changes,
                refresh: Mutex::new(None),
                stream_task: Mutex::new(None),
            }),
        }
    }

    /// Open the stream and perform the initial load.
    pub async fn start(&self) -> Result<LoadOutcome, FeedError> {
        let filter = self.inner.timeline.lock().await.filter().clone();
        self.connect_stream(&filter).await;
        self.pull_to_refresh().await
    }

    /// Switch to another filter and load it.
    ///
    /// In-flight loads for the previous filter are discarded when they
    /// arrive. The stream is re-subscribed only if the effective server or
    /// channel changed.
    pub async fn set_filter(&self, filter: Filter) -> Result<LoadOutcome, FeedError> {
        let filter = {
            let mut slot = self.inner.stream_task.lock().await;
            let mut timeline = self.inner.timeline.lock().await;
            let generation = timeline.set_filter(filter);
            tracing::info!(filter = %timeline.filter(), generation, "Filter changed");

            // The old stream must not apply another frame to the new feed.
            let key = stream_key(timeline.filter());
            if slot.as_ref().is_some_and(|task| task.key != key) {
                if let Some(old) = slot.take() {
                    old.handle.abort();
                    tracing::info!("Stream for {:?} stopped", old.key);
                }
            }

            self.inner.publish(&timeline);
            timeline.filter().clone()
        };

        self.connect_stream(&filter).await;
        self.pull_to_refresh().await
    }

    /// Reload the newest page, replacing the current contents.
    ///
    /// If a refresh is already in flight for the active filter, waits for
    /// it and returns its outcome instead of fetching again. On failure the
    /// current contents are kept and a [`FeedError::NetworkFailure`] is
    /// returned.
    pub async fn pull_to_refresh(&self) -> Result<LoadOutcome, FeedError> {
        let future = {
            let mut slot = self.inner.refresh.lock().await;
            let generation = self.inner.timeline.lock().await.generation();

            match slot.as_ref() {
                Some(flight) if flight.generation == generation && flight.future.peek().is_none() => {
                    tracing::debug!(generation, "Joining in-flight refresh");
                    flight.future.clone()
                }
                _ => {
                    let inner = Arc::clone(&self.inner);
                    let future = inner.load(LoadKind::Initial).boxed().shared();
                    *slot = Some(Flight {
                        generation,
                        future: future.clone(),
                    });
                    future
                }
            }
        };

        future.await
    }

    /// Load the next older page.
    pub async fn load_older(&self) -> Result<LoadOutcome, FeedError> {
        Arc::clone(&self.inner).load(LoadKind::Older).await
    }

    /// Catch up on entries newer than the head.
    ///
    /// Pages until a page comes back shorter than `page_size`. If
    /// `max_newer_pages` full pages arrive the gap is too large to stitch,
    /// and the feed is refreshed instead.
    pub async fn load_newer(&self) -> Result<LoadOutcome, FeedError> {
        let page_size = self.inner.config.page_size;
        let mut returned_total = 0;
        let mut inserted_total = 0;

        for _ in 0..self.inner.config.max_newer_pages {
            let (ticket, filter) = match self.inner.begin(LoadKind::Newer).await {
                Ok(started) => started,
                Err(outcome) => return Ok(outcome),
            };
            let (result, next_older) = self.inner.execute(ticket, filter.clone()).await;
            if let Some(next) = next_older {
                self.inner.spawn_older(next, filter);
            }

            match result? {
                LoadOutcome::Applied {
                    returned, inserted, ..
                } => {
                    returned_total += returned;
                    inserted_total += inserted;
                    if returned < page_size {
                        return Ok(LoadOutcome::Applied {
                            kind: LoadKind::Newer,
                            returned: returned_total,
                            inserted: inserted_total,
                        });
                    }
                }
                other => return Ok(other),
            }
        }

        tracing::info!(
            pages = self.inner.config.max_newer_pages,
            "Newer gap too large, refreshing"
        );
        self.pull_to_refresh().await
    }

    /// The app returned to the foreground.
    ///
    /// Catches up with newer pages when the filter supports it and the feed
    /// is loaded; otherwise refreshes.
    pub async fn on_foreground(&self) -> Result<LoadOutcome, FeedError> {
        let catch_up = {
            let timeline = self.inner.timeline.lock().await;
            timeline.filter().supports_newest_pagination() && timeline.cursor().max_id().is_some()
        };

        if catch_up {
            self.load_newer().await
        } else {
            self.pull_to_refresh().await
        }
    }

    /// Report the consumer's visible index range.
    ///
    /// Starts an older load in the background when the range is near the
    /// end of the feed. Repeated reports while that load is in flight start
    /// nothing.
    pub async fn visible_range_changed(&self, lo: usize, hi: usize) -> Prefetch {
        let (changed, filter) = {
            let mut timeline = self.inner.timeline.lock().await;
            let changed = timeline.visible_range_changed(lo, hi);
            self.inner.publish(&timeline);
            (changed, timeline.filter().clone())
        };

        let load = changed.older.map(|ticket| {
            tracing::debug!(lo, hi, max_id = ?ticket.max_id, "Prefetching older page");
            self.inner.spawn_older(ticket, filter)
        });

        Prefetch {
            warm: changed.warm,
            load,
        }
    }

    /// Reveal withheld stream entries.
    pub async fn flush_pending(&self) -> FlushOutcome {
        let mut timeline = self.inner.timeline.lock().await;
        let outcome = timeline.flush_pending();
        if outcome.count > 0 {
            tracing::debug!(count = outcome.count, anchor = ?outcome.anchor, "Flushed pending entries");
        }
        self.inner.publish(&timeline);
        outcome
    }

    /// Record whether the timeline is on screen and focused.
    pub async fn set_visible(&self, visible: bool) {
        let mut timeline = self.inner.timeline.lock().await;
        timeline.set_visible(visible);
        self.inner.publish(&timeline);
    }

    /// Clear the failure banner.
    pub async fn dismiss_error(&self) {
        let mut timeline = self.inner.timeline.lock().await;
        timeline.clear_error();
        self.inner.publish(&timeline);
    }

    /// Receive a snapshot after every change.
    pub fn subscribe_changes(&self) -> watch::Receiver<TimelineSnapshot> {
        self.inner.changes.subscribe()
    }

    /// The latest snapshot.
    pub fn snapshot(&self) -> TimelineSnapshot {
        self.inner.changes.borrow().clone()
    }

    /// Stop the stream task.
    pub async fn shutdown(&self) {
        if let Some(task) = self.inner.stream_task.lock().await.take() {
            task.handle.abort();
        }

        let mut timeline = self.inner.timeline.lock().await;
        let policy = self.inner.config.reconnect.policy();
        let (state, actions) = timeline
            .stream_state()
            .on_event(Event::DisconnectRequested, &policy);
        for action in &actions {
            if let Action::Emit(notice) = action {
                log_notice(notice, timeline.filter());
            }
        }
        timeline.set_stream_state(state);
        self.inner.publish(&timeline);
    }

    /// Get a reference to the feed source (for testing).
    pub fn feed(&self) -> &F {
        &self.inner.feed
    }

    /// Get a reference to the stream source (for testing).
    pub fn stream(&self) -> &S {
        &self.inner.stream
    }

    /// Make sure a stream task serves `filter`'s server and channel.
    async fn connect_stream(&self, filter: &Filter) {
        let key = stream_key(filter);
        let mut slot = self.inner.stream_task.lock().await;

        if let Some(task) = slot.as_ref() {
            if task.key == key && !task.handle.is_finished() {
                return;
            }
        }
        if let Some(old) = slot.take() {
            old.handle.abort();
            tracing::info!("Stream for {:?} replaced", old.key);
        }

        let inner = Arc::clone(&self.inner);
        let handle = tokio::spawn(run_stream(inner, filter.clone()));
        *slot = Some(StreamTask { key, handle });
    }
}

impl<F, S> Inner<F, S>
where
    F: FeedSource + 'static,
    S: StreamSource + 'static,
{
    fn publish(&self, timeline: &Timeline) {
        self.changes.send_replace(timeline.snapshot());
    }

    async fn set_stream_state(&self, state: StreamState) {
        let mut timeline = self.timeline.lock().await;
        timeline.set_stream_state(state);
        self.publish(&timeline);
    }

    /// Start a load and capture the filter it is for.
    async fn begin(&self, kind: LoadKind) -> Result<(LoadTicket, Filter), LoadOutcome> {
        let mut timeline = self.timeline.lock().await;
        match timeline.begin_load(kind) {
            Ok(ticket) => {
                self.publish(&timeline);
                Ok((ticket, timeline.filter().clone()))
            }
            Err(err) => {
                tracing::debug!(kind = %kind, reason = %err, "Load not started");
                Err(err.into())
            }
        }
    }

    /// Start and run one load, chaining any older load it triggers.
    async fn load(self: Arc<Self>, kind: LoadKind) -> Result<LoadOutcome, FeedError> {
        let (ticket, filter) = match self.begin(kind).await {
            Ok(started) => started,
            Err(outcome) => return Ok(outcome),
        };

        let (result, next_older) = self.execute(ticket, filter.clone()).await;
        if let Some(next) = next_older {
            self.spawn_older(next, filter);
        }
        result
    }

    /// Fetch and apply a started load.
    ///
    /// Also returns the follow-up older load the prefetcher started, which
    /// the caller must run.
    async fn execute(
        &self,
        ticket: LoadTicket,
        filter: Filter,
    ) -> (Result<LoadOutcome, FeedError>, Option<LoadTicket>) {
        let fetched = self
            .feed
            .fetch_page(&filter, PageRequest::from(&ticket))
            .await;

        let mut timeline = self.timeline.lock().await;
        let result = match fetched {
            Ok(entries) => match timeline.apply_page(&ticket, entries) {
                Ok(applied) => {
                    tracing::debug!(
                        kind = %applied.kind,
                        returned = applied.returned,
                        inserted = applied.report.inserted,
                        duplicates = applied.report.duplicates.len(),
                        generation = timeline.generation(),
                        "Applied page"
                    );
                    if applied.kind == LoadKind::Initial {
                        tracing::info!(
                            filter = %filter,
                            count = timeline.store().len(),
                            "Refresh complete"
                        );
                    }
                    let outcome = LoadOutcome::Applied {
                        kind: applied.kind,
                        returned: applied.returned,
                        inserted: applied.report.inserted,
                    };
                    (Ok(outcome), applied.next_older)
                }
                Err(err) => (stale_or_error(err, ticket.kind), None),
            },
            Err(source_err) => {
                let message = source_err.to_string();
                match timeline.fail_load(&ticket, &message) {
                    Ok(()) => {
                        tracing::warn!(kind = %ticket.kind, filter = %filter, "Fetch failed: {}", message);
                        (Err(FeedError::NetworkFailure(message)), None)
                    }
                    Err(err) => (stale_or_error(err, ticket.kind), None),
                }
            }
        };

        self.publish(&timeline);
        result
    }

    /// Run a started older load in the background, following any chained
    /// loads until the viewport is far enough from the end.
    fn spawn_older(
        self: &Arc<Self>,
        ticket: LoadTicket,
        filter: Filter,
    ) -> JoinHandle<Result<LoadOutcome, FeedError>> {
        let inner = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticket = ticket;
            loop {
                let (result, next_older) = inner.execute(ticket, filter.clone()).await;
                match next_older {
                    Some(next) => ticket = next,
                    None => return result,
                }
            }
        })
    }
}

fn stale_or_error(err: FeedError, kind: LoadKind) -> Result<LoadOutcome, FeedError> {
    match err {
        FeedError::StaleResult { captured, current } => {
            tracing::warn!(kind = %kind, captured, current, "Discarded stale result");
            Ok(LoadOutcome::Stale { captured, current })
        }
        other => Err(other),
    }
}

fn log_notice(notice: &StreamNotice, filter: &Filter) {
    match notice {
        StreamNotice::Connected => {
            tracing::info!(channel = %filter.stream_channel(), "Stream subscribed")
        }
        StreamNotice::ConnectFailed { error } => {
            tracing::warn!(channel = %filter.stream_channel(), "Stream subscribe failed: {}", error)
        }
        StreamNotice::Lost { reason } => tracing::warn!("Stream lost: {}", reason),
        StreamNotice::ReconnectFailed { attempt, error } => {
            tracing::warn!(attempt, "Stream reconnect failed: {}", error)
        }
        StreamNotice::Closed => tracing::info!("Stream closed"),
    }
}

/// Drive the stream state machine for `filter` until the task is aborted.
///
/// Frames are applied one at a time in arrival order.
async fn run_stream<F, S>(inner: Arc<Inner<F, S>>, filter: Filter)
where
    F: FeedSource + 'static,
    S: StreamSource + 'static,
{
    let policy = inner.config.reconnect.policy();
    let key = stream_key(&filter);
    let mut state = StreamState::new();
    let mut next = Some(Event::ConnectRequested);
    let mut frames: Option<FrameStream> = None;

    while let Some(event) = next.take() {
        let (new_state, actions) = state.on_event(event, &policy);
        state = new_state;
        inner.set_stream_state(state).await;

        for action in actions {
            match action {
                Action::Subscribe => {
                    next = Some(match inner.stream.subscribe(&filter).await {
                        Ok(stream) => {
                            frames = Some(stream);
                            Event::ConnectSucceeded
                        }
                        Err(e) => Event::ConnectFailed {
                            error: e.to_string(),
                        },
                    });
                }
                Action::StartReconnectTimer { delay } => {
                    tracing::debug!(delay_ms = delay.as_millis() as u64, "Reconnecting stream");
                    tokio::time::sleep(delay).await;
                    next = Some(Event::ReconnectTimer);
                }
                Action::CancelReconnect => {}
                Action::Emit(notice) => log_notice(&notice, &filter),
            }
        }

        if next.is_none() {
            if let Some(stream) = frames.take() {
                let reason = consume_frames(&inner, &key, stream).await;
                next = Some(Event::StreamEnded { reason });
            }
        }
    }
}

/// Apply frames until the stream ends. Returns why it ended.
///
/// Frames are only applied while the active filter still maps to `key`.
async fn consume_frames<F, S>(
    inner: &Inner<F, S>,
    key: &StreamKey,
    mut frames: FrameStream,
) -> String
where
    F: FeedSource + 'static,
    S: StreamSource + 'static,
{
    while let Some(frame) = frames.next().await {
        let text = match frame {
            Ok(text) => text,
            Err(e) => return e.to_string(),
        };

        let mut timeline = inner.timeline.lock().await;
        if stream_key(timeline.filter()) != *key {
            tracing::debug!(?key, "Discarded frame from a replaced stream");
            continue;
        }

        let applied = timeline.apply_frame(&text);
        match applied.as_feed_error() {
            Some(FeedError::StreamDecodeFailure(err)) => tracing::warn!(
                dropped = timeline.ingest().dropped(),
                "Dropped stream frame: {}",
                err
            ),
            Some(absorbed) => tracing::debug!("{}", absorbed),
            None => tracing::debug!(?applied, "Applied stream event"),
        }
        inner.publish(&timeline);
    }
    SourceError::Closed.to_string()
}
