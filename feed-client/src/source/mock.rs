//! Mock collaborators for testing.
//!
//! Allows queueing pages and frames, injecting failures, holding a fetch
//! open, and capturing requests for verification. Clones share state, so a
//! test keeps one handle while the engine owns another.

use super::{Directory, FeedSource, FrameStream, PageRequest, SourceError, StreamSource};
use async_trait::async_trait;
use feed_types::{Entry, Filter, StreamEvent};
use futures::channel::mpsc;
use futures::StreamExt;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::oneshot;

/// How long `wait_for_*` helpers poll before giving up.
const WAIT_LIMIT: Duration = Duration::from_secs(5);

/// Poll `check` until it holds or [`WAIT_LIMIT`] passes.
async fn wait_until(mut check: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + WAIT_LIMIT;
    while !check() {
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
    true
}

/// Releases a fetch held by [`MockFeedSource::hold_next`].
#[derive(Debug)]
pub struct FetchGate(oneshot::Sender<()>);

impl FetchGate {
    /// Let the held fetch return.
    pub fn release(self) {
        let _ = self.0.send(());
    }
}

// ===========================================
// MockFeedSource
// ===========================================

/// Mock paginated source.
///
/// Pages are returned in the order they were queued, whatever the request.
/// An empty queue answers with an empty page.
#[derive(Debug, Default, Clone)]
pub struct MockFeedSource {
    inner: Arc<Mutex<MockFeedInner>>,
}

#[derive(Debug, Default)]
struct MockFeedInner {
    pages: VecDeque<Vec<Entry>>,
    calls: Vec<(Filter, PageRequest)>,
    fail_next: Option<String>,
    held: Option<oneshot::Receiver<()>>,
}

impl MockFeedSource {
    /// Create a new mock source.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MockFeedInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queue a page to be returned by the next `fetch_page()` call.
    pub fn queue_page(&self, entries: Vec<Entry>) {
        self.lock().pages.push_back(entries);
    }

    /// Cause the next `fetch_page()` to fail with the given error.
    pub fn fail_next(&self, error: &str) {
        self.lock().fail_next = Some(error.to_string());
    }

    /// Hold the next `fetch_page()` open until the returned gate is released
    /// (or dropped).
    pub fn hold_next(&self) -> FetchGate {
        let (tx, rx) = oneshot::channel();
        self.lock().held = Some(rx);
        FetchGate(tx)
    }

    /// Get all requests that were made.
    pub fn calls(&self) -> Vec<(Filter, PageRequest)> {
        self.lock().calls.clone()
    }

    /// Number of requests made so far.
    pub fn call_count(&self) -> usize {
        self.lock().calls.len()
    }

    /// Wait until at least `count` requests have been made.
    pub async fn wait_for_calls(&self, count: usize) -> bool {
        wait_until(|| self.call_count() >= count).await
    }
}

#[async_trait]
impl FeedSource for MockFeedSource {
    async fn fetch_page(
        &self,
        filter: &Filter,
        request: PageRequest,
    ) -> Result<Vec<Entry>, SourceError> {
        let (response, held) = {
            let mut inner = self.lock();
            inner.calls.push((filter.clone(), request));

            // Check for forced failure
            let response = match inner.fail_next.take() {
                Some(error) => Err(SourceError::RequestFailed(error)),
                None => Ok(inner.pages.pop_front().unwrap_or_default()),
            };
            (response, inner.held.take())
        };

        if let Some(gate) = held {
            let _ = gate.await;
        }
        response
    }
}

// ===========================================
// MockStreamSource
// ===========================================

/// Mock streaming source.
///
/// Frames pushed while nothing is subscribed are kept and delivered to the
/// next subscription.
#[derive(Debug, Default, Clone)]
pub struct MockStreamSource {
    inner: Arc<Mutex<MockStreamInner>>,
}

#[derive(Debug, Default)]
struct MockStreamInner {
    subscriptions: Vec<Filter>,
    sender: Option<mpsc::UnboundedSender<Result<String, SourceError>>>,
    backlog: VecDeque<String>,
    fail_next_subscribe: Option<String>,
}

impl MockStreamSource {
    /// Create a new mock stream.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MockStreamInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Deliver a raw frame.
    pub fn push_frame(&self, text: impl Into<String>) {
        let text = text.into();
        let mut inner = self.lock();
        let undelivered = match &inner.sender {
            Some(tx) => tx.unbounded_send(Ok(text)).err().map(|e| e.into_inner()),
            None => Some(Ok(text)),
        };
        if let Some(Ok(text)) = undelivered {
            inner.backlog.push_back(text);
        }
    }

    /// Encode and deliver an event.
    pub fn push_event(&self, event: &StreamEvent) {
        if let Ok(text) = event.encode() {
            self.push_frame(text);
        }
    }

    /// End the current subscription cleanly.
    pub fn end_stream(&self) {
        self.lock().sender = None;
    }

    /// End the current subscription with an error.
    pub fn fail_stream(&self, error: &str) {
        if let Some(tx) = self.lock().sender.take() {
            let _ = tx.unbounded_send(Err(SourceError::RequestFailed(error.to_string())));
        }
    }

    /// Cause the next `subscribe()` to fail with the given error.
    pub fn fail_next_subscribe(&self, error: &str) {
        self.lock().fail_next_subscribe = Some(error.to_string());
    }

    /// Filters passed to every `subscribe()` call so far.
    pub fn subscriptions(&self) -> Vec<Filter> {
        self.lock().subscriptions.clone()
    }

    /// Check if a subscription is currently open.
    pub fn is_subscribed(&self) -> bool {
        self.lock()
            .sender
            .as_ref()
            .is_some_and(|tx| !tx.is_closed())
    }

    /// Wait until at least `count` subscriptions have been attempted.
    pub async fn wait_for_subscriptions(&self, count: usize) -> bool {
        wait_until(|| self.lock().subscriptions.len() >= count).await
    }
}

#[async_trait]
impl StreamSource for MockStreamSource {
    async fn subscribe(&self, filter: &Filter) -> Result<FrameStream, SourceError> {
        let mut inner = self.lock();
        inner.subscriptions.push(filter.clone());

        // Check for forced failure
        if let Some(error) = inner.fail_next_subscribe.take() {
            return Err(SourceError::ConnectionFailed(error));
        }

        let (tx, rx) = mpsc::unbounded();
        for text in inner.backlog.drain(..) {
            let _ = tx.unbounded_send(Ok(text));
        }
        inner.sender = Some(tx);
        Ok(rx.boxed())
    }
}

// ===========================================
// StaticDirectory
// ===========================================

/// Fixed directory contents.
#[derive(Debug, Default, Clone)]
pub struct StaticDirectory {
    inner: Arc<Mutex<StaticDirectoryInner>>,
}

#[derive(Debug, Default)]
struct StaticDirectoryInner {
    lists: Vec<String>,
    tags: Vec<String>,
    servers: Vec<String>,
    fail: Option<String>,
}

impl StaticDirectory {
    /// Create an empty directory.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, StaticDirectoryInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Set the list ids.
    pub fn with_lists<I: IntoIterator<Item = S>, S: Into<String>>(self, lists: I) -> Self {
        self.lock().lists = lists.into_iter().map(Into::into).collect();
        self
    }

    /// Set the followed tags.
    pub fn with_tags<I: IntoIterator<Item = S>, S: Into<String>>(self, tags: I) -> Self {
        self.lock().tags = tags.into_iter().map(Into::into).collect();
        self
    }

    /// Set the pinned servers.
    pub fn with_servers<I: IntoIterator<Item = S>, S: Into<String>>(self, servers: I) -> Self {
        self.lock().servers = servers.into_iter().map(Into::into).collect();
        self
    }

    /// Make every list and tag lookup fail.
    pub fn fail_lookups(&self, error: &str) {
        self.lock().fail = Some(error.to_string());
    }

    fn lookup(&self, pick: impl Fn(&StaticDirectoryInner) -> &Vec<String>) -> Result<Vec<String>, SourceError> {
        let inner = self.lock();
        match &inner.fail {
            Some(error) => Err(SourceError::RequestFailed(error.clone())),
            None => Ok(pick(&inner).clone()),
        }
    }
}

#[async_trait]
impl Directory for StaticDirectory {
    async fn lists(&self) -> Result<Vec<String>, SourceError> {
        self.lookup(|inner| &inner.lists)
    }

    async fn followed_tags(&self) -> Result<Vec<String>, SourceError> {
        self.lookup(|inner| &inner.tags)
    }

    async fn pinned_servers(&self) -> Result<Vec<String>, SourceError> {
        Ok(self.lock().servers.clone())
    }
}
