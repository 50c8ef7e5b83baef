//! Replay fixtures.
//!
//! A fixture scripts one session: the pages the server would answer with,
//! the frames the stream would deliver, and the consumer actions to perform.
//!
//! ```json
//! {
//!   "filter": { "kind": "home" },
//!   "pages": {
//!     "initial": [[{ "id": "100", "author_id": "a", "created_at": 0, "content_ref": "c" }]],
//!     "older": [],
//!     "newer": []
//!   },
//!   "stream": ["{\"event\":\"delete\",\"payload\":\"100\"}"],
//!   "steps": [{ "op": "stream", "count": 1 }, { "op": "scroll", "lo": 0, "hi": 0 }]
//! }
//! ```

use anyhow::{Context, Result};
use async_trait::async_trait;
use feed_client::{FeedSource, PageRequest, SourceError};
use feed_types::{Entry, Filter, LoadKind};
use serde::Deserialize;
use std::collections::VecDeque;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};

/// A scripted session.
#[derive(Debug, Clone, Deserialize)]
pub struct Fixture {
    /// Filter active when the session starts.
    #[serde(default = "default_filter")]
    pub filter: Filter,
    /// Server responses, consumed in order per request kind.
    #[serde(default)]
    pub pages: FixturePages,
    /// Raw stream frames, delivered by `stream` steps.
    #[serde(default)]
    pub stream: Vec<String>,
    /// Consumer actions.
    #[serde(default)]
    pub steps: Vec<Step>,
}

fn default_filter() -> Filter {
    Filter::Home
}

/// Page responses per request kind.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FixturePages {
    /// Answers to requests without bounds.
    #[serde(default)]
    pub initial: VecDeque<Vec<Entry>>,
    /// Answers to requests with `max_id`.
    #[serde(default)]
    pub older: VecDeque<Vec<Entry>>,
    /// Answers to requests with `min_id`.
    #[serde(default)]
    pub newer: VecDeque<Vec<Entry>>,
}

/// One consumer action.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Step {
    /// Pull to refresh.
    Refresh,
    /// Report a visible index range.
    Scroll {
        /// First visible index.
        lo: usize,
        /// Last visible index.
        hi: usize,
    },
    /// Deliver the next `count` stream frames.
    Stream {
        /// Number of frames.
        count: usize,
    },
    /// Reveal withheld entries.
    Flush,
    /// Switch filters.
    Filter {
        /// The new filter.
        filter: Filter,
    },
    /// Load the next older page.
    Older,
    /// Catch up on newer entries.
    Newer,
    /// Return from the background.
    Foreground,
    /// Show or hide the timeline.
    Visible {
        /// Whether the timeline is on screen.
        visible: bool,
    },
}

impl Fixture {
    /// Load a fixture from a JSON file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read fixture {}", path.display()))?;
        serde_json::from_str(&contents).context("Invalid fixture")
    }
}

/// Page source answering from a fixture.
///
/// The request kind is inferred from its bounds. An exhausted queue answers
/// with an empty page; every page is cut to the request limit.
#[derive(Debug, Clone, Default)]
pub struct FixtureSource {
    pages: Arc<Mutex<FixturePages>>,
}

impl FixtureSource {
    /// Create a source serving `pages`.
    pub fn new(pages: FixturePages) -> Self {
        Self {
            pages: Arc::new(Mutex::new(pages)),
        }
    }
}

fn request_kind(request: &PageRequest) -> LoadKind {
    match (request.max_id, request.min_id) {
        (Some(_), _) => LoadKind::Older,
        (None, Some(_)) => LoadKind::Newer,
        (None, None) => LoadKind::Initial,
    }
}

#[async_trait]
impl FeedSource for FixtureSource {
    async fn fetch_page(
        &self,
        filter: &Filter,
        request: PageRequest,
    ) -> Result<Vec<Entry>, SourceError> {
        let kind = request_kind(&request);
        let mut pages = self.pages.lock().unwrap_or_else(PoisonError::into_inner);
        let queue = match kind {
            LoadKind::Initial => &mut pages.initial,
            LoadKind::Older => &mut pages.older,
            LoadKind::Newer => &mut pages.newer,
        };

        let mut page = queue.pop_front().unwrap_or_default();
        page.truncate(request.limit);
        tracing::debug!(filter = %filter, kind = %kind, count = page.len(), "Fixture page");
        Ok(page)
    }
}
