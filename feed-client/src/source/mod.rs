//! Collaborator abstraction for tideline.
//!
//! The engine never talks to a network itself. It consumes three
//! collaborators through traits:
//! - [`FeedSource`] answers paginated page requests
//! - [`StreamSource`] opens a live sequence of raw push frames
//! - [`Directory`] lists the lists, tags and servers used to build the
//!   filter menu
//!
//! Timeout and retry policy belong to the implementations. The engine only
//! distinguishes success from failure.
//!
//! # Example
//!
//! ```ignore
//! let feed = MockFeedSource::new();
//! feed.queue_page(entries);
//! let page = feed.fetch_page(&Filter::Home, PageRequest::initial(20)).await?;
//! ```

mod mock;

pub use mock::{FetchGate, MockFeedSource, MockStreamSource, StaticDirectory};

use async_trait::async_trait;
use feed_core::LoadTicket;
use feed_types::{Entry, EntryId, Filter};
use futures::stream::BoxStream;
use thiserror::Error;

/// Collaborator errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SourceError {
    /// The request could not be completed.
    #[error("request failed: {0}")]
    RequestFailed(String),

    /// A stream subscription could not be opened.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// The stream was closed by the remote side.
    #[error("stream closed")]
    Closed,
}

/// Parameters of one page request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    /// Return entries strictly older than this id.
    pub max_id: Option<EntryId>,
    /// Return entries strictly newer than this id.
    pub min_id: Option<EntryId>,
    /// Maximum number of entries.
    pub limit: usize,
}

impl PageRequest {
    /// Request the newest page.
    pub fn initial(limit: usize) -> Self {
        Self {
            max_id: None,
            min_id: None,
            limit,
        }
    }
}

impl From<&LoadTicket> for PageRequest {
    fn from(ticket: &LoadTicket) -> Self {
        Self {
            max_id: ticket.max_id,
            min_id: ticket.min_id,
            limit: ticket.limit,
        }
    }
}

/// A live sequence of raw text frames.
pub type FrameStream = BoxStream<'static, Result<String, SourceError>>;

/// Paginated fetch collaborator.
#[async_trait]
pub trait FeedSource: Send + Sync {
    /// Fetch one page of `filter`, newest first.
    async fn fetch_page(
        &self,
        filter: &Filter,
        request: PageRequest,
    ) -> Result<Vec<Entry>, SourceError>;
}

/// Streaming collaborator.
///
/// A subscription never restarts by itself: when the returned stream ends
/// or yields an error, re-subscribing is up to the caller.
#[async_trait]
pub trait StreamSource: Send + Sync {
    /// Open the push channel for `filter`.
    async fn subscribe(&self, filter: &Filter) -> Result<FrameStream, SourceError>;
}

/// Read-only account directory used to build the filter menu.
#[async_trait]
pub trait Directory: Send + Sync {
    /// Ids of the account's lists.
    async fn lists(&self) -> Result<Vec<String>, SourceError>;

    /// Hashtags the account follows.
    async fn followed_tags(&self) -> Result<Vec<String>, SourceError>;

    /// Remote servers pinned by the account.
    async fn pinned_servers(&self) -> Result<Vec<String>, SourceError>;
}

/// Build the filter menu.
///
/// Starts from [`Filter::available`], then adds lists, followed hashtags and
/// the local feed of every pinned server. Lists and tags require an
/// authenticated session; a directory lookup that fails is left out of the
/// menu rather than failing it.
pub async fn filter_menu<D: Directory + ?Sized>(directory: &D, authenticated: bool) -> Vec<Filter> {
    let mut menu = Filter::available(authenticated);

    if authenticated {
        match directory.lists().await {
            Ok(lists) => menu.extend(lists.iter().map(|id| Filter::list(id))),
            Err(e) => tracing::warn!("List lookup failed: {}", e),
        }
        match directory.followed_tags().await {
            Ok(tags) => menu.extend(tags.iter().map(|tag| Filter::hashtag(tag))),
            Err(e) => tracing::warn!("Tag lookup failed: {}", e),
        }
    }

    match directory.pinned_servers().await {
        Ok(servers) => menu.extend(
            servers
                .iter()
                .map(|server| Filter::remote(server, Filter::Local)),
        ),
        Err(e) => tracing::warn!("Server lookup failed: {}", e),
    }

    menu.dedup();
    menu
}
