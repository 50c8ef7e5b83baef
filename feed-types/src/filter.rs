//! Feed filters.
//!
//! A [`Filter`] selects which entries belong to a feed. Exactly one filter is
//! active per engine; changing it invalidates the store and cursors.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::entry::{normalize_tag, Entry};

/// Selection criteria defining a feed.
///
/// `RemoteLocal` nests another filter that is evaluated against a different
/// server than the session's home server.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Filter {
    /// Entries from followed accounts.
    Home,
    /// Entries local to the home server.
    Local,
    /// Entries from all known servers.
    Federated,
    /// Entries from the members of a list.
    List {
        /// List identifier.
        list_id: String,
    },
    /// Entries carrying a hashtag, optionally scoped to one account.
    Hashtag {
        /// Tag name without the leading `#`.
        tag: String,
        /// Restrict to entries by this account.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        account_id: Option<String>,
    },
    /// A filter evaluated against a remote server.
    RemoteLocal {
        /// Host name of the remote server.
        server: String,
        /// The filter applied on that server.
        filter: Box<Filter>,
    },
    /// "Jump to newest": a full reload of the home feed.
    Latest,
}

impl Filter {
    /// Build a hashtag filter, normalizing the tag name.
    pub fn hashtag(tag: &str) -> Self {
        Filter::Hashtag {
            tag: normalize_tag(tag),
            account_id: None,
        }
    }

    /// Build a list filter.
    pub fn list(list_id: &str) -> Self {
        Filter::List {
            list_id: list_id.to_string(),
        }
    }

    /// Build a remote filter for `server`.
    pub fn remote(server: &str, filter: Filter) -> Self {
        Filter::RemoteLocal {
            server: server.to_string(),
            filter: Box::new(filter),
        }
    }

    /// The default filter menu.
    pub fn available(authenticated: bool) -> Vec<Filter> {
        if authenticated {
            vec![Filter::Home, Filter::Local, Filter::Federated]
        } else {
            vec![Filter::Local, Filter::Federated]
        }
    }

    /// Human-readable label.
    pub fn title(&self) -> String {
        match self {
            Filter::Home => "Home".to_string(),
            Filter::Local => "Local".to_string(),
            Filter::Federated => "Federated".to_string(),
            Filter::List { list_id } => format!("List {}", list_id),
            Filter::Hashtag { tag, .. } => format!("#{}", tag),
            Filter::RemoteLocal { server, filter } => format!("{} · {}", server, filter.title()),
            Filter::Latest => "Latest".to_string(),
        }
    }

    /// Whether stream creates may be withheld in the pending buffer.
    pub fn supports_newest_pagination(&self) -> bool {
        match self {
            Filter::RemoteLocal { filter, .. } => filter.supports_newest_pagination(),
            Filter::Latest => false,
            _ => true,
        }
    }

    /// Effective server identity. `None` means the session's home server.
    pub fn server(&self) -> Option<&str> {
        match self {
            Filter::RemoteLocal { server, .. } => Some(server.as_str()),
            _ => None,
        }
    }

    /// Push channel this filter listens on.
    pub fn stream_channel(&self) -> String {
        match self {
            Filter::Home | Filter::Latest => "user".to_string(),
            Filter::Local => "public:local".to_string(),
            Filter::Federated => "public".to_string(),
            Filter::List { list_id } => format!("list:{}", list_id),
            Filter::Hashtag { tag, .. } => format!("hashtag:{}", tag),
            Filter::RemoteLocal { filter, .. } => filter.stream_channel(),
        }
    }

    /// Whether a streamed entry belongs to this feed.
    pub fn admits(&self, entry: &Entry) -> bool {
        match self {
            Filter::Hashtag { tag, account_id } => {
                entry.has_tag(tag)
                    && account_id
                        .as_deref()
                        .map_or(true, |account| account == entry.author_id)
            }
            Filter::RemoteLocal { filter, .. } => filter.admits(entry),
            _ => true,
        }
    }

    /// Resolve `Latest` to the feed it reloads.
    pub fn resolved(&self) -> Filter {
        match self {
            Filter::Latest => Filter::Home,
            other => other.clone(),
        }
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.title())
    }
}
