//! Feed entries.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::ids::EntryId;

/// One feed item: a post, or a boost of another post.
///
/// Entries are immutable once created; identity is [`Entry::id`]. An edit
/// event produces a new `Entry` with the same id that replaces the old one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    /// Orderable identifier assigned by the remote service.
    pub id: EntryId,
    /// Account that authored (or boosted) this entry.
    pub author_id: String,
    /// Creation time, Unix seconds.
    pub created_at: u64,
    /// Opaque handle the display layer uses to resolve content.
    pub content_ref: String,
    /// Id of the original entry when this entry is a boost.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub boost_of: Option<EntryId>,
    /// Lower-cased hashtag names attached to the entry.
    #[serde(default)]
    pub filter_tags: BTreeSet<String>,
}

impl Entry {
    /// Create a new entry with no boost target and no tags.
    pub fn new(id: EntryId, author_id: &str, created_at: u64, content_ref: &str) -> Self {
        Self {
            id,
            author_id: author_id.to_string(),
            created_at,
            content_ref: content_ref.to_string(),
            boost_of: None,
            filter_tags: BTreeSet::new(),
        }
    }

    /// Mark this entry as a boost of `original`.
    pub fn with_boost_of(mut self, original: EntryId) -> Self {
        self.boost_of = Some(original);
        self
    }

    /// Attach hashtags. Names are stored lower-cased without a leading `#`.
    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.filter_tags.extend(tags.into_iter().map(|t| normalize_tag(t.as_ref())));
        self
    }

    /// Whether this entry is a boost of another entry.
    pub fn is_boost(&self) -> bool {
        self.boost_of.is_some()
    }

    /// Whether the entry carries the given hashtag (case-insensitive).
    pub fn has_tag(&self, tag: &str) -> bool {
        self.filter_tags.contains(&normalize_tag(tag))
    }
}

pub(crate) fn normalize_tag(tag: &str) -> String {
    tag.trim().trim_start_matches('#').to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entry_builder() {
        let entry = Entry::new(EntryId::new(5), "alice", 1_700_000_000, "content:5")
            .with_boost_of(EntryId::new(3))
            .with_tags(["#Rust", "async"]);

        assert!(entry.is_boost());
        assert_eq!(entry.boost_of, Some(EntryId::new(3)));
        assert!(entry.has_tag("rust"));
        assert!(entry.has_tag("#ASYNC"));
        assert!(!entry.has_tag("go"));
    }

    #[test]
    fn entry_deserializes_with_defaults() {
        let json = r#"{"id":"12","author_id":"bob","created_at":10,"content_ref":"c"}"#;
        let entry: Entry = serde_json::from_str(json).unwrap();
        assert_eq!(entry.id, EntryId::new(12));
        assert!(entry.boost_of.is_none());
        assert!(entry.filter_tags.is_empty());
    }
}
