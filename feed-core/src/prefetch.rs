//! Prefetch decisions for tideline.
//!
//! The display layer reports its visible index range `[lo, hi]`. When the
//! bottom of that range comes within `margin` entries of the end of the
//! store, the feed should load older entries before the consumer gets there.
//! The entries just below `hi` are reported for warm-loading.
//!
//! This module only decides. Starting the load (and with it marking the
//! cursor as busy, which makes repeated triggers no-ops) is up to the caller.

use feed_types::{EntryId, LoadKind};

use crate::cursor::CursorManager;
use crate::store::EntryStore;

/// Outcome of evaluating a visible range.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PrefetchDecision {
    /// An older page should be requested now.
    pub load_older: bool,
    /// Entries just below the visible range, for warm-loading.
    pub warm: Vec<EntryId>,
}

/// Margin-based trigger for loading older pages.
#[derive(Debug, Clone)]
pub struct Prefetcher {
    margin: usize,
    warm_ahead: usize,
    last_range: Option<(usize, usize)>,
}

impl Prefetcher {
    /// Create a prefetcher with trigger margin `margin` that reports
    /// `warm_ahead` entries below the visible range.
    pub fn new(margin: usize, warm_ahead: usize) -> Self {
        Self {
            margin,
            warm_ahead,
            last_range: None,
        }
    }

    /// Trigger margin.
    pub fn margin(&self) -> usize {
        self.margin
    }

    /// Last reported visible range.
    pub fn last_range(&self) -> Option<(usize, usize)> {
        self.last_range
    }

    /// Record a new visible range and evaluate it.
    ///
    /// A reversed range is normalized.
    pub fn on_visible_range(
        &mut self,
        lo: usize,
        hi: usize,
        store: &EntryStore,
        cursor: &CursorManager,
    ) -> PrefetchDecision {
        self.last_range = Some((lo.min(hi), lo.max(hi)));
        self.recompute(store, cursor)
    }

    /// Re-evaluate the last visible range after the store changed.
    pub fn recompute(&self, store: &EntryStore, cursor: &CursorManager) -> PrefetchDecision {
        let Some((_, hi)) = self.last_range else {
            return PrefetchDecision::default();
        };
        let total = store.len();
        if total == 0 {
            return PrefetchDecision::default();
        }

        let hi = hi.min(total - 1);
        let near_end = total - hi <= self.margin;
        let load_older = near_end
            && cursor.has_more()
            && cursor.is_populated()
            && !cursor.is_loading(LoadKind::Older)
            && !cursor.is_loading(LoadKind::Initial);

        let warm = store.entries()[hi + 1..]
            .iter()
            .take(self.warm_ahead)
            .map(|e| e.id)
            .collect();

        PrefetchDecision { load_older, warm }
    }

    /// Forget the last visible range.
    pub fn reset(&mut self) {
        self.last_range = None;
    }
}
