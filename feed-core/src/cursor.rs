//! Pagination cursor management for tideline.
//!
//! This module tracks the boundary identifiers of the active feed with:
//! - `max_id` / `min_id` bounds for requesting newer/older pages
//! - `has_more`, which only describes the older end of the feed
//! - One in-flight flag per load kind, so a second request of the same kind
//!   is rejected instead of queued
//!
//! A load is started with [`CursorManager::begin`], which hands out a
//! [`LoadTicket`] carrying the request parameters and the generation that
//! was current when the load started. The ticket is given back on completion.

use feed_types::{EntryId, LoadKind};
use thiserror::Error;

use crate::store::EntryStore;

/// Reasons a load cannot start.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CursorError {
    /// A load that conflicts with this one is in flight.
    #[error("{0} load already in progress")]
    AlreadyInProgress(LoadKind),
    /// The older end of the feed has been reached.
    #[error("no more data")]
    NoMoreData,
    /// No initial load has populated the cursor yet.
    #[error("cursor not loaded")]
    NotLoaded,
}

/// Observable phase of the cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoadPhase {
    /// Nothing in flight.
    #[default]
    Idle,
    /// Initial load or refresh in flight.
    LoadingInitial,
    /// Older page in flight.
    LoadingOlder,
    /// Newer page in flight.
    LoadingNewer,
    /// Last load failed.
    Error,
}

/// Parameters of an in-flight load.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadTicket {
    /// Which load this is.
    pub kind: LoadKind,
    /// Generation captured when the load started.
    pub generation: u64,
    /// Return entries strictly older than this id.
    pub max_id: Option<EntryId>,
    /// Return entries strictly newer than this id.
    pub min_id: Option<EntryId>,
    /// Requested page size.
    pub limit: usize,
}

/// Boundary and in-flight state for one filter.
#[derive(Debug, Clone)]
pub struct CursorManager {
    max_id: Option<EntryId>,
    min_id: Option<EntryId>,
    has_more: bool,
    loading_initial: bool,
    loading_older: bool,
    loading_newer: bool,
    last_error: Option<String>,
}

impl CursorManager {
    /// Create an empty cursor.
    pub fn new() -> Self {
        Self {
            max_id: None,
            min_id: None,
            has_more: true,
            loading_initial: false,
            loading_older: false,
            loading_newer: false,
            last_error: None,
        }
    }

    /// Largest id known to the feed.
    pub fn max_id(&self) -> Option<EntryId> {
        self.max_id
    }

    /// Smallest id known to the feed.
    pub fn min_id(&self) -> Option<EntryId> {
        self.min_id
    }

    /// Whether older pages may exist.
    pub fn has_more(&self) -> bool {
        self.has_more
    }

    /// Check if a load of this kind is in flight.
    pub fn is_loading(&self, kind: LoadKind) -> bool {
        match kind {
            LoadKind::Initial => self.loading_initial,
            LoadKind::Older => self.loading_older,
            LoadKind::Newer => self.loading_newer,
        }
    }

    /// Message of the last failed load, cleared on the next success.
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Current phase.
    pub fn phase(&self) -> LoadPhase {
        if self.loading_initial {
            LoadPhase::LoadingInitial
        } else if self.loading_older {
            LoadPhase::LoadingOlder
        } else if self.loading_newer {
            LoadPhase::LoadingNewer
        } else if self.last_error.is_some() {
            LoadPhase::Error
        } else {
            LoadPhase::Idle
        }
    }

    /// Whether the cursor has been populated by a load.
    pub fn is_populated(&self) -> bool {
        self.min_id.is_some()
    }

    /// Start a load.
    ///
    /// Older and newer loads are rejected while an initial load is in flight,
    /// since their boundaries are about to be replaced.
    pub fn begin(
        &mut self,
        kind: LoadKind,
        generation: u64,
        limit: usize,
    ) -> Result<LoadTicket, CursorError> {
        if self.is_loading(kind) {
            return Err(CursorError::AlreadyInProgress(kind));
        }

        let (max_id, min_id) = match kind {
            LoadKind::Initial => (None, None),
            LoadKind::Older => {
                if self.loading_initial {
                    return Err(CursorError::AlreadyInProgress(LoadKind::Initial));
                }
                let min = self.min_id.ok_or(CursorError::NotLoaded)?;
                if !self.has_more {
                    return Err(CursorError::NoMoreData);
                }
                (Some(min), None)
            }
            LoadKind::Newer => {
                if self.loading_initial {
                    return Err(CursorError::AlreadyInProgress(LoadKind::Initial));
                }
                let max = self.max_id.ok_or(CursorError::NotLoaded)?;
                (None, Some(max))
            }
        };

        self.set_loading(kind, true);
        Ok(LoadTicket {
            kind,
            generation,
            max_id,
            min_id,
            limit,
        })
    }

    /// Complete a load whose page has been merged into `store`.
    ///
    /// `returned` is the raw page length before dedup.
    pub fn complete(&mut self, ticket: &LoadTicket, returned: usize, store: &EntryStore) {
        self.set_loading(ticket.kind, false);
        self.last_error = None;

        match ticket.kind {
            LoadKind::Initial => {
                // Pages started against the replaced contents are discarded
                // by their generation, so their flags are cleared here.
                self.loading_older = false;
                self.loading_newer = false;
                self.max_id = store.max_id();
                self.min_id = store.min_id();
                self.has_more = returned > 0;
            }
            LoadKind::Older => {
                self.has_more = returned >= ticket.limit;
                self.observe(store);
            }
            LoadKind::Newer => self.observe(store),
        }
    }

    /// Record a failed load. Boundaries are left untouched.
    pub fn fail(&mut self, kind: LoadKind, message: impl Into<String>) {
        self.set_loading(kind, false);
        self.last_error = Some(message.into());
    }

    /// Clear the last error (`Error → Idle`).
    pub fn clear_error(&mut self) {
        self.last_error = None;
    }

    /// Widen the bounds to cover everything in `store`.
    pub fn observe(&mut self, store: &EntryStore) {
        if let Some(head) = store.max_id() {
            self.max_id = Some(self.max_id.map_or(head, |max| max.max(head)));
        }
        if let Some(tail) = store.min_id() {
            self.min_id = Some(self.min_id.map_or(tail, |min| min.min(tail)));
        }
    }

    fn set_loading(&mut self, kind: LoadKind, loading: bool) {
        match kind {
            LoadKind::Initial => self.loading_initial = loading,
            LoadKind::Older => self.loading_older = loading,
            LoadKind::Newer => self.loading_newer = loading,
        }
    }
}

impl Default for CursorManager {
    fn default() -> Self {
        Self::new()
    }
}
