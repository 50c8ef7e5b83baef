//! Pending buffer for tideline.
//!
//! Streamed entries that arrive while the consumer is reading the top of a
//! feed are withheld here instead of being merged, so the reading position
//! stays put. The buffer provides:
//! - Arrival-order storage of withheld entries
//! - Dedup against both the buffer and the entry store
//! - A capacity cap: beyond it the oldest buffered entries are handed back
//!   for immediate merge instead of growing without bound

use std::collections::{HashSet, VecDeque};

use feed_types::{Entry, EntryId};

use crate::store::EntryStore;

/// Default maximum number of withheld entries.
pub const DEFAULT_PENDING_CAPACITY: usize = 200;

/// What happened to an entry offered to the buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnqueueOutcome {
    /// The entry is now withheld.
    Queued,
    /// The id was already buffered or visible.
    Duplicate,
    /// The entry is not newer than the store head; merge it directly.
    NotNewer(Entry),
    /// The entry was queued but the cap was exceeded; the returned oldest
    /// entries were evicted and must be merged now.
    Overflowed(Vec<Entry>),
}

/// Holding area for streamed entries not yet revealed.
#[derive(Debug, Clone)]
pub struct PendingBuffer {
    /// Maximum number of withheld entries.
    capacity: usize,
    /// Withheld entries in arrival order.
    queue: VecDeque<Entry>,
    /// Ids in `queue`, for dedup.
    ids: HashSet<EntryId>,
}

impl PendingBuffer {
    /// Create a buffer with the given capacity.
    ///
    /// A capacity of 0 is treated as 1.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            queue: VecDeque::new(),
            ids: HashSet::new(),
        }
    }

    /// Maximum number of withheld entries.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of withheld entries (the "N new posts" count).
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// Check if nothing is withheld.
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Check if an entry is withheld.
    pub fn contains(&self, id: EntryId) -> bool {
        self.ids.contains(&id)
    }

    /// Withheld ids in arrival order.
    pub fn ids(&self) -> impl Iterator<Item = EntryId> + '_ {
        self.queue.iter().map(|e| e.id)
    }

    /// Offer a streamed entry.
    pub fn enqueue(&mut self, entry: Entry, store: &EntryStore) -> EnqueueOutcome {
        if self.ids.contains(&entry.id) || store.contains(entry.id) {
            return EnqueueOutcome::Duplicate;
        }
        if store.max_id().is_some_and(|head| entry.id <= head) {
            return EnqueueOutcome::NotNewer(entry);
        }

        self.ids.insert(entry.id);
        self.queue.push_back(entry);

        if self.queue.len() <= self.capacity {
            return EnqueueOutcome::Queued;
        }

        let excess = self.queue.len() - self.capacity;
        let evicted: Vec<Entry> = self.queue.drain(..excess).collect();
        for entry in &evicted {
            self.ids.remove(&entry.id);
        }
        EnqueueOutcome::Overflowed(evicted)
    }

    /// Take every withheld entry in arrival order, leaving the buffer empty.
    pub fn flush(&mut self) -> Vec<Entry> {
        self.ids.clear();
        self.queue.drain(..).collect()
    }

    /// Drop every withheld entry without merging. Returns how many were dropped.
    pub fn discard(&mut self) -> usize {
        let count = self.queue.len();
        self.queue.clear();
        self.ids.clear();
        count
    }

    /// Drop withheld entries that the store now covers: ids already present
    /// and anything not newer than the store head.
    pub fn prune(&mut self, store: &EntryStore) -> usize {
        let before = self.queue.len();
        let head = store.max_id();
        self.queue
            .retain(|e| !store.contains(e.id) && head.map_or(true, |head| e.id > head));
        let ids = &mut self.ids;
        ids.clear();
        ids.extend(self.queue.iter().map(|e| e.id));
        before - self.queue.len()
    }

    /// Drop a withheld entry that was deleted upstream.
    pub fn remove(&mut self, id: EntryId) -> bool {
        if !self.ids.remove(&id) {
            return false;
        }
        self.queue.retain(|e| e.id != id);
        true
    }

    /// Apply an edit to a withheld entry.
    pub fn update(&mut self, entry: Entry) -> Result<(), Entry> {
        match self.queue.iter_mut().find(|e| e.id == entry.id) {
            Some(slot) => {
                *slot = entry;
                Ok(())
            }
            None => Err(entry),
        }
    }
}

impl Default for PendingBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_PENDING_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: u64) -> Entry {
        Entry::new(EntryId::new(id), "alice", id, "c")
    }

    fn store_up_to(max: u64) -> EntryStore {
        let mut store = EntryStore::new();
        store.replace(((max - 9)..=max).map(entry).collect());
        store
    }

    fn ids(entries: &[Entry]) -> Vec<u64> {
        entries.iter().map(|e| e.id.value()).collect()
    }

    // ===========================================
    // Enqueue
    // ===========================================

    #[test]
    fn enqueue_withholds_newer_entries() {
        let store = store_up_to(200);
        let mut pending = PendingBuffer::default();

        for id in [201, 202, 203] {
            assert_eq!(pending.enqueue(entry(id), &store), EnqueueOutcome::Queued);
        }
        assert_eq!(pending.len(), 3);
        assert_eq!(
            pending.ids().map(|id| id.value()).collect::<Vec<_>>(),
            vec![201, 202, 203]
        );
    }

    #[test]
    fn enqueue_rejects_buffered_and_visible_ids() {
        let store = store_up_to(200);
        let mut pending = PendingBuffer::default();
        pending.enqueue(entry(201), &store);

        assert_eq!(pending.enqueue(entry(201), &store), EnqueueOutcome::Duplicate);
        assert_eq!(pending.enqueue(entry(200), &store), EnqueueOutcome::Duplicate);
        assert_eq!(pending.len(), 1);
    }

    #[test]
    fn enqueue_hands_back_entries_older_than_head() {
        let mut store = store_up_to(200);
        store.remove(EntryId::new(195));
        let mut pending = PendingBuffer::default();

        assert_eq!(
            pending.enqueue(entry(195), &store),
            EnqueueOutcome::NotNewer(entry(195))
        );
        assert!(pending.is_empty());
    }

    #[test]
    fn enqueue_into_empty_store_queues() {
        let store = EntryStore::new();
        let mut pending = PendingBuffer::default();
        assert_eq!(pending.enqueue(entry(1), &store), EnqueueOutcome::Queued);
    }

    #[test]
    fn overflow_evicts_oldest_for_merge() {
        let store = store_up_to(200);
        let mut pending = PendingBuffer::new(3);

        for id in 201..=203 {
            pending.enqueue(entry(id), &store);
        }
        match pending.enqueue(entry(204), &store) {
            EnqueueOutcome::Overflowed(evicted) => assert_eq!(ids(&evicted), vec![201]),
            other => panic!("expected overflow, got {:?}", other),
        }
        assert_eq!(pending.len(), 3);
        assert!(!pending.contains(EntryId::new(201)));
        assert!(pending.contains(EntryId::new(204)));
    }

    #[test]
    fn zero_capacity_is_clamped() {
        assert_eq!(PendingBuffer::new(0).capacity(), 1);
    }

    // ===========================================
    // Flush and Discard
    // ===========================================

    #[test]
    fn flush_returns_arrival_order_and_empties() {
        let store = store_up_to(200);
        let mut pending = PendingBuffer::default();
        for id in [202, 201, 203] {
            pending.enqueue(entry(id), &store);
        }

        assert_eq!(ids(&pending.flush()), vec![202, 201, 203]);
        assert!(pending.is_empty());
        assert!(pending.flush().is_empty());
    }

    #[test]
    fn discard_drops_everything() {
        let store = store_up_to(200);
        let mut pending = PendingBuffer::default();
        pending.enqueue(entry(201), &store);
        pending.enqueue(entry(202), &store);

        assert_eq!(pending.discard(), 2);
        assert!(pending.is_empty());
        assert_eq!(pending.enqueue(entry(201), &store), EnqueueOutcome::Queued);
    }

    #[test]
    fn prune_drops_entries_covered_by_store() {
        let mut store = store_up_to(200);
        let mut pending = PendingBuffer::default();
        for id in [201, 202, 205] {
            pending.enqueue(entry(id), &store);
        }

        store.merge_newer(vec![entry(203), entry(202)]);
        assert_eq!(pending.prune(&store), 2);
        assert_eq!(ids(&pending.flush()), vec![205]);
    }

    // ===========================================
    // Deletes and Edits
    // ===========================================

    #[test]
    fn remove_drops_withheld_entry() {
        let store = store_up_to(200);
        let mut pending = PendingBuffer::default();
        pending.enqueue(entry(201), &store);
        pending.enqueue(entry(202), &store);

        assert!(pending.remove(EntryId::new(201)));
        assert!(!pending.remove(EntryId::new(201)));
        assert_eq!(ids(&pending.flush()), vec![202]);
    }

    #[test]
    fn update_replaces_withheld_entry() {
        let store = store_up_to(200);
        let mut pending = PendingBuffer::default();
        pending.enqueue(entry(201), &store);

        let mut edited = entry(201);
        edited.content_ref = "edited".into();
        assert!(pending.update(edited).is_ok());
        assert!(pending.update(entry(300)).is_err());
        assert_eq!(pending.flush()[0].content_ref, "edited");
    }
}
