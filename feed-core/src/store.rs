//! Entry store for tideline.
//!
//! This module holds the ordered, deduplicated sequence of entries for the
//! active filter:
//! - Sorted by id descending (newest first) at all times
//! - No two entries share an id
//! - Cheap snapshots: entries live behind an `Arc`, so a snapshot handed to
//!   the display layer is a reference count bump, and the next mutation
//!   copies only if that snapshot is still alive
//!
//! Every merge operation funnels through one sorted merge, so the ordering
//! and dedup invariants hold whatever order the input arrives in.

use std::collections::HashSet;
use std::sync::Arc;

use feed_types::{Entry, EntryId};

/// Result of merging a batch of entries into the store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeReport {
    /// Number of entries inserted.
    pub inserted: usize,
    /// Number of inserted entries that landed above the previous head.
    pub inserted_at_head: usize,
    /// Ids skipped because they were already present (or repeated in the batch).
    pub duplicates: Vec<EntryId>,
}

impl MergeReport {
    /// Whether the merge changed the store.
    pub fn changed(&self) -> bool {
        self.inserted > 0
    }
}

/// Ordered, deduplicated entries for one filter.
#[derive(Debug, Clone, Default)]
pub struct EntryStore {
    entries: Arc<Vec<Entry>>,
    ids: HashSet<EntryId>,
}

impl EntryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the store is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The entries, newest first.
    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    /// Shared handle to the entries for snapshots.
    pub fn shared(&self) -> Arc<Vec<Entry>> {
        Arc::clone(&self.entries)
    }

    /// Check if an entry with this id is present.
    pub fn contains(&self, id: EntryId) -> bool {
        self.ids.contains(&id)
    }

    /// Position of the entry with this id.
    pub fn index_of(&self, id: EntryId) -> Option<usize> {
        if !self.contains(id) {
            return None;
        }
        // Descending order: entries before the target have larger ids.
        self.entries.binary_search_by(|e| id.cmp(&e.id)).ok()
    }

    /// Look up an entry by id.
    pub fn get(&self, id: EntryId) -> Option<&Entry> {
        self.index_of(id).map(|i| &self.entries[i])
    }

    /// Largest id in the store (the head).
    pub fn max_id(&self) -> Option<EntryId> {
        self.entries.first().map(|e| e.id)
    }

    /// Smallest id in the store (the tail).
    pub fn min_id(&self) -> Option<EntryId> {
        self.entries.last().map(|e| e.id)
    }

    /// Entries that boost the given original.
    pub fn boosts_of(&self, original: EntryId) -> impl Iterator<Item = &Entry> {
        self.entries
            .iter()
            .filter(move |e| e.boost_of == Some(original))
    }

    /// Discard current contents and install `entries`, sorted by id descending.
    ///
    /// Repeated ids within `entries` keep their first occurrence.
    pub fn replace(&mut self, entries: Vec<Entry>) -> MergeReport {
        self.entries = Arc::new(Vec::new());
        self.ids.clear();
        self.merge(entries)
    }

    /// Merge an older page at the tail.
    ///
    /// Ids already present are skipped. Entries that are not older than the
    /// current tail (an overlapping page) are placed in sorted position.
    pub fn append_older(&mut self, entries: Vec<Entry>) -> MergeReport {
        self.merge(entries)
    }

    /// Merge newer entries at the head, skipping ids already present.
    pub fn merge_newer(&mut self, entries: Vec<Entry>) -> MergeReport {
        self.merge(entries)
    }

    /// Delete the entry with this id.
    ///
    /// Boosts that reference the deleted entry through `boost_of` are kept;
    /// only the entry whose own identity matches is removed.
    pub fn remove(&mut self, id: EntryId) -> Option<Entry> {
        let index = self.index_of(id)?;
        self.ids.remove(&id);
        Some(Arc::make_mut(&mut self.entries).remove(index))
    }

    /// Replace an existing entry with the same id, keeping its position.
    ///
    /// Returns `false` if no entry with that id is present.
    pub fn update_in_place(&mut self, entry: Entry) -> bool {
        match self.index_of(entry.id) {
            Some(index) => {
                Arc::make_mut(&mut self.entries)[index] = entry;
                true
            }
            None => false,
        }
    }

    /// Remove everything.
    pub fn clear(&mut self) {
        self.entries = Arc::new(Vec::new());
        self.ids.clear();
    }

    /// Verify the ordering and dedup invariants.
    pub fn is_consistent(&self) -> bool {
        self.entries.windows(2).all(|w| w[0].id > w[1].id) && self.ids.len() == self.entries.len()
    }

    fn merge(&mut self, incoming: Vec<Entry>) -> MergeReport {
        let mut report = MergeReport::default();
        let mut fresh = Vec::with_capacity(incoming.len());

        for entry in incoming {
            if self.ids.insert(entry.id) {
                fresh.push(entry);
            } else {
                report.duplicates.push(entry.id);
            }
        }

        if fresh.is_empty() {
            return report;
        }

        fresh.sort_unstable_by(|a, b| b.id.cmp(&a.id));
        report.inserted = fresh.len();
        report.inserted_at_head = match self.max_id() {
            Some(head) => fresh.iter().take_while(|e| e.id > head).count(),
            None => fresh.len(),
        };

        let tail = self.min_id();
        let head = self.max_id();
        let entries = Arc::make_mut(&mut self.entries);

        match (head, tail) {
            // Whole batch is older than the tail: append.
            (_, Some(tail)) if fresh[0].id < tail => entries.extend(fresh),
            // Whole batch is newer than the head: prepend.
            (Some(head), _) if fresh[fresh.len() - 1].id > head => {
                entries.splice(0..0, fresh);
            }
            (None, None) => entries.extend(fresh),
            _ => {
                let existing = std::mem::take(entries);
                *entries = merge_descending(existing, fresh);
            }
        }

        debug_assert!(self.is_consistent());
        report
    }
}

/// Merge two id-descending sequences with disjoint ids.
fn merge_descending(existing: Vec<Entry>, fresh: Vec<Entry>) -> Vec<Entry> {
    let mut out = Vec::with_capacity(existing.len() + fresh.len());
    let mut existing = existing.into_iter().peekable();

    for entry in fresh {
        while let Some(e) = existing.next_if(|e| e.id > entry.id) {
            out.push(e);
        }
        out.push(entry);
    }
    out.extend(existing);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn entry(id: u64) -> Entry {
        Entry::new(EntryId::new(id), "alice", id, &format!("content:{}", id))
    }

    fn entries(ids: impl IntoIterator<Item = u64>) -> Vec<Entry> {
        ids.into_iter().map(entry).collect()
    }

    fn ids(store: &EntryStore) -> Vec<u64> {
        store.entries().iter().map(|e| e.id.value()).collect()
    }

    // ===========================================
    // Replace
    // ===========================================

    #[test]
    fn replace_sorts_descending() {
        let mut store = EntryStore::new();
        store.replace(entries([3, 9, 1, 5]));
        assert_eq!(ids(&store), vec![9, 5, 3, 1]);
        assert_eq!(store.max_id(), Some(EntryId::new(9)));
        assert_eq!(store.min_id(), Some(EntryId::new(1)));
    }

    #[test]
    fn replace_discards_previous_contents() {
        let mut store = EntryStore::new();
        store.replace(entries([10, 9]));
        store.replace(entries([4, 3]));
        assert_eq!(ids(&store), vec![4, 3]);
        assert!(!store.contains(EntryId::new(10)));
    }

    #[test]
    fn replace_drops_repeated_ids_in_batch() {
        let mut store = EntryStore::new();
        let report = store.replace(entries([5, 5, 4]));
        assert_eq!(ids(&store), vec![5, 4]);
        assert_eq!(report.duplicates, vec![EntryId::new(5)]);
    }

    // ===========================================
    // Append Older
    // ===========================================

    #[test]
    fn append_older_extends_tail() {
        let mut store = EntryStore::new();
        store.replace(entries(91..=100));
        let report = store.append_older(entries(81..=90));

        assert_eq!(report.inserted, 10);
        assert_eq!(report.inserted_at_head, 0);
        assert_eq!(store.len(), 20);
        assert_eq!(store.min_id(), Some(EntryId::new(81)));
        assert!(store.is_consistent());
    }

    #[test]
    fn append_older_skips_overlap() {
        let mut store = EntryStore::new();
        store.replace(entries(81..=100));
        let report = store.append_older(entries([85, 80]));

        assert_eq!(report.inserted, 1);
        assert_eq!(report.duplicates, vec![EntryId::new(85)]);
        assert_eq!(store.entries().iter().filter(|e| e.id.value() == 85).count(), 1);
        assert_eq!(store.min_id(), Some(EntryId::new(80)));
    }

    #[test]
    fn append_older_places_gap_fill_in_order() {
        let mut store = EntryStore::new();
        store.replace(entries([10, 8, 2]));
        store.append_older(entries([9, 1]));
        assert_eq!(ids(&store), vec![10, 9, 8, 2, 1]);
    }

    // ===========================================
    // Merge Newer
    // ===========================================

    #[test]
    fn merge_newer_inserts_at_head() {
        let mut store = EntryStore::new();
        store.replace(entries([200, 199]));
        let report = store.merge_newer(entries([201, 202, 203]));

        assert_eq!(ids(&store), vec![203, 202, 201, 200, 199]);
        assert_eq!(report.inserted_at_head, 3);
    }

    #[test]
    fn merge_newer_skips_present_ids() {
        let mut store = EntryStore::new();
        store.replace(entries([200, 199]));
        let report = store.merge_newer(entries([200, 201]));

        assert_eq!(ids(&store), vec![201, 200, 199]);
        assert_eq!(report.inserted, 1);
        assert_eq!(report.duplicates, vec![EntryId::new(200)]);
    }

    #[test]
    fn merge_into_empty_store() {
        let mut store = EntryStore::new();
        store.merge_newer(entries([2, 3, 1]));
        assert_eq!(ids(&store), vec![3, 2, 1]);
    }

    #[test]
    fn empty_merge_reports_no_change() {
        let mut store = EntryStore::new();
        store.replace(entries([1]));
        assert!(!store.merge_newer(Vec::new()).changed());
    }

    // ===========================================
    // Remove and Update
    // ===========================================

    #[test]
    fn remove_keeps_boosts_of_deleted_entry() {
        let mut store = EntryStore::new();
        store.replace(vec![
            entry(10).with_boost_of(EntryId::new(5)),
            entry(7),
            entry(5),
        ]);

        let removed = store.remove(EntryId::new(5));
        assert_eq!(removed.map(|e| e.id), Some(EntryId::new(5)));
        assert_eq!(ids(&store), vec![10, 7]);
        assert_eq!(store.boosts_of(EntryId::new(5)).count(), 1);
        assert!(store.is_consistent());
    }

    #[test]
    fn remove_missing_is_none() {
        let mut store = EntryStore::new();
        store.replace(entries([3]));
        assert!(store.remove(EntryId::new(4)).is_none());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn update_in_place_preserves_position() {
        let mut store = EntryStore::new();
        store.replace(entries([3, 2, 1]));

        let mut edited = entry(2);
        edited.content_ref = "content:2:edited".into();
        assert!(store.update_in_place(edited));

        assert_eq!(ids(&store), vec![3, 2, 1]);
        assert_eq!(
            store.get(EntryId::new(2)).map(|e| e.content_ref.as_str()),
            Some("content:2:edited")
        );
        assert!(!store.update_in_place(entry(9)));
    }

    #[test]
    fn index_of_uses_descending_order() {
        let mut store = EntryStore::new();
        store.replace(entries([50, 40, 30, 20]));
        assert_eq!(store.index_of(EntryId::new(50)), Some(0));
        assert_eq!(store.index_of(EntryId::new(20)), Some(3));
        assert_eq!(store.index_of(EntryId::new(35)), None);
    }

    #[test]
    fn snapshot_survives_mutation() {
        let mut store = EntryStore::new();
        store.replace(entries([2, 1]));
        let snapshot = store.shared();
        store.merge_newer(entries([3]));

        assert_eq!(snapshot.len(), 2);
        assert_eq!(store.len(), 3);
    }

    // ===========================================
    // Invariant Properties
    // ===========================================

    #[derive(Debug, Clone)]
    enum Op {
        Replace(Vec<u64>),
        Older(Vec<u64>),
        Newer(Vec<u64>),
        Remove(u64),
    }

    fn op() -> impl Strategy<Value = Op> {
        let batch = proptest::collection::vec(0u64..200, 0..25);
        prop_oneof![
            batch.clone().prop_map(Op::Replace),
            batch.clone().prop_map(Op::Older),
            batch.prop_map(Op::Newer),
            (0u64..200).prop_map(Op::Remove),
        ]
    }

    proptest! {
        #[test]
        fn never_duplicates_and_stays_descending(ops in proptest::collection::vec(op(), 1..40)) {
            let mut store = EntryStore::new();
            for op in ops {
                match op {
                    Op::Replace(batch) => { store.replace(entries(batch)); }
                    Op::Older(batch) => { store.append_older(entries(batch)); }
                    Op::Newer(batch) => { store.merge_newer(entries(batch)); }
                    Op::Remove(id) => { store.remove(EntryId::new(id)); }
                }

                let ids = ids(&store);
                prop_assert!(ids.windows(2).all(|w| w[0] > w[1]));
                let unique: HashSet<u64> = ids.iter().copied().collect();
                prop_assert_eq!(unique.len(), ids.len());
                prop_assert!(store.is_consistent());
            }
        }
    }
}
