use std::hash::Hash;

use imbl::HashMap;
use smallvec::SmallVec;

use crate::Value;

/// The last-known values of every sort-relevant key of one record.
///
/// Snapshots are only used to compare positions; they are never the source of
/// truth for record content.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Snapshot {
    section: Value,
    keys: SmallVec<[Value; 4]>,
}

impl Snapshot {
    pub(crate) fn new(section: Value, keys: SmallVec<[Value; 4]>) -> Self {
        Self { section, keys }
    }

    /// The grouping key. Always `Null` for ungrouped views.
    pub fn section(&self) -> &Value {
        &self.section
    }

    /// The row sort keys, in priority order.
    pub fn keys(&self) -> &[Value] {
        &self.keys
    }
}

/// Record identity → [`Snapshot`].
///
/// Its lifetime is coupled to the section store: every projected record has
/// exactly one entry, and nothing else has one.
#[derive(Clone, Debug)]
pub(crate) struct SnapshotCache<Id: Clone + Eq + Hash> {
    entries: HashMap<Id, Snapshot>,
}

impl<Id: Clone + Eq + Hash> SnapshotCache<Id> {
    pub(crate) fn new() -> Self {
        Self { entries: HashMap::new() }
    }

    pub(crate) fn get(&self, id: &Id) -> Option<&Snapshot> {
        self.entries.get(id)
    }

    pub(crate) fn contains(&self, id: &Id) -> bool {
        self.entries.contains_key(id)
    }

    /// Insert or replace the snapshot of `id`, returning the previous one.
    pub(crate) fn insert(&mut self, id: Id, snapshot: Snapshot) -> Option<Snapshot> {
        self.entries.insert(id, snapshot)
    }

    pub(crate) fn remove(&mut self, id: &Id) -> Option<Snapshot> {
        self.entries.remove(id)
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn clear(&mut self) {
        self.entries.clear();
    }

    pub(crate) fn ids(&self) -> impl Iterator<Item = &Id> {
        self.entries.keys()
    }
}
