use std::hash::Hash;

use imbl::Vector;

use crate::{
    comparator::Comparator,
    snapshot::{Snapshot, SnapshotCache},
    store::{Section, SectionStore},
    IndexPath, RecordIdentity,
};

/// The sectioned, sorted state of a [`SectionedCollection`], together with the
/// snapshot cache that keeps it ordered.
///
/// Read it through the collection itself (which dereferences to it) or
/// through [`SectionSubscriber::read`] between reconciliation passes.
///
/// [`SectionedCollection`]: crate::SectionedCollection
/// [`SectionSubscriber::read`]: crate::SectionSubscriber::read
#[derive(Clone, Debug)]
pub struct Projection<Id: Clone + Eq + Hash> {
    pub(crate) store: SectionStore<Id>,
    pub(crate) cache: SnapshotCache<Id>,
    pub(crate) comparator: Comparator,
}

impl<Id: RecordIdentity> Projection<Id> {
    pub(crate) fn new(comparator: Comparator) -> Self {
        Self { store: SectionStore::new(), cache: SnapshotCache::new(), comparator }
    }

    /// The number of sections.
    pub fn section_count(&self) -> usize {
        self.store.len()
    }

    /// The number of rows in the given section, or `0` if there is no such
    /// section.
    pub fn row_count(&self, section: usize) -> usize {
        self.store.section(section).map_or(0, Section::len)
    }

    /// The name of the given section.
    pub fn section_name(&self, section: usize) -> Option<&str> {
        self.store.section(section)?.name()
    }

    /// The section at the given index.
    pub fn section(&self, section: usize) -> Option<&Section<Id>> {
        self.store.section(section)
    }

    /// All sections, in order.
    pub fn sections(&self) -> &Vector<Section<Id>> {
        self.store.sections()
    }

    /// The identity at the given position.
    pub fn get(&self, path: IndexPath) -> Option<&Id> {
        self.store.section(path.section)?.get(path.row)
    }

    /// The position of the given record, if it is projected.
    pub fn index_of(&self, id: &Id) -> Option<IndexPath> {
        let snapshot = self.cache.get(id)?;
        self.store.locate(id, snapshot, &self.cache, &self.comparator)
    }

    /// Whether the given record is projected.
    pub fn contains(&self, id: &Id) -> bool {
        self.cache.contains(id)
    }

    /// The snapshot the record is currently placed with.
    pub fn snapshot(&self, id: &Id) -> Option<&Snapshot> {
        self.cache.get(id)
    }

    /// The total number of projected records.
    pub fn len(&self) -> usize {
        self.cache.len()
    }

    /// Whether no records are projected.
    pub fn is_empty(&self) -> bool {
        self.cache.len() == 0
    }

    /// Iterate over all projected records in order, with their positions.
    pub fn iter(&self) -> impl Iterator<Item = (IndexPath, &Id)> + '_ {
        self.store.sections().iter().enumerate().flat_map(|(section, s)| {
            s.members().iter().enumerate().map(move |(row, id)| (IndexPath::new(section, row), id))
        })
    }

    /// The position of the given index path in the flattened projection, i.e.
    /// counting rows across sections.
    pub fn flat_index(&self, path: IndexPath) -> Option<usize> {
        let section = self.store.section(path.section)?;
        if path.row >= section.len() {
            return None;
        }

        let preceding: usize =
            self.store.sections().iter().take(path.section).map(Section::len).sum();
        Some(preceding + path.row)
    }

    /// The index path of the given position in the flattened projection.
    pub fn path_at_flat(&self, mut index: usize) -> Option<IndexPath> {
        for (section, s) in self.store.sections().iter().enumerate() {
            if index < s.len() {
                return Some(IndexPath::new(section, index));
            }
            index -= s.len();
        }
        None
    }

    /// Check the structural invariants: sections ordered and non-empty,
    /// members ordered, cache and store membership identical.
    ///
    /// Returns a description of the first violation found.
    pub fn check_invariants(&self) -> Result<(), String> {
        let sections = self.store.sections();
        let mut members = 0;

        for (index, section) in sections.iter().enumerate() {
            if section.is_empty() {
                return Err(format!("section {index} is empty"));
            }
            if let Some(previous) = index.checked_sub(1).map(|i| &sections[i]) {
                if !self.comparator.compare_sections(previous.key(), section.key()).is_lt() {
                    return Err(format!("sections {} and {index} are out of order", index - 1));
                }
            }

            let mut previous: Option<&Snapshot> = None;
            for (row, id) in section.members().iter().enumerate() {
                let Some(snapshot) = self.cache.get(id) else {
                    return Err(format!("record {id:?} at [{index}, {row}] has no snapshot"));
                };
                if snapshot.section() != section.key() {
                    return Err(format!("record {id:?} is cached in another section"));
                }
                if previous.is_some_and(|p| self.comparator.compare_rows(p, snapshot).is_gt()) {
                    return Err(format!("record {id:?} at [{index}, {row}] is out of order"));
                }
                previous = Some(snapshot);
                members += 1;
            }
        }

        if members != self.cache.len() {
            return Err(format!(
                "{} snapshots are cached but {members} records are projected",
                self.cache.len()
            ));
        }
        if let Some(stray) = self.cache.ids().find(|id| self.index_of(id).is_none()) {
            return Err(format!("record {stray:?} is cached but not projected"));
        }

        Ok(())
    }

    pub(crate) fn clear(&mut self) {
        self.store.clear();
        self.cache.clear();
    }
}
