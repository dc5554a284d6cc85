use std::{cmp::Ordering, fmt, hash::Hash};

use imbl::Vector;

use crate::{
    comparator::Comparator,
    snapshot::{Snapshot, SnapshotCache},
    IndexPath, Value,
};

/// A run of records sharing one grouping key, in row order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Section<Id: Clone> {
    key: Value,
    name: Option<String>,
    members: Vector<Id>,
}

impl<Id: Clone> Section<Id> {
    pub(crate) fn new(key: Value) -> Self {
        let name = key.section_name();
        Self { key, name, members: Vector::new() }
    }

    /// The grouping key shared by every member.
    pub fn key(&self) -> &Value {
        &self.key
    }

    /// The display name of the section, derived from its grouping key.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// The member identities, in row order.
    pub fn members(&self) -> &Vector<Id> {
        &self.members
    }

    /// The identity at the given row.
    pub fn get(&self, row: usize) -> Option<&Id> {
        self.members.get(row)
    }

    /// The number of members.
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Whether the section has no members. Only observable in the middle of a
    /// reconciliation pass.
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

/// The ordered list of sections, maintained through binary search.
///
/// Every operation that needs to compare members takes the snapshot cache and
/// comparator, since the store itself only holds identities.
#[derive(Clone, Debug)]
pub(crate) struct SectionStore<Id: Clone> {
    sections: Vector<Section<Id>>,
}

impl<Id> SectionStore<Id>
where
    Id: Clone + Eq + Hash + fmt::Debug,
{
    pub(crate) fn new() -> Self {
        Self { sections: Vector::new() }
    }

    pub(crate) fn sections(&self) -> &Vector<Section<Id>> {
        &self.sections
    }

    pub(crate) fn section(&self, index: usize) -> Option<&Section<Id>> {
        self.sections.get(index)
    }

    pub(crate) fn len(&self) -> usize {
        self.sections.len()
    }

    pub(crate) fn clear(&mut self) {
        self.sections.clear();
    }

    /// Binary search for the section with the given grouping key.
    ///
    /// Returns `Err` with the index at which such a section would have to be
    /// inserted if there is none.
    pub(crate) fn find_section(
        &self,
        key: &Value,
        comparator: &Comparator,
    ) -> Result<usize, usize> {
        self.sections.binary_search_by(|section| comparator.compare_sections(&section.key, key))
    }

    /// Find the section with the given grouping key, creating it at its
    /// ordered position if it doesn't exist yet.
    ///
    /// Returns the section index and whether it was created.
    pub(crate) fn find_or_create_section(
        &mut self,
        key: &Value,
        comparator: &Comparator,
    ) -> (usize, bool) {
        match self.find_section(key, comparator) {
            Ok(index) => (index, false),
            Err(index) => {
                self.sections.insert(index, Section::new(key.clone()));
                (index, true)
            }
        }
    }

    /// Locate a member by the snapshot it was placed with.
    ///
    /// Binary search narrows the lookup to the run of members that compare
    /// equal to `snapshot`; identity decides within that run.
    pub(crate) fn locate(
        &self,
        id: &Id,
        snapshot: &Snapshot,
        cache: &SnapshotCache<Id>,
        comparator: &Comparator,
    ) -> Option<IndexPath> {
        let section = self.find_section(snapshot.section(), comparator).ok()?;
        let members = &self.sections[section].members;

        let start = partition_point(members, |member| {
            comparator.compare_rows(cached(cache, member), snapshot).is_lt()
        });

        (start..members.len())
            .map(|row| (row, &members[row]))
            .take_while(|(_, member)| {
                comparator.compare_rows(cached(cache, *member), snapshot) == Ordering::Equal
            })
            .find_map(|(row, member)| (member == id).then_some(IndexPath::new(section, row)))
    }

    /// Like [`locate`][Self::locate], but treats a missing member as a
    /// desynchronization of the store and the cache.
    ///
    /// # Panics
    ///
    /// Panics if the member can't be found.
    #[track_caller]
    pub(crate) fn expect_located(
        &self,
        id: &Id,
        snapshot: &Snapshot,
        cache: &SnapshotCache<Id>,
        comparator: &Comparator,
    ) -> IndexPath {
        self.locate(id, snapshot, cache, comparator).unwrap_or_else(|| {
            panic!(
                "record {id:?} is cached in section {:?} but could not be found there; \
                 the section store and snapshot cache are out of sync",
                snapshot.section(),
            )
        })
    }

    /// Insert `id` into the given section after every member that doesn't
    /// compare greater than it. Returns the row it was inserted at.
    ///
    /// `snapshot` must be the snapshot cached for `id`.
    pub(crate) fn insert_member(
        &mut self,
        section: usize,
        id: Id,
        snapshot: &Snapshot,
        cache: &SnapshotCache<Id>,
        comparator: &Comparator,
    ) -> usize {
        let members = &mut self.sections[section].members;

        // Appending in order is the common case during population.
        let row = match members.last() {
            Some(last) if comparator.compare_rows(cached(cache, last), snapshot).is_gt() => {
                partition_point(members, |member| {
                    comparator.compare_rows(cached(cache, member), snapshot).is_le()
                })
            }
            _ => members.len(),
        };

        members.insert(row, id);
        row
    }

    /// Remove the given rows from a section. `rows` must be sorted in
    /// descending order, so that every removal leaves the remaining indices
    /// intact.
    pub(crate) fn remove_rows(&mut self, section: usize, rows: impl IntoIterator<Item = usize>) {
        let members = &mut self.sections[section].members;
        let mut previous = usize::MAX;
        for row in rows {
            debug_assert!(row < previous, "rows must be removed in descending order");
            members.remove(row);
            previous = row;
        }
    }

    /// Replace the identity at the given position.
    pub(crate) fn replace_member(&mut self, path: IndexPath, id: Id) -> Id {
        let section = &mut self.sections[path.section];
        section.members.set(path.row, id)
    }

    pub(crate) fn remove_section(&mut self, index: usize) -> Section<Id> {
        self.sections.remove(index)
    }
}

// The cache must hold an entry for every member; see `SnapshotCache`.
#[track_caller]
fn cached<'a, Id>(cache: &'a SnapshotCache<Id>, id: &Id) -> &'a Snapshot
where
    Id: Clone + Eq + Hash + fmt::Debug,
{
    cache.get(id).unwrap_or_else(|| panic!("record {id:?} is projected but has no cached snapshot"))
}

/// The index of the first value for which `pred` is false; `pred` must hold
/// for a prefix of `values`.
fn partition_point<T: Clone>(values: &Vector<T>, mut pred: impl FnMut(&T) -> bool) -> usize {
    // Never returns `Equal`, so this is always `Err`.
    values
        .binary_search_by(|value| if pred(value) { Ordering::Less } else { Ordering::Greater })
        .unwrap_or_else(|index| index)
}
