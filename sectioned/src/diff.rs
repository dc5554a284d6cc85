use std::fmt;

/// The position of a record: section index and row within that section.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct IndexPath {
    /// The section index.
    pub section: usize,
    /// The row within the section.
    pub row: usize,
}

impl IndexPath {
    /// Create a new `IndexPath`.
    pub fn new(section: usize, row: usize) -> Self {
        Self { section, row }
    }
}

impl fmt::Display for IndexPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.section, self.row)
    }
}

/// A row that changed position.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RowMove {
    /// The position before the reconciliation pass.
    pub from: IndexPath,
    /// The position after the reconciliation pass.
    pub to: IndexPath,
}

impl RowMove {
    /// Create a new `RowMove`.
    pub fn new(from: IndexPath, to: IndexPath) -> Self {
        Self { from, to }
    }
}

/// The structural changes of one reconciliation pass.
///
/// Deleted sections, deleted rows and move origins refer to positions
/// *before* the pass; inserted sections, inserted rows, move destinations and
/// updated rows refer to positions *after* it. Every list is sorted.
///
/// Rows of an inserted section are never reported individually: the section
/// insertion accounts for its full contents. Rows of a deleted section are
/// reported as deleted rows, before the section removal.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SectionDiff {
    /// Indices of removed sections.
    pub deleted_sections: Vec<usize>,
    /// Indices of new sections.
    pub inserted_sections: Vec<usize>,
    /// Positions of removed rows.
    pub deleted_rows: Vec<IndexPath>,
    /// Positions of new rows.
    pub inserted_rows: Vec<IndexPath>,
    /// Rows that changed position.
    pub moved_rows: Vec<RowMove>,
    /// Rows whose record changed without affecting its position.
    pub updated_rows: Vec<IndexPath>,
}

impl SectionDiff {
    /// Whether there are no changes at all.
    pub fn is_empty(&self) -> bool {
        self.deleted_sections.is_empty()
            && self.inserted_sections.is_empty()
            && self.deleted_rows.is_empty()
            && self.inserted_rows.is_empty()
            && self.moved_rows.is_empty()
            && self.updated_rows.is_empty()
    }

    /// The total number of section and row changes.
    pub fn len(&self) -> usize {
        self.deleted_sections.len()
            + self.inserted_sections.len()
            + self.deleted_rows.len()
            + self.inserted_rows.len()
            + self.moved_rows.len()
            + self.updated_rows.len()
    }

    /// Applies this [`SectionDiff`] to a sectioned layout.
    ///
    /// This is useful to keep a consumer-side copy of the projection in sync.
    /// `lookup` is called with post-pass positions and must return the value
    /// at that position in the updated projection; it is used for inserted
    /// rows, move destinations, updated rows and the contents of inserted
    /// sections. `section_len` must return the number of rows a section has
    /// after the pass.
    ///
    /// # Panics
    ///
    /// When removing or inserting past the end of the layout, i.e. when the
    /// diff doesn't belong to `layout`.
    pub fn apply<T>(
        &self,
        layout: &mut Vec<Vec<T>>,
        mut lookup: impl FnMut(IndexPath) -> T,
        mut section_len: impl FnMut(usize) -> usize,
    ) {
        let mut removals: Vec<IndexPath> = self
            .deleted_rows
            .iter()
            .copied()
            .chain(self.moved_rows.iter().map(|m| m.from))
            .collect();
        removals.sort_unstable();
        for path in removals.into_iter().rev() {
            layout[path.section].remove(path.row);
        }

        for &section in self.deleted_sections.iter().rev() {
            let removed = layout.remove(section);
            assert!(removed.is_empty(), "section {section} still has rows after row deletions");
        }

        for &section in &self.inserted_sections {
            let len = section_len(section);
            let rows = (0..len).map(|row| lookup(IndexPath::new(section, row))).collect();
            layout.insert(section, rows);
        }

        let mut insertions: Vec<IndexPath> = self
            .inserted_rows
            .iter()
            .copied()
            .chain(self.moved_rows.iter().map(|m| m.to))
            .collect();
        insertions.sort_unstable();
        for path in insertions {
            layout[path.section].insert(path.row, lookup(path));
        }

        for &path in &self.updated_rows {
            layout[path.section][path.row] = lookup(path);
        }
    }
}

/// An event emitted by a [`SectionedCollection`] after each reconciliation
/// pass.
///
/// [`SectionedCollection`]: crate::SectionedCollection
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SectionEvent {
    /// The projection was rebuilt from scratch. Consumers must discard any
    /// index they maintain and re-read everything.
    Reloaded,
    /// The projection was updated incrementally.
    Updated(SectionDiff),
}

#[cfg(feature = "serde")]
mod serde_impls {
    use serde::ser::{Serialize, SerializeMap, SerializeStruct, Serializer};

    use super::{IndexPath, RowMove, SectionDiff, SectionEvent};

    impl Serialize for IndexPath {
        fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
            let mut state = serializer.serialize_struct("IndexPath", 2)?;
            state.serialize_field("section", &self.section)?;
            state.serialize_field("row", &self.row)?;
            state.end()
        }
    }

    impl Serialize for RowMove {
        fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
            let mut state = serializer.serialize_struct("RowMove", 2)?;
            state.serialize_field("from", &self.from)?;
            state.serialize_field("to", &self.to)?;
            state.end()
        }
    }

    // Empty categories are omitted.
    impl Serialize for SectionDiff {
        fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
            fn entry<M: SerializeMap, T: Serialize>(
                map: &mut M,
                key: &str,
                values: &[T],
            ) -> Result<(), M::Error> {
                if values.is_empty() {
                    Ok(())
                } else {
                    map.serialize_entry(key, values)
                }
            }

            let mut map = serializer.serialize_map(None)?;
            entry(&mut map, "deleted_sections", &self.deleted_sections)?;
            entry(&mut map, "inserted_sections", &self.inserted_sections)?;
            entry(&mut map, "deleted_rows", &self.deleted_rows)?;
            entry(&mut map, "inserted_rows", &self.inserted_rows)?;
            entry(&mut map, "moved_rows", &self.moved_rows)?;
            entry(&mut map, "updated_rows", &self.updated_rows)?;
            map.end()
        }
    }

    impl Serialize for SectionEvent {
        fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
            const SELF_NAME: &str = "SectionEvent";

            match self {
                SectionEvent::Reloaded => {
                    serializer.serialize_unit_variant(SELF_NAME, 0, "Reloaded")
                }
                SectionEvent::Updated(diff) => {
                    serializer.serialize_newtype_variant(SELF_NAME, 1, "Updated", diff)
                }
            }
        }
    }
}
