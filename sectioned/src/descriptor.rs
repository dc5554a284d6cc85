use std::{borrow::Cow, fmt, sync::Arc};

use smallvec::SmallVec;

use crate::{comparator::Comparator, snapshot::Snapshot, Value};

/// The direction of a [`SortDescriptor`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum SortOrder {
    /// Smallest values first.
    #[default]
    Ascending,
    /// Largest values first.
    Descending,
}

impl SortOrder {
    /// Apply this direction to an ordering obtained for ascending order.
    pub fn apply(self, ordering: std::cmp::Ordering) -> std::cmp::Ordering {
        match self {
            SortOrder::Ascending => ordering,
            SortOrder::Descending => ordering.reverse(),
        }
    }
}

/// A named, typed attribute accessor for records of type `R`.
///
/// Key paths are resolved once, when a [`ViewConfig`] is built; the
/// projection never looks attributes up by name afterwards.
pub struct KeyPath<R> {
    name: Cow<'static, str>,
    extract: Arc<dyn Fn(&R) -> Value + Send + Sync>,
}

impl<R> KeyPath<R> {
    /// Create a new `KeyPath` with the given name and extractor.
    pub fn new<F>(name: impl Into<Cow<'static, str>>, extract: F) -> Self
    where
        F: Fn(&R) -> Value + Send + Sync + 'static,
    {
        Self { name: name.into(), extract: Arc::new(extract) }
    }

    /// The name of the key, for diagnostics and for stores that push sorting
    /// down to their own query engine.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Extract the value of this key from the given record.
    pub fn extract(&self, record: &R) -> Value {
        (self.extract)(record)
    }
}

impl<R> Clone for KeyPath<R> {
    fn clone(&self) -> Self {
        Self { name: self.name.clone(), extract: self.extract.clone() }
    }
}

impl<R> fmt::Debug for KeyPath<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("KeyPath").field(&self.name).finish()
    }
}

/// A [`KeyPath`] together with the direction to sort by it.
pub struct SortDescriptor<R> {
    /// The key to sort by.
    pub key: KeyPath<R>,
    /// The direction to sort in.
    pub order: SortOrder,
}

impl<R> SortDescriptor<R> {
    /// Sort ascending by the given key.
    pub fn ascending<F>(name: impl Into<Cow<'static, str>>, extract: F) -> Self
    where
        F: Fn(&R) -> Value + Send + Sync + 'static,
    {
        Self { key: KeyPath::new(name, extract), order: SortOrder::Ascending }
    }

    /// Sort descending by the given key.
    pub fn descending<F>(name: impl Into<Cow<'static, str>>, extract: F) -> Self
    where
        F: Fn(&R) -> Value + Send + Sync + 'static,
    {
        Self { key: KeyPath::new(name, extract), order: SortOrder::Descending }
    }
}

impl<R> Clone for SortDescriptor<R> {
    fn clone(&self) -> Self {
        Self { key: self.key.clone(), order: self.order }
    }
}

impl<R> fmt::Debug for SortDescriptor<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SortDescriptor")
            .field("key", &self.key)
            .field("order", &self.order)
            .finish()
    }
}

/// The definition of a projection: how records are sorted, whether they are
/// grouped into sections, which records qualify and whether plain updates are
/// reported.
///
/// `R` is the store's record type and `P` its predicate type.
pub struct ViewConfig<R, P> {
    descriptors: Vec<SortDescriptor<R>>,
    grouped: bool,
    predicate: Option<P>,
    emits_updates: bool,
}

impl<R, P> ViewConfig<R, P> {
    /// Create a new ungrouped `ViewConfig` sorting by the given descriptors,
    /// in priority order.
    ///
    /// # Panics
    ///
    /// Panics if `descriptors` is empty.
    #[track_caller]
    pub fn new(descriptors: impl IntoIterator<Item = SortDescriptor<R>>) -> Self {
        let descriptors: Vec<_> = descriptors.into_iter().collect();
        assert!(!descriptors.is_empty(), "a view needs at least one sort descriptor");

        Self { descriptors, grouped: false, predicate: None, emits_updates: true }
    }

    /// Group records into sections by the first sort descriptor.
    ///
    /// Sections are ordered by that descriptor; members within a section are
    /// ordered by the remaining ones.
    ///
    /// # Panics
    ///
    /// Panics if the view has fewer than two sort descriptors.
    #[track_caller]
    pub fn grouped(mut self) -> Self {
        let len = self.descriptors.len();
        assert!(
            len >= 2,
            "a grouped view needs the grouping key and at least one row key, \
             but only {len} sort descriptor(s) were given"
        );

        self.grouped = true;
        self
    }

    /// Only project records that match the given predicate.
    pub fn predicate(mut self, predicate: P) -> Self {
        self.predicate = Some(predicate);
        self
    }

    /// Whether to report updates of records whose position did not change.
    ///
    /// Defaults to `true`.
    pub fn emits_updates(mut self, emits_updates: bool) -> Self {
        self.emits_updates = emits_updates;
        self
    }

    /// The sort descriptors, in priority order. If the view is grouped, the
    /// first one is the grouping key.
    pub fn descriptors(&self) -> &[SortDescriptor<R>] {
        &self.descriptors
    }

    /// Whether records are grouped into sections by the first sort descriptor.
    pub fn is_grouped(&self) -> bool {
        self.grouped
    }

    /// The predicate that records must match, if any.
    pub fn predicate_ref(&self) -> Option<&P> {
        self.predicate.as_ref()
    }

    /// Whether plain updates are reported.
    pub fn reports_updates(&self) -> bool {
        self.emits_updates
    }

    pub(crate) fn comparator(&self) -> Comparator {
        let (section_order, rows) = match self.split() {
            (Some(section), rows) => (section.order, rows),
            (None, rows) => (SortOrder::Ascending, rows),
        };
        Comparator::new(section_order, rows.iter().map(|d| d.order).collect())
    }

    pub(crate) fn snapshot(&self, record: &R) -> Snapshot {
        let (section, rows) = self.split();
        let section = section.map_or(Value::Null, |d| d.key.extract(record));
        let keys: SmallVec<_> = rows.iter().map(|d| d.key.extract(record)).collect();

        Snapshot::new(section, keys)
    }

    // The grouping descriptor, if any, and the row descriptors.
    fn split(&self) -> (Option<&SortDescriptor<R>>, &[SortDescriptor<R>]) {
        match &self.descriptors[..] {
            [section, rows @ ..] if self.grouped => (Some(section), rows),
            rows => (None, rows),
        }
    }
}

impl<R, P: fmt::Debug> fmt::Debug for ViewConfig<R, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ViewConfig")
            .field("descriptors", &self.descriptors)
            .field("grouped", &self.grouped)
            .field("predicate", &self.predicate)
            .field("emits_updates", &self.emits_updates)
            .finish()
    }
}
