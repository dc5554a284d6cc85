use std::cmp::Ordering;

use smallvec::SmallVec;

use crate::{snapshot::Snapshot, SortOrder, Value};

/// Orders cached snapshots, and sections by their grouping key.
///
/// `Equal` only means that two records are tied on every sort key; record
/// identity is never used for ordering.
#[derive(Clone, Debug)]
pub(crate) struct Comparator {
    section_order: SortOrder,
    row_orders: SmallVec<[SortOrder; 4]>,
}

impl Comparator {
    pub(crate) fn new(section_order: SortOrder, row_orders: SmallVec<[SortOrder; 4]>) -> Self {
        Self { section_order, row_orders }
    }

    /// Compare two snapshots by the row keys, in priority order.
    pub(crate) fn compare_rows(&self, left: &Snapshot, right: &Snapshot) -> Ordering {
        self.row_orders
            .iter()
            .zip(left.keys().iter().zip(right.keys()))
            .map(|(order, (left, right))| order.apply(left.cmp(right)))
            .find(|ordering| ordering.is_ne())
            .unwrap_or(Ordering::Equal)
    }

    /// Compare two grouping keys. `Null` is the smallest grouping key, so it
    /// comes first in ascending and last in descending order.
    pub(crate) fn compare_sections(&self, left: &Value, right: &Value) -> Ordering {
        self.section_order.apply(left.cmp(right))
    }
}
