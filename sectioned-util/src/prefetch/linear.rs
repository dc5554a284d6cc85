use std::collections::HashSet;

use sectioned::{IndexPath, Projection, RecordIdentity, SectionDiff};

use super::{materialize, Materializer, Prefetcher};

/// Keeps a window of rows around the last accessed position materialized.
///
/// The window spans `radius` rows on either side of the last access, counted
/// across section boundaries. Rows that leave the window are released.
/// Before the first access the window is centered on the first row.
#[derive(Debug)]
pub struct LinearPrefetcher<Id, M> {
    materializer: M,
    radius: usize,
    center: Option<usize>,
    window: HashSet<Id>,
}

impl<Id: RecordIdentity, M: Materializer<Id>> LinearPrefetcher<Id, M> {
    /// Create a new `LinearPrefetcher` with the given window radius.
    pub fn new(materializer: M, radius: usize) -> Self {
        Self { materializer, radius, center: None, window: HashSet::new() }
    }

    /// The materializer.
    pub fn materializer(&self) -> &M {
        &self.materializer
    }

    /// Whether the given record is in the materialized window.
    pub fn is_materialized(&self, id: &Id) -> bool {
        self.window.contains(id)
    }

    /// The number of materialized records.
    pub fn window_len(&self) -> usize {
        self.window.len()
    }

    fn recenter(&mut self, projection: &Projection<Id>) {
        let Some(center) = self.center else { return };

        let wanted: Vec<Id> = match projection.len().checked_sub(1) {
            Some(last) => {
                let center = center.min(last);
                let start = center.saturating_sub(self.radius);
                let end = center.saturating_add(self.radius).min(last);
                let len = end - start + 1;
                projection.iter().skip(start).take(len).map(|(_, id)| id.clone()).collect()
            }
            None => Vec::new(),
        };

        let released: Vec<Id> =
            self.window.iter().filter(|id| !wanted.contains(id)).cloned().collect();
        if !released.is_empty() {
            self.materializer.release(&released);
            for id in &released {
                self.window.remove(id);
            }
        }

        let added: Vec<Id> = wanted.into_iter().filter(|id| !self.window.contains(id)).collect();
        if materialize(&mut self.materializer, &added) {
            self.window.extend(added);
        }
    }
}

impl<Id: RecordIdentity, M: Materializer<Id>> Prefetcher<Id> for LinearPrefetcher<Id, M> {
    fn acknowledge_access(&mut self, path: IndexPath, projection: &Projection<Id>) {
        let Some(index) = projection.flat_index(path) else {
            tracing::debug!(target: "sectioned_util::prefetch", %path, "Access out of bounds");
            return;
        };

        if self.center != Some(index) {
            self.center = Some(index);
            self.recenter(projection);
        }
    }

    fn acknowledge_fetch(&mut self, projection: &Projection<Id>) {
        self.center.get_or_insert(0);
        self.recenter(projection);
    }

    fn acknowledge_diff(&mut self, diff: &SectionDiff, projection: &Projection<Id>) {
        if !diff.is_empty() {
            self.recenter(projection);
        }
    }
}
