use std::collections::HashSet;

use sectioned::{IndexPath, Projection, RecordIdentity, SectionDiff};

use super::{materialize, Materializer, Prefetcher};

/// Materializes every projected record.
///
/// Everything is materialized when the projection is fetched; afterwards only
/// the records a diff brings in are, and the ones it removes are released.
#[derive(Debug)]
pub struct GreedyPrefetcher<Id, M> {
    materializer: M,
    materialized: HashSet<Id>,
}

impl<Id: RecordIdentity, M: Materializer<Id>> GreedyPrefetcher<Id, M> {
    /// Create a new `GreedyPrefetcher`.
    pub fn new(materializer: M) -> Self {
        Self { materializer, materialized: HashSet::new() }
    }

    /// The materializer.
    pub fn materializer(&self) -> &M {
        &self.materializer
    }

    /// Whether the given record was materialized.
    pub fn is_materialized(&self, id: &Id) -> bool {
        self.materialized.contains(id)
    }

    fn release_missing(&mut self, projection: &Projection<Id>) {
        let gone: Vec<Id> =
            self.materialized.iter().filter(|id| !projection.contains(id)).cloned().collect();
        if !gone.is_empty() {
            self.materializer.release(&gone);
            for id in &gone {
                self.materialized.remove(id);
            }
        }
    }

    fn materialize_new(&mut self, ids: impl IntoIterator<Item = Id>) {
        let mut ids: Vec<Id> =
            ids.into_iter().filter(|id| !self.materialized.contains(id)).collect();
        let mut seen = HashSet::new();
        ids.retain(|id| seen.insert(id.clone()));

        if materialize(&mut self.materializer, &ids) {
            self.materialized.extend(ids);
        }
    }
}

impl<Id: RecordIdentity, M: Materializer<Id>> Prefetcher<Id> for GreedyPrefetcher<Id, M> {
    fn acknowledge_access(&mut self, path: IndexPath, projection: &Projection<Id>) {
        // Retries what an earlier failure left out.
        if let Some(id) = projection.get(path) {
            self.materialize_new([id.clone()]);
        }
    }

    fn acknowledge_fetch(&mut self, projection: &Projection<Id>) {
        self.release_missing(projection);
        self.materialize_new(projection.iter().map(|(_, id)| id.clone()));
    }

    fn acknowledge_diff(&mut self, diff: &SectionDiff, projection: &Projection<Id>) {
        if !diff.deleted_rows.is_empty() {
            self.release_missing(projection);
        }

        let rows = diff.inserted_rows.iter().copied().chain(diff.moved_rows.iter().map(|m| m.to));
        let sections = diff.inserted_sections.iter().filter_map(|&index| projection.section(index));

        let ids: Vec<Id> = rows
            .filter_map(|path| projection.get(path).cloned())
            .chain(sections.flat_map(|section| section.members().iter().cloned()))
            .collect();
        self.materialize_new(ids);
    }
}
