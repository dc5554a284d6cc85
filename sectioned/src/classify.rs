use std::collections::HashSet;

use crate::{
    projection::Projection, snapshot::Snapshot, ChangeBatch, IndexPath, PendingState,
    RecordSource, ViewConfig,
};

/// What a change batch means for one record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum Change {
    /// Newly qualifying.
    Insert,
    /// No longer qualifying, or deleted.
    Delete { from: IndexPath },
    /// Sort-order-affecting update. `cross_section` is set when the grouping
    /// key changed.
    Move { from: IndexPath, cross_section: bool },
    /// Update that leaves the position untouched.
    Update,
}

#[derive(Clone, Debug)]
pub(crate) struct Classified<Id> {
    pub(crate) id: Id,
    pub(crate) change: Change,
    /// The snapshot of the live record. `None` for deletions.
    pub(crate) snapshot: Option<Snapshot>,
}

/// Classify every record mentioned in `batch` against the current projection.
///
/// Positions are taken from the projection as it is before the batch, using
/// the cached snapshots; nothing is mutated. A record mentioned in several
/// sets of the batch is classified once, from its live state.
pub(crate) fn classify<S: RecordSource>(
    projection: &Projection<S::Id>,
    config: &ViewConfig<S::Record, S::Predicate>,
    source: &S,
    batch: &ChangeBatch<S::Id>,
) -> Vec<Classified<S::Id>> {
    let deleted: HashSet<&S::Id> = batch.deleted.iter().collect();
    let inserted: HashSet<&S::Id> = batch.inserted.iter().collect();

    let mut seen = HashSet::new();
    let mut result = Vec::new();

    let mentioned = batch
        .inserted
        .iter()
        .chain(&batch.deleted)
        .chain(&batch.updated)
        .chain(&batch.refreshed)
        .chain(&batch.invalidated);

    for id in mentioned {
        if !seen.insert(id) {
            continue;
        }

        // A deletion only stands if the record wasn't re-inserted in the same
        // batch, which the store tells us by still having it.
        let removed = deleted.contains(id) && !(inserted.contains(id) && live(source, id));
        let snapshot = if removed { None } else { qualifying_snapshot(config, source, id) };

        let change = match (projection.cache.get(id), &snapshot) {
            (None, None) => continue,
            (None, Some(_)) => Change::Insert,
            (Some(cached), snapshot) => {
                let from = projection.store.expect_located(
                    id,
                    cached,
                    &projection.cache,
                    &projection.comparator,
                );

                match snapshot {
                    None => Change::Delete { from },
                    Some(new) if new.section() != cached.section() => {
                        Change::Move { from, cross_section: true }
                    }
                    Some(new) if new.keys() != cached.keys() => {
                        Change::Move { from, cross_section: false }
                    }
                    Some(_) => Change::Update,
                }
            }
        };

        result.push(Classified { id: id.clone(), change, snapshot });
    }

    result
}

/// The snapshot of the live record, if it exists, isn't pending deletion and
/// matches the view's predicate.
pub(crate) fn qualifying_snapshot<S: RecordSource>(
    config: &ViewConfig<S::Record, S::Predicate>,
    source: &S,
    id: &S::Id,
) -> Option<Snapshot> {
    if source.pending_state(id) == PendingState::Deleted {
        return None;
    }

    source
        .read(id, |record| {
            let matches = config.predicate_ref().map_or(true, |p| source.evaluate(p, record));
            matches.then(|| config.snapshot(record))
        })
        .flatten()
}

fn live<S: RecordSource>(source: &S, id: &S::Id) -> bool {
    source.pending_state(id) != PendingState::Deleted && source.read(id, |_| ()).is_some()
}
