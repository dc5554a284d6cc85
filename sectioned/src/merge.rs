use std::collections::{BTreeMap, BTreeSet};

use crate::{
    classify::{classify, qualifying_snapshot, Change, Classified},
    projection::Projection,
    ChangeBatch, PendingState, RecordIdentity, RecordSource, RowMove, SectionDiff, Value,
    ViewConfig,
};

/// Apply classified changes to the projection and compute the resulting
/// diff.
///
/// The passes run in a fixed order: removals (descending rows), pruning of
/// sections left empty, binary-search insertion, and finally the
/// per-record reconciliation that decides which row events to report.
pub(crate) fn merge<Id: RecordIdentity>(
    projection: &mut Projection<Id>,
    changes: Vec<Classified<Id>>,
    emits_updates: bool,
) -> SectionDiff {
    let Projection { store, cache, comparator } = projection;

    // Removal: deletions and the origin side of every move, per old section.
    let mut removals: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    for change in &changes {
        if let Change::Delete { from } | Change::Move { from, .. } = change.change {
            removals.entry(from.section).or_default().push(from.row);
        }
    }

    for (&section, rows) in &mut removals {
        rows.sort_unstable_by(|a, b| b.cmp(a));
        store.remove_rows(section, rows.iter().copied());
    }

    for change in &changes {
        match &change.snapshot {
            Some(snapshot) => {
                cache.insert(change.id.clone(), snapshot.clone());
            }
            None => {
                cache.remove(&change.id);
            }
        }
    }

    // Pruning. Every removal happened before any section index changed, so
    // the indices recorded here are pre-pass indices.
    let inbound: BTreeSet<&Value> = changes
        .iter()
        .filter(|c| matches!(c.change, Change::Insert | Change::Move { .. }))
        .filter_map(|c| c.snapshot.as_ref().map(|s| s.section()))
        .collect();

    let mut deleted_sections = Vec::new();
    for &section in removals.keys().rev() {
        let emptied =
            store.section(section).is_some_and(|s| s.is_empty() && !inbound.contains(s.key()));
        if emptied {
            store.remove_section(section);
            deleted_sections.push(section);
        }
    }
    deleted_sections.reverse();

    // Insertion, creating sections as needed.
    let mut created: BTreeSet<Value> = BTreeSet::new();
    for change in &changes {
        let (Change::Insert | Change::Move { .. }, Some(snapshot)) =
            (&change.change, &change.snapshot)
        else {
            continue;
        };

        let (section, was_created) = store.find_or_create_section(snapshot.section(), comparator);
        if was_created {
            created.insert(snapshot.section().clone());
        }
        store.insert_member(section, change.id.clone(), snapshot, cache, comparator);
    }

    // Reconciliation against the final state.
    let mut diff = SectionDiff { deleted_sections, ..Default::default() };

    for change in &changes {
        let destination = || {
            let snapshot = change.snapshot.as_ref().expect("only deletions lack a snapshot");
            store.expect_located(&change.id, snapshot, cache, comparator)
        };
        let into_created = || {
            change.snapshot.as_ref().is_some_and(|s| created.contains(s.section()))
        };

        match change.change {
            Change::Delete { from } => diff.deleted_rows.push(from),
            Change::Insert => {
                if !into_created() {
                    diff.inserted_rows.push(destination());
                }
            }
            Change::Move { from, cross_section: false } => {
                diff.moved_rows.push(RowMove::new(from, destination()));
            }
            Change::Move { from, cross_section: true } => {
                if into_created() {
                    // The section insertion covers the destination.
                    diff.deleted_rows.push(from);
                } else if diff.deleted_sections.binary_search(&from.section).is_ok() {
                    // No origin to animate from.
                    diff.deleted_rows.push(from);
                    diff.inserted_rows.push(destination());
                } else {
                    diff.moved_rows.push(RowMove::new(from, destination()));
                }
            }
            Change::Update => {
                if emits_updates {
                    diff.updated_rows.push(destination());
                }
            }
        }
    }

    diff.inserted_sections = created
        .iter()
        .map(|key| {
            store
                .find_section(key, comparator)
                .expect("created sections are never pruned in the same pass")
        })
        .collect();

    diff.inserted_sections.sort_unstable();
    diff.deleted_rows.sort_unstable();
    diff.inserted_rows.sort_unstable();
    diff.moved_rows.sort_unstable();
    diff.updated_rows.sort_unstable();

    diff
}

/// Rebuild the projection from the identities returned by a fetch.
///
/// Records with pending changes can't be trusted to be at the right position
/// in the fetch results; they are routed through classification and merging
/// instead of being placed directly. Records pending deletion or failing the
/// predicate in their live state are left out.
pub(crate) fn populate<S: RecordSource>(
    projection: &mut Projection<S::Id>,
    config: &ViewConfig<S::Record, S::Predicate>,
    source: &S,
    ids: Vec<S::Id>,
) {
    projection.clear();

    let mut deferred = Vec::new();
    for id in ids {
        match source.pending_state(&id) {
            PendingState::Clean => {}
            PendingState::Deleted => continue,
            PendingState::Inserted | PendingState::Updated => {
                deferred.push(id);
                continue;
            }
        }

        if projection.cache.contains(&id) {
            continue;
        }
        let Some(snapshot) = qualifying_snapshot(config, source, &id) else {
            continue;
        };

        let Projection { store, cache, comparator } = &mut *projection;
        // Fetch results arrive as contiguous runs per section.
        let continues_run =
            store.sections().last().is_some_and(|last| last.key() == snapshot.section());
        let section = if continues_run {
            store.len() - 1
        } else {
            store.find_or_create_section(snapshot.section(), comparator).0
        };
        cache.insert(id.clone(), snapshot.clone());
        store.insert_member(section, id, &snapshot, cache, comparator);
    }

    if !deferred.is_empty() {
        let batch = ChangeBatch::new().updated(deferred);
        let changes = classify(projection, config, source, &batch);
        // The reload event covers these.
        let _diff = merge(projection, changes, false);
    }
}
