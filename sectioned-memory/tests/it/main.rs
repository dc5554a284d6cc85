#![allow(missing_docs)]

use assert_matches::assert_matches;
use sectioned::{FetchError, FetchRequest, PendingState, RecordSource, SortDescriptor, Value};
use sectioned_memory::{predicate, MemoryStore, Predicate, RecordId, StoreError};

#[derive(Clone, Debug, PartialEq)]
struct Note {
    folder: &'static str,
    rank: i64,
}

fn note(folder: &'static str, rank: i64) -> Note {
    Note { folder, rank }
}

fn descriptors() -> [SortDescriptor<Note>; 2] {
    [
        SortDescriptor::ascending("folder", |n: &Note| Value::from(n.folder)),
        SortDescriptor::descending("rank", |n: &Note| Value::from(n.rank)),
    ]
}

fn fetch(store: &MemoryStore<Note>, predicate: Option<&Predicate<Note>>) -> Vec<RecordId> {
    let descriptors = descriptors();
    store.fetch(FetchRequest { sort_descriptors: &descriptors, grouped: true, predicate }).unwrap()
}

#[test]
fn fetch_sorts_committed_records() {
    let store: MemoryStore<Note> =
        [note("b", 1), note("a", 1), note("a", 5), note("a", 1)].into_iter().collect();

    // Ties are broken by identity.
    assert_eq!(
        fetch(&store, None),
        [RecordId::Durable(2), RecordId::Durable(1), RecordId::Durable(3), RecordId::Durable(0)]
    );
}

#[test]
fn fetch_filters_by_predicate() {
    let store: MemoryStore<Note> = [note("a", 1), note("a", 5), note("b", 7)].into_iter().collect();
    let high = predicate(|n: &Note| n.rank > 3);

    assert_eq!(fetch(&store, Some(&high)), [RecordId::Durable(1), RecordId::Durable(2)]);
    assert!(store.evaluate(&high, &note("c", 4)));
}

#[test]
fn fetch_appends_unsaved_records() {
    let mut store: MemoryStore<Note> = [note("a", 1), note("a", 5)].into_iter().collect();
    store.update(RecordId::Durable(0), |n| n.rank = 10).unwrap();
    let first = store.insert(note("z", 0));
    let second = store.insert(note("a", 9));

    // Updated records follow the committed ones, pending insertions come
    // last, in insertion order.
    assert_eq!(fetch(&store, None), [RecordId::Durable(1), RecordId::Durable(0), first, second]);
    assert_eq!(store.pending_state(&RecordId::Durable(0)), PendingState::Updated);
    assert_eq!(store.pending_state(&first), PendingState::Inserted);
    assert_eq!(store.read(&RecordId::Durable(0), |n| n.rank), Some(10));
}

#[test]
fn fetch_does_not_filter_unsaved_updates() {
    let mut store: MemoryStore<Note> = [note("a", 1), note("a", 2)].into_iter().collect();
    let high = predicate(|n: &Note| n.rank > 3);
    assert!(fetch(&store, Some(&high)).is_empty());

    // Only the committed state fails the predicate.
    store.update(RecordId::Durable(1), |n| n.rank = 4).unwrap();
    assert_eq!(fetch(&store, Some(&high)), [RecordId::Durable(1)]);

    store.save().unwrap();
    assert_eq!(fetch(&store, Some(&high)), [RecordId::Durable(1)]);
}

#[test]
fn unavailable_store_fails_fetches() {
    let mut store: MemoryStore<Note> = [note("a", 1)].into_iter().collect();
    store.set_available(false);

    let descriptors = descriptors();
    let request = FetchRequest { sort_descriptors: &descriptors, grouped: false, predicate: None };
    assert_matches!(store.fetch(request), Err(FetchError::Store(_)));

    store.set_available(true);
    assert_eq!(store.fetch(request).unwrap(), [RecordId::Durable(0)]);
}

#[test]
fn change_batches() {
    let mut store: MemoryStore<Note> = [note("a", 1), note("a", 2)].into_iter().collect();
    assert!(store.process_pending_changes().is_empty());

    let inserted = store.insert(note("b", 1));
    store.update(RecordId::Durable(0), |n| n.rank = 3).unwrap();
    store.delete(RecordId::Durable(1)).unwrap();
    store.refresh(RecordId::Durable(0)).unwrap();

    let batch = store.process_pending_changes();
    assert_eq!(batch.inserted, [inserted]);
    assert_eq!(batch.updated, [RecordId::Durable(0)]);
    assert_eq!(batch.deleted, [RecordId::Durable(1)]);
    assert_eq!(batch.refreshed, [RecordId::Durable(0)]);
    assert!(store.process_pending_changes().is_empty());

    assert_eq!(store.pending_state(&RecordId::Durable(0)), PendingState::Clean);
    assert_eq!(store.pending_state(&RecordId::Durable(1)), PendingState::Deleted);
    assert_eq!(store.get(RecordId::Durable(1)), None);
    assert_eq!(store.len(), 2);
}

#[test]
fn save_assigns_durable_identities() {
    let mut store: MemoryStore<Note> = [note("a", 1)].into_iter().collect();
    let inserted = store.insert(note("a", 2));
    store.delete(RecordId::Durable(0)).unwrap();

    let receipt = store.save().unwrap();
    assert_eq!(receipt.assigned, [(inserted, RecordId::Durable(1))]);
    assert_eq!(receipt.changes.inserted, [inserted]);
    assert_eq!(receipt.changes.deleted, [RecordId::Durable(0)]);

    assert_eq!(fetch(&store, None), [RecordId::Durable(1)]);
    assert_eq!(store.pending_state(&RecordId::Durable(1)), PendingState::Clean);

    // The temporary identity keeps working.
    assert_eq!(store.read(&inserted, |n| n.rank), Some(2));
    store.update(inserted, |n| n.rank = 4).unwrap();
    assert_eq!(store.process_pending_changes().updated, [RecordId::Durable(1)]);
    assert_eq!(store.get(RecordId::Durable(1)), Some(&note("a", 4)));
}

#[test]
fn validation() {
    let mut store = MemoryStore::new().with_validation(|n: &Note| n.rank >= 0);
    let valid = store.insert(note("a", 1));
    let invalid = store.insert(note("a", -1));

    assert_matches!(store.save(), Err(StoreError::Rejected(id)) if id == invalid);
    assert_eq!(store.pending_state(&valid), PendingState::Inserted);

    store.delete(invalid).unwrap();
    let receipt = store.save().unwrap();
    assert_eq!(receipt.assigned, [(valid, RecordId::Durable(0))]);
}

#[test]
fn invalidate_all_discards_changes() {
    let mut store: MemoryStore<Note> = [note("a", 1)].into_iter().collect();
    store.update(RecordId::Durable(0), |n| n.rank = 3).unwrap();
    let inserted = store.insert(note("b", 1));

    store.invalidate_all();

    let batch = store.process_pending_changes();
    assert!(batch.invalidated_all);
    assert!(batch.inserted.is_empty());
    assert_eq!(store.get(RecordId::Durable(0)), Some(&note("a", 1)));
    assert_eq!(store.get(inserted), None);
    assert_eq!(store.ids(), [RecordId::Durable(0)]);
}

#[test]
fn transaction_changes_show_up_together() {
    let mut store: MemoryStore<Note> = [note("a", 1)].into_iter().collect();

    let mut txn = store.transaction();
    let inserted = txn.insert(note("a", 2));
    txn.update(RecordId::Durable(0), |n| n.folder = "b").unwrap();
    txn.commit();

    let batch = store.process_pending_changes();
    assert_eq!(batch.inserted, [inserted]);
    assert_eq!(batch.updated, [RecordId::Durable(0)]);
    assert_eq!(store.ids(), [inserted, RecordId::Durable(0)]);
}

#[test]
fn unknown_records() {
    let mut store: MemoryStore<Note> = MemoryStore::new();

    assert_matches!(
        store.update(RecordId::Durable(3), |n| n.rank = 0),
        Err(StoreError::UnknownRecord(RecordId::Durable(3)))
    );
    assert_matches!(store.delete(RecordId::Temporary(0)), Err(StoreError::UnknownRecord(_)));
    assert_eq!(store.read(&RecordId::Durable(3), |n| n.rank), None);
    assert!(store.is_empty());
}
