use sectioned::SectionEvent;
use sectioned_memory::RecordId;
use sectioned_util::{GreedyPrefetcher, Prefetcher};

use crate::{apply, durable, loaded, path, Item, Recorder, Store};

fn three() -> Store {
    [Item::new("a", 1), Item::new("a", 2), Item::new("b", 1)].into_iter().collect()
}

#[test]
fn fetch_materializes_everything() {
    let store = three();
    let collection = loaded(&store);
    let recorder = Recorder::default();
    let mut prefetcher = GreedyPrefetcher::new(recorder.clone());

    prefetcher.acknowledge_fetch(&collection);

    assert_eq!(recorder.log.borrow().materialized, [durable(0..3)]);
}

#[test]
fn diff_brings_in_and_releases() {
    let mut store = three();
    let mut collection = loaded(&store);
    let recorder = Recorder::default();
    let mut prefetcher = GreedyPrefetcher::new(recorder.clone());
    prefetcher.acknowledge_fetch(&collection);

    store.delete(RecordId::Durable(0)).unwrap();
    let new_section = store.insert(Item::new("c", 1));
    let new_row = store.insert(Item::new("b", 0));
    let diff = apply(&mut collection, &mut store);
    prefetcher.acknowledge_diff(&diff, &collection);

    let log = recorder.log.borrow();
    assert_eq!(log.released(), [RecordId::Durable(0)]);
    assert_eq!(log.materialized.last().unwrap(), &[new_row, new_section]);
    assert!(prefetcher.is_materialized(&new_section));
    assert!(!prefetcher.is_materialized(&RecordId::Durable(0)));
}

#[test]
fn moved_records_are_not_requested_again() {
    let mut store = three();
    let mut collection = loaded(&store);
    let recorder = Recorder::default();
    let mut prefetcher = GreedyPrefetcher::new(recorder.clone());
    prefetcher.acknowledge_fetch(&collection);

    store.update(RecordId::Durable(1), |item| item.group = "b").unwrap();
    let diff = apply(&mut collection, &mut store);
    assert_eq!(diff.moved_rows.len(), 1);
    prefetcher.acknowledge_event(&SectionEvent::Updated(diff), &collection);

    assert_eq!(recorder.log.borrow().materialized.len(), 1);
    assert!(recorder.log.borrow().released.is_empty());
}

#[test]
fn access_retries_failed_prefetch() {
    let store = three();
    let collection = loaded(&store);
    let recorder = Recorder::default();
    let mut prefetcher = GreedyPrefetcher::new(recorder.clone());

    recorder.log.borrow_mut().failing = true;
    prefetcher.acknowledge_fetch(&collection);
    assert!(!prefetcher.is_materialized(&RecordId::Durable(0)));

    recorder.log.borrow_mut().failing = false;
    prefetcher.acknowledge_access(path(1, 0), &collection);
    assert_eq!(recorder.log.borrow().materialized, [vec![RecordId::Durable(2)]]);
    assert!(prefetcher.is_materialized(&RecordId::Durable(2)));
}

#[test]
fn reload_releases_missing_records() {
    let mut store = three();
    let mut collection = loaded(&store);
    let recorder = Recorder::default();
    let mut prefetcher = GreedyPrefetcher::new(recorder.clone());
    prefetcher.acknowledge_fetch(&collection);

    store.delete(RecordId::Durable(2)).unwrap();
    collection.reload(&store).unwrap();
    prefetcher.acknowledge_fetch(&collection);

    let log = recorder.log.borrow();
    assert_eq!(log.released(), [RecordId::Durable(2)]);
    // Nothing new to materialize.
    assert_eq!(log.materialized.len(), 1);
}
