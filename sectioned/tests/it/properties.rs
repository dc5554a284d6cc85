use sectioned::{ChangeBatch, RecordSource};
use sectioned_memory::RecordId;

use crate::{apply, grouped, keys, layout, loaded, visible_only, Collection, Item, Store};

fn names(collection: &Collection) -> Vec<Option<String>> {
    (0..collection.section_count())
        .map(|s| collection.section_name(s).map(ToOwned::to_owned))
        .collect()
}

/// Apply the buffered changes, save, and swap in the durable identities.
fn save(collection: &mut Collection, store: &mut Store) {
    let receipt = store.save().unwrap();
    collection.apply(store, receipt.changes).unwrap();
    collection.resolve_identities(receipt.assigned);
    collection.check_invariants().unwrap();
    assert_eq!(collection.pending_identities().count(), 0);
}

#[test]
fn empty_batch_changes_nothing() {
    let store: Store =
        [Item::new("a", 2), Item::new("b", 1), Item::new("a", 1)].into_iter().collect();
    let mut collection = loaded(&store, grouped());
    let before = layout(&collection);
    let snapshots: Vec<_> =
        store.ids().iter().map(|id| collection.snapshot(id).cloned()).collect();

    let diff = collection.apply(&store, ChangeBatch::new()).unwrap();

    assert!(diff.is_empty());
    assert_eq!(layout(&collection), before);
    let after: Vec<_> = store.ids().iter().map(|id| collection.snapshot(id).cloned()).collect();
    assert_eq!(after, snapshots);
}

#[test]
fn reload_matches_incremental_state() {
    let mut store: Store =
        [Item::new("a", 10), Item::new("b", 20), Item::new("c", 30)].into_iter().collect();
    let mut collection = loaded(&store, grouped());

    store.insert(Item::new("b", 15));
    store.update(RecordId::Durable(0), |item| item.group = Some("c")).unwrap();
    apply(&mut collection, &mut store);
    store.delete(RecordId::Durable(2)).unwrap();
    store.insert(Item::new("d", 5));
    apply(&mut collection, &mut store);
    store.update(RecordId::Durable(1), |item| item.key = 1).unwrap();
    save(&mut collection, &mut store);

    let incremental = layout(&collection);
    collection.reload(&store).unwrap();
    assert_eq!(layout(&collection), incremental);
    assert_eq!(layout(&loaded(&store, grouped())), incremental);
}

#[test]
fn reload_with_unsaved_changes_matches_incremental_state() {
    let mut hidden = Item::new("x", 2);
    hidden.visible = false;
    let mut store: Store = [Item::new("x", 1), hidden].into_iter().collect();
    let mut collection = loaded(&store, visible_only());
    assert_eq!(layout(&collection), [[RecordId::Durable(0)]]);

    // Only the live state matches the predicate.
    store.update(RecordId::Durable(1), |item| item.visible = true).unwrap();
    store.update(RecordId::Durable(0), |item| item.key = 3).unwrap();
    let inserted = store.insert(Item::new("x", 5));
    apply(&mut collection, &mut store);

    let incremental = layout(&collection);
    assert_eq!(incremental, [[RecordId::Durable(1), RecordId::Durable(0), inserted]]);
    collection.reload(&store).unwrap();
    collection.check_invariants().unwrap();
    assert_eq!(layout(&collection), incremental);
    assert_eq!(layout(&loaded(&store, visible_only())), incremental);

    // Hidden again before saving.
    store.update(RecordId::Durable(1), |item| item.visible = false).unwrap();
    apply(&mut collection, &mut store);
    let incremental = layout(&collection);
    collection.reload(&store).unwrap();
    assert_eq!(layout(&collection), incremental);
    assert_eq!(incremental, [[RecordId::Durable(0), inserted]]);
}

/// A small deterministic generator, so failures are reproducible.
struct Lcg(u64);

impl Lcg {
    fn below(&mut self, bound: usize) -> usize {
        self.0 = self
            .0
            .wrapping_mul(6_364_136_223_846_793_005)
            .wrapping_add(1_442_695_040_888_963_407);
        ((self.0 >> 33) % bound as u64) as usize
    }
}

#[test]
fn random_batches_keep_invariants() {
    const GROUPS: [&str; 4] = ["a", "b", "c", "d"];

    let mut rng = Lcg(7);
    let mut store: Store = (0..12).map(|i| Item::new(GROUPS[i % 4], i as i64 % 5)).collect();
    let mut collection = loaded(&store, visible_only());

    for round in 0..200 {
        for _ in 0..=rng.below(4) {
            let ids = store.ids();
            let target = (!ids.is_empty()).then(|| ids[rng.below(ids.len())]);

            match (rng.below(6), target) {
                (0, _) | (_, None) => {
                    let group = GROUPS[rng.below(4)];
                    store.insert(Item::new(group, rng.below(8) as i64));
                }
                (1, Some(id)) => store.delete(id).unwrap(),
                (2, Some(id)) => {
                    let group = GROUPS[rng.below(4)];
                    store.update(id, |item| item.group = Some(group)).unwrap();
                }
                (3, Some(id)) => store.update(id, |item| item.visible = !item.visible).unwrap(),
                (_, Some(id)) => {
                    let key = rng.below(8) as i64;
                    store.update(id, |item| item.key = key).unwrap();
                }
            }
        }

        apply(&mut collection, &mut store);
        if round % 25 == 12 {
            let fresh = loaded(&store, visible_only());
            assert_eq!(keys(&collection, &store), keys(&fresh, &store), "round {round}");
        }
        if round % 25 == 24 {
            save(&mut collection, &mut store);
        }
    }
    save(&mut collection, &mut store);

    let fresh = loaded(&store, visible_only());
    assert_eq!(keys(&collection, &store), keys(&fresh, &store));
    assert_eq!(names(&collection), names(&fresh));

    let visible = store.ids().into_iter().filter(|id| store.read(id, |item| item.visible).unwrap());
    assert_eq!(collection.len(), visible.count());
}
