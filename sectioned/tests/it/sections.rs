use sectioned::{RowMove, SectionDiff};
use sectioned_memory::RecordId;

use crate::{apply, grouped, keys, layout, loaded, path, visible_only, Item, Store};

#[test]
fn cross_section_move() {
    let mut store: Store =
        [Item::new("x", 1), Item::new("x", 2), Item::new("y", 1)].into_iter().collect();
    let mut collection = loaded(&store, grouped());

    store.update(RecordId::Durable(0), |a| a.group = Some("y")).unwrap();
    let diff = apply(&mut collection, &mut store);

    // Ties go after existing members.
    assert_eq!(
        diff,
        SectionDiff {
            moved_rows: vec![RowMove::new(path(0, 0), path(1, 1))],
            ..Default::default()
        }
    );
    assert_eq!(
        layout(&collection),
        vec![vec![RecordId::Durable(1)], vec![RecordId::Durable(2), RecordId::Durable(0)]]
    );
}

#[test]
fn cross_section_move_emptying_origin() {
    let mut store: Store = [Item::new("x", 2), Item::new("y", 1)].into_iter().collect();
    let mut collection = loaded(&store, grouped());

    store.update(RecordId::Durable(0), |a| a.group = Some("y")).unwrap();
    let diff = apply(&mut collection, &mut store);

    // The origin section is gone, so there is nothing to move from.
    assert_eq!(
        diff,
        SectionDiff {
            deleted_sections: vec![0],
            deleted_rows: vec![path(0, 0)],
            inserted_rows: vec![path(0, 1)],
            ..Default::default()
        }
    );
    assert_eq!(collection.section_name(0), Some("y"));
}

#[test]
fn deleting_only_member_deletes_section() {
    let mut store: Store = [Item::new("x", 1), Item::new("y", 1)].into_iter().collect();
    let mut collection = loaded(&store, grouped());

    store.delete(RecordId::Durable(0)).unwrap();
    let diff = apply(&mut collection, &mut store);

    assert_eq!(
        diff,
        SectionDiff {
            deleted_sections: vec![0],
            deleted_rows: vec![path(0, 0)],
            ..Default::default()
        }
    );
    assert_eq!(collection.section_count(), 1);
}

#[test]
fn inserting_into_new_section() {
    let mut store: Store = [Item::new("x", 1)].into_iter().collect();
    let mut collection = loaded(&store, grouped());

    store.insert(Item::new("z", 2));
    store.insert(Item::new("z", 1));
    let diff = apply(&mut collection, &mut store);

    // The section insertion accounts for both rows.
    assert_eq!(diff, SectionDiff { inserted_sections: vec![1], ..Default::default() });
    assert_eq!(keys(&collection, &store), [vec![1], vec![1, 2]]);
}

#[test]
fn new_sections_are_ordered() {
    let mut store: Store = [Item::new("b", 1), Item::new("d", 1)].into_iter().collect();
    let mut collection = loaded(&store, grouped());

    store.insert(Item::new("e", 1));
    store.insert(Item::new("a", 1));
    store.insert(Item::new("c", 1));
    store.insert(Item::new("b", 0));
    let diff = apply(&mut collection, &mut store);

    assert_eq!(
        diff,
        SectionDiff {
            inserted_sections: vec![0, 2, 4],
            inserted_rows: vec![path(1, 0)],
            ..Default::default()
        }
    );
    let names: Vec<_> = (0..5).map(|s| collection.section_name(s).unwrap()).collect();
    assert_eq!(names, ["a", "b", "c", "d", "e"]);
}

#[test]
fn move_into_new_section() {
    let mut store: Store = [Item::new("x", 1), Item::new("x", 2)].into_iter().collect();
    let mut collection = loaded(&store, grouped());

    store.update(RecordId::Durable(1), |c| c.group = Some("w")).unwrap();
    let diff = apply(&mut collection, &mut store);

    assert_eq!(
        diff,
        SectionDiff {
            inserted_sections: vec![0],
            deleted_rows: vec![path(0, 1)],
            ..Default::default()
        }
    );
    assert_eq!(collection.section_name(0), Some("w"));
}

#[test]
fn move_into_new_section_emptying_origin() {
    let mut store: Store = [Item::new("x", 1), Item::new("y", 1)].into_iter().collect();
    let mut collection = loaded(&store, grouped());

    store.update(RecordId::Durable(0), |a| a.group = Some("z")).unwrap();
    let diff = apply(&mut collection, &mut store);

    assert_eq!(
        diff,
        SectionDiff {
            deleted_sections: vec![0],
            inserted_sections: vec![1],
            deleted_rows: vec![path(0, 0)],
            ..Default::default()
        }
    );
    assert_eq!(layout(&collection), [[RecordId::Durable(1)], [RecordId::Durable(0)]]);
}

#[test]
fn swapping_sections_keeps_both() {
    let mut store: Store = [Item::new("x", 1), Item::new("y", 1)].into_iter().collect();
    let mut collection = loaded(&store, grouped());

    store.update(RecordId::Durable(0), |a| a.group = Some("y")).unwrap();
    store.update(RecordId::Durable(1), |b| b.group = Some("x")).unwrap();
    let diff = apply(&mut collection, &mut store);

    // Each section is emptied and refilled in the same pass.
    assert_eq!(
        diff,
        SectionDiff {
            moved_rows: vec![
                RowMove::new(path(0, 0), path(1, 0)),
                RowMove::new(path(1, 0), path(0, 0)),
            ],
            ..Default::default()
        }
    );
    assert_eq!(layout(&collection), [[RecordId::Durable(1)], [RecordId::Durable(0)]]);
}

#[test]
fn predicate_transitions() {
    let mut store: Store = [Item::new("x", 1), Item::new("x", 2)].into_iter().collect();
    let mut collection = loaded(&store, visible_only());

    store.update(RecordId::Durable(0), |a| a.visible = false).unwrap();
    let diff = apply(&mut collection, &mut store);
    assert_eq!(diff, SectionDiff { deleted_rows: vec![path(0, 0)], ..Default::default() });

    store.update(RecordId::Durable(1), |b| b.visible = false).unwrap();
    let diff = apply(&mut collection, &mut store);
    assert_eq!(
        diff,
        SectionDiff {
            deleted_sections: vec![0],
            deleted_rows: vec![path(0, 0)],
            ..Default::default()
        }
    );
    assert!(collection.is_empty());

    store.update(RecordId::Durable(0), |a| a.visible = true).unwrap();
    let diff = apply(&mut collection, &mut store);
    assert_eq!(diff, SectionDiff { inserted_sections: vec![0], ..Default::default() });
}

#[test]
fn non_qualifying_insert_is_ignored() {
    let mut store: Store = [Item::new("x", 1)].into_iter().collect();
    let mut collection = loaded(&store, visible_only());

    store.insert(Item { visible: false, ..Item::new("x", 0) });
    let diff = apply(&mut collection, &mut store);

    assert!(diff.is_empty());
    assert_eq!(collection.len(), 1);
}
