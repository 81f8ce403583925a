//! Integration tests for entity allocation and swap-remove bookkeeping

use tessera_foundation::{Entity, Name, Schema, Value};
use tessera_storage::{EntityValues, Store, StoreConfig};

fn score(n: u32) -> EntityValues {
    [(Name::from("score"), Value::from(n))].into_iter().collect()
}

fn store() -> Store {
    Store::with_config(
        StoreConfig::compact(),
        [("score", Schema::u32())],
        std::iter::empty::<(&str, Value)>(),
    )
    .unwrap()
}

#[test]
fn ids_are_reused_most_recent_first() {
    let mut s = store();
    let arch = s.ensure_archetype(["id", "score"]).unwrap();
    let [a, b, c] = [1, 2, 3].map(|n| s.insert(arch, score(n)).unwrap());
    s.delete(a);
    s.delete(b);
    s.delete(c);
    let reused = [4, 5, 6].map(|n| s.insert(arch, score(n)).unwrap());
    assert_eq!(reused, [c, b, a]);
    assert_eq!(s.insert(arch, score(7)).unwrap(), Entity::new(3));
}

#[test]
fn delete_relocates_last_row() {
    let mut s = store();
    let arch = s.ensure_archetype(["id", "score"]).unwrap();
    let entities: Vec<_> = (0..5).map(|n| s.insert(arch, score(n)).unwrap()).collect();
    s.delete(entities[1]);
    assert_eq!(s.locate(entities[4]).unwrap().row, 1);
    for (i, &e) in entities.iter().enumerate() {
        if i != 1 {
            assert_eq!(s.get(e, "score"), Some(Value::from(u32::try_from(i).unwrap())));
        }
    }
    assert_eq!(s.archetype(arch).unwrap().len(), 4);
}

#[test]
fn deleting_twice_is_harmless() {
    let mut s = store();
    let e = s.create(score(1)).unwrap();
    assert!(s.delete(e).is_some());
    assert!(s.delete(e).is_none());
    assert!(s.read(e).is_none());
    assert_eq!(s.entity_count(), 0);
}

#[test]
fn tables_grow_past_initial_capacity() {
    let mut s = store();
    let arch = s.ensure_archetype(["id", "score"]).unwrap();
    for n in 0..40 {
        s.insert(arch, score(n)).unwrap();
    }
    let table = s.archetype(arch).unwrap().table();
    assert_eq!(table.rows(), 40);
    assert!(table.capacity() >= 40);
}
