//! Integration tests for transactional writes

use tessera_engine::{TransactionalStore, WriteOperation, apply_write_operations};
use tessera_foundation::{ErrorKind, Value};
use tessera_storage::Changes;

use crate::{store, values};

// =============================================================================
// Rollback
// =============================================================================

#[test]
fn failed_transaction_leaves_store_untouched() {
    let mut ts = TransactionalStore::new(store());
    let keep = ts
        .execute(|tx| tx.create(values([("name", Value::from("keep"))])))
        .unwrap()
        .value;

    let err = ts
        .execute(|tx| {
            tx.create(values([("name", Value::from("doomed"))]))?;
            tx.update(keep, &Changes::new().set("name", "renamed").set("hp", 5))?;
            tx.set_resource("time", 3.0)?;
            tx.update(keep, &Changes::new().set("hp", -1))
        })
        .unwrap_err();
    assert!(matches!(err.kind, ErrorKind::SchemaViolation { .. }));

    let s = ts.store();
    assert_eq!(s.entity_count(), 3);
    assert_eq!(s.read(keep).unwrap(), values([("id", Value::from(keep)), ("name", Value::from("keep"))]));
    assert_eq!(s.resource("time"), Some(Value::Float(0.0)));
}

#[test]
fn rollback_restores_deleted_entities() {
    let mut ts = TransactionalStore::new(store());
    let e = ts
        .execute(|tx| tx.create(values([("hp", Value::from(9u32))])))
        .unwrap()
        .value;
    let before = ts.store().read(e);

    let result = ts.execute(|tx| {
        tx.delete(e);
        tx.create(values([("hp", Value::Int(-3))]))
    });
    assert!(result.is_err());
    assert_eq!(ts.store().read(e), before);
}

// =============================================================================
// Records
// =============================================================================

#[test]
fn undo_reverts_and_redo_reapplies() {
    let mut ts = TransactionalStore::new(store());
    let e = ts
        .execute(|tx| tx.create(values([("hp", Value::from(10u32))])))
        .unwrap()
        .value;
    let before = ts.store().read(e).unwrap();

    let result = ts
        .execute(|tx| {
            tx.update(e, &Changes::new().set("hp", 4).set("name", "hurt"))?;
            tx.create(values([("name", Value::from("spawned"))]))
        })
        .unwrap();
    let after = ts.store().read(e).unwrap();

    let mut store = ts.into_inner();
    apply_write_operations(&mut store, &result.undo).unwrap();
    assert_eq!(store.read(e).unwrap(), before);
    assert!(!store.contains(result.value));

    apply_write_operations(&mut store, &result.redo).unwrap();
    assert_eq!(store.read(e).unwrap(), after);
    assert_eq!(store.get(result.value, "name"), Some(Value::from("spawned")));
}

#[test]
fn repeated_updates_coalesce() {
    let mut ts = TransactionalStore::new(store());
    let e = ts
        .execute(|tx| tx.create(values([("hp", Value::from(1u32))])))
        .unwrap()
        .value;
    let result = ts
        .execute(|tx| {
            for hp in 2..6 {
                tx.update(e, &Changes::new().set("hp", hp))?;
            }
            Ok(())
        })
        .unwrap();
    assert_eq!(
        result.redo,
        vec![WriteOperation::Update {
            entity: e,
            changes: Changes::new().set("hp", 5),
        }]
    );
    assert_eq!(
        result.undo,
        vec![WriteOperation::Update {
            entity: e,
            changes: Changes::new().set("hp", 1),
        }]
    );
}

#[test]
fn change_sets_cover_every_touched_item() {
    let mut ts = TransactionalStore::new(store());
    let e = ts
        .execute(|tx| tx.create(values([("name", Value::from("a"))])))
        .unwrap()
        .value;
    let result = ts
        .execute(|tx| tx.update(e, &Changes::new().set("velocity", Value::from([0.0, 0.0, 1.0]))))
        .unwrap();
    assert!(result.changed_entities.contains(&e));
    assert_eq!(
        result.changed_components.iter().map(ToString::to_string).collect::<Vec<_>>(),
        vec!["velocity"]
    );
    assert_eq!(result.changed_archetypes.len(), 2);
}

#[test]
fn writes_that_change_nothing_are_empty() {
    let mut ts = TransactionalStore::new(store());
    let e = ts
        .execute(|tx| tx.create(values([("name", Value::from("a"))])))
        .unwrap()
        .value;
    let result = ts
        .execute(|tx| tx.update(e, &Changes::new().set("name", "a").remove("hp")))
        .unwrap();
    assert!(result.is_empty());
}

// =============================================================================
// Properties
// =============================================================================

mod proptests {
    use super::*;
    use proptest::prelude::*;
    use tessera_foundation::Error;

    #[derive(Clone, Debug)]
    enum Op {
        Create(u32),
        Update(usize, u32),
        Rename(usize),
        Delete(usize),
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            any::<u32>().prop_map(Op::Create),
            (0..8usize, any::<u32>()).prop_map(|(i, hp)| Op::Update(i, hp)),
            (0..8usize).prop_map(Op::Rename),
            (0..8usize).prop_map(Op::Delete),
        ]
    }

    proptest! {
        #[test]
        fn failed_transactions_are_atomic(ops in prop::collection::vec(op(), 0..40)) {
            let mut ts = TransactionalStore::new(store());
            let seeded: Vec<_> = (0..4u32)
                .map(|n| {
                    ts.execute(|tx| tx.create(values([("hp", Value::from(n))])))
                        .unwrap()
                        .value
                })
                .collect();
            let snapshot: Vec<_> = (0..8).map(|i| ts.store().read(tessera_foundation::Entity::new(i))).collect();

            let result = ts.execute(|tx| {
                let mut live = seeded.clone();
                for op in &ops {
                    match *op {
                        Op::Create(hp) => live.push(tx.create(values([("hp", Value::from(hp))]))?),
                        Op::Update(i, hp) => {
                            if let Some(&e) = live.get(i % live.len().max(1)) {
                                if tx.contains(e) {
                                    tx.update(e, &Changes::new().set("hp", hp))?;
                                }
                            }
                        }
                        Op::Rename(i) => {
                            if let Some(&e) = live.get(i % live.len().max(1)) {
                                if tx.contains(e) {
                                    tx.update(e, &Changes::new().set("name", format!("e{i}")).remove("hp"))?;
                                }
                            }
                        }
                        Op::Delete(i) => {
                            if let Some(&e) = live.get(i % live.len().max(1)) {
                                tx.delete(e);
                            }
                        }
                    }
                }
                Err::<(), _>(Error::internal("abort"))
            });

            prop_assert!(result.is_err());
            let after: Vec<_> = (0..8).map(|i| ts.store().read(tessera_foundation::Entity::new(i))).collect();
            prop_assert_eq!(after, snapshot);
        }
    }
}
