//! Integration tests for database observers and named transactions

use std::cell::RefCell;
use std::rc::Rc;

use futures::executor::block_on;
use futures::stream;
use tessera_engine::Transactions;
use tessera_foundation::{Entity, Error, ErrorKind, Value};
use tessera_storage::{Changes, EntityValues};

use crate::{database, values};

fn log() -> Rc<RefCell<Vec<String>>> {
    Rc::new(RefCell::new(Vec::new()))
}

fn spawn() -> Transactions {
    Transactions::new()
        .with("spawn", |tx, args| {
            let name = args.as_str().ok_or_else(|| Error::internal("name expected"))?;
            tx.create(values([("name", Value::from(name))])).map(Some)
        })
        .with("rename", |tx, args| {
            let entity = args.field("entity").and_then(Value::as_entity);
            let entity = entity.ok_or_else(|| Error::internal("entity expected"))?;
            let name = args.field("name").cloned().unwrap_or(Value::Null);
            tx.update(entity, &Changes::new().set("name", name))?;
            Ok(None)
        })
}

// =============================================================================
// Entity Observers
// =============================================================================

#[test]
fn entity_observer_sees_lifecycle() {
    let db = database(spawn());
    let e = db.transact("spawn", Value::from("orc")).unwrap().unwrap();
    let seen: Rc<RefCell<Vec<Option<EntityValues>>>> = Rc::new(RefCell::new(Vec::new()));
    let s = Rc::clone(&seen);
    let _h = db.observe_entity(e, move |v| s.borrow_mut().push(v.cloned())).unwrap();

    db.transact("rename", Value::object([("entity", Value::from(e)), ("name", Value::from("elf"))]))
        .unwrap();
    db.execute(|tx| Ok(tx.delete(e))).unwrap();

    let seen = seen.borrow();
    assert_eq!(seen.len(), 3);
    assert_eq!(seen[0].as_ref().unwrap()["name"], Value::from("orc"));
    assert_eq!(seen[1].as_ref().unwrap()["name"], Value::from("elf"));
    assert_eq!(seen[2], None);
}

#[test]
fn observer_of_missing_entity_starts_with_none() {
    let db = database(Transactions::new());
    let calls = Rc::new(RefCell::new(Vec::new()));
    let c = Rc::clone(&calls);
    let _h = db
        .observe_entity(Entity::new(42), move |v| c.borrow_mut().push(v.is_some()))
        .unwrap();
    assert_eq!(*calls.borrow(), vec![false]);
}

// =============================================================================
// Ordering
// =============================================================================

#[test]
fn observers_fire_from_broad_to_narrow() {
    let db = database(spawn());
    let e = db.transact("spawn", Value::from("a")).unwrap().unwrap();
    let arch = db.with_store(|s| s.locate(e).unwrap().archetype).unwrap();

    let order = log();
    let (o1, o2, o3, o4) = (Rc::clone(&order), Rc::clone(&order), Rc::clone(&order), Rc::clone(&order));
    let _a = db.observe_transactions(move |_| o1.borrow_mut().push("transaction".into()));
    let _b = db.observe_component("name", move || o2.borrow_mut().push("component".into()));
    let _c = db.observe_archetype(arch, move || o3.borrow_mut().push("archetype".into()));
    let _d = db.observe_entity(e, move |_| o4.borrow_mut().push("entity".into())).unwrap();
    order.borrow_mut().clear();

    db.transact("rename", Value::object([("entity", Value::from(e)), ("name", Value::from("b"))]))
        .unwrap();
    assert_eq!(*order.borrow(), vec!["transaction", "component", "archetype", "entity"]);
}

#[test]
fn failures_notify_no_one() {
    let db = database(spawn());
    let order = log();
    let o = Rc::clone(&order);
    let _h = db.observe_transactions(move |_| o.borrow_mut().push("called".into()));
    let err = db.transact("spawn", Value::Int(3)).unwrap_err();
    assert_eq!(err.context.and_then(|c| c.transaction).as_deref(), Some("spawn"));
    assert!(order.borrow().is_empty());
}

#[test]
fn unsubscribed_observers_stay_quiet() {
    let db = database(Transactions::new());
    let order = log();
    let o = Rc::clone(&order);
    let handle = db.observe_resource("time", move |v| o.borrow_mut().push(v.to_string())).unwrap();
    db.set_resource("time", 1.5).unwrap();
    handle.unsubscribe();
    db.set_resource("time", 2.5).unwrap();
    assert_eq!(order.borrow().len(), 2);
    assert_eq!(db.observer_count(), 0);
}

#[test]
fn resource_observers_ignore_same_named_components() {
    let db = database(Transactions::new());
    let seen = log();
    let s = Rc::clone(&seen);
    let _h = db.observe_resource("time", move |v| s.borrow_mut().push(v.to_string())).unwrap();

    let e = db
        .execute(|tx| tx.create(values([("time", Value::Float(99.0))])))
        .unwrap()
        .value;
    db.execute(|tx| tx.update(e, &Changes::new().set("time", 100.0))).unwrap();
    assert_eq!(seen.borrow().len(), 1);

    db.set_resource("time", 3.0).unwrap();
    assert_eq!(seen.borrow().len(), 2);
}

// =============================================================================
// Named Transactions
// =============================================================================

#[test]
fn unknown_transaction_names_are_rejected() {
    let db = database(spawn());
    let err = db.transact("despawn", Value::Null).unwrap_err();
    assert!(matches!(err.kind, ErrorKind::UnknownTransaction(ref n) if n == "despawn"));
}

#[test]
fn deferred_arguments_run_once() {
    let db = database(spawn());
    let e = block_on(db.transact_deferred("spawn", async { Ok(Value::from("later")) }))
        .unwrap()
        .unwrap();
    assert_eq!(db.read(e).unwrap().unwrap()["name"], Value::from("later"));
}

#[test]
fn streamed_arguments_commit_each_item() {
    let db = database(spawn());
    let args = stream::iter(["a", "b", "c"].map(|n| Ok(Value::from(n))));
    let created = block_on(db.transact_streamed("spawn", args)).unwrap();
    assert_eq!(created.len(), 3);
    assert_eq!(db.with_store(|s| s.select(&["name"], &[]).len()).unwrap(), 3);
}

#[test]
fn streamed_arguments_stop_at_first_failure() {
    let db = database(spawn());
    let args = stream::iter(vec![Ok(Value::from("a")), Ok(Value::Int(1)), Ok(Value::from("c"))]);
    let err = block_on(db.transact_streamed("spawn", args)).unwrap_err();
    assert!(matches!(err.kind, ErrorKind::Internal(_)));
    assert_eq!(db.with_store(|s| s.select(&["name"], &[]).len()).unwrap(), 1);
}
