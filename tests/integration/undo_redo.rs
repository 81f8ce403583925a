//! Integration tests for history over named transactions

use tessera_engine::History;
use tessera_foundation::Value;

use crate::{game, spawn, vec3};

#[test]
fn undo_and_redo_restore_named_transactions() {
    let db = game();
    let history = History::attach(&db, 16);
    let ship = spawn(&db, "ship", [0.0, 0.0, 0.0], [0.0, 0.0, 0.0]);
    let initial = db.read(ship).unwrap();

    for x in [1.0, 2.0, 3.0] {
        let args = Value::object([("entity", Value::from(ship)), ("position", Value::from([x, 0.0, 0.0]))]);
        db.transact("teleport", args).unwrap();
    }
    assert_eq!(history.undo_len(), 4);

    for _ in 0..3 {
        assert!(history.undo().unwrap());
    }
    assert_eq!(db.read(ship).unwrap(), initial);
    assert!(history.undo().unwrap());
    assert_eq!(db.read(ship).unwrap(), None);

    for _ in 0..4 {
        assert!(history.redo().unwrap());
    }
    assert_eq!(vec3(&db.read(ship).unwrap().unwrap()["position"]), [3.0, 0.0, 0.0]);
    assert_eq!(history.undo_len(), 4);
    assert!(!history.can_redo());
}

#[test]
fn undo_notifies_observers() {
    let db = game();
    let history = History::attach(&db, 4);
    db.set_resource("dt", 1.0).unwrap();

    let seen = std::rc::Rc::new(std::cell::RefCell::new(Vec::new()));
    let s = std::rc::Rc::clone(&seen);
    let _h = db.observe_resource("dt", move |v| s.borrow_mut().push(v.clone())).unwrap();
    history.undo().unwrap();
    history.redo().unwrap();
    assert_eq!(*seen.borrow(), vec![Value::Float(1.0), Value::Float(0.5), Value::Float(1.0)]);
    assert_eq!(history.undo_len(), 1);
}

#[test]
fn failed_transactions_leave_history_alone() {
    let db = game();
    let history = History::attach(&db, 4);
    let err = db.transact("spawn", Value::object([("name", "ghost")]));
    assert!(err.is_err());
    assert!(!history.can_undo());
}
