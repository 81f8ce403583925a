//! Integration tests for computed values

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use tessera_engine::{Computed, Transactions};
use tessera_foundation::Value;

use crate::database;

#[test]
fn recomputes_when_a_dependency_changes() {
    let db = database(Transactions::new());
    let label = Computed::new(&db, |view| {
        let paused = view.get("paused").and_then(|v| v.as_bool()).unwrap_or(false);
        if paused { "paused".to_string() } else { "running".to_string() }
    });
    let seen = Rc::new(RefCell::new(Vec::new()));
    let s = Rc::clone(&seen);
    let _h = label.subscribe(move |v| s.borrow_mut().push(v.clone())).unwrap();

    db.set_resource("paused", true).unwrap();
    db.set_resource("time", 1.0).unwrap();
    assert_eq!(*seen.borrow(), vec!["running", "paused"]);
}

#[test]
fn batch_coalesces_recomputation() {
    let db = database(Transactions::new());
    let runs = Rc::new(Cell::new(0));
    let r = Rc::clone(&runs);
    let time = Computed::new(&db, move |view| {
        r.set(r.get() + 1);
        view.get("time").and_then(|v| v.as_f64()).unwrap_or(0.0).to_bits()
    });
    let _h = time.subscribe(|_| {}).unwrap();
    let before = runs.get();
    db.batch(|| {
        for n in 1..=5 {
            db.set_resource("time", f64::from(n)).unwrap();
        }
    });
    assert_eq!(runs.get(), before + 1);
    assert_eq!(time.get().unwrap(), 5.0f64.to_bits());
}

#[test]
fn unsubscribed_value_reads_fresh() {
    let db = database(Transactions::new());
    let time = Computed::new(&db, |view| view.get("time"));
    assert_eq!(time.get().unwrap(), Some(Value::Float(0.0)));
    db.set_resource("time", 2.0).unwrap();
    assert_eq!(time.get().unwrap(), Some(Value::Float(2.0)));
    assert_eq!(db.observer_count(), 0);
}
