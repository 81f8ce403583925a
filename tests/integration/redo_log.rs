//! Integration tests for persisting redo logs
#![cfg(feature = "serde")]

use std::cell::RefCell;
use std::rc::Rc;

use tessera_engine::{WriteOperation, apply_write_operations};
use tessera_foundation::Value;

use crate::{game, spawn, store};

#[test]
fn replaying_a_msgpack_log_rebuilds_the_store() {
    let db = game();
    let log: Rc<RefCell<Vec<u8>>> = Rc::default();
    let sink = Rc::clone(&log);
    let _h = db.observe_transactions(move |result| {
        let bytes = rmp_serde::to_vec_named(&result.redo).unwrap();
        let mut sink = sink.borrow_mut();
        sink.extend(u32::try_from(bytes.len()).unwrap().to_le_bytes());
        sink.extend(bytes);
    });

    let ship = spawn(&db, "ship", [1.0, 2.0, 3.0], [0.0, 0.0, 0.0]);
    let rock = spawn(&db, "rock", [0.0, 0.0, 0.0], [0.0, 0.0, 0.0]);
    db.execute(|tx| Ok(tx.delete(rock))).unwrap();
    db.set_resource("frame", 9).unwrap();

    let mut replica = store();
    let bytes = log.borrow();
    let mut rest = &bytes[..];
    let mut batches = 0;
    while !rest.is_empty() {
        let (len, tail) = rest.split_at(4);
        let len = u32::from_le_bytes(len.try_into().unwrap()) as usize;
        let (body, tail) = tail.split_at(len);
        let ops: Vec<WriteOperation> = rmp_serde::from_slice(body).unwrap();
        apply_write_operations(&mut replica, &ops).unwrap();
        rest = tail;
        batches += 1;
    }

    assert_eq!(batches, 4);
    assert_eq!(replica.read(ship), db.read(ship).unwrap());
    assert!(!replica.contains(rock));
    assert_eq!(replica.resource("frame"), Some(Value::Int(9)));
}
