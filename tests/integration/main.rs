//! Cross-layer integration tests
//!
//! Tests that drive a database through scheduled frames, history, and
//! persisted redo logs.

mod redo_log;
mod undo_redo;

use tessera_engine::{Database, Transactions};
use tessera_foundation::{Error, Name, Schema, Value};
use tessera_storage::{Changes, EntityValues, Store};

pub fn values<const N: usize>(pairs: [(&str, Value); N]) -> EntityValues {
    pairs.into_iter().map(|(k, v)| (Name::from(k), v)).collect()
}

pub fn store() -> Store {
    Store::new(
        [
            ("position", Schema::vec3()),
            ("velocity", Schema::vec3()),
            ("name", Schema::String),
        ],
        [("dt", Value::Float(0.5)), ("frame", Value::Int(0))],
    )
    .unwrap()
}

pub fn vec3(value: &Value) -> [f64; 3] {
    let at = |i| value.element(i).and_then(Value::as_f64).unwrap_or(0.0);
    [at(0), at(1), at(2)]
}

/// Transactions shared by the scenarios: `spawn` takes a name plus position
/// and velocity arrays; `teleport` takes an entity and a position.
pub fn game() -> Database {
    let transactions = Transactions::new()
        .with("spawn", |tx, args| {
            let field = |name: &str| {
                args.field(name)
                    .cloned()
                    .ok_or_else(|| Error::internal(format!("missing {name}")))
            };
            let entity = tx.create(values([
                ("name", field("name")?),
                ("position", field("position")?),
                ("velocity", field("velocity")?),
            ]))?;
            Ok(Some(entity))
        })
        .with("teleport", |tx, args| {
            let entity = args
                .field("entity")
                .and_then(Value::as_entity)
                .ok_or_else(|| Error::internal("missing entity"))?;
            let position = args.field("position").cloned().unwrap_or(Value::Null);
            tx.update(entity, &Changes::new().set("position", position))?;
            Ok(None)
        });
    Database::new(store(), transactions)
}

pub fn spawn(db: &Database, name: &str, position: [f64; 3], velocity: [f64; 3]) -> tessera_foundation::Entity {
    let args = Value::object([
        ("name", Value::from(name)),
        ("position", Value::from(position)),
        ("velocity", Value::from(velocity)),
    ]);
    db.transact("spawn", args).unwrap().unwrap()
}
