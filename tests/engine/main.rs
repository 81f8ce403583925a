//! Integration tests for Layer 2: Engine
//!
//! Tests for transactions, observation, computed values, and scheduling.

mod computed;
mod observation;
mod transactions;

use tessera_engine::{Database, Transactions};
use tessera_foundation::{Name, Schema, Value};
use tessera_storage::{EntityValues, Store};

pub fn store() -> Store {
    Store::new(
        [
            ("position", Schema::vec3()),
            ("velocity", Schema::vec3()),
            ("name", Schema::String),
            ("hp", Schema::u32()),
        ],
        [("time", Value::Float(0.0)), ("paused", Value::Bool(false))],
    )
    .unwrap()
}

pub fn database(transactions: Transactions) -> Database {
    Database::new(store(), transactions)
}

pub fn values<const N: usize>(pairs: [(&str, Value); N]) -> EntityValues {
    pairs.into_iter().map(|(k, v)| (Name::from(k), v)).collect()
}
