//! Tessera - Schema-driven columnar entity store
//!
//! This crate re-exports all layers of the Tessera system for convenient access.
//! For detailed documentation, see the individual layer crates.
//!
//! # Architecture
//!
//! ```text
//! Layer 2: tessera_engine      Transactions, observation, computed values, history, scheduling
//! Layer 1: tessera_storage     Byte layouts, columns, archetype tables, resources
//! Layer 0: tessera_foundation  Core types (Value, Entity, Schema, Error)
//! ```

pub use tessera_engine as engine;
pub use tessera_foundation as foundation;
pub use tessera_storage as storage;
