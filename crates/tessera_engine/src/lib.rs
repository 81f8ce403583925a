//! Transactions, observation, computed values, and system scheduling for Tessera.
//!
//! This crate provides:
//! - [`TransactionalStore`] - Recorded, atomic store mutation with rollback
//! - [`Database`] - Observable transactions, resources, and named transactions
//! - [`Computed`] - Values derived from resources with dependency tracking
//! - [`History`] - Bounded undo/redo over committed transactions
//! - [`SystemScheduler`] - Phased, ordered per-frame systems

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod computed;
pub mod database;
pub mod history;
pub mod scheduler;
pub mod transaction;

pub use computed::{Computed, ResourceView};
pub use database::{Database, TransactionFn, Transactions, Unsubscribe};
pub use history::{History, HistoryEntry};
pub use scheduler::{AsyncSystemFn, DEFAULT_PHASES, SyncSystemFn, System, SystemRun, SystemScheduler};
pub use transaction::{
    Transaction, TransactionOptions, TransactionResult, TransactionalStore, WriteOperation,
    apply_write_operations,
};
