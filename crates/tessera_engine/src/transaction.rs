//! Transactional mutation of a [`Store`].
//!
//! [`TransactionalStore::execute`] hands the caller a [`Transaction`], a view
//! of the store whose writes are recorded as redo and undo operations. If the
//! transaction function fails, the undo operations are replayed against the
//! store and the error is returned.

use std::collections::BTreeSet;
use std::ops::Deref;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use tessera_foundation::{Entity, Error, ID, Name, Result, Value};
use tessera_storage::{ArchetypeId, Changes, EntityValues, Store};

// =============================================================================
// Write Operations
// =============================================================================

/// One replayable store mutation.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(tag = "type", rename_all = "snake_case"))]
pub enum WriteOperation {
    /// Create an entity holding `values` in the archetype of exactly those
    /// components plus `id`.
    Insert {
        /// Component values, `id` excluded.
        values: EntityValues,
    },
    /// Apply changes to an entity.
    Update {
        /// Target entity.
        entity: Entity,
        /// Components to set or remove.
        changes: Changes,
    },
    /// Delete an entity.
    Delete {
        /// Target entity.
        entity: Entity,
    },
}

/// Replays operations directly against a store, without recording.
///
/// Used to apply undo and redo lists and to replay persisted redo logs. An
/// `Insert` receives whatever id the store allocates next; replaying an undo
/// list right after its transaction restores the original ids because ids
/// are reused most recently freed first.
///
/// # Errors
///
/// Stops at and returns the first failing operation's error. Operations
/// before it stay applied.
pub fn apply_write_operations(store: &mut Store, operations: &[WriteOperation]) -> Result<()> {
    for operation in operations {
        match operation {
            WriteOperation::Insert { values } => {
                store.create(values.clone())?;
            }
            WriteOperation::Update { entity, changes } => store.update(*entity, changes)?,
            WriteOperation::Delete { entity } => {
                store.delete(*entity);
            }
        }
    }
    Ok(())
}

// =============================================================================
// Options and Results
// =============================================================================

/// Options for a single transaction.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TransactionOptions {
    /// Marks the transaction as excluded from undo history.
    pub transient: bool,
}

impl TransactionOptions {
    /// Creates default options.
    #[must_use]
    pub const fn new() -> Self {
        Self { transient: false }
    }

    /// Options for a transaction that history should not record.
    #[must_use]
    pub const fn transient() -> Self {
        Self { transient: true }
    }
}

/// What a committed transaction did.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TransactionResult<R> {
    /// Value returned by the transaction function.
    pub value: R,
    /// Whether the transaction is excluded from undo history.
    pub transient: bool,
    /// Operations that reapply the transaction, in application order.
    pub redo: Vec<WriteOperation>,
    /// Operations that revert the transaction, in the order to apply them.
    pub undo: Vec<WriteOperation>,
    /// Entities created, changed or deleted.
    pub changed_entities: BTreeSet<Entity>,
    /// Components written or removed.
    pub changed_components: BTreeSet<Name>,
    /// Archetypes that gained or lost rows or had rows changed.
    pub changed_archetypes: BTreeSet<ArchetypeId>,
}

impl<R> TransactionResult<R> {
    /// Returns true if the transaction changed nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.redo.is_empty()
    }

    /// Separates the returned value from the record of changes.
    pub fn split(self) -> (R, TransactionResult<()>) {
        let Self {
            value,
            transient,
            redo,
            undo,
            changed_entities,
            changed_components,
            changed_archetypes,
        } = self;
        let record = TransactionResult {
            value: (),
            transient,
            redo,
            undo,
            changed_entities,
            changed_components,
            changed_archetypes,
        };
        (value, record)
    }

    /// Replaces the returned value.
    pub fn with_value<T>(self, value: T) -> TransactionResult<T> {
        TransactionResult {
            value,
            transient: self.transient,
            redo: self.redo,
            undo: self.undo,
            changed_entities: self.changed_entities,
            changed_components: self.changed_components,
            changed_archetypes: self.changed_archetypes,
        }
    }
}

// =============================================================================
// Transaction
// =============================================================================

#[derive(Default)]
struct Recording {
    redo: Vec<WriteOperation>,
    /// Undo operations in application order; reversed on commit.
    undo: Vec<WriteOperation>,
    entities: BTreeSet<Entity>,
    components: BTreeSet<Name>,
    archetypes: BTreeSet<ArchetypeId>,
}

/// Recording view of a store for the duration of one transaction.
///
/// Reads go straight to the store through [`Deref`]. Writes go through the
/// methods below so they can be undone.
pub struct Transaction<'a> {
    store: &'a mut Store,
    recording: Recording,
}

impl Deref for Transaction<'_> {
    type Target = Store;

    fn deref(&self) -> &Store {
        self.store
    }
}

impl Transaction<'_> {
    /// See [`Store::ensure_archetype`]. Not recorded.
    ///
    /// # Errors
    ///
    /// Same as [`Store::ensure_archetype`].
    pub fn ensure_archetype<I, S>(&mut self, names: I) -> Result<ArchetypeId>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.store.ensure_archetype(names)
    }

    /// Creates an entity in `archetype`.
    ///
    /// # Errors
    ///
    /// Same as [`Store::insert`].
    pub fn insert(&mut self, archetype: ArchetypeId, mut values: EntityValues) -> Result<Entity> {
        values.remove(ID);
        let entity = self.store.insert(archetype, values.clone())?;
        let rec = &mut self.recording;
        rec.entities.insert(entity);
        rec.archetypes.insert(archetype);
        rec.components.extend(values.keys().cloned());
        rec.redo.push(WriteOperation::Insert { values });
        rec.undo.push(WriteOperation::Delete { entity });
        Ok(entity)
    }

    /// Creates an entity in the archetype of `id` plus the given components.
    ///
    /// # Errors
    ///
    /// Same as [`Store::create`].
    pub fn create(&mut self, values: EntityValues) -> Result<Entity> {
        let archetype = self
            .store
            .ensure_archetype(values.keys().map(|n| &**n).chain([ID]))?;
        self.insert(archetype, values)
    }

    /// Applies changes to a live entity.
    ///
    /// Only components whose value actually changes are recorded. Consecutive
    /// updates of the same entity merge into one redo and one undo operation.
    ///
    /// # Errors
    ///
    /// Same as [`Store::update`].
    pub fn update(&mut self, entity: Entity, changes: &Changes) -> Result<()> {
        let before = self
            .store
            .locate(entity)
            .ok_or_else(|| Error::entity_not_found(entity))?;
        let old = self
            .store
            .read(entity)
            .ok_or_else(|| Error::entity_not_found(entity))?;

        let mut effective = Changes::new();
        let mut replaced = Changes::new();
        for (name, value) in changes.iter() {
            let previous = old.get(name.as_ref());
            if value != previous {
                effective.insert(Name::clone(name), value.cloned());
                replaced.insert(Name::clone(name), previous.cloned());
            }
        }

        self.store.update(entity, changes)?;
        if effective.is_empty() {
            return Ok(());
        }

        let after = self
            .store
            .locate(entity)
            .ok_or_else(|| Error::internal(format!("{entity} lost during update")))?;
        let rec = &mut self.recording;
        rec.entities.insert(entity);
        rec.archetypes.insert(before.archetype);
        rec.archetypes.insert(after.archetype);
        rec.components.extend(effective.names().cloned());

        if let (
            Some(WriteOperation::Update { entity: redo_entity, changes: redo }),
            Some(WriteOperation::Update { entity: undo_entity, changes: undo }),
        ) = (rec.redo.last_mut(), rec.undo.last_mut())
        {
            if *redo_entity == entity && *undo_entity == entity {
                redo.overlay(effective);
                replaced.overlay(std::mem::take(undo));
                *undo = replaced;
                return Ok(());
            }
        }
        rec.redo.push(WriteOperation::Update { entity, changes: effective });
        rec.undo.push(WriteOperation::Update { entity, changes: replaced });
        Ok(())
    }

    /// Deletes an entity. Returns false, recording nothing, if it is not live.
    pub fn delete(&mut self, entity: Entity) -> bool {
        let Some(location) = self.store.locate(entity) else {
            return false;
        };
        let Some(mut values) = self.store.delete(entity) else {
            return false;
        };
        values.remove(ID);
        let rec = &mut self.recording;
        rec.entities.insert(entity);
        rec.archetypes.insert(location.archetype);
        rec.components.extend(values.keys().cloned());
        rec.redo.push(WriteOperation::Delete { entity });
        rec.undo.push(WriteOperation::Insert { values });
        true
    }

    /// Replaces a resource's value.
    ///
    /// # Errors
    ///
    /// Returns `UnknownResource` if the resource was not declared.
    pub fn set_resource(&mut self, name: &str, value: impl Into<Value>) -> Result<()> {
        let entity = self
            .store
            .resource_entity(name)
            .ok_or_else(|| Error::unknown_resource(name))?;
        self.update(entity, &Changes::new().set(name, value))
    }

    /// Replays operations through the recording path.
    ///
    /// # Errors
    ///
    /// Returns the first failing operation's error.
    pub fn apply(&mut self, operations: &[WriteOperation]) -> Result<()> {
        for operation in operations {
            match operation {
                WriteOperation::Insert { values } => {
                    self.create(values.clone())?;
                }
                WriteOperation::Update { entity, changes } => self.update(*entity, changes)?,
                WriteOperation::Delete { entity } => {
                    self.delete(*entity);
                }
            }
        }
        Ok(())
    }

    fn rollback(self) -> Result<()> {
        let undo: Vec<WriteOperation> = self.recording.undo.into_iter().rev().collect();
        apply_write_operations(self.store, &undo)
    }
}

// =============================================================================
// Transactional Store
// =============================================================================

/// A store whose mutations happen in atomic, recorded transactions.
#[derive(Debug)]
pub struct TransactionalStore {
    store: Store,
}

impl TransactionalStore {
    /// Wraps a store.
    #[must_use]
    pub const fn new(store: Store) -> Self {
        Self { store }
    }

    /// Read access to the underlying store.
    #[must_use]
    pub const fn store(&self) -> &Store {
        &self.store
    }

    /// Unwraps the underlying store.
    #[must_use]
    pub fn into_inner(self) -> Store {
        self.store
    }

    /// Runs `f` as a transaction with default options.
    ///
    /// # Errors
    ///
    /// See [`Self::execute_with`].
    pub fn execute<R, F>(&mut self, f: F) -> Result<TransactionResult<R>>
    where
        F: FnOnce(&mut Transaction<'_>) -> Result<R>,
    {
        self.execute_with(TransactionOptions::default(), f)
    }

    /// Runs `f` as a transaction.
    ///
    /// # Errors
    ///
    /// Returns the error from `f` after reverting everything it wrote.
    pub fn execute_with<R, F>(&mut self, options: TransactionOptions, f: F) -> Result<TransactionResult<R>>
    where
        F: FnOnce(&mut Transaction<'_>) -> Result<R>,
    {
        let mut tx = Transaction {
            store: &mut self.store,
            recording: Recording::default(),
        };

        let value = match f(&mut tx) {
            Ok(value) => value,
            Err(err) => {
                let operations = tx.recording.undo.len();
                match tx.rollback() {
                    Ok(()) => tracing::warn!(%err, operations, "transaction rolled back"),
                    Err(rollback) => tracing::error!(%err, %rollback, "transaction rollback failed"),
                }
                return Err(err);
            }
        };

        let Recording {
            redo,
            mut undo,
            entities,
            components,
            archetypes,
        } = tx.recording;
        undo.reverse();
        tracing::debug!(
            operations = redo.len(),
            entities = entities.len(),
            transient = options.transient,
            "transaction committed"
        );
        Ok(TransactionResult {
            value,
            transient: options.transient,
            redo,
            undo,
            changed_entities: entities,
            changed_components: components,
            changed_archetypes: archetypes,
        })
    }
}

impl From<Store> for TransactionalStore {
    fn from(store: Store) -> Self {
        Self::new(store)
    }
}
