//! The database: a transactional store plus change observation.
//!
//! A [`Database`] is a cheap-clone, single-threaded handle. Every committed
//! transaction is diffed against the observer registries and the matching
//! observers are called once all internal borrows are released, so an
//! observer may itself read the database or run another transaction.

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::rc::{Rc, Weak};

use futures::{Stream, StreamExt};

use tessera_foundation::{Entity, Error, ErrorKind, Name, Result, Value};
use tessera_storage::{ArchetypeId, EntityValues, Store};

use crate::transaction::{Transaction, TransactionOptions, TransactionResult, TransactionalStore};

// =============================================================================
// Named Transactions
// =============================================================================

/// Body of a named transaction: receives the recording view and its
/// arguments, and may return an entity (typically one it created).
pub type TransactionFn = dyn Fn(&mut Transaction<'_>, Value) -> Result<Option<Entity>>;

/// Named transaction declarations.
#[derive(Clone, Default)]
pub struct Transactions {
    declared: BTreeMap<Name, Rc<TransactionFn>>,
}

impl Transactions {
    /// Creates an empty set of declarations.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method to declare a transaction. Redeclaring a name replaces it.
    #[must_use]
    pub fn with<F>(mut self, name: impl Into<Name>, body: F) -> Self
    where
        F: Fn(&mut Transaction<'_>, Value) -> Result<Option<Entity>> + 'static,
    {
        self.declared.insert(name.into(), Rc::new(body));
        self
    }

    /// Looks up a declaration.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Rc<TransactionFn>> {
        self.declared.get(name).cloned()
    }

    /// Declared names in order.
    pub fn names(&self) -> impl Iterator<Item = &Name> {
        self.declared.keys()
    }

    /// Number of declarations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.declared.len()
    }

    /// Returns true if nothing is declared.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.declared.is_empty()
    }
}

impl fmt::Debug for Transactions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.declared.keys()).finish()
    }
}

// =============================================================================
// Observer Registries
// =============================================================================

type TransactionObserver = dyn Fn(&TransactionResult<()>);
type EntityObserver = dyn Fn(Option<&EntityValues>);
type Notify = dyn Fn();

struct Registry<K, F: ?Sized> {
    next: u64,
    entries: BTreeMap<K, Vec<(u64, Rc<F>)>>,
}

impl<K: Ord, F: ?Sized> Registry<K, F> {
    const fn new() -> Self {
        Self {
            next: 0,
            entries: BTreeMap::new(),
        }
    }

    fn add(&mut self, key: K, observer: Rc<F>) -> u64 {
        let id = self.next;
        self.next += 1;
        self.entries.entry(key).or_default().push((id, observer));
        id
    }

    fn remove(&mut self, key: &K, id: u64) {
        if let Some(list) = self.entries.get_mut(key) {
            list.retain(|(i, _)| *i != id);
            if list.is_empty() {
                self.entries.remove(key);
            }
        }
    }

    fn get(&self, key: &K) -> Vec<Rc<F>> {
        self.entries
            .get(key)
            .map(|list| list.iter().map(|(_, o)| Rc::clone(o)).collect())
            .unwrap_or_default()
    }

    fn count(&self) -> usize {
        self.entries.values().map(Vec::len).sum()
    }
}

struct Observers {
    transactions: Registry<(), TransactionObserver>,
    components: Registry<Name, Notify>,
    archetypes: Registry<ArchetypeId, Notify>,
    entities: Registry<Entity, EntityObserver>,
}

impl Observers {
    const fn new() -> Self {
        Self {
            transactions: Registry::new(),
            components: Registry::new(),
            archetypes: Registry::new(),
            entities: Registry::new(),
        }
    }
}

/// Handle that removes an observer.
///
/// Dropping the handle keeps the observer subscribed.
pub struct Unsubscribe {
    release: Option<Box<dyn FnOnce()>>,
}

impl Unsubscribe {
    pub(crate) fn new(release: impl FnOnce() + 'static) -> Self {
        Self {
            release: Some(Box::new(release)),
        }
    }

    /// Removes the observer.
    pub fn unsubscribe(mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl fmt::Debug for Unsubscribe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Unsubscribe")
            .field("active", &self.release.is_some())
            .finish()
    }
}

// =============================================================================
// Database
// =============================================================================

struct Shared {
    store: RefCell<TransactionalStore>,
    transactions: Transactions,
    observers: RefCell<Observers>,
    /// Work deferred to the end of the current tick.
    pending: RefCell<Vec<Rc<Notify>>>,
    depth: Cell<usize>,
}

/// Observable, transactional entity database.
///
/// # Example
///
/// ```
/// use std::cell::Cell;
/// use std::rc::Rc;
/// use tessera_engine::{Database, Transactions};
/// use tessera_foundation::{Schema, Value};
/// use tessera_storage::Store;
///
/// let store = Store::new([("hp", Schema::u32())], [("time", Value::Float(0.0))]).unwrap();
/// let spawn = Transactions::new().with("spawn", |tx, hp| {
///     let values = [("hp".into(), hp)].into_iter().collect();
///     tx.create(values).map(Some)
/// });
/// let db = Database::new(store, spawn);
///
/// let calls = Rc::new(Cell::new(0));
/// let seen = Rc::clone(&calls);
/// let _handle = db.observe_component("hp", move || seen.set(seen.get() + 1));
///
/// let e = db.transact("spawn", Value::Int(10)).unwrap().unwrap();
/// assert_eq!(calls.get(), 1);
/// assert_eq!(db.read(e).unwrap().unwrap()["hp"], Value::Int(10));
/// ```
#[derive(Clone)]
pub struct Database {
    shared: Rc<Shared>,
}

impl Database {
    /// Creates a database over `store` with the given named transactions.
    #[must_use]
    pub fn new(store: Store, transactions: Transactions) -> Self {
        Self {
            shared: Rc::new(Shared {
                store: RefCell::new(TransactionalStore::new(store)),
                transactions,
                observers: RefCell::new(Observers::new()),
                pending: RefCell::new(Vec::new()),
                depth: Cell::new(0),
            }),
        }
    }

    fn from_weak(weak: &Weak<Shared>) -> Option<Self> {
        weak.upgrade().map(|shared| Self { shared })
    }

    fn downgrade(&self) -> Weak<Shared> {
        Rc::downgrade(&self.shared)
    }

    // -------------------------------------------------------------------------
    // Reads
    // -------------------------------------------------------------------------

    /// Runs `f` with read access to the store.
    ///
    /// # Errors
    ///
    /// Returns `Internal` when called from inside a transaction function.
    pub fn with_store<T>(&self, f: impl FnOnce(&Store) -> T) -> Result<T> {
        let store = self
            .shared
            .store
            .try_borrow()
            .map_err(|_| Error::internal("store is held by a running transaction"))?;
        Ok(f(store.store()))
    }

    /// Every component value of an entity, or `None` if it is not live.
    ///
    /// # Errors
    ///
    /// See [`Self::with_store`].
    pub fn read(&self, entity: Entity) -> Result<Option<EntityValues>> {
        self.with_store(|s| s.read(entity))
    }

    /// Current value of a resource.
    ///
    /// # Errors
    ///
    /// Returns `UnknownResource` for undeclared names.
    pub fn resource(&self, name: &str) -> Result<Value> {
        self.with_store(|s| s.resource(name))?
            .ok_or_else(|| Error::unknown_resource(name))
    }

    /// The declared named transactions.
    #[must_use]
    pub fn transactions(&self) -> &Transactions {
        &self.shared.transactions
    }

    // -------------------------------------------------------------------------
    // Writes
    // -------------------------------------------------------------------------

    /// Replaces a resource's value in its own transaction.
    ///
    /// # Errors
    ///
    /// Returns `UnknownResource` for undeclared names.
    pub fn set_resource(&self, name: &str, value: impl Into<Value>) -> Result<()> {
        let value = value.into();
        self.execute(|tx| tx.set_resource(name, value)).map(|_| ())
    }

    /// Runs `f` as a transaction and notifies observers of what it changed.
    ///
    /// # Errors
    ///
    /// See [`Self::execute_with`].
    pub fn execute<R, F>(&self, f: F) -> Result<TransactionResult<R>>
    where
        F: FnOnce(&mut Transaction<'_>) -> Result<R>,
    {
        self.execute_with(TransactionOptions::default(), f)
    }

    /// Runs `f` as a transaction with options and notifies observers.
    ///
    /// Observers are called in this order: transaction observers, component
    /// observers, archetype observers, then entity observers.
    ///
    /// # Errors
    ///
    /// Returns the error from `f` after rollback, in which case no observer
    /// is called. Returns `Internal` when called from inside a transaction
    /// function.
    pub fn execute_with<R, F>(&self, options: TransactionOptions, f: F) -> Result<TransactionResult<R>>
    where
        F: FnOnce(&mut Transaction<'_>) -> Result<R>,
    {
        self.tick(|| {
            let result = {
                let mut store = self
                    .shared
                    .store
                    .try_borrow_mut()
                    .map_err(|_| Error::internal("transactions cannot nest"))?;
                store.execute_with(options, f)?
            };
            let (value, record) = result.split();
            self.notify(&record);
            Ok(record.with_value(value))
        })
    }

    /// Runs `f` as one tick: computed values invalidated by any transaction
    /// inside it are recomputed once, after `f` returns.
    pub fn batch<T>(&self, f: impl FnOnce() -> T) -> T {
        self.tick(f)
    }

    fn tick<T>(&self, f: impl FnOnce() -> T) -> T {
        let depth = &self.shared.depth;
        depth.set(depth.get() + 1);
        let out = f();
        depth.set(depth.get() - 1);
        if depth.get() == 0 {
            self.flush();
        }
        out
    }

    /// Queues `job` to run at the end of the current tick.
    pub(crate) fn defer(&self, job: Rc<Notify>) {
        self.shared.pending.borrow_mut().push(job);
        if self.shared.depth.get() == 0 {
            self.flush();
        }
    }

    fn flush(&self) {
        loop {
            let jobs = std::mem::take(&mut *self.shared.pending.borrow_mut());
            if jobs.is_empty() {
                break;
            }
            for job in jobs {
                job();
            }
        }
    }

    fn notify(&self, record: &TransactionResult<()>) {
        let observers = self.shared.observers.borrow().transactions.get(&());
        for observer in observers {
            observer(record);
        }

        for name in &record.changed_components {
            let observers = self.shared.observers.borrow().components.get(name);
            for observer in observers {
                observer();
            }
        }

        for archetype in &record.changed_archetypes {
            let observers = self.shared.observers.borrow().archetypes.get(archetype);
            for observer in observers {
                observer();
            }
        }

        for &entity in &record.changed_entities {
            let observers = self.shared.observers.borrow().entities.get(&entity);
            if observers.is_empty() {
                continue;
            }
            let row = self.read(entity).ok().flatten();
            for observer in observers {
                observer(row.as_ref());
            }
        }
    }

    // -------------------------------------------------------------------------
    // Observation
    // -------------------------------------------------------------------------

    /// Calls `observer` after every transaction that writes or removes the
    /// component.
    pub fn observe_component(&self, name: impl Into<Name>, observer: impl Fn() + 'static) -> Unsubscribe {
        let name = name.into();
        let id = self
            .shared
            .observers
            .borrow_mut()
            .components
            .add(Name::clone(&name), Rc::new(observer));
        let weak = self.downgrade();
        Unsubscribe::new(move || {
            if let Some(db) = Self::from_weak(&weak) {
                db.shared.observers.borrow_mut().components.remove(&name, id);
            }
        })
    }

    /// Calls `observer` after every transaction that touches the archetype.
    pub fn observe_archetype(&self, archetype: ArchetypeId, observer: impl Fn() + 'static) -> Unsubscribe {
        let id = self
            .shared
            .observers
            .borrow_mut()
            .archetypes
            .add(archetype, Rc::new(observer));
        let weak = self.downgrade();
        Unsubscribe::new(move || {
            if let Some(db) = Self::from_weak(&weak) {
                db.shared.observers.borrow_mut().archetypes.remove(&archetype, id);
            }
        })
    }

    /// Calls `observer` with the entity's current values now, and again
    /// after every transaction that changes it (`None` once deleted).
    ///
    /// # Errors
    ///
    /// See [`Self::with_store`].
    pub fn observe_entity(
        &self,
        entity: Entity,
        observer: impl Fn(Option<&EntityValues>) + 'static,
    ) -> Result<Unsubscribe> {
        let current = self.read(entity)?;
        observer(current.as_ref());
        Ok(self.watch_entity(entity, Rc::new(observer)))
    }

    /// Calls `observer` with the resource's value now, and again after every
    /// transaction that writes it.
    ///
    /// Only writes to the resource itself count. An ordinary entity carrying
    /// a component of the same name does not trigger the observer.
    ///
    /// # Errors
    ///
    /// Returns `UnknownResource` for undeclared names.
    pub fn observe_resource(&self, name: &str, observer: impl Fn(&Value) + 'static) -> Result<Unsubscribe> {
        let entity = self.resource_entity(name)?;
        observer(&self.resource(name)?);
        let name: Name = name.into();
        Ok(self.watch_entity(
            entity,
            Rc::new(move |row: Option<&EntityValues>| {
                if let Some(value) = row.and_then(|row| row.get(&name)) {
                    observer(value);
                }
            }),
        ))
    }

    /// Calls `observer` after every transaction that writes the resource,
    /// without an initial call.
    pub(crate) fn watch_resource(&self, name: &str, observer: impl Fn() + 'static) -> Result<Unsubscribe> {
        let entity = self.resource_entity(name)?;
        Ok(self.watch_entity(entity, Rc::new(move |_: Option<&EntityValues>| observer())))
    }

    fn resource_entity(&self, name: &str) -> Result<Entity> {
        self.with_store(|s| s.resource_entity(name))?
            .ok_or_else(|| Error::unknown_resource(name))
    }

    fn watch_entity(&self, entity: Entity, observer: Rc<EntityObserver>) -> Unsubscribe {
        let id = self.shared.observers.borrow_mut().entities.add(entity, observer);
        let weak = self.downgrade();
        Unsubscribe::new(move || {
            if let Some(db) = Self::from_weak(&weak) {
                db.shared.observers.borrow_mut().entities.remove(&entity, id);
            }
        })
    }

    /// Calls `observer` with the record of every committed transaction.
    pub fn observe_transactions(&self, observer: impl Fn(&TransactionResult<()>) + 'static) -> Unsubscribe {
        let id = self
            .shared
            .observers
            .borrow_mut()
            .transactions
            .add((), Rc::new(observer));
        let weak = self.downgrade();
        Unsubscribe::new(move || {
            if let Some(db) = Self::from_weak(&weak) {
                db.shared.observers.borrow_mut().transactions.remove(&(), id);
            }
        })
    }

    /// Number of registered observers of every kind.
    #[must_use]
    pub fn observer_count(&self) -> usize {
        let observers = self.shared.observers.borrow();
        observers.transactions.count()
            + observers.components.count()
            + observers.archetypes.count()
            + observers.entities.count()
    }

    // -------------------------------------------------------------------------
    // Named transactions
    // -------------------------------------------------------------------------

    fn declaration(&self, name: &str) -> Result<Rc<TransactionFn>> {
        self.shared
            .transactions
            .get(name)
            .ok_or_else(|| Error::new(ErrorKind::UnknownTransaction(name.to_string())))
    }

    /// Runs a named transaction.
    ///
    /// # Errors
    ///
    /// Returns `UnknownTransaction` for undeclared names, otherwise the
    /// transaction's error after rollback, tagged with the transaction name.
    pub fn transact(&self, name: &str, args: Value) -> Result<Option<Entity>> {
        let body = self.declaration(name)?;
        self.execute(|tx| body(tx, args))
            .map(|result| result.value)
            .map_err(|err| in_transaction(err, name))
    }

    /// Awaits `args`, then runs the named transaction once.
    ///
    /// Other transactions may commit while `args` is pending.
    ///
    /// # Errors
    ///
    /// Returns `UnknownTransaction` before awaiting anything, the arguments'
    /// error if they fail, otherwise as [`Self::transact`].
    pub async fn transact_deferred<A>(&self, name: &str, args: A) -> Result<Option<Entity>>
    where
        A: Future<Output = Result<Value>>,
    {
        self.declaration(name)?;
        let args = args.await.map_err(|err| {
            tracing::warn!(transaction = name, %err, "deferred transaction arguments failed");
            in_transaction(err, name)
        })?;
        self.transact(name, args)
    }

    /// Runs the named transaction once per item of `args`, in order.
    ///
    /// Each item commits independently. The first failing item, or failing
    /// transaction, stops the stream; transactions committed before it stay
    /// committed.
    ///
    /// # Errors
    ///
    /// Returns `UnknownTransaction` before polling anything, otherwise the
    /// first error encountered.
    pub async fn transact_streamed<S>(&self, name: &str, args: S) -> Result<Vec<Option<Entity>>>
    where
        S: Stream<Item = Result<Value>>,
    {
        self.declaration(name)?;
        let mut args = std::pin::pin!(args);
        let mut committed = Vec::new();
        while let Some(item) = args.next().await {
            match item.and_then(|args| self.transact(name, args)) {
                Ok(value) => committed.push(value),
                Err(err) => {
                    tracing::warn!(
                        transaction = name,
                        committed = committed.len(),
                        %err,
                        "streamed transaction stopped"
                    );
                    return Err(in_transaction(err, name));
                }
            }
        }
        Ok(committed)
    }
}

impl fmt::Debug for Database {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Database")
            .field("transactions", &self.shared.transactions)
            .field("observers", &self.observer_count())
            .finish_non_exhaustive()
    }
}

fn in_transaction(mut err: Error, name: &str) -> Error {
    let mut context = err.context.take().unwrap_or_default();
    context.transaction = Some(name.to_string());
    err.context = Some(context);
    err
}
