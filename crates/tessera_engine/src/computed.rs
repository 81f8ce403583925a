//! Computed values derived from resources.
//!
//! A [`Computed`] records which resources its function reads and observes
//! only those. When one of them changes the value is marked dirty and
//! recomputed once at the end of the current tick; subscribers hear about it
//! only if the result differs from the previous one.

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::rc::{Rc, Weak};

use tessera_foundation::{Name, Result, Value};
use tessera_storage::Store;

use crate::database::{Database, Unsubscribe};

/// Read-only resource access that records every resource read.
pub struct ResourceView<'a> {
    store: &'a Store,
    reads: RefCell<BTreeSet<Name>>,
}

impl<'a> ResourceView<'a> {
    pub(crate) const fn new(store: &'a Store) -> Self {
        Self {
            store,
            reads: RefCell::new(BTreeSet::new()),
        }
    }

    /// Current value of a resource, or `None` if it is not declared.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Value> {
        let value = self.store.resource(name)?;
        self.reads.borrow_mut().insert(Name::from(name));
        Some(value)
    }

    /// Resources read so far.
    #[must_use]
    pub fn reads(&self) -> BTreeSet<Name> {
        self.reads.borrow().clone()
    }

    fn into_reads(self) -> BTreeSet<Name> {
        self.reads.into_inner()
    }
}

type ComputeFn<T> = dyn Fn(&ResourceView<'_>) -> T;
type Subscriber<T> = dyn Fn(&T);

struct State<T> {
    value: Option<T>,
    dirty: bool,
    dependencies: BTreeSet<Name>,
    upstream: Vec<Unsubscribe>,
    subscribers: BTreeMap<u64, Rc<Subscriber<T>>>,
    next_id: u64,
}

struct Node<T> {
    db: Database,
    compute: Box<ComputeFn<T>>,
    state: RefCell<State<T>>,
}

/// A lazily evaluated value computed from resources.
pub struct Computed<T> {
    node: Rc<Node<T>>,
}

impl<T> Clone for Computed<T> {
    fn clone(&self) -> Self {
        Self {
            node: Rc::clone(&self.node),
        }
    }
}

impl<T: Clone + PartialEq + 'static> Computed<T> {
    /// Declares a computed value. Nothing runs until it is read or subscribed.
    pub fn new<F>(db: &Database, compute: F) -> Self
    where
        F: Fn(&ResourceView<'_>) -> T + 'static,
    {
        Self {
            node: Rc::new(Node {
                db: db.clone(),
                compute: Box::new(compute),
                state: RefCell::new(State {
                    value: None,
                    dirty: false,
                    dependencies: BTreeSet::new(),
                    upstream: Vec::new(),
                    subscribers: BTreeMap::new(),
                    next_id: 0,
                }),
            }),
        }
    }

    /// Current value. Cached while subscribed, computed afresh otherwise.
    ///
    /// # Errors
    ///
    /// Returns `Internal` when called from inside a transaction function.
    pub fn get(&self) -> Result<T> {
        {
            let state = self.node.state.borrow();
            if let (false, Some(value)) = (state.dirty, &state.value) {
                return Ok(value.clone());
            }
        }
        evaluate(&self.node).map(|(value, _)| value)
    }

    /// Calls `subscriber` with the current value now, and again whenever a
    /// recomputation yields a different value.
    ///
    /// # Errors
    ///
    /// Returns `Internal` when called from inside a transaction function.
    pub fn subscribe(&self, subscriber: impl Fn(&T) + 'static) -> Result<Unsubscribe> {
        let first = self.node.state.borrow().subscribers.is_empty();
        if first {
            let (value, reads) = evaluate(&self.node)?;
            {
                let mut state = self.node.state.borrow_mut();
                state.value = Some(value);
                state.dirty = false;
            }
            if let Err(err) = track(&self.node, reads) {
                self.node.state.borrow_mut().value = None;
                return Err(err);
            }
        }

        let current = self.get()?;
        subscriber(&current);

        let id = {
            let mut state = self.node.state.borrow_mut();
            let id = state.next_id;
            state.next_id += 1;
            state.subscribers.insert(id, Rc::new(subscriber));
            id
        };
        let weak = Rc::downgrade(&self.node);
        Ok(Unsubscribe::new(move || {
            if let Some(node) = weak.upgrade() {
                release(&node, id);
            }
        }))
    }

    /// Resources the last evaluation read while subscribed.
    #[must_use]
    pub fn dependencies(&self) -> BTreeSet<Name> {
        self.node.state.borrow().dependencies.clone()
    }

    /// Number of subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.node.state.borrow().subscribers.len()
    }
}

impl<T> fmt::Debug for Computed<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.node.state.borrow();
        f.debug_struct("Computed")
            .field("dependencies", &state.dependencies)
            .field("dirty", &state.dirty)
            .field("subscribers", &state.subscribers.len())
            .finish_non_exhaustive()
    }
}

fn evaluate<T>(node: &Node<T>) -> Result<(T, BTreeSet<Name>)> {
    node.db.with_store(|store| {
        let view = ResourceView::new(store);
        let value = (node.compute)(&view);
        (value, view.into_reads())
    })
}

/// Observes exactly `reads`, replacing earlier upstream subscriptions.
///
/// Each dependency is watched through its resource entity, so ordinary
/// entities with a component of the same name never invalidate the value.
fn track<T: Clone + PartialEq + 'static>(node: &Rc<Node<T>>, reads: BTreeSet<Name>) -> Result<()> {
    let stale = {
        let mut state = node.state.borrow_mut();
        if state.dependencies == reads && !state.upstream.is_empty() {
            return Ok(());
        }
        state.dependencies = reads.clone();
        std::mem::take(&mut state.upstream)
    };
    for handle in stale {
        handle.unsubscribe();
    }

    let mut upstream = Vec::with_capacity(reads.len());
    for name in &reads {
        let weak = Rc::downgrade(node);
        match node.db.watch_resource(name, move || invalidate(&weak)) {
            Ok(handle) => upstream.push(handle),
            Err(err) => {
                for handle in upstream {
                    handle.unsubscribe();
                }
                node.state.borrow_mut().dependencies.clear();
                return Err(err);
            }
        }
    }
    node.state.borrow_mut().upstream = upstream;
    Ok(())
}

fn invalidate<T: Clone + PartialEq + 'static>(weak: &Weak<Node<T>>) {
    let Some(node) = weak.upgrade() else {
        return;
    };
    {
        let mut state = node.state.borrow_mut();
        if state.dirty {
            return;
        }
        state.dirty = true;
    }
    let job = Rc::downgrade(&node);
    node.db.defer(Rc::new(move || {
        if let Some(node) = job.upgrade() {
            recompute(&node);
        }
    }));
}

fn recompute<T: Clone + PartialEq + 'static>(node: &Rc<Node<T>>) {
    if node.state.borrow().subscribers.is_empty() {
        node.state.borrow_mut().dirty = false;
        return;
    }
    let (value, reads) = match evaluate(node) {
        Ok(evaluated) => evaluated,
        Err(err) => {
            tracing::warn!(%err, "computed value could not be recomputed");
            node.state.borrow_mut().dirty = false;
            return;
        }
    };

    let notify = {
        let mut state = node.state.borrow_mut();
        state.dirty = false;
        if state.value.as_ref() == Some(&value) {
            Vec::new()
        } else {
            state.value = Some(value.clone());
            state.subscribers.values().cloned().collect()
        }
    };
    if let Err(err) = track(node, reads) {
        tracing::warn!(%err, "computed value lost its dependencies");
    }
    for subscriber in notify {
        subscriber(&value);
    }
}

fn release<T>(node: &Node<T>, id: u64) {
    let upstream = {
        let mut state = node.state.borrow_mut();
        state.subscribers.remove(&id);
        if !state.subscribers.is_empty() {
            return;
        }
        state.value = None;
        state.dirty = false;
        state.dependencies.clear();
        std::mem::take(&mut state.upstream)
    };
    for handle in upstream {
        handle.unsubscribe();
    }
}
