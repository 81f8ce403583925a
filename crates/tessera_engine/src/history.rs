//! Undo/redo history fed by committed transactions.
//!
//! Keeps a bounded stack of recorded transactions, evicting the oldest when
//! full. Undo and redo replay the recorded operations as transient
//! transactions, so they notify observers but are never recorded themselves.
//!
//! Any other transient transaction that creates or deletes entities clears
//! both stacks, since recorded operations address entities by id and ids
//! are recycled.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use tessera_foundation::Result;

use crate::database::{Database, Unsubscribe};
use crate::transaction::{TransactionOptions, WriteOperation};

/// One recorded transaction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HistoryEntry {
    /// Operations that revert the transaction.
    pub undo: Vec<WriteOperation>,
    /// Operations that reapply it.
    pub redo: Vec<WriteOperation>,
}

#[derive(Debug)]
struct Stacks {
    capacity: usize,
    undo: VecDeque<HistoryEntry>,
    redo: Vec<HistoryEntry>,
    replaying: bool,
}

impl Stacks {
    fn record(&mut self, entry: HistoryEntry) {
        if self.capacity == 0 {
            return;
        }
        if self.undo.len() >= self.capacity {
            self.undo.pop_front();
        }
        self.undo.push_back(entry);
        self.redo.clear();
    }

    fn invalidate(&mut self) {
        if self.undo.is_empty() && self.redo.is_empty() {
            return;
        }
        tracing::debug!(
            undo = self.undo.len(),
            redo = self.redo.len(),
            "history cleared by transient structural change"
        );
        self.undo.clear();
        self.redo.clear();
    }
}

fn changes_structure(operations: &[WriteOperation]) -> bool {
    operations
        .iter()
        .any(|op| matches!(op, WriteOperation::Insert { .. } | WriteOperation::Delete { .. }))
}

/// Bounded undo/redo stack attached to a database.
#[derive(Debug)]
pub struct History {
    db: Database,
    stacks: Rc<RefCell<Stacks>>,
    subscription: Option<Unsubscribe>,
}

impl History {
    /// Starts recording every non-transient transaction committed on `db`.
    ///
    /// Transient transactions are not recorded. Those that create or delete
    /// entities forget all recorded history instead.
    #[must_use]
    pub fn attach(db: &Database, capacity: usize) -> Self {
        let stacks = Rc::new(RefCell::new(Stacks {
            capacity,
            undo: VecDeque::with_capacity(capacity.min(1024)),
            redo: Vec::new(),
            replaying: false,
        }));
        let recorder = Rc::clone(&stacks);
        let subscription = db.observe_transactions(move |result| {
            let mut stacks = recorder.borrow_mut();
            if result.transient {
                // The first transient result after a replay starts is the replay itself.
                if !std::mem::take(&mut stacks.replaying) && changes_structure(&result.redo) {
                    stacks.invalidate();
                }
                return;
            }
            if result.is_empty() {
                return;
            }
            stacks.record(HistoryEntry {
                undo: result.undo.clone(),
                redo: result.redo.clone(),
            });
        });
        Self {
            db: db.clone(),
            stacks,
            subscription: Some(subscription),
        }
    }

    /// Maximum number of undoable transactions kept.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.stacks.borrow().capacity
    }

    /// Returns true if there is a transaction to undo.
    #[must_use]
    pub fn can_undo(&self) -> bool {
        !self.stacks.borrow().undo.is_empty()
    }

    /// Returns true if there is a transaction to redo.
    #[must_use]
    pub fn can_redo(&self) -> bool {
        !self.stacks.borrow().redo.is_empty()
    }

    /// Number of undoable transactions.
    #[must_use]
    pub fn undo_len(&self) -> usize {
        self.stacks.borrow().undo.len()
    }

    /// Number of redoable transactions.
    #[must_use]
    pub fn redo_len(&self) -> usize {
        self.stacks.borrow().redo.len()
    }

    /// Forgets everything recorded so far.
    pub fn clear(&self) {
        let mut stacks = self.stacks.borrow_mut();
        stacks.undo.clear();
        stacks.redo.clear();
    }

    /// Reverts the most recent recorded transaction.
    ///
    /// Returns false if there was nothing to undo.
    ///
    /// # Errors
    ///
    /// Returns the replay's error; the entry then stays on the undo stack.
    pub fn undo(&self) -> Result<bool> {
        let Some(entry) = self.stacks.borrow_mut().undo.pop_back() else {
            return Ok(false);
        };
        match self.replay(&entry.undo) {
            Ok(()) => {
                self.stacks.borrow_mut().redo.push(entry);
                Ok(true)
            }
            Err(err) => {
                self.stacks.borrow_mut().undo.push_back(entry);
                Err(err)
            }
        }
    }

    /// Reapplies the most recently undone transaction.
    ///
    /// Returns false if there was nothing to redo.
    ///
    /// # Errors
    ///
    /// Returns the replay's error; the entry then stays on the redo stack.
    pub fn redo(&self) -> Result<bool> {
        let Some(entry) = self.stacks.borrow_mut().redo.pop() else {
            return Ok(false);
        };
        match self.replay(&entry.redo) {
            Ok(()) => {
                self.stacks.borrow_mut().undo.push_back(entry);
                Ok(true)
            }
            Err(err) => {
                self.stacks.borrow_mut().redo.push(entry);
                Err(err)
            }
        }
    }

    fn replay(&self, operations: &[WriteOperation]) -> Result<()> {
        self.stacks.borrow_mut().replaying = true;
        let result = self
            .db
            .execute_with(TransactionOptions::transient(), |tx| tx.apply(operations));
        self.stacks.borrow_mut().replaying = false;
        tracing::debug!(operations = operations.len(), "history replayed");
        result.map(|_| ())
    }
}

impl Drop for History {
    fn drop(&mut self) {
        if let Some(subscription) = self.subscription.take() {
            subscription.unsubscribe();
        }
    }
}
