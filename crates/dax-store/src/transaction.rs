//! Undo logs for backend writes.
//!
//! A [`Transaction`] collects compensating actions. Rolling back runs them
//! newest first; committing discards them, or hands them to the parent when
//! the transaction is nested.

use std::fmt;
use std::sync::{Arc, Mutex};

use crate::error::StoreResult;
use crate::traits::StorageBackend;

type UndoAction = Box<dyn FnOnce() -> StoreResult<()> + Send>;

/// An undo log of labelled compensating actions.
#[derive(Default)]
pub struct Transaction {
    parent: Option<Arc<Transaction>>,
    log: Mutex<Vec<(String, UndoAction)>>,
}

impl Transaction {
    pub fn new() -> Self {
        Self::default()
    }

    /// A transaction whose committed actions move to `parent`.
    pub fn nested(parent: Arc<Transaction>) -> Self {
        Self {
            parent: Some(parent),
            log: Mutex::new(Vec::new()),
        }
    }

    /// Record an action that undoes a write just made.
    pub fn register<F>(&self, label: impl Into<String>, undo: F)
    where
        F: FnOnce() -> StoreResult<()> + Send + 'static,
    {
        self.log
            .lock()
            .expect("lock poisoned")
            .push((label.into(), Box::new(undo)));
    }

    /// Number of pending actions.
    pub fn len(&self) -> usize {
        self.log.lock().expect("lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Labels of the pending actions, oldest first.
    pub fn labels(&self) -> Vec<String> {
        self.log
            .lock()
            .expect("lock poisoned")
            .iter()
            .map(|(label, _)| label.clone())
            .collect()
    }

    /// Run every pending action, newest first.
    ///
    /// A failing action is logged and the rest still run; the first failure
    /// is returned.
    pub fn rollback(&self) -> StoreResult<()> {
        let actions = std::mem::take(&mut *self.log.lock().expect("lock poisoned"));
        let mut first_error = None;
        for (label, undo) in actions.into_iter().rev() {
            match undo() {
                Ok(()) => tracing::debug!(%label, "rolled back"),
                Err(e) => {
                    tracing::warn!(%label, error = %e, "rollback action failed");
                    first_error.get_or_insert(e);
                }
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Accept every pending write.
    pub fn commit(&self) {
        let actions = std::mem::take(&mut *self.log.lock().expect("lock poisoned"));
        if let Some(parent) = &self.parent {
            parent.log.lock().expect("lock poisoned").extend(actions);
        }
    }
}

impl fmt::Debug for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transaction")
            .field("pending", &self.len())
            .field("nested", &self.parent.is_some())
            .finish()
    }
}

/// Run `f` against `backend` inside a transaction.
///
/// An error rolls back every write `f` made and is returned unchanged; a
/// failing undo action is logged, not returned. Success commits. A
/// transaction already installed on the backend becomes the parent, and is
/// reinstalled afterwards.
pub fn run_in_transaction<B, T, E, F>(backend: &B, f: F) -> Result<T, E>
where
    B: StorageBackend + ?Sized,
    F: FnOnce(&B) -> Result<T, E>,
{
    let previous = backend.transaction();
    let transaction = Arc::new(match &previous {
        Some(parent) => Transaction::nested(Arc::clone(parent)),
        None => Transaction::new(),
    });
    backend.set_transaction(Some(Arc::clone(&transaction)));
    let result = f(backend);
    backend.set_transaction(previous);

    match result {
        Ok(value) => {
            transaction.commit();
            Ok(value)
        }
        Err(e) => {
            if let Err(undo) = transaction.rollback() {
                tracing::warn!(backend = backend.name(), error = %undo, "rollback incomplete");
            }
            Err(e)
        }
    }
}
