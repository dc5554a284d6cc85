use std::fmt;

use crate::{
    store::{MemoryStore, State},
    RecordId, StoreError,
};

/// A transaction that allows making multiple changes to a [`MemoryStore`] as
/// an atomic unit.
///
/// For changes from the transaction to have effect, it has to be finalized
/// with [`.commit()`](Self::commit). If the transaction is dropped without that
/// method being called, the changes are discarded, and so are their change
/// notifications.
pub struct StoreTransaction<'s, R: Clone> {
    // The store being modified, only modified on commit.
    inner: &'s mut MemoryStore<R>,
    // A clone of the store's mutable state, what the methods operate on until commit.
    state: State<R>,
}

impl<'s, R: Clone> StoreTransaction<'s, R> {
    pub(crate) fn new(inner: &'s mut MemoryStore<R>) -> Self {
        let state = inner.state.clone();
        Self { inner, state }
    }

    /// Commit this transaction, applying the changes to the store.
    pub fn commit(self) {
        #[cfg(feature = "tracing")]
        tracing::debug!(target: "sectioned_memory::transaction", "commit");

        self.inner.state = self.state;
    }

    /// Roll back all changes made using this transaction so far.
    ///
    /// Same as dropping the transaction and starting a new one, semantically.
    pub fn rollback(&mut self) {
        #[cfg(feature = "tracing")]
        tracing::debug!(target: "sectioned_memory::transaction", "rollback (explicit)");

        self.state = self.inner.state.clone();
    }

    /// Insert a new record with a temporary identity.
    pub fn insert(&mut self, record: R) -> RecordId {
        self.state.insert(record)
    }

    /// Update a record in place.
    pub fn update(&mut self, id: RecordId, f: impl FnOnce(&mut R)) -> Result<(), StoreError> {
        let id = self.inner.resolve(id);
        self.state.update(id, f)
    }

    /// Mark a record for deletion.
    pub fn delete(&mut self, id: RecordId) -> Result<(), StoreError> {
        let id = self.inner.resolve(id);
        self.state.delete(id)
    }

    /// Discard the unsaved changes of a record.
    pub fn refresh(&mut self, id: RecordId) -> Result<(), StoreError> {
        let id = self.inner.resolve(id);
        self.state.refresh(id, self.inner.committed())
    }

    /// The state of a record as seen by this transaction.
    pub fn get(&self, id: RecordId) -> Option<&R> {
        self.state.live.get(&self.inner.resolve(id))
    }
}

impl<R: Clone> fmt::Debug for StoreTransaction<'_, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreTransaction")
            .field("staged_changes", &!self.state.changes.is_empty())
            .finish_non_exhaustive()
    }
}
