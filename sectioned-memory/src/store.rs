use std::{cmp::Ordering, collections::HashMap, fmt, mem, sync::Arc};

use sectioned::{
    ChangeBatch, FetchError, FetchRequest, PendingState, RecordSource, SortDescriptor,
};

use crate::{transaction::StoreTransaction, Predicate, RecordId, StoreError};

type Validator<R> = Arc<dyn Fn(&R) -> bool + Send + Sync>;

/// An in-memory record store with a pending-change buffer.
///
/// Records are inserted with a [`RecordId::Temporary`] identity and get a
/// [`RecordId::Durable`] one when saved. Temporary identities keep resolving
/// to the record after the save, until every projection has swapped them
/// out.
///
/// Fetches sort and filter committed records by their committed state. Records
/// with unsaved updates follow, unfiltered, then every pending insertion; the
/// projection places those by their live state.
pub struct MemoryStore<R: Clone> {
    committed: imbl::HashMap<u64, R>,
    pub(crate) state: State<R>,
    aliases: HashMap<u64, u64>,
    next_durable: u64,
    validator: Option<Validator<R>>,
    available: bool,
}

impl<R: Clone> MemoryStore<R> {
    /// Create an empty `MemoryStore`.
    pub fn new() -> Self {
        Self {
            committed: imbl::HashMap::new(),
            state: State::default(),
            aliases: HashMap::new(),
            next_durable: 0,
            validator: None,
            available: true,
        }
    }

    /// Reject saves while any changed record fails `validate`.
    pub fn with_validation(
        mut self,
        validate: impl Fn(&R) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.validator = Some(Arc::new(validate));
        self
    }

    /// Make fetches fail with a store error, or succeed again.
    pub fn set_available(&mut self, available: bool) {
        self.available = available;
    }

    /// Insert a new record with a temporary identity.
    pub fn insert(&mut self, record: R) -> RecordId {
        self.state.insert(record)
    }

    /// Update a record in place.
    pub fn update(&mut self, id: RecordId, f: impl FnOnce(&mut R)) -> Result<(), StoreError> {
        let id = self.resolve(id);
        self.state.update(id, f)
    }

    /// Mark a record for deletion.
    ///
    /// A record that was never saved is removed right away.
    pub fn delete(&mut self, id: RecordId) -> Result<(), StoreError> {
        let id = self.resolve(id);
        self.state.delete(id)
    }

    /// Discard the unsaved changes of a record, re-reading its committed
    /// state.
    pub fn refresh(&mut self, id: RecordId) -> Result<(), StoreError> {
        let id = self.resolve(id);
        self.state.refresh(id, &self.committed)
    }

    /// Discard all unsaved changes and every buffered change notification.
    ///
    /// The next batch reports that everything was invalidated.
    pub fn invalidate_all(&mut self) {
        #[cfg(feature = "tracing")]
        tracing::debug!(target: "sectioned_memory::store", "invalidate_all");

        self.state.live = self
            .committed
            .iter()
            .map(|(&id, record)| (RecordId::Durable(id), record.clone()))
            .collect();
        self.state.pending.clear();
        self.state.changes = ChangeBatch::invalidate_all();
    }

    /// Drain the buffered change notifications.
    pub fn process_pending_changes(&mut self) -> ChangeBatch<RecordId> {
        mem::take(&mut self.state.changes)
    }

    /// Start a transaction.
    ///
    /// Mutations made through it are only applied to the store, and only
    /// show up in change batches, on [`commit`][StoreTransaction::commit].
    pub fn transaction(&mut self) -> StoreTransaction<'_, R> {
        StoreTransaction::new(self)
    }

    /// Commit the live state.
    ///
    /// Temporary identities of inserted records are replaced by durable ones.
    /// The returned receipt carries the change notifications that were still
    /// buffered, which have to be applied before the identity assignments.
    ///
    /// If a validator is set and a changed record fails it, nothing is
    /// committed.
    pub fn save(&mut self) -> Result<SaveReceipt, StoreError> {
        let mut pending: Vec<_> =
            self.state.pending.iter().map(|(&id, &state)| (id, state)).collect();
        pending.sort_unstable_by_key(|&(id, _)| id);

        if let Some(validate) = &self.validator {
            let rejected = pending
                .iter()
                .filter(|(_, state)| *state != PendingState::Deleted)
                .find(|(id, _)| self.state.live.get(id).is_some_and(|record| !validate(record)));
            if let Some(&(id, _)) = rejected {
                return Err(StoreError::Rejected(id));
            }
        }

        let mut assigned = Vec::new();
        for (id, state) in pending {
            match (id, state) {
                (_, PendingState::Deleted) => {
                    self.state.live.remove(&id);
                    if let RecordId::Durable(durable) = id {
                        self.committed.remove(&durable);
                    }
                }
                (RecordId::Temporary(temporary), _) => {
                    let Some(record) = self.state.live.remove(&id) else { continue };
                    let durable = self.next_durable;
                    self.next_durable += 1;

                    self.aliases.insert(temporary, durable);
                    self.committed.insert(durable, record.clone());
                    self.state.live.insert(RecordId::Durable(durable), record);
                    assigned.push((id, RecordId::Durable(durable)));
                }
                (RecordId::Durable(durable), _) => {
                    if let Some(record) = self.state.live.get(&id) {
                        self.committed.insert(durable, record.clone());
                    }
                }
            }
        }

        self.state.pending.clear();
        let changes = mem::take(&mut self.state.changes);

        #[cfg(feature = "tracing")]
        tracing::debug!(
            target: "sectioned_memory::store",
            assigned = assigned.len(),
            "save"
        );

        Ok(SaveReceipt { changes, assigned })
    }

    /// The live state of a record, unless it is pending deletion.
    pub fn get(&self, id: RecordId) -> Option<&R> {
        let id = self.resolve(id);
        if self.state.pending.get(&id) == Some(&PendingState::Deleted) {
            return None;
        }
        self.state.live.get(&id)
    }

    /// The identities of all live records not pending deletion, sorted.
    pub fn ids(&self) -> Vec<RecordId> {
        let mut ids: Vec<_> = self
            .state
            .live
            .keys()
            .filter(|id| self.state.pending.get(id) != Some(&PendingState::Deleted))
            .copied()
            .collect();
        ids.sort_unstable();
        ids
    }

    /// The number of live records not pending deletion.
    pub fn len(&self) -> usize {
        let deleted = self.state.pending.values().filter(|&&s| s == PendingState::Deleted).count();
        self.state.live.len() - deleted
    }

    /// Whether there are no live records.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub(crate) fn resolve(&self, id: RecordId) -> RecordId {
        match id {
            RecordId::Temporary(temporary) => {
                self.aliases.get(&temporary).map_or(id, |&durable| RecordId::Durable(durable))
            }
            RecordId::Durable(_) => id,
        }
    }

    fn pending_ids(&self, state: PendingState) -> Vec<RecordId> {
        let mut ids: Vec<_> =
            self.state.pending.iter().filter(|(_, s)| **s == state).map(|(&id, _)| id).collect();
        ids.sort_unstable();
        ids
    }

    pub(crate) fn committed(&self) -> &imbl::HashMap<u64, R> {
        &self.committed
    }
}

impl<R: Clone> Default for MemoryStore<R> {
    fn default() -> Self {
        Self::new()
    }
}

/// Creates a store whose records are committed with the durable identities
/// `0..n`, in iteration order.
impl<R: Clone> FromIterator<R> for MemoryStore<R> {
    fn from_iter<I: IntoIterator<Item = R>>(iter: I) -> Self {
        let mut store = Self::new();
        for record in iter {
            let id = store.next_durable;
            store.next_durable += 1;
            store.committed.insert(id, record.clone());
            store.state.live.insert(RecordId::Durable(id), record);
        }
        store
    }
}

impl<R: Clone + fmt::Debug> fmt::Debug for MemoryStore<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryStore")
            .field("committed", &self.committed)
            .field("live", &self.state.live)
            .field("pending", &self.state.pending)
            .finish_non_exhaustive()
    }
}

impl<R: Clone> RecordSource for MemoryStore<R> {
    type Id = RecordId;
    type Record = R;
    type Predicate = Predicate<R>;

    fn fetch(
        &self,
        request: FetchRequest<'_, R, Predicate<R>>,
    ) -> Result<Vec<RecordId>, FetchError> {
        if !self.available {
            return Err(FetchError::store(StoreError::Unavailable));
        }

        let mut committed: Vec<_> = self
            .committed
            .iter()
            .map(|(&id, record)| (RecordId::Durable(id), record))
            .filter(|(id, _)| self.state.pending.get(id) != Some(&PendingState::Updated))
            .filter(|(_, record)| request.predicate.map_or(true, |p| p(*record)))
            .collect();
        committed.sort_by(|(left_id, left), (right_id, right)| {
            compare(request.sort_descriptors, *left, *right).then_with(|| left_id.cmp(right_id))
        });

        let updated = self.pending_ids(PendingState::Updated);
        let inserted = self.pending_ids(PendingState::Inserted);

        Ok(committed.into_iter().map(|(id, _)| id).chain(updated).chain(inserted).collect())
    }

    fn read<T>(&self, id: &RecordId, f: impl FnOnce(&R) -> T) -> Option<T> {
        self.state.live.get(&self.resolve(*id)).map(f)
    }

    fn evaluate(&self, predicate: &Predicate<R>, record: &R) -> bool {
        predicate(record)
    }

    fn pending_state(&self, id: &RecordId) -> PendingState {
        self.state.pending.get(&self.resolve(*id)).copied().unwrap_or_default()
    }
}

/// The result of [`MemoryStore::save`].
#[derive(Clone, Debug)]
pub struct SaveReceipt {
    /// The change notifications that were still buffered.
    pub changes: ChangeBatch<RecordId>,
    /// Temporary identities and the durable identities that replace them.
    pub assigned: Vec<(RecordId, RecordId)>,
}

/// The mutable part of a store, staged as a whole by transactions.
#[derive(Clone)]
pub(crate) struct State<R: Clone> {
    pub(crate) live: imbl::HashMap<RecordId, R>,
    pub(crate) pending: imbl::HashMap<RecordId, PendingState>,
    pub(crate) changes: ChangeBatch<RecordId>,
    next_temporary: u64,
}

impl<R: Clone> State<R> {
    pub(crate) fn insert(&mut self, record: R) -> RecordId {
        let id = RecordId::Temporary(self.next_temporary);
        self.next_temporary += 1;

        self.live.insert(id, record);
        self.pending.insert(id, PendingState::Inserted);
        self.changes.inserted.push(id);
        id
    }

    pub(crate) fn update(
        &mut self,
        id: RecordId,
        f: impl FnOnce(&mut R),
    ) -> Result<(), StoreError> {
        let pending = self.pending.get(&id).copied().unwrap_or_default();
        if pending == PendingState::Deleted {
            return Err(StoreError::AlreadyDeleted(id));
        }
        let record = self.live.get_mut(&id).ok_or(StoreError::UnknownRecord(id))?;
        f(record);

        if pending == PendingState::Clean {
            self.pending.insert(id, PendingState::Updated);
        }
        self.changes.updated.push(id);
        Ok(())
    }

    pub(crate) fn delete(&mut self, id: RecordId) -> Result<(), StoreError> {
        match self.pending.get(&id).copied().unwrap_or_default() {
            PendingState::Deleted => return Err(StoreError::AlreadyDeleted(id)),
            _ if !self.live.contains_key(&id) => return Err(StoreError::UnknownRecord(id)),
            PendingState::Inserted => {
                self.live.remove(&id);
                self.pending.remove(&id);
            }
            PendingState::Clean | PendingState::Updated => {
                self.pending.insert(id, PendingState::Deleted);
            }
        }

        self.changes.deleted.push(id);
        Ok(())
    }

    pub(crate) fn refresh(
        &mut self,
        id: RecordId,
        committed: &imbl::HashMap<u64, R>,
    ) -> Result<(), StoreError> {
        match id {
            RecordId::Durable(durable) => {
                let record = committed.get(&durable).ok_or(StoreError::UnknownRecord(id))?;
                self.live.insert(id, record.clone());
                self.pending.remove(&id);
            }
            // Nothing to re-read for records that were never saved.
            RecordId::Temporary(_) if self.live.contains_key(&id) => {}
            RecordId::Temporary(_) => return Err(StoreError::UnknownRecord(id)),
        }

        self.changes.refreshed.push(id);
        Ok(())
    }
}

impl<R: Clone> Default for State<R> {
    fn default() -> Self {
        Self {
            live: imbl::HashMap::new(),
            pending: imbl::HashMap::new(),
            changes: ChangeBatch::new(),
            next_temporary: 0,
        }
    }
}

fn compare<R>(descriptors: &[SortDescriptor<R>], left: &R, right: &R) -> Ordering {
    descriptors
        .iter()
        .map(|d| d.order.apply(d.key.extract(left).cmp(&d.key.extract(right))))
        .find(|ordering| ordering.is_ne())
        .unwrap_or(Ordering::Equal)
}
