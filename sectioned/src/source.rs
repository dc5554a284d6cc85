//! The persistence collaborator: what a [`SectionedCollection`] needs from the
//! store it projects.
//!
//! [`SectionedCollection`]: crate::SectionedCollection

use std::{error::Error as StdError, fmt, hash::Hash};

use tokio::sync::{broadcast, mpsc};

use crate::SortDescriptor;

/// A stable handle to a record in the store.
///
/// Two identities are equal iff they denote the same logical record.
pub trait RecordIdentity: Clone + Eq + Hash + fmt::Debug {
    /// Whether this identity is provisional and will be replaced by a durable
    /// one once the record is committed.
    fn is_temporary(&self) -> bool {
        false
    }
}

macro_rules! impl_durable_identity {
    ($($ty:ty),*) => {
        $(impl RecordIdentity for $ty {})*
    };
}

impl_durable_identity!(u32, u64, usize, i32, i64, String);

/// The state of a record in the store's pending-change buffer, i.e. changes
/// that are visible in memory but not yet reflected by [`RecordSource::fetch`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum PendingState {
    /// No pending changes.
    #[default]
    Clean,
    /// Inserted, not yet committed.
    Inserted,
    /// Updated, not yet committed. Stores must also report records whose sort
    /// keys depend on related records that changed.
    Updated,
    /// Marked for deletion.
    Deleted,
}

/// The parameters of a fetch.
#[derive(Debug)]
pub struct FetchRequest<'a, R, P> {
    /// The sort descriptors, in priority order. If `grouped` is set, the first
    /// one is the grouping key.
    pub sort_descriptors: &'a [SortDescriptor<R>],
    /// Whether results will be grouped into sections by the first descriptor.
    pub grouped: bool,
    /// The predicate records must match, if any.
    pub predicate: Option<&'a P>,
}

impl<R, P> Clone for FetchRequest<'_, R, P> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<R, P> Copy for FetchRequest<'_, R, P> {}

/// A store that can be projected by a [`SectionedCollection`].
///
/// All methods are called from the single thread of control that owns the
/// collection.
///
/// [`SectionedCollection`]: crate::SectionedCollection
pub trait RecordSource {
    /// The record identity type.
    type Id: RecordIdentity;
    /// The record type, as seen by [`KeyPath`][crate::KeyPath] extractors.
    type Record;
    /// The predicate type.
    type Predicate;

    /// Fetch the identities of all records matching the request, sorted by
    /// its descriptors.
    fn fetch(
        &self,
        request: FetchRequest<'_, Self::Record, Self::Predicate>,
    ) -> Result<Vec<Self::Id>, FetchError>;

    /// Call `f` with the live, in-memory state of the record.
    ///
    /// Returns `None` if the record doesn't exist (anymore).
    fn read<T>(&self, id: &Self::Id, f: impl FnOnce(&Self::Record) -> T) -> Option<T>;

    /// Whether the record matches the predicate.
    fn evaluate(&self, predicate: &Self::Predicate, record: &Self::Record) -> bool;

    /// The pending-change state of the record.
    fn pending_state(&self, _id: &Self::Id) -> PendingState {
        PendingState::Clean
    }
}

/// The records that changed in one transaction of the store.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChangeBatch<Id> {
    /// Records that were added.
    pub inserted: Vec<Id>,
    /// Records that were removed.
    pub deleted: Vec<Id>,
    /// Records whose attributes changed.
    pub updated: Vec<Id>,
    /// Records that were re-read from durable storage.
    pub refreshed: Vec<Id>,
    /// Records whose in-memory state was discarded.
    pub invalidated: Vec<Id>,
    /// Every record was invalidated. Incremental information is meaningless
    /// if this is set.
    pub invalidated_all: bool,
}

impl<Id> ChangeBatch<Id> {
    /// Create an empty `ChangeBatch`.
    pub fn new() -> Self {
        Self {
            inserted: Vec::new(),
            deleted: Vec::new(),
            updated: Vec::new(),
            refreshed: Vec::new(),
            invalidated: Vec::new(),
            invalidated_all: false,
        }
    }

    /// A batch signalling that every record was invalidated.
    pub fn invalidate_all() -> Self {
        Self { invalidated_all: true, ..Self::new() }
    }

    /// Add inserted records.
    pub fn inserted(mut self, ids: impl IntoIterator<Item = Id>) -> Self {
        self.inserted.extend(ids);
        self
    }

    /// Add deleted records.
    pub fn deleted(mut self, ids: impl IntoIterator<Item = Id>) -> Self {
        self.deleted.extend(ids);
        self
    }

    /// Add updated records.
    pub fn updated(mut self, ids: impl IntoIterator<Item = Id>) -> Self {
        self.updated.extend(ids);
        self
    }

    /// Add refreshed records.
    pub fn refreshed(mut self, ids: impl IntoIterator<Item = Id>) -> Self {
        self.refreshed.extend(ids);
        self
    }

    /// Add invalidated records.
    pub fn invalidated(mut self, ids: impl IntoIterator<Item = Id>) -> Self {
        self.invalidated.extend(ids);
        self
    }

    /// Whether the batch carries no changes at all.
    pub fn is_empty(&self) -> bool {
        !self.invalidated_all
            && self.inserted.is_empty()
            && self.deleted.is_empty()
            && self.updated.is_empty()
            && self.refreshed.is_empty()
            && self.invalidated.is_empty()
    }
}

impl<Id> Default for ChangeBatch<Id> {
    fn default() -> Self {
        Self::new()
    }
}

/// Where applied change batches are forwarded to, e.g. sibling projections
/// over other views of the same store.
pub trait ChangeSink<Id> {
    /// Forward a batch that was just applied.
    fn forward(&self, batch: &ChangeBatch<Id>);
}

impl<Id, F> ChangeSink<Id> for F
where
    F: Fn(&ChangeBatch<Id>),
{
    fn forward(&self, batch: &ChangeBatch<Id>) {
        self(batch);
    }
}

impl<Id: Clone> ChangeSink<Id> for broadcast::Sender<ChangeBatch<Id>> {
    fn forward(&self, batch: &ChangeBatch<Id>) {
        // No receivers is not an error for a fan-out.
        let _num_receivers = self.send(batch.clone()).unwrap_or(0);
    }
}

impl<Id: Clone> ChangeSink<Id> for mpsc::UnboundedSender<ChangeBatch<Id>> {
    fn forward(&self, batch: &ChangeBatch<Id>) {
        let _ = self.send(batch.clone());
    }
}

/// An error returned by [`RecordSource::fetch`].
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// The store could not execute the fetch.
    #[error("the store failed to execute the fetch")]
    Store(#[source] Box<dyn StdError + Send + Sync>),
    /// The fetch was cancelled by the store.
    #[error("the fetch was cancelled")]
    Cancelled,
}

impl FetchError {
    /// Wrap a store-specific error.
    pub fn store(error: impl StdError + Send + Sync + 'static) -> Self {
        Self::Store(Box::new(error))
    }
}
