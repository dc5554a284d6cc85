//! An in-memory record store for [`sectioned`] projections.
//!
//! [`MemoryStore`] keeps two versions of every record: the committed one,
//! which is what fetches see, and the live one, which is what change batches
//! describe. Mutations go to the live state and are buffered until
//! [`MemoryStore::process_pending_changes`] drains them into a
//! [`ChangeBatch`], or [`MemoryStore::save`] commits them.
//!
//! Cargo features:
//!
//! - `tracing`: Emit [tracing] events for saves and transactions
//!
//! [`ChangeBatch`]: sectioned::ChangeBatch

use std::{fmt, sync::Arc};

use sectioned::RecordIdentity;

mod store;
mod transaction;

pub use self::{
    store::{MemoryStore, SaveReceipt},
    transaction::StoreTransaction,
};

/// The identity of a record in a [`MemoryStore`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RecordId {
    /// Assigned on insertion, until the record is saved.
    Temporary(u64),
    /// Assigned on save.
    Durable(u64),
}

impl RecordIdentity for RecordId {
    fn is_temporary(&self) -> bool {
        matches!(self, Self::Temporary(_))
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Temporary(id) => write!(f, "t{id}"),
            Self::Durable(id) => write!(f, "d{id}"),
        }
    }
}

/// The predicate type of a [`MemoryStore`].
pub type Predicate<R> = Arc<dyn Fn(&R) -> bool + Send + Sync>;

/// Create a [`Predicate`] from a closure.
pub fn predicate<R>(f: impl Fn(&R) -> bool + Send + Sync + 'static) -> Predicate<R> {
    Arc::new(f)
}

/// An error returned by the mutating methods of [`MemoryStore`].
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The record doesn't exist.
    #[error("unknown record {0}")]
    UnknownRecord(RecordId),
    /// The record is already pending deletion.
    #[error("record {0} is already deleted")]
    AlreadyDeleted(RecordId),
    /// The store can't be reached.
    #[error("the store is unavailable")]
    Unavailable,
    /// The record failed validation on save.
    #[error("record {0} failed validation")]
    Rejected(RecordId),
}
