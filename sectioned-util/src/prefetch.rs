//! Materializing records ahead of use.
//!
//! A [`Prefetcher`] observes how a projection is read and how it changes, and
//! asks a [`Materializer`] to load records before they are needed. It never
//! touches the projection itself, so a prefetcher that fails, or is missing
//! entirely, only costs latency: records are then materialized on demand.

use std::error::Error as StdError;

use sectioned::{IndexPath, Projection, RecordIdentity, SectionDiff, SectionEvent};

mod greedy;
mod linear;

pub use self::{greedy::GreedyPrefetcher, linear::LinearPrefetcher};

/// Loads records into memory, and lets go of them again.
pub trait Materializer<Id> {
    /// Materialize the given records.
    fn materialize(&mut self, ids: &[Id]) -> Result<(), PrefetchError>;

    /// Release records that were materialized before.
    fn release(&mut self, ids: &[Id]);
}

/// A prefetching strategy.
pub trait Prefetcher<Id: RecordIdentity> {
    /// A row of the projection is about to be read.
    fn acknowledge_access(&mut self, path: IndexPath, projection: &Projection<Id>);

    /// The projection was rebuilt from a fetch.
    fn acknowledge_fetch(&mut self, projection: &Projection<Id>);

    /// The projection was updated incrementally.
    fn acknowledge_diff(&mut self, diff: &SectionDiff, projection: &Projection<Id>);

    /// Dispatch a [`SectionEvent`] to [`acknowledge_fetch`] or
    /// [`acknowledge_diff`].
    ///
    /// [`acknowledge_fetch`]: Self::acknowledge_fetch
    /// [`acknowledge_diff`]: Self::acknowledge_diff
    fn acknowledge_event(&mut self, event: &SectionEvent, projection: &Projection<Id>) {
        match event {
            SectionEvent::Reloaded => self.acknowledge_fetch(projection),
            SectionEvent::Updated(diff) => self.acknowledge_diff(diff, projection),
        }
    }
}

/// An error returned by a [`Materializer`].
#[derive(Debug, thiserror::Error)]
pub enum PrefetchError {
    /// The store refused to materialize some of the records.
    #[error("{0} record(s) could not be materialized")]
    Rejected(usize),
    /// Any other failure.
    #[error("materialization failed")]
    Other(#[source] Box<dyn StdError + Send + Sync>),
}

fn materialize<Id>(materializer: &mut impl Materializer<Id>, ids: &[Id]) -> bool {
    if ids.is_empty() {
        return true;
    }

    match materializer.materialize(ids) {
        Ok(()) => true,
        Err(error) => {
            tracing::warn!(
                target: "sectioned_util::prefetch",
                count = ids.len(),
                "Prefetch failed, falling back to on-demand materialization: {error}"
            );
            false
        }
    }
}
