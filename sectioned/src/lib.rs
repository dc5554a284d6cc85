//! Live, sectioned, sorted projections over a mutable record store.
//!
//! A [`SectionedCollection`] keeps the records of a [`RecordSource`] that
//! match a [`ViewConfig`] in sorted order, optionally grouped into sections
//! by the first sort descriptor. Instead of re-running the query after every
//! change, it applies the store's [`ChangeBatch`]es incrementally and
//! broadcasts the minimal [`SectionDiff`] of each pass to its subscribers.
//!
//! ```
//! use sectioned::{SectionedCollection, SortDescriptor, ViewConfig};
//! use sectioned_memory::MemoryStore;
//!
//! #[derive(Clone)]
//! struct Task {
//!     project: &'static str,
//!     title: &'static str,
//! }
//!
//! let mut store: MemoryStore<Task> = [
//!     Task { project: "garden", title: "water plants" },
//!     Task { project: "house", title: "fix door" },
//! ]
//! .into_iter()
//! .collect();
//!
//! let config = ViewConfig::new([
//!     SortDescriptor::ascending("project", |t: &Task| t.project.into()),
//!     SortDescriptor::ascending("title", |t: &Task| t.title.into()),
//! ])
//! .grouped();
//!
//! let mut tasks: SectionedCollection<MemoryStore<Task>> = SectionedCollection::new(config);
//! tasks.reload(&store)?;
//! assert_eq!(tasks.section_count(), 2);
//!
//! store.insert(Task { project: "garden", title: "mow lawn" });
//! let batch = store.process_pending_changes();
//! let diff = tasks.apply(&store, batch)?;
//! assert_eq!(diff.inserted_rows.len(), 1);
//! assert_eq!(tasks.row_count(0), 2);
//! # Ok::<(), sectioned::FetchError>(())
//! ```
//!
//! Cargo features:
//!
//! - `serde`: Implement `serde::Serialize` for [`SectionDiff`] and
//!   [`SectionEvent`]
//! - `tracing`: Emit [tracing] events for every reconciliation pass and
//!   broadcast

mod classify;
mod collection;
mod comparator;
mod descriptor;
mod diff;
mod merge;
mod projection;
mod snapshot;
mod source;
mod store;
mod value;

pub use self::{
    collection::{
        FetchOutcome, PendingFetch, ProjectionReadGuard, ReloadHandle, SectionSubscriber,
        SectionedCollection,
    },
    descriptor::{KeyPath, SortDescriptor, SortOrder, ViewConfig},
    diff::{IndexPath, RowMove, SectionDiff, SectionEvent},
    projection::Projection,
    snapshot::Snapshot,
    source::{
        ChangeBatch, ChangeSink, FetchError, FetchRequest, PendingState, RecordIdentity,
        RecordSource,
    },
    store::Section,
    value::Value,
};

#[doc(no_inline)]
pub use imbl::Vector;
