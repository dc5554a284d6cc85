use std::{
    collections::HashSet,
    fmt, ops,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use readlock::Shared;
use tokio::sync::broadcast::{self, Sender};

use crate::{
    classify::classify,
    merge::{merge, populate},
    projection::Projection,
    ChangeBatch, ChangeSink, FetchError, FetchRequest, IndexPath, RecordIdentity, RecordSource,
    SectionDiff, SectionEvent, ViewConfig,
};

mod subscriber;

pub use self::subscriber::{ProjectionReadGuard, SectionSubscriber};

/// A live, sectioned, sorted projection of the records of a [`RecordSource`]
/// that broadcasts a [`SectionEvent`] after every reconciliation pass.
///
/// The collection dereferences to its [`Projection`] for random access. All
/// mutation goes through `&mut self`, so it is confined to whichever thread
/// of control owns the collection; subscribers only ever see the projection
/// between passes.
pub struct SectionedCollection<S: RecordSource> {
    config: ViewConfig<S::Record, S::Predicate>,
    state: Shared<Projection<S::Id>>,
    // `None` once disposed, which closes every subscriber.
    sender: Option<Sender<SectionEvent>>,
    generation: u64,
    reload_requested: Arc<AtomicBool>,
    pending_identities: HashSet<S::Id>,
    sink: Option<Box<dyn ChangeSink<S::Id> + Send + Sync>>,
}

impl<S: RecordSource> SectionedCollection<S> {
    /// Create a new, empty `SectionedCollection` for the given view.
    ///
    /// As of the time of writing, this is equivalent to
    /// `SectionedCollection::with_capacity(config, 16)`, but the internal
    /// buffer capacity is subject to change in non-breaking releases.
    ///
    /// Call [`reload`][Self::reload] (or [`begin_fetch`][Self::begin_fetch])
    /// to populate it.
    pub fn new(config: ViewConfig<S::Record, S::Predicate>) -> Self {
        Self::with_capacity(config, 16)
    }

    /// Create a new, empty `SectionedCollection` with the given capacity for
    /// the inner event buffer.
    ///
    /// Up to `capacity` events that have not been received by all of the
    /// subscribers yet will be retained in the inner buffer. If an event is
    /// emitted while the buffer is at capacity, the oldest event is discarded
    /// from it and all subscribers that have not yet received it will instead
    /// see [`SectionEvent::Reloaded`] as the next event.
    ///
    /// # Panics
    ///
    /// Panics if the capacity is `0`, or larger than `usize::MAX / 2`.
    pub fn with_capacity(config: ViewConfig<S::Record, S::Predicate>, capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        let state = Shared::new(Projection::new(config.comparator()));

        Self {
            config,
            state,
            sender: Some(sender),
            generation: 0,
            reload_requested: Arc::new(AtomicBool::new(false)),
            pending_identities: HashSet::new(),
            sink: None,
        }
    }

    /// Forward every applied change batch to the given sink.
    pub fn with_sink(mut self, sink: impl ChangeSink<S::Id> + Send + Sync + 'static) -> Self {
        self.sink = Some(Box::new(sink));
        self
    }

    /// The view this collection projects.
    pub fn config(&self) -> &ViewConfig<S::Record, S::Predicate> {
        &self.config
    }

    /// The fetch the store has to execute to (re)populate this collection.
    pub fn fetch_request(&self) -> FetchRequest<'_, S::Record, S::Predicate> {
        FetchRequest {
            sort_descriptors: self.config.descriptors(),
            grouped: self.config.is_grouped(),
            predicate: self.config.predicate_ref(),
        }
    }

    /// Obtain a new subscriber.
    ///
    /// The subscriber only receives events for passes that complete after
    /// this call. Disposed collections return an already-closed subscriber.
    pub fn subscribe(&self) -> SectionSubscriber<S::Id> {
        let read_lock = Shared::get_read_lock(&self.state);
        let rx = match &self.sender {
            Some(sender) => sender.subscribe(),
            // A fresh channel whose sender is dropped right away.
            None => broadcast::channel(1).1,
        };
        SectionSubscriber::new(read_lock, rx)
    }

    /// Obtain a handle through which observers can ask for a reload.
    pub fn reload_handle(&self) -> ReloadHandle {
        ReloadHandle { requested: self.reload_requested.clone() }
    }

    /// Whether [`dispose`][Self::dispose] was called.
    pub fn is_disposed(&self) -> bool {
        self.sender.is_none()
    }

    /// Temporary identities currently in the projection, waiting for
    /// [`resolve_identities`][Self::resolve_identities].
    pub fn pending_identities(&self) -> impl Iterator<Item = &S::Id> {
        self.pending_identities.iter()
    }

    /// Call `f` with the live record at the given position.
    pub fn with_record<T>(
        &self,
        source: &S,
        path: IndexPath,
        f: impl FnOnce(&S::Record) -> T,
    ) -> Option<T> {
        let id = self.state.get(path)?;
        source.read(id, f)
    }

    /// Fetch all records from `source` and rebuild the projection, then emit
    /// [`SectionEvent::Reloaded`].
    ///
    /// If the fetch fails, the projection keeps its previous state.
    pub fn reload(&mut self, source: &S) -> Result<(), FetchError> {
        self.reload_now(source)?;
        self.process_deferred(source)?;
        Ok(())
    }

    /// Start a fetch that will be executed outside of this call, e.g.
    /// asynchronously.
    ///
    /// Execute [`fetch_request`][Self::fetch_request] against the store and
    /// hand the result to [`complete_fetch`][Self::complete_fetch]. Starting
    /// another fetch supersedes this one.
    pub fn begin_fetch(&mut self) -> PendingFetch {
        self.generation += 1;

        #[cfg(feature = "tracing")]
        tracing::debug!(
            target: "sectioned::collection::fetch",
            "begin_fetch(generation = {})", self.generation
        );

        PendingFetch { generation: self.generation }
    }

    /// Complete a fetch started with [`begin_fetch`][Self::begin_fetch].
    ///
    /// Results of superseded fetches, and of fetches completing after the
    /// collection was disposed, are discarded without touching the
    /// projection. A fetch error is returned as-is and the projection keeps
    /// its previous state.
    pub fn complete_fetch(
        &mut self,
        source: &S,
        fetch: PendingFetch,
        result: Result<Vec<S::Id>, FetchError>,
    ) -> Result<FetchOutcome, FetchError> {
        if self.is_disposed() || fetch.generation != self.generation {
            #[cfg(feature = "tracing")]
            tracing::debug!(
                target: "sectioned::collection::fetch",
                "discarding fetch (generation = {}, current = {})",
                fetch.generation,
                self.generation,
            );

            return Ok(FetchOutcome::Discarded);
        }

        let ids = result?;

        #[cfg(feature = "tracing")]
        tracing::debug!(target: "sectioned::collection::update", "reload(len = {})", ids.len());

        {
            let mut projection = Shared::lock(&mut self.state);
            populate(&mut *projection, &self.config, source, ids);

            self.pending_identities =
                projection.cache.ids().filter(|id| id.is_temporary()).cloned().collect();
        }

        self.broadcast(SectionEvent::Reloaded);
        Ok(FetchOutcome::Applied)
    }

    /// Reconcile the projection with a batch of changes from `source`, emit
    /// [`SectionEvent::Updated`] and return the diff.
    ///
    /// A batch that invalidates everything triggers a full reload instead,
    /// which emits [`SectionEvent::Reloaded`] and returns an empty diff. A
    /// pass that changes nothing emits no event.
    ///
    /// Reload requests made through a [`ReloadHandle`] are served after the
    /// pass, never in the middle of it.
    ///
    /// # Panics
    ///
    /// Panics if a record the projection holds can't be located, which means
    /// the projection no longer reflects the store.
    pub fn apply(
        &mut self,
        source: &S,
        batch: ChangeBatch<S::Id>,
    ) -> Result<SectionDiff, FetchError> {
        if self.is_disposed() {
            return Ok(SectionDiff::default());
        }

        if batch.invalidated_all {
            self.reload_now(source)?;
            self.forward(&batch);
            self.process_deferred(source)?;
            return Ok(SectionDiff::default());
        }

        if batch.is_empty() {
            #[cfg(feature = "tracing")]
            tracing::trace!(target: "sectioned::collection::update", "Skipping empty change batch");

            return Ok(SectionDiff::default());
        }

        #[cfg(feature = "tracing")]
        tracing::debug!(
            target: "sectioned::collection::update",
            inserted = batch.inserted.len(),
            deleted = batch.deleted.len(),
            updated = batch.updated.len(),
            refreshed = batch.refreshed.len(),
            invalidated = batch.invalidated.len(),
            "apply"
        );

        let diff = {
            let mut projection = Shared::lock(&mut self.state);
            let changes = classify(&*projection, &self.config, source, &batch);
            let temporary: Vec<_> =
                changes.iter().map(|c| &c.id).filter(|id| id.is_temporary()).cloned().collect();

            let diff = merge(&mut *projection, changes, self.config.reports_updates());

            for id in temporary {
                if projection.contains(&id) {
                    self.pending_identities.insert(id);
                } else {
                    self.pending_identities.remove(&id);
                }
            }

            diff
        };

        if diff.is_empty() {
            #[cfg(feature = "tracing")]
            tracing::trace!(
                target: "sectioned::collection::broadcast",
                "Skipping broadcast of empty diff"
            );
        } else {
            self.broadcast(SectionEvent::Updated(diff.clone()));
        }

        self.forward(&batch);
        self.process_deferred(source)?;

        Ok(diff)
    }

    /// Serve a reload requested through a [`ReloadHandle`], if any.
    ///
    /// Returns whether a reload happened.
    pub fn process_deferred(&mut self, source: &S) -> Result<bool, FetchError> {
        if self.is_disposed() || !self.reload_requested.swap(false, Ordering::AcqRel) {
            return Ok(false);
        }

        #[cfg(feature = "tracing")]
        tracing::debug!(target: "sectioned::collection::update", "serving deferred reload");

        self.reload_now(source)?;
        Ok(true)
    }

    /// Replace temporary identities by the durable ones the store assigned on
    /// commit.
    ///
    /// This is not a structural change: positions stay the same and no event
    /// is emitted. Pairs whose temporary identity is not in the projection are
    /// ignored. Returns the number of identities replaced.
    ///
    /// # Panics
    ///
    /// Panics if a "durable" identity is itself temporary: the store committed
    /// without promoting the record's identity, which can't be fixed by
    /// trying again later.
    #[track_caller]
    pub fn resolve_identities(
        &mut self,
        assignments: impl IntoIterator<Item = (S::Id, S::Id)>,
    ) -> usize {
        let mut projection = Shared::lock(&mut self.state);
        let projection = &mut *projection;
        let mut resolved = 0;

        for (temporary, durable) in assignments {
            assert!(
                !durable.is_temporary(),
                "record {temporary:?} was committed with the temporary identity {durable:?}"
            );

            if !self.pending_identities.remove(&temporary) {
                continue;
            }
            let Some(snapshot) = projection.cache.get(&temporary).cloned() else {
                continue;
            };

            let path = projection.store.expect_located(
                &temporary,
                &snapshot,
                &projection.cache,
                &projection.comparator,
            );
            projection.store.replace_member(path, durable.clone());
            projection.cache.remove(&temporary);
            projection.cache.insert(durable, snapshot);
            resolved += 1;
        }

        #[cfg(feature = "tracing")]
        tracing::debug!(target: "sectioned::collection::update", "resolve_identities({resolved})");

        resolved
    }

    /// Tear the projection down.
    ///
    /// Every subscriber stream ends, pending fetches are discarded when they
    /// complete and further change batches are ignored.
    pub fn dispose(&mut self) {
        #[cfg(feature = "tracing")]
        tracing::debug!(target: "sectioned::collection::update", "dispose");

        self.sender = None;
        self.generation += 1;
        self.pending_identities.clear();
        Shared::lock(&mut self.state).clear();
    }

    fn reload_now(&mut self, source: &S) -> Result<FetchOutcome, FetchError> {
        let fetch = self.begin_fetch();
        let result = source.fetch(self.fetch_request());
        self.complete_fetch(source, fetch, result)
    }

    fn forward(&self, batch: &ChangeBatch<S::Id>) {
        if let Some(sink) = &self.sink {
            sink.forward(batch);
        }
    }

    fn broadcast(&self, event: SectionEvent) {
        let Some(sender) = &self.sender else { return };

        if sender.receiver_count() != 0 {
            let _num_receivers = sender.send(event).unwrap_or(0);
            #[cfg(feature = "tracing")]
            tracing::debug!(
                target: "sectioned::collection::broadcast",
                "Section event broadcast to {_num_receivers} receivers"
            );
        }
    }
}

impl<S: RecordSource> fmt::Debug for SectionedCollection<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SectionedCollection")
            .field("projection", &*self.state)
            .field("generation", &self.generation)
            .finish_non_exhaustive()
    }
}

// Note: No DerefMut because all mutating must go through reconciliation
impl<S: RecordSource> ops::Deref for SectionedCollection<S> {
    type Target = Projection<S::Id>;

    fn deref(&self) -> &Self::Target {
        &self.state
    }
}

/// A fetch started by [`SectionedCollection::begin_fetch`].
#[derive(Debug)]
#[must_use = "a pending fetch does nothing unless completed"]
pub struct PendingFetch {
    generation: u64,
}

/// What [`SectionedCollection::complete_fetch`] did with a fetch result.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FetchOutcome {
    /// The projection was rebuilt and [`SectionEvent::Reloaded`] emitted.
    Applied,
    /// The fetch was superseded or the collection disposed; nothing happened.
    Discarded,
}

/// A handle to request a reload of a [`SectionedCollection`] from anywhere,
/// including from code reacting to one of its events.
///
/// Requests are queued and served once the current reconciliation pass is
/// over; several requests before that are served by one reload.
#[derive(Clone, Debug)]
pub struct ReloadHandle {
    requested: Arc<AtomicBool>,
}

impl ReloadHandle {
    /// Request a reload.
    pub fn request(&self) {
        self.requested.store(true, Ordering::Release);
    }

    /// Whether a reload was requested and not served yet.
    pub fn is_requested(&self) -> bool {
        self.requested.load(Ordering::Acquire)
    }
}
