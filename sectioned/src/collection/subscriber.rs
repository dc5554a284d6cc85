use std::{
    fmt, ops,
    pin::Pin,
    task::{ready, Context, Poll},
};

use futures_core::Stream;
use readlock::{SharedReadGuard, SharedReadLock};
use tokio::sync::broadcast::{
    error::{RecvError, TryRecvError},
    Receiver,
};
use tokio_util::sync::ReusableBoxFuture;

use crate::{projection::Projection, RecordIdentity, SectionEvent};

/// A subscriber for the events of a [`SectionedCollection`].
///
/// Use its [`Stream`] implementation to interact with it (futures-util and
/// other futures-related crates have extension traits with convenience
/// methods). The stream ends when the collection is disposed or dropped.
///
/// [`SectionedCollection`]: crate::SectionedCollection
pub struct SectionSubscriber<Id: RecordIdentity> {
    state: SharedReadLock<Projection<Id>>,
    inner: ReusableBoxFuture<'static, SubscriberFutureReturn<SectionEvent>>,
}

impl<Id: RecordIdentity> SectionSubscriber<Id> {
    pub(super) fn new(state: SharedReadLock<Projection<Id>>, rx: Receiver<SectionEvent>) -> Self {
        Self { state, inner: ReusableBoxFuture::new(make_future(rx)) }
    }

    /// Lock the projection for reading.
    ///
    /// The projection reflects the last completed reconciliation pass, which
    /// may be newer than the last event received through this subscriber.
    /// As long as the returned guard is alive, the collection can't be
    /// updated.
    pub fn read(&self) -> ProjectionReadGuard<'_, Id> {
        ProjectionReadGuard { inner: self.state.lock() }
    }
}

impl<Id: RecordIdentity> fmt::Debug for SectionSubscriber<Id> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SectionSubscriber").finish_non_exhaustive()
    }
}

impl<Id: RecordIdentity> Stream for SectionSubscriber<Id> {
    type Item = SectionEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let (result, mut rx) = ready!(self.inner.poll(cx));

        let poll = match result {
            Ok(event) => Poll::Ready(Some(event)),
            Err(RecvError::Closed) => Poll::Ready(None),
            Err(RecvError::Lagged(_)) => {
                // Drain what is left, the incremental events are useless
                // without the ones that were dropped.
                loop {
                    match rx.try_recv() {
                        Ok(_) | Err(TryRecvError::Lagged(_)) => {}
                        Err(TryRecvError::Empty) => break Poll::Ready(Some(SectionEvent::Reloaded)),
                        Err(TryRecvError::Closed) => {
                            #[cfg(feature = "tracing")]
                            tracing::info!("Channel closed after lag, not emitting a reload");
                            break Poll::Ready(None);
                        }
                    }
                }
            }
        };

        self.inner.set(make_future(rx));
        poll
    }
}

/// A read guard for the projection of a [`SectionedCollection`].
///
/// Note that as long as a `ProjectionReadGuard` is kept alive, the associated
/// collection is locked and can not be updated.
///
/// [`SectionedCollection`]: crate::SectionedCollection
#[must_use]
#[clippy::has_significant_drop]
pub struct ProjectionReadGuard<'a, Id: RecordIdentity> {
    inner: SharedReadGuard<'a, Projection<Id>>,
}

impl<Id: RecordIdentity> fmt::Debug for ProjectionReadGuard<'_, Id> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        (**self).fmt(f)
    }
}

impl<Id: RecordIdentity> ops::Deref for ProjectionReadGuard<'_, Id> {
    type Target = Projection<Id>;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

type SubscriberFutureReturn<T> = (Result<T, RecvError>, Receiver<T>);

async fn make_future<T: Clone>(mut rx: Receiver<T>) -> SubscriberFutureReturn<T> {
    let result = rx.recv().await;
    (result, rx)
}
