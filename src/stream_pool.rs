use crate::error::PoolError;
use crate::pool::AsyncPool;
use crate::Result;
use futures::stream::{Map, Stream, StreamExt, TryStream, TryStreamExt};
use std::collections::{HashSet, VecDeque};
use std::convert::Infallible;
use std::fmt::Display;
use std::future::Future;
use std::hash::Hash;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{Mutex, Notify};

/// An infallible stream, lifted so that it can feed a [`StreamPool`].
pub type Infallibly<St> = Map<
    St,
    fn(<St as Stream>::Item) -> std::result::Result<<St as Stream>::Item, Infallible>,
>;

struct Inner<S: TryStream> {
    source: S,
    checked_out: HashSet<S::Ok>,
    returned: VecDeque<S::Ok>,
}

/// A pool that draws fresh values lazily from an upstream stream, and hands out values that were
/// checked back in (oldest first) before drawing more.
///
/// Only values that came from upstream & are currently checked out are accepted back. When the
/// upstream stream ends or yields an error, the pool closes. The error itself is logged and
/// otherwise dropped.
///
/// Checked out values are tracked as a set: if upstream yields a value equal to one still on loan,
/// both copies are handed out but only one checkin of that value is taken back.
///
/// The source may be borrowed (`&mut S` is a stream too) when its lifetime is managed elsewhere.
pub struct StreamPool<S: TryStream> {
    inner: Mutex<Inner<S>>,
    closed: AtomicBool,
    closing: Notify,
}

impl<S> StreamPool<S>
where
    S: TryStream + Unpin,
    S::Ok: Eq + Hash + Clone,
    S::Error: Display,
{
    /// Wrap a stream of `Result`s. The first error closes the pool.
    pub fn new(source: S) -> Self {
        Self {
            inner: Mutex::new(Inner {
                source,
                checked_out: HashSet::new(),
                returned: VecDeque::new(),
            }),
            closed: AtomicBool::new(false),
            closing: Notify::new(),
        }
    }

    /// The number of values currently checked out.
    pub async fn checked_out(&self) -> usize {
        self.inner.lock().await.checked_out.len()
    }

    /// The number of values checked back in & waiting to be handed out again.
    pub async fn returned(&self) -> usize {
        self.inner.lock().await.returned.len()
    }

    /// Give back the upstream source.
    pub fn into_inner(self) -> S {
        self.inner.into_inner().source
    }

    /// Run `work`, unless the pool is closed first. Closing wakes callers still waiting for the
    /// lock or for an upstream pull.
    async fn unless_closed<R>(&self, work: impl Future<Output = Result<R>>) -> Result<R> {
        let closing = self.closing.notified();
        tokio::pin!(closing);
        closing.as_mut().enable();
        if self.is_closed() {
            return Err(PoolError::Closed);
        }

        tokio::select! {
            biased;
            _ = &mut closing => Err(PoolError::Closed),
            result = work => result,
        }
    }

    async fn pull(&self) -> Result<S::Ok> {
        let mut guard = self.inner.lock().await;
        let inner = &mut *guard;
        if self.is_closed() {
            return Err(PoolError::Closed);
        }

        if let Some(value) = inner.returned.pop_front() {
            inner.checked_out.insert(value.clone());
            return Ok(value);
        }

        match inner.source.try_next().await {
            Ok(Some(value)) => {
                inner.checked_out.insert(value.clone());
                Ok(value)
            }
            // Closed while the lock is still held, so no queued checkout polls the source again.
            Ok(None) => {
                self.close("upstream exhausted");
                Err(PoolError::Closed)
            }
            Err(error) => {
                tracing::warn!(%error, "upstream failed, closing stream pool");
                self.close("upstream failed");
                Err(PoolError::Closed)
            }
        }
    }

    async fn put_back(&self, value: S::Ok) -> Result<()> {
        let mut guard = self.inner.lock().await;
        let inner = &mut *guard;
        if self.is_closed() {
            return Err(PoolError::Closed);
        }
        if inner.checked_out.remove(&value) {
            inner.returned.push_back(value);
        } else {
            tracing::trace!("discarding checkin of a value that is not checked out");
        }
        Ok(())
    }
}

impl<St> StreamPool<Infallibly<St>>
where
    St: Stream + Unpin,
    St::Item: Eq + Hash + Clone,
{
    /// Wrap a stream that cannot fail. The pool closes when the stream ends.
    pub fn from_stream(source: St) -> Self {
        let lift: fn(St::Item) -> std::result::Result<St::Item, Infallible> = Ok;
        Self::new(source.map(lift))
    }
}

impl<S> AsyncPool for StreamPool<S>
where
    S: TryStream + Unpin,
    S::Ok: Eq + Hash + Clone,
    S::Error: Display,
{
    type Item = S::Ok;

    async fn checkout(&self) -> Result<S::Ok> {
        self.unless_closed(self.pull()).await
    }

    /// Only values drawn from upstream & currently checked out are taken back; anything else is
    /// ignored.
    async fn checkin(&self, value: S::Ok) -> Result<()> {
        self.unless_closed(self.put_back(value)).await
    }

    fn close(&self, reason: &str) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        tracing::debug!(reason, "stream pool closed");
        self.closing.notify_waiters();
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}
