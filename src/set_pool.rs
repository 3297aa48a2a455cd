use crate::error::PoolError;
use crate::pool::{Pool, PopulationPool};
use crate::Result;
use parking_lot::{Condvar, Mutex, MutexGuard};
use std::collections::HashSet;
use std::hash::Hash;
use std::time::{Duration, Instant};

/// The values ready to be handed out. Shared by the blocking & async set pools.
pub(crate) struct Available<T>(HashSet<T>);

impl<T: Eq + Hash + Clone> Available<T> {
    pub(crate) fn new<V: IntoIterator<Item = T>>(values: V) -> Self {
        Self(values.into_iter().collect())
    }

    pub(crate) fn take_any(&mut self) -> Option<T> {
        let value = self.0.iter().next()?.clone();
        self.0.take(&value)
    }

    pub(crate) fn insert(&mut self, value: T) -> bool {
        self.0.insert(value)
    }

    /// Insert every value, returning how many were not already present.
    pub(crate) fn insert_all<V: IntoIterator<Item = T>>(&mut self, values: V) -> usize {
        let mut added = 0;
        for value in values {
            if self.0.insert(value) {
                added += 1;
            }
        }
        added
    }

    pub(crate) fn len(&self) -> usize {
        self.0.len()
    }
}

struct State<T> {
    available: Available<T>,
    closed: bool,
}

/// A thread-safe population pool backed by a set. Checkouts block until a value is available or
/// the pool is closed. Share it between threads with an `Arc`.
///
/// Values come out in no particular order, and nothing is promised about which of several
/// waiting threads gets served first.
pub struct SetPool<T> {
    state: Mutex<State<T>>,
    signal: Condvar,
}

impl<T: Eq + Hash + Clone> SetPool<T> {
    /// Create a new, empty pool.
    pub fn new() -> Self {
        Self::with_values(std::iter::empty())
    }

    /// Create a new pool with initial contents from an iterable of values.
    pub fn with_values<V: IntoIterator<Item = T>>(values: V) -> Self {
        Self {
            state: Mutex::new(State {
                available: Available::new(values),
                closed: false,
            }),
            signal: Condvar::new(),
        }
    }

    fn lock_open(&self) -> Result<MutexGuard<'_, State<T>>> {
        let state = self.state.lock();
        if state.closed {
            return Err(PoolError::Closed);
        }
        Ok(state)
    }

    /// Take a value if one is available right now, without blocking.
    pub fn try_checkout(&self) -> Result<Option<T>> {
        Ok(self.lock_open()?.available.take_any())
    }

    /// Like [`Pool::checkout`], but give up after `timeout`, returning `None`. A timeout too large
    /// to express as a deadline waits without one.
    pub fn checkout_timeout(&self, timeout: Duration) -> Result<Option<T>> {
        let mut state = self.lock_open()?;
        if let Some(value) = state.available.take_any() {
            return Ok(Some(value));
        }
        let Some(deadline) = Instant::now().checked_add(timeout) else {
            drop(state);
            return self.checkout().map(Some);
        };
        loop {
            let timed_out = self.signal.wait_until(&mut state, deadline).timed_out();
            if state.closed {
                return Err(PoolError::Closed);
            }
            if let Some(value) = state.available.take_any() {
                return Ok(Some(value));
            }
            if timed_out {
                return Ok(None);
            }
        }
    }

    /// The number of values ready to be checked out.
    pub fn available(&self) -> usize {
        self.state.lock().available.len()
    }
}

impl<T: Eq + Hash + Clone> Default for SetPool<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Eq + Hash + Clone> Pool for SetPool<T> {
    type Item = T;

    fn checkout(&self) -> Result<T> {
        let mut state = self.lock_open()?;
        loop {
            if let Some(value) = state.available.take_any() {
                return Ok(value);
            }
            self.signal.wait(&mut state);
            if state.closed {
                return Err(PoolError::Closed);
            }
        }
    }

    /// Values the pool never handed out are admitted too, as if populated.
    fn checkin(&self, value: T) -> Result<()> {
        let mut state = self.lock_open()?;
        if state.available.insert(value) {
            drop(state);
            self.signal.notify_one();
        }
        Ok(())
    }

    fn close(&self, reason: &str) {
        let mut state = self.state.lock();
        if state.closed {
            return;
        }
        state.closed = true;
        drop(state);
        tracing::debug!(reason, "set pool closed");
        self.signal.notify_all();
    }

    fn is_closed(&self) -> bool {
        self.state.lock().closed
    }
}

impl<T: Eq + Hash + Clone> PopulationPool for SetPool<T> {
    fn populate<I>(&self, values: I) -> Result<usize>
    where
        I: IntoIterator<Item = T>,
    {
        let added = self.lock_open()?.available.insert_all(values);
        for _ in 0..added {
            if !self.signal.notify_one() {
                break;
            }
        }
        Ok(added)
    }
}
