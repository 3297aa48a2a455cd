use crate::error::PoolError;
use crate::pool::Pool;
use crate::Result;
use std::cell::{Cell, RefCell};
use std::collections::{HashSet, VecDeque};

#[derive(Default)]
struct Returned {
    queue: VecDeque<u64>,
    // Mirrors `queue` for the duplicate check.
    members: HashSet<u64>,
}

/// An endless source of integers, counting upward from a starting value. Integers that are checked
/// back in are handed out again (oldest first) before any fresh ones.
///
/// Never blocks. It is meant for a single consumer & is deliberately `!Sync`.
pub struct CountingPool {
    first: u64,
    // The lowest integer that has never been handed out.
    next_fresh: Cell<u64>,
    returned: RefCell<Returned>,
    closed: Cell<bool>,
}

impl CountingPool {
    /// Create a pool that counts up from zero.
    pub fn new() -> Self {
        Self::starting_at(0)
    }

    /// Create a pool whose first fresh value is `first`.
    pub fn starting_at(first: u64) -> Self {
        Self {
            first,
            next_fresh: Cell::new(first),
            returned: RefCell::new(Returned::default()),
            closed: Cell::new(false),
        }
    }

    /// The lowest value that has never been checked out.
    pub fn watermark(&self) -> u64 {
        self.next_fresh.get()
    }

    /// The number of checked in values waiting to be handed out again.
    pub fn returned_len(&self) -> usize {
        self.returned.borrow().queue.len()
    }
}

impl Default for CountingPool {
    fn default() -> Self {
        Self::new()
    }
}

impl Pool for CountingPool {
    type Item = u64;

    fn checkout(&self) -> Result<u64> {
        if self.closed.get() {
            return Err(PoolError::Closed);
        }
        let mut returned = self.returned.borrow_mut();
        if let Some(value) = returned.queue.pop_front() {
            returned.members.remove(&value);
            return Ok(value);
        }
        drop(returned);

        let value = self.next_fresh.get();
        match value.checked_add(1) {
            Some(next) => {
                self.next_fresh.set(next);
                Ok(value)
            }
            None => {
                self.close("integers exhausted");
                Err(PoolError::Closed)
            }
        }
    }

    fn checkin(&self, value: u64) -> Result<()> {
        if self.closed.get() {
            return Err(PoolError::Closed);
        }
        if !(self.first..self.next_fresh.get()).contains(&value) {
            tracing::trace!(value, "discarding checkin of a value that was never handed out");
            return Ok(());
        }
        let mut returned = self.returned.borrow_mut();
        if returned.members.insert(value) {
            returned.queue.push_back(value);
        } else {
            tracing::trace!(value, "discarding duplicate checkin");
        }
        Ok(())
    }

    fn close(&self, reason: &str) {
        if !self.closed.replace(true) {
            tracing::debug!(reason, "counting pool closed");
        }
    }

    fn is_closed(&self) -> bool {
        self.closed.get()
    }
}
