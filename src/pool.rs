//! The contracts every pool in this crate honours.
//!
//! A pool hands out values of its `Item` type one at a time. A value that has been checked out
//! is never handed out again until it is checked back in, and once a pool is closed every
//! further operation fails with [`PoolError::Closed`].

use crate::error::PoolError;
use crate::Result;
use std::any::Any;

/// A pool of values that can be checked out & checked back in for reuse.
pub trait Pool {
    type Item;

    /// Take a value that is not currently on loan. Blocking pools wait for one to become
    /// available; if the pool is closed, or becomes closed while waiting, this fails with
    /// [`PoolError::Closed`].
    fn checkout(&self) -> Result<Self::Item>;

    /// Give a value back to the pool. What happens to a value the pool never handed out depends
    /// on the pool.
    fn checkin(&self, value: Self::Item) -> Result<()>;

    /// Give back a value whose type is only known at runtime. Values that are not of the pooled
    /// type are ignored.
    fn checkin_any(&self, value: Box<dyn Any>) -> Result<()>
    where
        Self::Item: 'static,
    {
        if self.is_closed() {
            return Err(PoolError::Closed);
        }
        match value.downcast::<Self::Item>() {
            Ok(value) => self.checkin(*value),
            Err(_) => {
                tracing::trace!("ignoring checkin of a value that is not of the pooled type");
                Ok(())
            }
        }
    }

    /// Close the pool for good, waking anyone waiting on it. Closing twice is harmless.
    fn close(&self, reason: &str);

    fn is_closed(&self) -> bool;
}

/// A pool that can also be fed values from the side, without a checkout having happened.
pub trait PopulationPool: Pool {
    /// Add values to the pool. Returns how many distinct values became newly available; that many
    /// waiting checkouts are woken.
    fn populate<I>(&self, values: I) -> Result<usize>
    where
        I: IntoIterator<Item = Self::Item>;
}

/// The asynchronous counterpart of [`Pool`]. Waiting yields to the executor rather than
/// blocking a thread.
#[cfg(feature = "async")]
#[allow(async_fn_in_trait)]
pub trait AsyncPool {
    type Item;

    async fn checkout(&self) -> Result<Self::Item>;

    async fn checkin(&self, value: Self::Item) -> Result<()>;

    /// Like [`Pool::checkin_any`]. The box must be `Send` because it is held across the
    /// `checkin` await, and the future may be spawned onto a multi-threaded runtime; the blocking
    /// version runs on the caller's thread and needs no such bound.
    async fn checkin_any(&self, value: Box<dyn Any + Send>) -> Result<()>
    where
        Self::Item: 'static,
    {
        if self.is_closed() {
            return Err(PoolError::Closed);
        }
        match value.downcast::<Self::Item>() {
            Ok(value) => self.checkin(*value).await,
            Err(_) => {
                tracing::trace!("ignoring checkin of a value that is not of the pooled type");
                Ok(())
            }
        }
    }

    /// Close the pool for good. Every suspended checkout is woken & fails with
    /// [`PoolError::Closed`].
    fn close(&self, reason: &str);

    fn is_closed(&self) -> bool;
}

/// The asynchronous counterpart of [`PopulationPool`].
#[cfg(feature = "async")]
#[allow(async_fn_in_trait)]
pub trait AsyncPopulationPool: AsyncPool {
    async fn populate<I>(&self, values: I) -> Result<usize>
    where
        I: IntoIterator<Item = Self::Item>;
}
