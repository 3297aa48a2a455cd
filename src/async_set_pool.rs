use crate::error::PoolError;
use crate::pool::{AsyncPool, AsyncPopulationPool};
use crate::set_pool::Available;
use crate::Result;
use std::hash::Hash;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{Mutex, MutexGuard, Notify};

/// The asynchronous version of [`SetPool`](crate::SetPool). A checkout on an empty pool suspends
/// the task until a value is checked in, the pool is populated, or the pool is closed.
///
/// Dropping a suspended checkout is safe; a wakeup it already received is passed on to another
/// waiting task.
pub struct AsyncSetPool<T> {
    available: Mutex<Available<T>>,
    closed: AtomicBool,
    signal: Notify,
}

impl<T: Eq + Hash + Clone> AsyncSetPool<T> {
    pub fn new() -> Self {
        Self::with_values(std::iter::empty())
    }

    pub fn with_values<V: IntoIterator<Item = T>>(values: V) -> Self {
        Self {
            available: Mutex::new(Available::new(values)),
            closed: AtomicBool::new(false),
            signal: Notify::new(),
        }
    }

    async fn lock_open(&self) -> Result<MutexGuard<'_, Available<T>>> {
        let available = self.available.lock().await;
        if self.is_closed() {
            return Err(PoolError::Closed);
        }
        Ok(available)
    }

    /// Take a value if one is available right now. Only waits for the internal lock.
    pub async fn try_checkout(&self) -> Result<Option<T>> {
        Ok(self.lock_open().await?.take_any())
    }

    pub async fn available(&self) -> usize {
        self.available.lock().await.len()
    }

    fn wake(&self, count: usize) {
        for _ in 0..count {
            self.signal.notify_one();
        }
    }
}

impl<T: Eq + Hash + Clone> Default for AsyncSetPool<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Eq + Hash + Clone> AsyncPool for AsyncSetPool<T> {
    type Item = T;

    async fn checkout(&self) -> Result<T> {
        loop {
            // Created before the closed flag is read, so a close that lands afterwards is seen
            // through `notify_waiters`.
            let notified = self.signal.notified();
            tokio::pin!(notified);
            {
                let mut available = self.lock_open().await?;
                if let Some(value) = available.take_any() {
                    return Ok(value);
                }
                // Register while holding the lock so no populate or checkin can slip past.
                notified.as_mut().enable();
            }
            notified.await;
        }
    }

    /// Values the pool never handed out are admitted too, as if populated.
    async fn checkin(&self, value: T) -> Result<()> {
        let added = self.lock_open().await?.insert(value);
        if added {
            self.wake(1);
        }
        Ok(())
    }

    fn close(&self, reason: &str) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        tracing::debug!(reason, "async set pool closed");
        self.signal.notify_waiters();
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl<T: Eq + Hash + Clone> AsyncPopulationPool for AsyncSetPool<T> {
    async fn populate<I>(&self, values: I) -> Result<usize>
    where
        I: IntoIterator<Item = T>,
    {
        let added = self.lock_open().await?.insert_all(values);
        self.wake(added);
        Ok(added)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::any::Any;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::sync::mpsc;
    use tokio::task;

    async fn settle() {
        for _ in 0..10 {
            task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn test_non_blocking() {
        let pool = AsyncSetPool::with_values(vec![1, 2, 3]);
        let first = pool.checkout().await.unwrap();
        let second = pool.checkout().await.unwrap();
        assert_ne!(first, second);
        assert_eq!(pool.available().await, 1);

        pool.checkin(first).await.unwrap();
        pool.checkin(first).await.unwrap();
        assert_eq!(pool.available().await, 2);

        let mut rest = vec![
            pool.try_checkout().await.unwrap().unwrap(),
            pool.try_checkout().await.unwrap().unwrap(),
        ];
        rest.sort_unstable();
        let mut expected: Vec<i32> = vec![1, 2, 3].into_iter().filter(|v| *v != second).collect();
        expected.sort_unstable();
        assert_eq!(rest, expected);
        assert_eq!(pool.try_checkout().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_populate_counts_distinct_new_values() {
        let pool = AsyncSetPool::with_values(vec!["x"]);
        assert_eq!(pool.populate(vec!["x", "y", "y", "z"]).await.unwrap(), 2);
        assert_eq!(pool.available().await, 3);
    }

    #[tokio::test]
    async fn test_wrong_type_is_ignored() {
        let pool: AsyncSetPool<u16> = AsyncSetPool::new();
        pool.checkin_any(Box::new(4u32)).await.unwrap();
        assert_eq!(pool.available().await, 0);
        pool.checkin_any(Box::new(4u16)).await.unwrap();
        assert_eq!(pool.available().await, 1);
    }

    #[tokio::test]
    async fn test_checkin_wakes_waiter() {
        let pool: Arc<AsyncSetPool<u8>> = Arc::new(AsyncSetPool::new());
        let waiter = {
            let pool = pool.clone();
            task::spawn(async move { pool.checkout().await })
        };
        settle().await;
        assert!(!waiter.is_finished());

        pool.checkin(42).await.unwrap();
        assert_eq!(waiter.await.unwrap(), Ok(42));
    }

    #[tokio::test]
    async fn test_populate_wakes_no_more_than_added() {
        let pool: Arc<AsyncSetPool<u32>> = Arc::new(AsyncSetPool::new());
        let (sender, mut receiver) = mpsc::unbounded_channel();
        for _ in 0..4 {
            let pool = pool.clone();
            let sender = sender.clone();
            task::spawn(async move { sender.send(pool.checkout().await) });
        }
        settle().await;

        assert_eq!(pool.populate(vec![7, 8]).await.unwrap(), 2);
        let mut got = vec![
            receiver.recv().await.unwrap().unwrap(),
            receiver.recv().await.unwrap().unwrap(),
        ];
        got.sort_unstable();
        assert_eq!(got, vec![7, 8]);

        settle().await;
        assert!(receiver.try_recv().is_err());

        pool.close("test over");
        for _ in 0..2 {
            assert_eq!(receiver.recv().await.unwrap(), Err(PoolError::Closed));
        }
    }

    #[tokio::test]
    async fn test_close_wakes_every_waiter() {
        let pool: Arc<AsyncSetPool<String>> = Arc::new(AsyncSetPool::new());
        let waiters: Vec<_> = (0..6)
            .map(|_| {
                let pool = pool.clone();
                task::spawn(async move { pool.checkout().await })
            })
            .collect();
        settle().await;

        pool.close("shutting down");
        pool.close("shutting down twice");
        for waiter in waiters {
            assert_eq!(waiter.await.unwrap(), Err(PoolError::Closed));
        }

        assert!(pool.is_closed());
        assert_eq!(pool.checkout().await, Err(PoolError::Closed));
        assert_eq!(pool.checkin(String::new()).await, Err(PoolError::Closed));
        assert_eq!(pool.populate(vec![String::new()]).await, Err(PoolError::Closed));
    }

    #[tokio::test]
    async fn test_dropped_checkout_passes_wakeup_on() {
        let pool: Arc<AsyncSetPool<u8>> = Arc::new(AsyncSetPool::new());
        let abandoned = {
            let pool = pool.clone();
            task::spawn(async move { pool.checkout().await })
        };
        let patient = {
            let pool = pool.clone();
            task::spawn(async move { pool.checkout().await })
        };
        settle().await;

        abandoned.abort();
        pool.populate([1]).await.unwrap();
        assert_eq!(patient.await.unwrap(), Ok(1));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_populate_wakes_no_more_than_added_multi_thread() {
        let pool: Arc<AsyncSetPool<u32>> = Arc::new(AsyncSetPool::new());
        let (sender, mut receiver) = mpsc::unbounded_channel();
        for _ in 0..4 {
            let pool = pool.clone();
            let sender = sender.clone();
            task::spawn(async move { sender.send(pool.checkout().await) });
        }
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(pool.populate(vec![7, 8]).await.unwrap(), 2);
        let mut got = vec![
            receiver.recv().await.unwrap().unwrap(),
            receiver.recv().await.unwrap().unwrap(),
        ];
        got.sort_unstable();
        assert_eq!(got, vec![7, 8]);

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(receiver.try_recv().is_err());

        pool.close("test over");
        for _ in 0..2 {
            assert_eq!(receiver.recv().await.unwrap(), Err(PoolError::Closed));
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_checkin_any_can_be_spawned() {
        let pool: Arc<AsyncSetPool<u16>> = Arc::new(AsyncSetPool::new());
        let values: [Box<dyn Any + Send>; 3] = [Box::new(1u16), Box::new("2"), Box::new(3u16)];
        let checkins: Vec<_> = values
            .into_iter()
            .map(|value| {
                let pool = pool.clone();
                task::spawn(async move { pool.checkin_any(value).await })
            })
            .collect();
        for checkin in checkins {
            assert_eq!(checkin.await.unwrap(), Ok(()));
        }
        assert_eq!(pool.available().await, 2);
    }
}
