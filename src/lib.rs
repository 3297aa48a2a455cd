//! Pools that hand out unique values one at a time & take them back for reuse.
//!
//! * [`CountingPool`] counts upward forever, reusing integers that come back. Single consumer,
//!   never blocks.
//! * [`SetPool`] is a thread-safe population pool; checkouts block until a value arrives or the
//!   pool is closed.
//! * [`AsyncSetPool`] is the same thing for async tasks.
//! * [`StreamPool`] draws values lazily from an upstream stream.
//!
//! ```
//! use reuse_pool::{Pool, PopulationPool, SetPool};
//!
//! let pool = SetPool::new();
//! pool.populate(["a", "b"]).unwrap();
//! let value = pool.checkout().unwrap();
//! pool.checkin(value).unwrap();
//! pool.close("done");
//! assert!(pool.checkout().is_err());
//! ```
//!
//! The async pools are behind the `async` feature (on by default).

mod counting;
mod error;
mod pool;
mod set_pool;

#[cfg(feature = "async")]
mod async_set_pool;
#[cfg(feature = "async")]
mod stream_pool;

pub use counting::CountingPool;
pub use error::{PoolError as Error, Result};
pub use pool::{Pool, PopulationPool};
pub use set_pool::SetPool;

#[cfg(feature = "async")]
pub use async_set_pool::AsyncSetPool;
#[cfg(feature = "async")]
pub use pool::{AsyncPool, AsyncPopulationPool};
#[cfg(feature = "async")]
pub use stream_pool::{Infallibly, StreamPool};
