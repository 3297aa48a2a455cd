use thiserror::Error;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum PoolError {
    /// The pool was closed, either explicitly or because its upstream source ran dry. A closed
    /// pool never reopens.
    #[error("pool is closed")]
    Closed,
}

pub type Result<T> = std::result::Result<T, PoolError>;
