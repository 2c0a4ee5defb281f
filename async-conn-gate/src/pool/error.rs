use thiserror::Error;

/// An error raised by the pool's own bookkeeping.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum PoolError {
    /// The connection is not currently admitted by this pool
    #[error("The connection is not active in this pool")]
    InvalidConnection,
    /// The pool is draining and admits no new connections
    #[error("The connection pool is closing")]
    PoolClosing,
    /// The pool has shut down
    #[error("The connection pool is closed")]
    PoolClosed,
    /// An acquisition context was entered after it had already been used
    #[error("The connection is already acquired")]
    AlreadyAcquired,
    /// The connection's resource is borrowed in a conflicting way
    #[error("The connection resource is already borrowed")]
    ResourceBusy,
}

/// An error during connection acquisition or release.
#[derive(Debug, Error)]
pub enum AcquireError<E> {
    /// The pool refused the operation
    #[error(transparent)]
    Pool(#[from] PoolError),
    /// The acquire timed out while queued for a free slot
    #[error("Timed out waiting for an available connection")]
    Timeout,
    /// Wraps an error result from the pool's connect callback or from
    /// closing the underlying connection
    #[error("Resource error: {0:?}")]
    Resource(E),
}

impl<E> AcquireError<E> {
    /// Returns `true` if the acquire gave up waiting in the queue. The pool
    /// is unaffected, so the request may simply be retried.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout)
    }

    /// Returns the pool error kind, if this is one.
    pub fn pool_error(&self) -> Option<PoolError> {
        match self {
            Self::Pool(err) => Some(*err),
            _ => None,
        }
    }
}

/// A configuration error.
#[derive(Debug, Error)]
#[error("Config error: {0}")]
pub struct ConfigError(pub String);
