use std::time::Duration;

use futures_lite::future::BoxedLocal;

use crate::pool::ConfigError;

#[cfg(feature = "global-exec")]
mod global;

#[cfg(feature = "global-exec")]
pub use self::global::GlobalExecutor;

#[cfg(feature = "global-exec")]
/// Returns a default [`Executor`] instance to use when constructing a
/// connection pool.
pub fn default_executor() -> Result<Box<dyn Executor>, ConfigError> {
    Ok(Box::new(self::global::GlobalExecutor))
}

#[cfg(not(feature = "global-exec"))]
/// Returns a default [`Executor`] instance to use when constructing a
/// connection pool.
pub fn default_executor() -> Result<Box<dyn Executor>, ConfigError> {
    Err(ConfigError("No default executor is provided".to_owned()))
}

/// The cooperative scheduler a pool runs on. Every pool is handed one of
/// these at construction, so independent pools never share hidden global
/// state and tests can drive a pool from their own executor.
///
/// Implementations are expected to be single-threaded: spawned tasks run on
/// the same thread as the pool itself.
pub trait Executor {
    /// Spawn a detached, boxed Future with no return value
    fn spawn_local(&self, task: BoxedLocal<()>);

    /// Create a Future which resolves once `duration` has elapsed
    fn sleep(&self, duration: Duration) -> BoxedLocal<()>;
}
