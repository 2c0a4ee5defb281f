//! An async admission gate for short-lived connections.
//!
//! A [`Pool`] caps the number of connections which may be open at once.
//! Requesters beyond the cap wait in a first-in, first-out queue and are
//! admitted one at a time as connections are closed. Despite the name, no
//! connection is ever reused: each admission creates a fresh resource
//! through the configured connect callback.
//!
//! A pool runs on a single-threaded cooperative [`Executor`], which is
//! supplied when the pool is built. It supports a graceful
//! [`close`](Pool::close), which waits for connections to be returned, and
//! a forced [`terminate`](Pool::terminate), which closes them.

mod executor;
#[cfg(feature = "global-exec")]
pub use self::executor::GlobalExecutor;
pub use self::executor::{default_executor, Executor};

mod pool;
pub use self::pool::{
    Acquire, AcquireError, ConfigError, Pool, PoolConfig, PoolError, PoolState, Scope,
    DEFAULT_MAX_CONCURRENT,
};

mod resource;
pub use self::resource::{connect_fn, Connect, ConnectFn, ConnectInfo, Connection, Resource};
