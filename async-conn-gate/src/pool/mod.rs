mod acquire;
pub use acquire::{Acquire, Scope};

mod config;
pub use config::{PoolConfig, DEFAULT_MAX_CONCURRENT};

mod error;
pub use error::{AcquireError, ConfigError, PoolError};

mod pool;
pub use pool::{Pool, PoolState};

mod wait;
