use std::future::Future;
use std::time::Duration;

use super::error::ConfigError;
use super::pool::{Pool, PoolInternal};
use crate::executor::{default_executor, Executor};
use crate::resource::{connect_fn, BoxedConnect, Connect, ConnectInfo, Resource};

/// The number of concurrently admitted connections when none is configured.
pub const DEFAULT_MAX_CONCURRENT: usize = 5;

pub struct PoolConfig<R: Resource> {
    acquire_timeout: Option<Duration>,
    connect: BoxedConnect<R>,
    executor: Option<Box<dyn Executor>>,
    info: ConnectInfo,
    max_concurrent: usize,
}

impl<R: Resource> PoolConfig<R> {
    /// Configure a pool which creates each connection by calling `create`
    /// with the resource locator and any options added to this config.
    pub fn new<C, F>(locator: impl Into<String>, create: C) -> Self
    where
        C: Fn(&ConnectInfo) -> F + 'static,
        F: Future<Output = Result<R, R::Error>> + 'static,
    {
        Self::with_connector(locator, connect_fn(create))
    }

    pub fn with_connector<C>(locator: impl Into<String>, connector: C) -> Self
    where
        C: Connect<Resource = R>,
    {
        Self {
            acquire_timeout: None,
            connect: Box::new(connector),
            executor: None,
            info: ConnectInfo::new(locator),
            max_concurrent: DEFAULT_MAX_CONCURRENT,
        }
    }

    /// Set the default time an acquire may spend queued. A zero duration
    /// waits indefinitely.
    pub fn acquire_timeout(mut self, val: Duration) -> Self {
        if val.is_zero() {
            self.acquire_timeout.take();
        } else {
            self.acquire_timeout.replace(val);
        }
        self
    }

    pub fn executor<E>(mut self, executor: E) -> Self
    where
        E: Executor + 'static,
    {
        self.executor.replace(Box::new(executor));
        self
    }

    pub fn max_concurrent(mut self, val: usize) -> Self {
        self.max_concurrent = val;
        self
    }

    /// Add an option passed through to the connect callback.
    pub fn option(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.info.set_option(key.into(), value.into());
        self
    }

    pub fn build(self) -> Result<Pool<R>, ConfigError> {
        if self.max_concurrent == 0 {
            return Err(ConfigError(
                "max_concurrent must be greater than zero".to_owned(),
            ));
        }
        let executor = match self.executor {
            Some(executor) => executor,
            None => default_executor()?,
        };
        let inner = PoolInternal::new(
            self.acquire_timeout,
            self.connect,
            executor,
            self.info,
            self.max_concurrent,
        );
        Ok(Pool::new(inner))
    }
}
