use std::fmt::{self, Debug, Formatter};
use std::future::IntoFuture;
use std::ops::{Deref, DerefMut};
use std::time::Duration;

use futures_lite::future::{BoxedLocal, FutureExt};

use super::error::{AcquireError, PoolError};
use super::pool::Pool;
use crate::resource::{Connection, Resource};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ContextState {
    Unused,
    Holding,
    Done,
}

/// A single-use acquisition context returned by [`Pool::acquire`].
///
/// Awaiting the context resolves to a [`Connection`] owned by the caller.
/// Alternatively [`enter`](Self::enter) yields a [`Scope`] which closes the
/// connection when it goes out of scope. Either way the context cannot be
/// used a second time.
pub struct Acquire<R: Resource> {
    pool: Pool<R>,
    state: ContextState,
    timeout: Option<Duration>,
}

impl<R: Resource> Acquire<R> {
    pub(crate) fn new(pool: Pool<R>, timeout: Option<Duration>) -> Self {
        Self {
            pool,
            state: ContextState::Unused,
            timeout,
        }
    }

    /// Limit the time spent waiting for a free slot. A zero duration waits
    /// indefinitely.
    pub fn timeout(mut self, val: Duration) -> Self {
        if val.is_zero() {
            self.timeout.take();
        } else {
            self.timeout.replace(val);
        }
        self
    }

    /// Returns `true` once a connection has been handed out through this
    /// context.
    pub fn is_used(&self) -> bool {
        self.state != ContextState::Unused
    }

    /// Acquire a connection bound to the returned scope.
    ///
    /// A failed acquisition leaves the context unused, so it may be retried
    /// after a timeout.
    pub async fn enter(&mut self) -> Result<Scope<'_, R>, AcquireError<R::Error>> {
        if self.state != ContextState::Unused {
            return Err(PoolError::AlreadyAcquired.into());
        }
        let conn = self.pool.acquire_now(self.timeout).await?;
        self.state = ContextState::Holding;
        Ok(Scope {
            conn: Some(conn),
            context: self,
        })
    }
}

impl<R: Resource> Debug for Acquire<R> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Acquire")
            .field("state", &self.state)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl<R: Resource> IntoFuture for Acquire<R> {
    type Output = Result<Connection<R>, AcquireError<R::Error>>;
    type IntoFuture = BoxedLocal<Self::Output>;

    fn into_future(self) -> Self::IntoFuture {
        async move {
            if self.state != ContextState::Unused {
                return Err(PoolError::AlreadyAcquired.into());
            }
            self.pool.acquire_now(self.timeout).await
        }
        .boxed_local()
    }
}

/// A connection held for the lifetime of a scope.
///
/// Prefer [`exit`](Self::exit), which reports any error from closing the
/// connection. Dropping the scope, including on an early return, releases
/// the connection immediately and closes it in the background.
pub struct Scope<'a, R: Resource> {
    conn: Option<Connection<R>>,
    context: &'a mut Acquire<R>,
}

impl<R: Resource> Scope<'_, R> {
    pub async fn exit(mut self) -> Result<(), AcquireError<R::Error>> {
        self.context.state = ContextState::Done;
        match self.conn.take() {
            Some(mut conn) => conn.close().await,
            None => Ok(()),
        }
    }
}

impl<R: Resource + Debug> Debug for Scope<'_, R> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scope").field("conn", &self.conn).finish()
    }
}

impl<R: Resource> Deref for Scope<'_, R> {
    type Target = Connection<R>;
    fn deref(&self) -> &Self::Target {
        // note: the connection is only taken by exit or drop
        self.conn.as_ref().unwrap()
    }
}

impl<R: Resource> DerefMut for Scope<'_, R> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.conn.as_mut().unwrap()
    }
}

impl<R: Resource> Drop for Scope<'_, R> {
    fn drop(&mut self) {
        self.context.state = ContextState::Done;
        self.conn.take();
    }
}
