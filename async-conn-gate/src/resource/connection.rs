use std::cell::{Ref, RefMut};
use std::fmt::{self, Debug, Formatter};

use super::{Resource, SharedResource};
use crate::pool::{AcquireError, Pool, PoolError};

/// A connection admitted by a [`Pool`].
///
/// Closing the connection returns its slot to the pool before the
/// underlying resource is closed. Dropping it without closing does the same,
/// with the resource closed in the background on the pool's executor.
pub struct Connection<R: Resource> {
    id: u64,
    pool: Pool<R>,
    resource: SharedResource<R>,
}

impl<R: Resource> Connection<R> {
    pub(crate) fn new(id: u64, pool: Pool<R>, resource: SharedResource<R>) -> Self {
        Self { id, pool, resource }
    }

    /// The admission identifier, unique within the owning pool.
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn pool(&self) -> &Pool<R> {
        &self.pool
    }

    /// Returns `true` while this connection still occupies a pool slot.
    pub fn is_active(&self) -> bool {
        self.pool.inner.is_active(self.id)
    }

    /// Borrow the underlying resource. Fails once the connection has been
    /// closed, or forcibly closed by [`Pool::terminate`], and while the
    /// resource is mutably borrowed elsewhere.
    pub fn borrow(&self) -> Result<Ref<'_, R>, PoolError> {
        let guard = self
            .resource
            .try_borrow()
            .map_err(|_| PoolError::ResourceBusy)?;
        Ref::filter_map(guard, Option::as_ref).map_err(|_| PoolError::InvalidConnection)
    }

    pub fn borrow_mut(&self) -> Result<RefMut<'_, R>, PoolError> {
        let guard = self
            .resource
            .try_borrow_mut()
            .map_err(|_| PoolError::ResourceBusy)?;
        RefMut::filter_map(guard, Option::as_mut).map_err(|_| PoolError::InvalidConnection)
    }

    /// Release the connection to the pool and close the underlying resource.
    ///
    /// A second call fails with the pool's error for an inactive connection
    /// and never closes the resource twice.
    pub async fn close(&mut self) -> Result<(), AcquireError<R::Error>> {
        self.pool.release(self)?;
        let resource = self.resource.borrow_mut().take();
        if let Some(resource) = resource {
            resource.close().await.map_err(AcquireError::Resource)?;
        }
        Ok(())
    }

    /// An alias for [`close`](Self::close).
    pub async fn release(&mut self) -> Result<(), AcquireError<R::Error>> {
        self.close().await
    }
}

impl<R: Resource + Debug> Debug for Connection<R> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let mut dbg = f.debug_struct("Connection");
        dbg.field("id", &self.id);
        match self.resource.try_borrow() {
            Ok(res) => dbg.field("resource", &*res),
            Err(_) => dbg.field("resource", &"<borrowed>"),
        };
        dbg.finish()
    }
}

impl<R: Resource> Drop for Connection<R> {
    fn drop(&mut self) {
        // Fails when already released or the pool is shut down, which is fine
        self.pool.inner.release(self.id).unwrap_or(());
        let resource = self
            .resource
            .try_borrow_mut()
            .ok()
            .and_then(|mut res| res.take());
        if let Some(resource) = resource {
            self.pool.inner.spawn_close(self.id, resource);
        }
    }
}
