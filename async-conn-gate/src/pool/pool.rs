use std::cell::RefCell;
use std::collections::{BTreeMap, VecDeque};
use std::fmt::{self, Debug, Formatter};
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll};
use std::time::Duration;

use event_listener::Event;
use futures_lite::future::{self, FutureExt};
use tracing::{debug, trace, warn};

use super::acquire::Acquire;
use super::error::{AcquireError, PoolError};
use super::wait::{waiter_pair, Canceled, WaitResponder, Waiter};
use crate::executor::Executor;
use crate::resource::{BoxedConnect, ConnectInfo, Connection, Resource, SharedResource};

/// The lifecycle state of a [`Pool`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PoolState {
    Open,
    Closing,
    Closed,
}

struct AdmissionRecord<R> {
    resource: SharedResource<R>,
    released: Event,
}

impl<R> AdmissionRecord<R> {
    fn new() -> Self {
        Self {
            resource: Rc::new(RefCell::new(None)),
            released: Event::new(),
        }
    }

    fn complete(&self) {
        self.released.notify(usize::MAX);
    }
}

struct PoolShared<R> {
    state: PoolState,
    records: BTreeMap<u64, AdmissionRecord<R>>,
    waiters: VecDeque<WaitResponder>,
    // slots granted to a requester which has not registered its record yet
    reserved: usize,
    last_id: u64,
}

impl<R> PoolShared<R> {
    fn new() -> Self {
        Self {
            state: PoolState::Open,
            records: BTreeMap::new(),
            waiters: VecDeque::new(),
            reserved: 0,
            last_id: 0,
        }
    }

    fn next_id(&mut self) -> u64 {
        self.last_id += 1;
        self.last_id
    }

    fn occupied(&self) -> usize {
        self.records.len() + self.reserved
    }

    fn check_open(&self) -> Result<(), PoolError> {
        match self.state {
            PoolState::Open => Ok(()),
            PoolState::Closing => Err(PoolError::PoolClosing),
            PoolState::Closed => Err(PoolError::PoolClosed),
        }
    }

    /// The error reported to a waiter whose token was cancelled.
    fn cancel_error(&self) -> PoolError {
        match self.state {
            PoolState::Closed => PoolError::PoolClosed,
            _ => PoolError::PoolClosing,
        }
    }

    /// Pass a freed slot to the earliest live waiter. Returns `false` if
    /// nobody was waiting and the slot is simply free.
    fn hand_off(&mut self) -> bool {
        while let Some(waiter) = self.waiters.pop_front() {
            let id = waiter.id();
            if waiter.send().is_ok() {
                self.reserved += 1;
                trace!(waiter = id, "woke queued request");
                return true;
            }
        }
        false
    }

    fn cancel_waiters(&mut self) -> usize {
        let count = self.waiters.len();
        for waiter in self.waiters.drain(..) {
            waiter.cancel();
        }
        count
    }

    fn shutdown(&mut self) -> bool {
        if self.state == PoolState::Closed {
            return false;
        }
        self.state = PoolState::Closing;
        let cancelled = self.cancel_waiters();
        debug!(
            active = self.records.len(),
            cancelled, "pool shutting down"
        );
        true
    }
}

pub(crate) struct PoolInternal<R: Resource> {
    acquire_timeout: Option<Duration>,
    connect: BoxedConnect<R>,
    executor: Box<dyn Executor>,
    info: ConnectInfo,
    max_concurrent: usize,
    shared: RefCell<PoolShared<R>>,
}

impl<R: Resource> PoolInternal<R> {
    pub fn new(
        acquire_timeout: Option<Duration>,
        connect: BoxedConnect<R>,
        executor: Box<dyn Executor>,
        info: ConnectInfo,
        max_concurrent: usize,
    ) -> Self {
        Self {
            acquire_timeout,
            connect,
            executor,
            info,
            max_concurrent,
            shared: RefCell::new(PoolShared::new()),
        }
    }

    fn try_admit(&self) -> Result<Admit<'_, R>, PoolError> {
        let mut shared = self.shared.borrow_mut();
        shared.check_open()?;
        // Newcomers queue behind existing waiters even if a slot looks free
        if shared.occupied() < self.max_concurrent && shared.waiters.is_empty() {
            shared.reserved += 1;
            Ok(Admit::Ready(Slot::new(self)))
        } else {
            let id = shared.next_id();
            let (responder, waiter) = waiter_pair(id);
            shared.waiters.push_back(responder);
            debug!(
                waiter = id,
                queued = shared.waiters.len(),
                "pool at capacity, queueing request"
            );
            Ok(Admit::Queued(Queued::new(self, waiter)))
        }
    }

    async fn wait_turn<'p>(
        &'p self,
        mut queued: Queued<'p, R>,
        timeout: Option<Duration>,
    ) -> Result<Slot<'p, R>, AcquireError<R::Error>> {
        let woken = match timeout {
            Some(duration) => {
                let expire = self.executor.sleep(duration);
                let wake = async { Some((&mut queued).await) };
                let expire = async {
                    expire.await;
                    None
                };
                match future::or(wake, expire).await {
                    Some(woken) => woken,
                    None => {
                        debug!(waiter = queued.id(), ?duration, "acquire timed out");
                        return Err(AcquireError::Timeout);
                    }
                }
            }
            None => (&mut queued).await,
        };
        match woken {
            Ok(()) => Ok(queued.into_slot()),
            Err(Canceled) => {
                // The pool only cancels tokens while shutting down
                let err = self.shared.borrow().cancel_error();
                trace!(waiter = queued.id(), %err, "queued request cancelled");
                Err(err.into())
            }
        }
    }

    /// Return an unregistered slot, passing it on to the next waiter.
    fn reclaim_slot(&self) {
        let mut shared = self.shared.borrow_mut();
        shared.reserved -= 1;
        shared.hand_off();
    }

    fn remove_waiter(&self, id: u64) {
        let mut shared = self.shared.borrow_mut();
        shared.waiters.retain(|waiter| waiter.id() != id);
        trace!(waiter = id, "queued request abandoned");
    }

    /// Drop the admission record for a connection which was never handed out.
    fn abort_admission(&self, id: u64) {
        let record = {
            let mut shared = self.shared.borrow_mut();
            let record = shared.records.remove(&id);
            if record.is_some() {
                shared.hand_off();
            }
            record
        };
        if let Some(record) = record {
            record.complete();
        }
    }

    pub fn release(&self, id: u64) -> Result<(), PoolError> {
        let record = {
            let mut shared = self.shared.borrow_mut();
            if shared.state == PoolState::Closed {
                return Err(PoolError::PoolClosed);
            }
            let record = shared
                .records
                .remove(&id)
                .ok_or(PoolError::InvalidConnection)?;
            shared.hand_off();
            record
        };
        record.complete();
        debug!(connection = id, "released connection");
        Ok(())
    }

    pub fn is_active(&self, id: u64) -> bool {
        self.shared.borrow().records.contains_key(&id)
    }

    pub fn spawn_close(&self, id: u64, resource: R) {
        trace!(connection = id, "closing connection in the background");
        self.executor.spawn_local(
            async move {
                if let Err(err) = resource.close().await {
                    warn!(connection = id, error = ?err, "error closing connection");
                }
            }
            .boxed_local(),
        );
    }
}

enum Admit<'p, R: Resource> {
    Ready(Slot<'p, R>),
    Queued(Queued<'p, R>),
}

/// A counted slot which is not yet backed by an admission record.
struct Slot<'p, R: Resource> {
    pool: &'p PoolInternal<R>,
    armed: bool,
}

impl<'p, R: Resource> Slot<'p, R> {
    fn new(pool: &'p PoolInternal<R>) -> Self {
        Self { pool, armed: true }
    }

    /// Convert the slot into an admission record. The pool state is checked
    /// again, as a woken waiter may resume after shutdown has begun.
    fn register(mut self) -> Result<Pending<'p, R>, PoolError> {
        let mut shared = self.pool.shared.borrow_mut();
        shared.check_open()?;
        let id = shared.next_id();
        let record = AdmissionRecord::new();
        let resource = record.resource.clone();
        shared.records.insert(id, record);
        shared.reserved -= 1;
        drop(shared);
        self.armed = false;
        Ok(Pending {
            pool: self.pool,
            id,
            resource,
            armed: true,
        })
    }
}

impl<R: Resource> Drop for Slot<'_, R> {
    fn drop(&mut self) {
        if self.armed {
            self.pool.reclaim_slot();
        }
    }
}

/// An admission whose resource is still being constructed.
struct Pending<'p, R: Resource> {
    pool: &'p PoolInternal<R>,
    id: u64,
    resource: SharedResource<R>,
    armed: bool,
}

impl<R: Resource> Pending<'_, R> {
    fn complete(mut self, pool: &Pool<R>, resource: R) -> Result<Connection<R>, PoolError> {
        self.armed = false;
        if !self.pool.is_active(self.id) {
            // The pool was terminated while the resource was being created
            self.pool.spawn_close(self.id, resource);
            return Err(self.pool.shared.borrow().cancel_error());
        }
        self.resource.borrow_mut().replace(resource);
        debug!(connection = self.id, "admitted connection");
        Ok(Connection::new(self.id, pool.clone(), self.resource.clone()))
    }
}

impl<R: Resource> Drop for Pending<'_, R> {
    fn drop(&mut self) {
        if self.armed {
            self.pool.abort_admission(self.id);
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum QueuedState {
    Waiting,
    Woken,
    Finished,
}

/// A requester's place in the wait queue. Dropping it gives up the place,
/// or passes the slot on if the token was already settled.
struct Queued<'p, R: Resource> {
    pool: &'p PoolInternal<R>,
    state: QueuedState,
    waiter: Waiter,
}

impl<'p, R: Resource> Queued<'p, R> {
    fn new(pool: &'p PoolInternal<R>, waiter: Waiter) -> Self {
        Self {
            pool,
            state: QueuedState::Waiting,
            waiter,
        }
    }

    fn id(&self) -> u64 {
        self.waiter.id()
    }

    fn into_slot(mut self) -> Slot<'p, R> {
        self.state = QueuedState::Finished;
        Slot::new(self.pool)
    }
}

impl<R: Resource> Future for Queued<'_, R> {
    type Output = Result<(), Canceled>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.waiter).poll(cx) {
            Poll::Pending => Poll::Pending,
            Poll::Ready(Ok(())) => {
                self.state = QueuedState::Woken;
                Poll::Ready(Ok(()))
            }
            Poll::Ready(Err(err)) => {
                self.state = QueuedState::Finished;
                Poll::Ready(Err(err))
            }
        }
    }
}

impl<R: Resource> Drop for Queued<'_, R> {
    fn drop(&mut self) {
        match self.state {
            QueuedState::Waiting => match self.waiter.try_settled() {
                Ok(None) => self.pool.remove_waiter(self.waiter.id()),
                Ok(Some(())) => self.pool.reclaim_slot(),
                Err(Canceled) => (),
            },
            QueuedState::Woken => self.pool.reclaim_slot(),
            QueuedState::Finished => (),
        }
    }
}

/// A concurrency-limiting admission gate for connections of type `R`.
///
/// The pool caps how many connections are open at once and queues excess
/// requesters in arrival order. It does not recycle connections: every
/// admission constructs a fresh resource through the connect callback, and
/// closing a connection really closes it.
///
/// A pool is bound to a single-threaded executor and is not `Send`.
pub struct Pool<R: Resource> {
    pub(crate) inner: Rc<PoolInternal<R>>,
}

impl<R: Resource> Pool<R> {
    pub(crate) fn new(inner: PoolInternal<R>) -> Self {
        Self {
            inner: Rc::new(inner),
        }
    }

    /// Returns an [`Acquire`] context using the pool's default timeout. The
    /// context may be awaited directly for a [`Connection`], or entered as
    /// a scope which closes the connection on exit.
    pub fn acquire(&self) -> Acquire<R> {
        Acquire::new(self.clone(), self.inner.acquire_timeout)
    }

    /// Admit a new connection, waiting in the queue while the pool is at
    /// capacity. `timeout` only bounds the time spent queued.
    pub async fn acquire_now(
        &self,
        timeout: Option<Duration>,
    ) -> Result<Connection<R>, AcquireError<R::Error>> {
        let inner = &*self.inner;
        let slot = match inner.try_admit()? {
            Admit::Ready(slot) => slot,
            Admit::Queued(queued) => inner.wait_turn(queued, timeout).await?,
        };
        let pending = slot.register()?;
        match inner.connect.connect(&inner.info).await {
            Ok(resource) => Ok(pending.complete(self, resource)?),
            Err(err) => {
                debug!(connection = pending.id, "connect failed");
                Err(AcquireError::Resource(err))
            }
        }
    }

    /// Return a connection's slot to the pool, waking the earliest queued
    /// requester. The underlying resource is left open.
    pub fn release(&self, conn: &Connection<R>) -> Result<(), PoolError> {
        if self.closed() {
            return Err(PoolError::PoolClosed);
        }
        if !Rc::ptr_eq(&self.inner, &conn.pool().inner) {
            return Err(PoolError::InvalidConnection);
        }
        self.inner.release(conn.id())
    }

    /// Gracefully shut down the pool. Queued requesters are cancelled, then
    /// this waits for every connection already handed out to be released by
    /// its owner. Does nothing if the pool is already closed.
    pub async fn close(&self) {
        let listeners = {
            let mut shared = self.inner.shared.borrow_mut();
            if !shared.shutdown() {
                return;
            }
            shared
                .records
                .values()
                .map(|record| record.released.listen())
                .collect::<Vec<_>>()
        };
        for listener in listeners {
            listener.await;
        }
        self.inner.shared.borrow_mut().state = PoolState::Closed;
        debug!("pool closed");
    }

    /// Forcibly shut down the pool. Queued requesters are cancelled and
    /// every connection still handed out is released and closed without
    /// waiting for its owner. Does nothing if the pool is already closed.
    pub async fn terminate(&self) {
        let records = {
            let mut shared = self.inner.shared.borrow_mut();
            if !shared.shutdown() {
                return;
            }
            std::mem::take(&mut shared.records)
        };
        for (id, record) in records {
            let resource = match record.resource.try_borrow_mut() {
                Ok(mut res) => res.take(),
                Err(_) => {
                    warn!(connection = id, "connection is in use, leaving close to its owner");
                    None
                }
            };
            record.complete();
            if let Some(resource) = resource {
                if let Err(err) = resource.close().await {
                    warn!(connection = id, error = ?err, "error closing connection");
                }
            }
        }
        self.inner.shared.borrow_mut().state = PoolState::Closed;
        debug!("pool terminated");
    }

    pub fn closed(&self) -> bool {
        self.state() == PoolState::Closed
    }

    pub fn is_closing(&self) -> bool {
        self.state() == PoolState::Closing
    }

    pub fn state(&self) -> PoolState {
        self.inner.shared.borrow().state
    }

    pub fn max_concurrent(&self) -> usize {
        self.inner.max_concurrent
    }

    /// Fetch the current number of admitted connections.
    pub fn active_count(&self) -> usize {
        self.inner.shared.borrow().records.len()
    }

    /// Fetch the current number of queued requesters.
    pub fn waiter_count(&self) -> usize {
        self.inner.shared.borrow().waiters.len()
    }

    pub fn connect_info(&self) -> &ConnectInfo {
        &self.inner.info
    }
}

impl<R: Resource> Clone for Pool<R> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<R: Resource> Debug for Pool<R> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let shared = self.inner.shared.borrow();
        f.debug_struct("Pool")
            .field("state", &shared.state)
            .field("max_concurrent", &self.inner.max_concurrent)
            .field("active", &shared.records.len())
            .field("waiters", &shared.waiters.len())
            .finish()
    }
}
