use std::fmt::{self, Debug, Formatter};
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures_channel::oneshot;

pub use self::oneshot::Canceled;

/// Create the two halves of a waiter token. The pool keeps the responder in
/// its queue, the requester suspends on the waiter.
pub fn waiter_pair(id: u64) -> (WaitResponder, Waiter) {
    let (sender, receiver) = oneshot::channel();
    (WaitResponder { id, sender }, Waiter { id, receiver })
}

pub struct WaitResponder {
    id: u64,
    sender: oneshot::Sender<()>,
}

impl WaitResponder {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Settle the token as cancelled. The waiter observes `Canceled`.
    pub fn cancel(self) {
        drop(self.sender);
    }

    /// Returns `true` if the waiting side has gone away.
    pub fn is_canceled(&self) -> bool {
        self.sender.is_canceled()
    }

    /// Settle the token as "proceed". Fails if the waiter was dropped.
    pub fn send(self) -> Result<(), ()> {
        self.sender.send(())
    }
}

impl Debug for WaitResponder {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("WaitResponder")
            .field("id", &self.id)
            .field("is_canceled", &self.is_canceled())
            .finish()
    }
}

pub struct Waiter {
    id: u64,
    receiver: oneshot::Receiver<()>,
}

impl Waiter {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Check whether the token has been settled without suspending.
    /// `Ok(None)` means it is still pending.
    pub fn try_settled(&mut self) -> Result<Option<()>, Canceled> {
        self.receiver.try_recv()
    }
}

impl Debug for Waiter {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Waiter").field("id", &self.id).finish()
    }
}

impl Future for Waiter {
    type Output = Result<(), Canceled>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.receiver).poll(cx)
    }
}
