use std::time::Duration;

use async_io::Timer;
use futures_lite::future::{BoxedLocal, FutureExt};

use super::Executor;

/// Runs background work on the thread-local executor of
/// `async-global-executor`, with timers driven by `async-io`.
///
/// Spawned tasks only make progress while the current thread is inside
/// `async_global_executor::block_on`.
#[derive(Clone, Copy, Debug, Default)]
pub struct GlobalExecutor;

impl Executor for GlobalExecutor {
    fn spawn_local(&self, task: BoxedLocal<()>) {
        async_global_executor::spawn_local(task).detach()
    }

    fn sleep(&self, duration: Duration) -> BoxedLocal<()> {
        async move {
            Timer::after(duration).await;
        }
        .boxed_local()
    }
}
