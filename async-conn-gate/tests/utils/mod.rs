use std::cell::Cell;
use std::future::Future;
use std::rc::Rc;
use std::time::Duration;

use async_executor::{LocalExecutor, Task};
use async_io::Timer;
use futures_lite::future::{self, BoxedLocal, FutureExt};

use async_conn_gate::{ConnectInfo, Executor, PoolConfig, Resource};

/// A single-threaded executor shared between a test body and its pool.
#[derive(Clone)]
pub struct TestExecutor {
    exec: Rc<LocalExecutor<'static>>,
}

#[allow(unused)]
impl TestExecutor {
    pub fn new() -> Self {
        Self {
            exec: Rc::new(LocalExecutor::new()),
        }
    }

    pub fn spawn<T: 'static>(&self, fut: impl Future<Output = T> + 'static) -> Task<T> {
        self.exec.spawn(fut)
    }

    pub fn run<T>(&self, fut: impl Future<Output = T>) -> T {
        future::block_on(self.exec.run(fut))
    }
}

impl Executor for TestExecutor {
    fn spawn_local(&self, task: BoxedLocal<()>) {
        self.exec.spawn(task).detach()
    }

    fn sleep(&self, duration: Duration) -> BoxedLocal<()> {
        async move {
            Timer::after(duration).await;
        }
        .boxed_local()
    }
}

#[derive(Debug, Default)]
pub struct Tally {
    created: Cell<usize>,
    closed: Cell<usize>,
    fail_next: Cell<bool>,
    connect_delay: Cell<Option<Duration>>,
}

#[allow(unused)]
impl Tally {
    pub fn created(&self) -> usize {
        self.created.get()
    }

    pub fn closed(&self) -> usize {
        self.closed.get()
    }

    pub fn fail_next(&self) {
        self.fail_next.set(true);
    }

    /// Make every later connect take at least `delay`.
    pub fn delay_connect(&self, delay: Duration) {
        self.connect_delay.set(Some(delay));
    }
}

#[derive(Debug, PartialEq, Eq)]
pub struct MockError(pub &'static str);

#[derive(Debug)]
pub struct MockConn {
    pub serial: usize,
    pub locator: String,
    pub mode: Option<String>,
    tally: Rc<Tally>,
}

impl Resource for MockConn {
    type Error = MockError;

    fn close(self) -> BoxedLocal<Result<(), MockError>> {
        let tally = self.tally;
        async move {
            tally.closed.set(tally.closed.get() + 1);
            Ok(())
        }
        .boxed_local()
    }
}

pub fn mock_pool_config(exec: &TestExecutor, tally: &Rc<Tally>) -> PoolConfig<MockConn> {
    let source = tally.clone();
    PoolConfig::new("file::memory:", move |info: &ConnectInfo| {
        let tally = source.clone();
        let locator = info.locator().to_owned();
        let mode = info.option("mode").map(str::to_owned);
        async move {
            if let Some(delay) = tally.connect_delay.get() {
                Timer::after(delay).await;
            }
            if tally.fail_next.replace(false) {
                return Err(MockError("connect refused"));
            }
            let serial = tally.created.get() + 1;
            tally.created.set(serial);
            Ok(MockConn {
                serial,
                locator,
                mode,
                tally,
            })
        }
    })
    .executor(exec.clone())
}

/// Yield to other tasks until `cond` holds.
#[allow(unused)]
pub async fn wait_until(cond: impl Fn() -> bool) {
    while !cond() {
        future::yield_now().await;
    }
}

/// Give other tasks a chance to run.
#[allow(unused)]
pub async fn settle() {
    for _ in 0..16 {
        future::yield_now().await;
    }
}
