use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt::Debug;
use std::future::Future;
use std::marker::PhantomData;
use std::rc::Rc;

use futures_lite::future::{BoxedLocal, FutureExt};

mod connection;
pub use connection::Connection;

/// A connection-like resource handed out by the pool. The only capability
/// the pool needs from it is an asynchronous `close`.
pub trait Resource: 'static {
    type Error: Debug + 'static;

    /// Close the underlying resource. Called at most once per instance.
    fn close(self) -> BoxedLocal<Result<(), Self::Error>>;
}

/// A factory for new resource instances, invoked once per admission.
pub trait Connect: 'static {
    type Resource: Resource;

    fn connect(
        &self,
        info: &ConnectInfo,
    ) -> BoxedLocal<Result<Self::Resource, <Self::Resource as Resource>::Error>>;
}

pub(crate) type BoxedConnect<R> = Box<dyn Connect<Resource = R>>;

pub(crate) type SharedResource<R> = Rc<RefCell<Option<R>>>;

/// The parameters forwarded verbatim to the connect callback on every
/// construction.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ConnectInfo {
    locator: String,
    options: BTreeMap<String, String>,
}

impl ConnectInfo {
    pub fn new(locator: impl Into<String>) -> Self {
        Self {
            locator: locator.into(),
            options: BTreeMap::new(),
        }
    }

    /// The opaque resource locator, such as a database path.
    pub fn locator(&self) -> &str {
        &self.locator
    }

    pub fn option(&self, key: &str) -> Option<&str> {
        self.options.get(key).map(String::as_str)
    }

    pub fn options(&self) -> &BTreeMap<String, String> {
        &self.options
    }

    pub(crate) fn set_option(&mut self, key: String, value: String) {
        self.options.insert(key, value);
    }
}

/// A `Connect` implementation backed by a closure.
pub struct ConnectFn<C, R> {
    inner: C,
    _pd: PhantomData<fn() -> R>,
}

impl<C, F, R> Connect for ConnectFn<C, R>
where
    C: Fn(&ConnectInfo) -> F + 'static,
    F: Future<Output = Result<R, R::Error>> + 'static,
    R: Resource,
{
    type Resource = R;

    fn connect(&self, info: &ConnectInfo) -> BoxedLocal<Result<R, R::Error>> {
        (self.inner)(info).boxed_local()
    }
}

pub fn connect_fn<C, F, R>(ctor: C) -> ConnectFn<C, R>
where
    C: Fn(&ConnectInfo) -> F + 'static,
    F: Future<Output = Result<R, R::Error>> + 'static,
    R: Resource,
{
    ConnectFn {
        inner: ctor,
        _pd: PhantomData,
    }
}
