//! Type-erased futures and wait-sets.
//!
//! `settle` and `wait` accept futures of different value types at once. Each
//! one is erased into an [`AnyFuture`]; [`AnyFuture::downcast`] recovers the
//! typed handle.

use crate::error::{FutureError, Result};
use crate::failure::Failure;
use crate::future::{Future, FutureId, Shared};
use crate::registry;
use std::any::{self, Any};
use std::fmt;
use std::sync::Arc;

/// What the orchestrator needs from a future, whatever its value type.
pub(crate) trait Erased: Send + Sync {
    fn id(&self) -> FutureId;
    fn type_name(&self) -> &'static str;
    fn is_resolved(&self) -> bool;
    fn is_unstarted(&self) -> bool;
    fn failure(&self) -> Option<Failure>;
    fn subscribe_settled(&self, callback: Box<dyn FnOnce() + Send + 'static>);
    /// Runs the body on the calling thread if nobody started it yet.
    fn start_inline(&self) -> bool;
    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

impl<T> Erased for Shared<T>
where
    T: Clone + Send + 'static,
{
    fn id(&self) -> FutureId {
        Shared::id(self)
    }

    fn type_name(&self) -> &'static str {
        any::type_name::<T>()
    }

    fn is_resolved(&self) -> bool {
        Shared::is_resolved(self)
    }

    fn is_unstarted(&self) -> bool {
        Shared::is_unstarted(self)
    }

    fn failure(&self) -> Option<Failure> {
        Shared::failure(self)
    }

    fn subscribe_settled(&self, callback: Box<dyn FnOnce() + Send + 'static>) {
        Shared::subscribe_settled(self, Box::new(move |_| callback()));
    }

    fn start_inline(&self) -> bool {
        self.start()
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

/// A future of any value type.
#[derive(Clone)]
pub struct AnyFuture {
    inner: Arc<dyn Erased>,
}

impl AnyFuture {
    pub fn id(&self) -> FutureId {
        self.inner.id()
    }

    pub fn is_resolved(&self) -> bool {
        self.inner.is_resolved()
    }

    /// Name of the value type this future resolves to.
    pub fn type_name(&self) -> &'static str {
        self.inner.type_name()
    }

    /// Recovers the typed future.
    ///
    /// # Errors
    ///
    /// [`FutureError::TypeMismatch`] if the future does not resolve to `T`.
    pub fn downcast<T>(&self) -> Result<Future<T>>
    where
        T: Clone + Send + 'static,
    {
        let id = self.id();
        let actual = self.type_name();
        Arc::clone(&self.inner)
            .into_any()
            .downcast::<Shared<T>>()
            .map(Future::from_shared)
            .map_err(|_| FutureError::TypeMismatch {
                id,
                expected: any::type_name::<T>(),
                actual,
            })
    }

    pub(crate) fn is_unstarted(&self) -> bool {
        self.inner.is_unstarted()
    }

    pub(crate) fn failure(&self) -> Option<Failure> {
        self.inner.failure()
    }

    pub(crate) fn deregister(&self) {
        registry::deregister(self.id());
    }

    pub(crate) fn subscribe_settled(&self, callback: Box<dyn FnOnce() + Send + 'static>) {
        self.inner.subscribe_settled(callback);
    }

    pub(crate) fn start_inline(&self) -> bool {
        self.inner.start_inline()
    }
}

impl fmt::Debug for AnyFuture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnyFuture")
            .field("id", &self.id())
            .field("type", &self.type_name())
            .field("resolved", &self.is_resolved())
            .finish()
    }
}

impl<T> From<Future<T>> for AnyFuture
where
    T: Clone + Send + 'static,
{
    fn from(future: Future<T>) -> Self {
        Self {
            inner: future.shared,
        }
    }
}

impl<T> From<&Future<T>> for AnyFuture
where
    T: Clone + Send + 'static,
{
    fn from(future: &Future<T>) -> Self {
        Self::from(future.clone())
    }
}

/// One entry of a wait-set: a single future or a list of them.
#[derive(Debug, Clone)]
pub enum WaitItem {
    Single(AnyFuture),
    List(Vec<AnyFuture>),
}

impl WaitItem {
    pub(crate) fn into_futures(self) -> Vec<AnyFuture> {
        match self {
            WaitItem::Single(future) => vec![future],
            WaitItem::List(futures) => futures,
        }
    }
}

impl From<AnyFuture> for WaitItem {
    fn from(future: AnyFuture) -> Self {
        WaitItem::Single(future)
    }
}

impl From<&AnyFuture> for WaitItem {
    fn from(future: &AnyFuture) -> Self {
        WaitItem::Single(future.clone())
    }
}

impl From<Vec<AnyFuture>> for WaitItem {
    fn from(futures: Vec<AnyFuture>) -> Self {
        WaitItem::List(futures)
    }
}

impl From<&[AnyFuture]> for WaitItem {
    fn from(futures: &[AnyFuture]) -> Self {
        WaitItem::List(futures.to_vec())
    }
}

impl<T> From<Future<T>> for WaitItem
where
    T: Clone + Send + 'static,
{
    fn from(future: Future<T>) -> Self {
        WaitItem::Single(future.into())
    }
}

impl<T> From<&Future<T>> for WaitItem
where
    T: Clone + Send + 'static,
{
    fn from(future: &Future<T>) -> Self {
        WaitItem::Single(future.into())
    }
}

impl<T> From<&[Future<T>]> for WaitItem
where
    T: Clone + Send + 'static,
{
    fn from(futures: &[Future<T>]) -> Self {
        WaitItem::List(futures.iter().map(AnyFuture::from).collect())
    }
}

impl<T, const N: usize> From<&[Future<T>; N]> for WaitItem
where
    T: Clone + Send + 'static,
{
    fn from(futures: &[Future<T>; N]) -> Self {
        WaitItem::from(&futures[..])
    }
}

impl<T> From<&Vec<Future<T>>> for WaitItem
where
    T: Clone + Send + 'static,
{
    fn from(futures: &Vec<Future<T>>) -> Self {
        WaitItem::from(futures.as_slice())
    }
}

impl<T> From<Vec<Future<T>>> for WaitItem
where
    T: Clone + Send + 'static,
{
    fn from(futures: Vec<Future<T>>) -> Self {
        WaitItem::List(futures.into_iter().map(AnyFuture::from).collect())
    }
}
