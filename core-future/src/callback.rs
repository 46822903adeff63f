//! Bridges for callback-style APIs.
//!
//! A function that reports its result through a trailing callback can be
//! adapted with [`wrap`]: the wrapper creates a future, passes its
//! [`Resolver`] where the callback goes, and returns the future.
//!
//! ```ignore
//! let read = wrap(|args: Vec<String>, done: Resolver<String>| {
//!     legacy_read(&args[0], move |err, text| done.call(err, text).unwrap())
//! }, 1);
//! let text = read.call(vec!["notes.txt".into()])?.wait()?;
//! ```

use crate::error::{FutureError, Result};
use crate::failure::Failure;
use crate::future::{Future, Outcome};
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

/// The resolving end of a future, shaped like a node-style callback.
pub struct Resolver<T> {
    future: Future<T>,
}

impl<T> Resolver<T>
where
    T: Clone + Send + 'static,
{
    pub(crate) fn new(future: Future<T>) -> Self {
        Self { future }
    }

    /// Rejects with `error` when it carries a message, otherwise resolves
    /// with `value`.
    pub fn call(&self, error: Option<Failure>, value: T) -> Result<()> {
        match error {
            Some(failure) if !failure.is_empty() => self.future.resolve_error(failure),
            _ => self.future.resolve_value(value),
        }
    }

    pub fn complete(&self, outcome: Outcome<T>) -> Result<()> {
        self.future.complete(outcome)
    }

    pub fn future(&self) -> &Future<T> {
        &self.future
    }
}

impl<T> Clone for Resolver<T> {
    fn clone(&self) -> Self {
        Self {
            future: self.future.clone(),
        }
    }
}

impl<T> fmt::Debug for Resolver<T>
where
    T: Clone + Send + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resolver")
            .field("future", &self.future)
            .finish()
    }
}

/// A callback-style function adapted to return futures. Built by [`wrap`].
pub struct Wrapped<A, T, F> {
    f: Arc<F>,
    callback_index: usize,
    _marker: PhantomData<fn(Vec<A>) -> T>,
}

impl<A, T, F> Wrapped<A, T, F>
where
    F: Fn(Vec<A>, Resolver<T>),
    T: Clone + Send + 'static,
{
    /// Calls the wrapped function with `args` and a fresh resolver.
    ///
    /// # Errors
    ///
    /// [`FutureError::ArgumentCountExceeded`] if more positional arguments
    /// are passed than fit before the callback position. The function is not
    /// called and no future is created in that case.
    #[track_caller]
    pub fn call(&self, args: Vec<A>) -> Result<Future<T>> {
        if args.len() > self.callback_index {
            return Err(FutureError::ArgumentCountExceeded {
                max: self.callback_index,
                got: args.len(),
            });
        }

        let future = Future::new();
        (self.f)(args, future.as_callback());
        Ok(future)
    }

    pub fn callback_index(&self) -> usize {
        self.callback_index
    }
}

impl<A, T, F> Clone for Wrapped<A, T, F> {
    fn clone(&self) -> Self {
        Self {
            f: Arc::clone(&self.f),
            callback_index: self.callback_index,
            _marker: PhantomData,
        }
    }
}

impl<A, T, F> fmt::Debug for Wrapped<A, T, F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Wrapped")
            .field("callback_index", &self.callback_index)
            .finish()
    }
}

/// Adapts `f`, which takes up to `callback_index` positional arguments plus
/// a trailing [`Resolver`], into a function returning a [`Future`].
pub fn wrap<A, T, F>(f: F, callback_index: usize) -> Wrapped<A, T, F>
where
    F: Fn(Vec<A>, Resolver<T>),
    T: Clone + Send + 'static,
{
    Wrapped {
        f: Arc::new(f),
        callback_index,
        _marker: PhantomData,
    }
}
