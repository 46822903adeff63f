//! Futures backed by a fiber.
//!
//! [`spawn`] runs a body in a fresh fiber on a later turn of the event loop
//! and resolves the returned future with the body's outcome. A waiter that
//! reaches the future before that turn may run the body itself instead (see
//! [`settle`](crate::settle)); whoever takes the body first runs it, the
//! other path finds the slot empty.

use crate::error::{FutureError, Result};
use crate::failure::Failure;
use crate::future::{Body, Future, Outcome, Shared};
use crate::registry;
use core_fiber::sync::lock;
use core_fiber::{unhandled, Fiber};
use std::any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{trace, warn};

impl<T> Shared<T>
where
    T: Clone + Send + 'static,
{
    /// Takes the body out of its slot and runs it on the calling thread.
    ///
    /// Returns `false` if the body was already taken (or there never was one).
    pub(crate) fn start(&self) -> bool {
        let body = lock(&self.body).take();
        let Some(body) = body else {
            return false;
        };

        trace!(future = %self.id(), "fiber future started");
        let outcome = match panic::catch_unwind(AssertUnwindSafe(body)) {
            Ok(Err(failure)) if failure.is_empty() => Err(Failure::new(FutureError::EmptyFailure)),
            Ok(outcome) => outcome,
            Err(payload) => Err(Failure::from_panic(payload.as_ref())),
        };

        if let Err(e) = self.resolve(outcome) {
            warn!(future = %self.id(), error = %e, "fiber future resolved twice");
            unhandled::report(Arc::new(e));
        }
        true
    }
}

/// Runs `body` in a new fiber and returns a future for its outcome.
///
/// The fiber is started on a later turn of the event loop, never before
/// `spawn` returns. A panic in `body` resolves the future with a failure.
///
/// # Errors
///
/// `FutureError::Fiber` if no event loop is running (or it has shut down);
/// nothing is registered in that case.
#[track_caller]
pub fn spawn<T, F>(body: F) -> Result<Future<T>>
where
    T: Clone + Send + 'static,
    F: FnOnce() -> Outcome<T> + Send + 'static,
{
    let body: Body<T> = Box::new(body);
    let future = Future::with_body(Some(body));

    let shared = Arc::clone(&future.shared);
    let scheduled = core_fiber::run_later(move || start_in_new_fiber(shared));
    if let Err(e) = scheduled {
        registry::deregister(future.id());
        return Err(e.into());
    }
    Ok(future)
}

fn start_in_new_fiber<T>(shared: Arc<Shared<T>>)
where
    T: Clone + Send + 'static,
{
    if !shared.is_unstarted() {
        // Already run in place by a waiter.
        return;
    }

    let id = shared.id();
    let runner = Arc::clone(&shared);
    let fiber = match Fiber::new(move || {
        runner.start();
    }) {
        Ok(fiber) => fiber,
        Err(e) => {
            // No fiber to run the body in: the future fails instead.
            warn!(future = %id, error = %e, "failed to start fiber future");
            if lock(&shared.body).take().is_some() {
                let failure = Failure::new(FutureError::from(e));
                if let Err(e) = shared.resolve(Err(failure)) {
                    unhandled::report(Arc::new(e));
                }
            }
            return;
        }
    };

    if let Err(e) = fiber.run() {
        warn!(future = %id, error = %e, "fiber future did not run cleanly");
        unhandled::report(Arc::new(FutureError::from(e)));
    }
}

/// A function whose calls return fiber-backed futures.
///
/// Built by [`future_fn`].
pub struct FutureFn<F> {
    f: Arc<F>,
}

impl<F> FutureFn<F> {
    /// Runs the wrapped function with `args` in a new fiber.
    ///
    /// See [`spawn`].
    #[track_caller]
    pub fn call<A, T>(&self, args: A) -> Result<Future<T>>
    where
        F: Fn(A) -> Outcome<T> + Send + Sync + 'static,
        A: Send + 'static,
        T: Clone + Send + 'static,
    {
        let f = Arc::clone(&self.f);
        spawn(move || f(args))
    }
}

impl<F> Clone for FutureFn<F> {
    fn clone(&self) -> Self {
        Self {
            f: Arc::clone(&self.f),
        }
    }
}

impl<F> fmt::Debug for FutureFn<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<<Future {}.future()>>", any::type_name::<F>())
    }
}

/// Wraps `f` so that every call runs it in a new fiber and returns a future.
///
/// ```ignore
/// let fetch = future_fn(|url: String| download(&url));
/// let page = fetch.call("https://example.com".to_string())?;
/// let body = page.wait()?;
/// ```
pub fn future_fn<A, T, F>(f: F) -> FutureFn<F>
where
    F: Fn(A) -> Outcome<T> + Send + Sync + 'static,
    A: Send + 'static,
    T: Clone + Send + 'static,
{
    FutureFn { f: Arc::new(f) }
}
