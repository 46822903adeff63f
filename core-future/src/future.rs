//! The future resolution state machine.
//!
//! A [`Future`] starts pending, is resolved exactly once with a value or a
//! [`Failure`], and never changes again. Continuations queued while it is
//! pending run synchronously, in subscription order, on whichever thread
//! resolves it.
//!
//! ```ignore
//! let future = Future::new();
//! future.subscribe(|outcome| println!("got {:?}", outcome));
//! future.resolve_value(42)?; // prints "got Ok(42)" before returning
//! assert_eq!(future.get()?, 42);
//! ```

use crate::callback::Resolver;
use crate::error::{FutureError, Result};
use crate::failure::{Failure, LinkedFailure};
use crate::orchestrator;
use crate::registry;
use crate::trace::Trace;
use core_fiber::sync::lock;
use core_fiber::unhandled;
use std::fmt;
use std::mem;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{debug, trace, warn};

static NEXT_FUTURE_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique, monotonically increasing future identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FutureId(u64);

impl FutureId {
    pub(crate) fn next() -> Self {
        Self(NEXT_FUTURE_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for FutureId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// What a future resolves with.
pub type Outcome<T> = std::result::Result<T, Failure>;

type Continuation<T> = Box<dyn FnOnce(Outcome<T>) + Send + 'static>;

pub(crate) type Body<T> = Box<dyn FnOnce() -> Outcome<T> + Send + 'static>;

enum State<T> {
    Pending(Vec<Continuation<T>>),
    Value(T),
    Error(Failure),
}

pub(crate) struct Shared<T> {
    id: FutureId,
    state: Mutex<State<T>>,
    /// Body of a fiber-backed future; taken exactly once when it starts.
    pub(crate) body: Mutex<Option<Body<T>>>,
}

impl<T> Shared<T>
where
    T: Clone + Send + 'static,
{
    pub(crate) fn id(&self) -> FutureId {
        self.id
    }

    pub(crate) fn is_resolved(&self) -> bool {
        !matches!(*lock(&self.state), State::Pending(_))
    }

    pub(crate) fn is_unstarted(&self) -> bool {
        lock(&self.body).is_some()
    }

    pub(crate) fn outcome(&self) -> Option<Outcome<T>> {
        match &*lock(&self.state) {
            State::Pending(_) => None,
            State::Value(value) => Some(Ok(value.clone())),
            State::Error(failure) => Some(Err(failure.clone())),
        }
    }

    pub(crate) fn failure(&self) -> Option<Failure> {
        match &*lock(&self.state) {
            State::Error(failure) => Some(failure.clone()),
            _ => None,
        }
    }

    /// Moves to the resolved state and drains the continuation queue.
    pub(crate) fn resolve(&self, outcome: Outcome<T>) -> Result<()> {
        let continuations = {
            let mut state = lock(&self.state);
            if !matches!(*state, State::Pending(_)) {
                return Err(FutureError::ConcurrentResolution(self.id));
            }
            if matches!(&outcome, Err(failure) if failure.is_empty()) {
                return Err(FutureError::EmptyFailure);
            }
            let resolved = match &outcome {
                Ok(value) => State::Value(value.clone()),
                Err(failure) => State::Error(failure.clone()),
            };
            match mem::replace(&mut *state, resolved) {
                State::Pending(continuations) => continuations,
                _ => Vec::new(),
            }
        };

        trace!(
            future = %self.id,
            ok = outcome.is_ok(),
            continuations = continuations.len(),
            "future resolved"
        );
        for continuation in continuations {
            invoke(continuation, outcome.clone());
        }
        Ok(())
    }

    /// Runs `continuation` now if resolved, otherwise queues it.
    pub(crate) fn subscribe_settled(&self, continuation: Continuation<T>) {
        let outcome = {
            let mut state = lock(&self.state);
            match &mut *state {
                State::Pending(queue) => {
                    queue.push(continuation);
                    return;
                }
                State::Value(value) => Ok(value.clone()),
                State::Error(failure) => Err(failure.clone()),
            }
        };
        invoke(continuation, outcome);
    }

    fn describe(&self) -> &'static str {
        match *lock(&self.state) {
            State::Pending(_) => "pending",
            State::Value(_) => "resolved",
            State::Error(_) => "failed",
        }
    }
}

/// A panicking continuation must not starve the ones queued after it.
fn invoke<T>(continuation: Continuation<T>, outcome: Outcome<T>) {
    if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(move || continuation(outcome))) {
        let failure = Failure::from_panic(payload.as_ref());
        warn!(error = %failure, "future continuation panicked");
        unhandled::report(failure.shared());
    }
}

/// Handle to a value or failure that may not be available yet.
///
/// Clones share one resolution cell.
pub struct Future<T> {
    pub(crate) shared: Arc<Shared<T>>,
}

impl<T> Clone for Future<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T> Future<T>
where
    T: Clone + Send + 'static,
{
    /// Creates a pending future and registers it for leak detection.
    #[track_caller]
    pub fn new() -> Self {
        Self::with_body(None)
    }

    /// Creates a future already resolved with `value`.
    #[track_caller]
    pub fn resolved(value: T) -> Self {
        let future = Self::new();
        // A fresh future is pending, so this cannot fail.
        let _ = future.shared.resolve(Ok(value));
        future
    }

    #[track_caller]
    pub(crate) fn with_body(body: Option<Body<T>>) -> Self {
        let id = FutureId::next();
        registry::register(id, Trace::capture());
        trace!(future = %id, fiber_backed = body.is_some(), "future created");
        Self {
            shared: Arc::new(Shared {
                id,
                state: Mutex::new(State::Pending(Vec::new())),
                body: Mutex::new(body),
            }),
        }
    }

    pub(crate) fn from_shared(shared: Arc<Shared<T>>) -> Self {
        Self { shared }
    }

    pub fn id(&self) -> FutureId {
        self.shared.id()
    }

    pub fn is_resolved(&self) -> bool {
        self.shared.is_resolved()
    }

    /// Resolves with `value`.
    ///
    /// # Errors
    ///
    /// [`FutureError::ConcurrentResolution`] if already resolved.
    pub fn resolve_value(&self, value: T) -> Result<()> {
        self.shared.resolve(Ok(value))
    }

    /// Resolves with `failure`.
    ///
    /// # Errors
    ///
    /// - [`FutureError::ConcurrentResolution`] if already resolved
    /// - [`FutureError::EmptyFailure`] if the failure's message is empty
    #[track_caller]
    pub fn resolve_error(&self, failure: impl Into<Failure>) -> Result<()> {
        self.shared.resolve(Err(failure.into()))
    }

    /// Resolves with either side of `outcome`.
    pub fn complete(&self, outcome: Outcome<T>) -> Result<()> {
        self.shared.resolve(outcome)
    }

    /// Reads the resolved value. Counts as consumption.
    ///
    /// # Errors
    ///
    /// - [`FutureError::NotResolved`] while pending
    /// - [`FutureError::Failed`] if resolved with a failure; the returned
    ///   [`LinkedFailure`] links this call site to the failure's origin
    #[track_caller]
    pub fn get(&self) -> Result<T> {
        registry::deregister(self.id());
        match self.shared.outcome() {
            None => Err(FutureError::NotResolved(self.id())),
            Some(Ok(value)) => Ok(value),
            Some(Err(failure)) => Err(FutureError::Failed(LinkedFailure::new(
                failure,
                Trace::capture(),
            ))),
        }
    }

    /// Blocks the current fiber until resolved, then behaves like [`get`].
    ///
    /// [`get`]: Future::get
    #[track_caller]
    pub fn wait(&self) -> Result<T> {
        if !self.is_resolved() {
            orchestrator::settle([self])?;
        }
        self.get()
    }

    /// Calls `callback` with the outcome: immediately if resolved, otherwise
    /// at resolution after every earlier subscriber. Counts as consumption.
    pub fn subscribe<F>(&self, callback: F)
    where
        F: FnOnce(Outcome<T>) + Send + 'static,
    {
        registry::deregister(self.id());
        self.shared.subscribe_settled(Box::new(callback));
    }

    /// Like [`subscribe`](Future::subscribe) without counting as consumption.
    pub(crate) fn subscribe_settled<F>(&self, callback: F)
    where
        F: FnOnce(Outcome<T>) + Send + 'static,
    {
        self.shared.subscribe_settled(Box::new(callback));
    }

    /// Calls `callback` with the value; failures are ignored.
    pub fn resolve_success<F>(&self, callback: F)
    where
        F: FnOnce(T) + Send + 'static,
    {
        self.subscribe(move |outcome| {
            if let Ok(value) = outcome {
                callback(value);
            }
        });
    }

    /// Gives up on the result; a failure goes to the unhandled channel.
    pub fn detach(&self) {
        let id = self.id();
        self.subscribe(move |outcome| {
            if let Err(failure) = outcome {
                debug!(future = %id, origin = %failure.origin(), "detached future failed");
                unhandled::report(failure.shared());
            }
        });
    }

    /// Resolves `other` with this future's outcome once it is known.
    pub fn proxy(&self, other: &Future<T>) {
        let other = other.clone();
        self.subscribe(move |outcome| {
            if let Err(e) = other.complete(outcome) {
                unhandled::report(Arc::new(e));
            }
        });
    }

    /// Rejects every future in `others` if this one fails.
    pub fn proxy_errors<U>(&self, others: &[Future<U>])
    where
        U: Clone + Send + 'static,
    {
        let others = others.to_vec();
        self.subscribe(move |outcome| {
            if let Err(failure) = outcome {
                for other in &others {
                    if let Err(e) = other.resolve_error(failure.clone()) {
                        unhandled::report(Arc::new(e));
                    }
                }
            }
        });
    }

    /// A resolver for callback-style APIs.
    pub fn as_callback(&self) -> Resolver<T> {
        Resolver::new(self.clone())
    }
}

impl<T> Default for Future<T>
where
    T: Clone + Send + 'static,
{
    #[track_caller]
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for Future<T>
where
    T: Clone + Send + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Future")
            .field("id", &self.id())
            .field("state", &self.shared.describe())
            .finish()
    }
}

/// A future already resolved with `value`.
#[track_caller]
pub fn from_result<T>(value: T) -> Future<T>
where
    T: Clone + Send + 'static,
{
    Future::resolved(value)
}
