//! Failure values carried by rejected futures.
//!
//! A [`Failure`] is what a future resolves with when it does not resolve
//! with a value. It wraps any `std::error::Error` behind an `Arc` so it can be
//! handed to every continuation, and remembers where it was created. When a
//! failure is observed through [`Future::get`](crate::Future::get) or
//! [`wait`](crate::wait) it is returned as a [`LinkedFailure`] that also
//! knows where it was observed; simultaneous failures of one wait-set are
//! gathered into an [`AggregateFailure`].

use crate::trace::Trace;
use core_runtime::SharedError;
use std::any::Any;
use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Marker placed between the observation trace and the origin trace.
pub const TRACE_SEPARATOR: &str = "    - - - - -";

#[derive(Error, Debug)]
#[error("{0}")]
struct Message(String);

#[derive(Error, Debug)]
#[error("panicked: {0}")]
struct Panic(String);

/// A cheaply cloneable failure and the trace of its creation.
///
/// `Failure` converts from any error type with `?` or `.into()`; clones share
/// the underlying error, see [`same_as`](Failure::same_as).
#[derive(Clone)]
pub struct Failure {
    error: SharedError,
    origin: Trace,
}

impl Failure {
    #[track_caller]
    pub fn new<E>(error: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        Self::from_shared(Arc::new(error))
    }

    /// A failure carrying only a message.
    #[track_caller]
    pub fn msg(message: impl Into<String>) -> Self {
        Self::new(Message(message.into()))
    }

    #[track_caller]
    pub fn from_shared(error: SharedError) -> Self {
        Self {
            error,
            origin: Trace::capture(),
        }
    }

    /// Converts a panic payload into a failure.
    #[track_caller]
    pub fn from_panic(payload: &(dyn Any + Send)) -> Self {
        Self::new(Panic(core_fiber::fiber::panic_message(payload)))
    }

    pub fn error(&self) -> &(dyn StdError + Send + Sync + 'static) {
        self.error.as_ref()
    }

    /// The shared error object, for handing to the unhandled-failure channel.
    pub fn shared(&self) -> SharedError {
        Arc::clone(&self.error)
    }

    pub fn origin(&self) -> &Trace {
        &self.origin
    }

    pub fn downcast_ref<E>(&self) -> Option<&E>
    where
        E: StdError + 'static,
    {
        self.error.downcast_ref::<E>()
    }

    /// Whether both values are clones of one failure.
    pub fn same_as(&self, other: &Failure) -> bool {
        std::ptr::eq(
            Arc::as_ptr(&self.error) as *const (),
            Arc::as_ptr(&other.error) as *const (),
        )
    }

    /// A failure whose message renders empty cannot reject a future.
    pub fn is_empty(&self) -> bool {
        self.error.to_string().is_empty()
    }

    /// Message followed by the creation trace.
    pub fn report(&self) -> String {
        format!("{}\n{}", self.error, self.origin)
    }
}

impl<E> From<E> for Failure
where
    E: StdError + Send + Sync + 'static,
{
    #[track_caller]
    fn from(error: E) -> Self {
        Self::new(error)
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.error, f)
    }
}

impl fmt::Debug for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Failure")
            .field("error", &self.error)
            .field("origin", &self.origin)
            .finish()
    }
}

/// A failure together with the place it was observed.
#[derive(Debug, Clone)]
pub struct LinkedFailure {
    failure: Failure,
    observed_at: Trace,
}

impl LinkedFailure {
    pub fn new(failure: Failure, observed_at: Trace) -> Self {
        Self {
            failure,
            observed_at,
        }
    }

    pub fn failure(&self) -> &Failure {
        &self.failure
    }

    pub fn into_failure(self) -> Failure {
        self.failure
    }

    pub fn observed_at(&self) -> &Trace {
        &self.observed_at
    }

    /// The observation trace, the separator line, then the origin trace.
    pub fn trace(&self) -> String {
        format!(
            "{}\n{}\n{}",
            self.observed_at,
            TRACE_SEPARATOR,
            self.failure.origin()
        )
    }
}

impl fmt::Display for LinkedFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.failure, f)
    }
}

impl StdError for LinkedFailure {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        Some(self.failure.error())
    }
}

/// Every failure raised by one `wait`, in wait-set order.
#[derive(Debug, Clone)]
pub struct AggregateFailure {
    failures: Vec<Failure>,
    observed_at: Trace,
}

impl AggregateFailure {
    pub fn new(failures: Vec<Failure>, observed_at: Trace) -> Self {
        Self {
            failures,
            observed_at,
        }
    }

    pub fn failures(&self) -> &[Failure] {
        &self.failures
    }

    pub fn observed_at(&self) -> &Trace {
        &self.observed_at
    }

    pub fn len(&self) -> usize {
        self.failures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.failures.is_empty()
    }
}

impl fmt::Display for AggregateFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Multiple failures were raised.")?;
        for failure in &self.failures {
            write!(f, "\n\n{}", failure.report())?;
        }
        Ok(())
    }
}

impl StdError for AggregateFailure {}
