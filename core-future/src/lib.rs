//! Fiber-blocking futures.
//!
//! A [`Future`] is a value or failure that is not available yet. Code running
//! in a fiber blocks on it with [`Future::wait`], [`wait`] or [`settle`]
//! instead of nesting callbacks; the fiber is suspended and the event loop
//! keeps running everything else until the futures resolve.
//!
//! # Modules
//!
//! - `future`: the resolution state machine and [`from_result`]
//! - `fiber_future`: [`spawn`] and the [`future_fn`] decorator
//! - `orchestrator`: [`settle`], [`wait`] and their macro forms
//! - `callback`: [`Resolver`] and [`wrap`] for callback-style APIs
//! - `registry`: leak detection with [`assert_no_outstanding`]
//!
//! # Examples
//!
//! ```rust
//! use core_future::{spawn, wait};
//!
//! let total = core_fiber::block_on(|| {
//!     let a = spawn(|| Ok(20)).unwrap();
//!     let b = spawn(|| Ok(22)).unwrap();
//!     wait([&a, &b]).unwrap();
//!     a.get().unwrap() + b.get().unwrap()
//! })
//! .unwrap();
//!
//! assert_eq!(total, 42);
//! ```

mod any;
pub mod callback;
pub mod error;
pub mod failure;
pub mod fiber_future;
pub mod future;
pub mod orchestrator;
pub mod registry;
pub mod trace;

pub use any::{AnyFuture, WaitItem};
pub use callback::{wrap, Resolver, Wrapped};
pub use error::{FutureError, Result};
pub use failure::{AggregateFailure, Failure, LinkedFailure};
pub use fiber_future::{future_fn, spawn, FutureFn};
pub use future::{from_result, Future, FutureId, Outcome};
pub use orchestrator::{settle, wait};
pub use registry::{assert_no_outstanding, configure, is_outstanding, outstanding, LeakReport};
pub use trace::Trace;

use core_fiber::EventLoop;
use core_runtime::RuntimeConfig;

/// Applies `config`'s diagnostics, then runs `f` as the root fiber of a new
/// event loop built from `config`.
pub fn run<T, F>(config: &RuntimeConfig, f: F) -> Result<T>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    configure(&config.diagnostics);
    Ok(EventLoop::new(config)?.block_on(f)?)
}
