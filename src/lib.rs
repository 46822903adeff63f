//! Synchronous-looking futures for cooperative fibers.
//!
//! This crate re-exports the workspace crates so hosts can depend on one
//! package:
//!
//! - [`runtime`] (`core-runtime`): configuration, logging bootstrap and the
//!   unhandled-failure sink
//! - [`fiber`] (`core-fiber`): fibers and the event loop hosting them
//! - the root items (`core-future`): [`Future`], [`spawn`], [`settle`],
//!   [`wait`] and leak detection
//!
//! # Examples
//!
//! ```rust
//! use fiber_futures::{spawn, Failure, FutureError, RuntimeConfig};
//!
//! let config = RuntimeConfig::builder().max_fibers(16).build().unwrap();
//! let outcome = fiber_futures::run(&config, || {
//!     let parsed = spawn(|| "42".parse::<u32>().map_err(Failure::from)).unwrap();
//!     parsed.wait()
//! })
//! .unwrap();
//!
//! assert_eq!(outcome.unwrap(), 42);
//! fiber_futures::assert_no_outstanding().unwrap();
//! ```

pub use core_fiber as fiber;
pub use core_runtime as runtime;

pub use core_fiber::{block_on, EventLoop, FiberError, LoopHandle};
pub use core_future::*;
pub use core_runtime::{DiagnosticsConfig, RuntimeConfig, UnhandledPolicy, UnhandledSink};
