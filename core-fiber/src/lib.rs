//! Cooperative fibers on top of the Tokio blocking pool.
//!
//! This crate hosts the collaborators the future layer is written against:
//!
//! - `fiber`: [`Fiber`] with `run`, [`yield_now`] and [`current`]
//! - `event_loop`: [`EventLoop`], [`run_later`] and [`LoopHandle`]
//! - `time`: [`run_after`] timers and a fiber-blocking [`sleep`](time::sleep)
//! - `unhandled`: the channel for failures nobody observed
//!
//! Every fiber runs on its own OS thread, but control is passed like a baton:
//! only the holder runs, so code sees single-threaded, cooperative scheduling.
//!
//! # Examples
//!
//! ```rust
//! use core_fiber::{yield_now, Fiber};
//!
//! let steps = core_fiber::block_on(|| {
//!     let fiber = Fiber::new(|| {
//!         yield_now().unwrap();
//!     })
//!     .unwrap();
//!     fiber.run().unwrap();
//!     let suspended = !fiber.is_finished();
//!     fiber.run().unwrap();
//!     (suspended, fiber.is_finished())
//! })
//! .unwrap();
//!
//! assert_eq!(steps, (true, true));
//! ```

// Re-export the entry-point/test macros so callers only depend on this crate.
pub use core_fiber_macros::{main, test};

mod context;
pub mod error;
pub mod event_loop;
pub mod fiber;
pub mod sync;
pub mod time;
pub mod unhandled;

pub use core_runtime::{RuntimeConfig, UnhandledPolicy};
pub use error::{FiberError, Result};
pub use event_loop::{block_on, handle, run_after, run_later, EventLoop, LoopHandle};
pub use fiber::{current, yield_now, Fiber, FiberId, FiberState};
pub use time::{sleep, Duration};
