//! # Unhandled-Failure Sink
//!
//! Failures that no consumer observed (a detached future that failed, a
//! continuation that panicked) are routed by the event loop to the host
//! through this trait. The loop always logs such failures itself; a sink is
//! the hook for hosts that want to surface them somewhere else (a crash
//! reporter, a test collector, an alert).
//!
//! ```
//! use core_runtime::sink::{SharedError, UnhandledSink};
//! use std::sync::Mutex;
//!
//! #[derive(Default)]
//! struct Collect(Mutex<Vec<String>>);
//!
//! impl UnhandledSink for Collect {
//!     fn report(&self, failure: SharedError) {
//!         self.0.lock().unwrap().push(failure.to_string());
//!     }
//! }
//! ```

use std::sync::Arc;

/// A failure shared between the loop, its log output and any sink.
pub type SharedError = Arc<dyn std::error::Error + Send + Sync + 'static>;

/// Receives failures that reached the unhandled-failure channel.
#[cfg_attr(test, mockall::automock)]
pub trait UnhandledSink: Send + Sync {
    /// Called on the event loop thread, once per unhandled failure, in the
    /// order the failures were reported.
    fn report(&self, failure: SharedError);
}
