//! The unhandled-failure channel.
//!
//! Failures that no consumer will ever observe are reported here. The report
//! is deferred onto the current event loop, which logs it, forwards it to the
//! configured [`UnhandledSink`](core_runtime::UnhandledSink) and applies the
//! [`UnhandledPolicy`](core_runtime::UnhandledPolicy) on a later turn.

use crate::context;
use crate::event_loop::Job;
use core_runtime::SharedError;
use tracing::error;

/// Reports `failure` to the current event loop.
///
/// Outside a running loop (or after it shut down) the failure is only logged.
pub fn report(failure: SharedError) {
    if let Some(event_loop) = context::event_loop() {
        if event_loop
            .schedule(Job::Unhandled(SharedError::clone(&failure)))
            .is_ok()
        {
            return;
        }
    }
    error!(error = %failure, "unhandled failure reported outside a running event loop");
}
