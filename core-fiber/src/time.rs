//! Timers for fibers.
//!
//! Timers are driven by the loop's Tokio worker; their callbacks still run on
//! the loop thread like any other scheduled work.

pub use crate::event_loop::run_after;
pub use std::time::{Duration, Instant};

use crate::error::{FiberError, Result};
use crate::fiber::{current, yield_now};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Suspends the current fiber for at least `delay`.
///
/// Other fibers and scheduled callbacks keep running meanwhile. A fiber that
/// is resumed early by someone else goes back to sleep until the timer fires.
///
/// # Errors
///
/// - [`FiberError::NoFiber`] outside a fiber
/// - [`FiberError::Abandoned`] if the loop shuts down during the sleep
pub fn sleep(delay: Duration) -> Result<()> {
    let fiber = current().ok_or(FiberError::NoFiber)?;
    let fired = Arc::new(AtomicBool::new(false));

    let flag = Arc::clone(&fired);
    run_after(delay, move || {
        flag.store(true, Ordering::SeqCst);
        if let Err(e) = fiber.run() {
            debug!(fiber = %fiber.id(), error = %e, "failed to wake sleeping fiber");
        }
    })?;

    while !fired.load(Ordering::SeqCst) {
        yield_now()?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event_loop::block_on;

    #[test]
    fn test_sleep_outside_fiber() {
        assert!(matches!(
            sleep(Duration::from_millis(1)),
            Err(FiberError::NoFiber)
        ));
    }

    #[test]
    fn test_sleep_waits_for_timer() {
        let elapsed = block_on(|| {
            let start = Instant::now();
            sleep(Duration::from_millis(20)).unwrap();
            start.elapsed()
        })
        .unwrap();
        assert!(elapsed >= Duration::from_millis(20));
    }
}
