//! Synchronization helpers shared by the fiber and loop implementations.
//!
//! Only one fiber runs at a time, so these locks never contend; they exist to
//! satisfy `Send`/`Sync` for state reachable from several OS threads. Guarded
//! state is left consistent before any user code runs, which makes recovering
//! a poisoned lock safe.

use std::sync::{Mutex, MutexGuard, PoisonError};

pub use tokio::sync::{mpsc, oneshot};

/// Locks `mutex`, recovering the guard if a panicking thread poisoned it.
pub fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
