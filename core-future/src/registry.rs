//! Leak detection.
//!
//! Every future is registered when it is created and deregistered the first
//! time it is consumed (read with `get`, included in a `wait`, subscribed to
//! or detached). Whatever is left at teardown was created and forgotten:
//! its failure, if any, would never be seen.
//!
//! ```ignore
//! // at the end of a test
//! core_future::assert_no_outstanding()?;
//! ```

use crate::error::{FutureError, Result};
use crate::future::FutureId;
use crate::trace::{set_capture_backtraces, Trace};
use core_fiber::sync::lock;
use core_runtime::DiagnosticsConfig;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use tracing::{debug, trace};

static OUTSTANDING: Mutex<BTreeMap<FutureId, Trace>> = Mutex::new(BTreeMap::new());
static ENABLED: AtomicBool = AtomicBool::new(true);

/// Applies the diagnostics section of the runtime configuration.
///
/// Disabling leak detection stops new registrations; futures already tracked
/// stay tracked until consumed.
pub fn configure(diagnostics: &DiagnosticsConfig) {
    ENABLED.store(diagnostics.leak_detection, Ordering::SeqCst);
    set_capture_backtraces(diagnostics.capture_backtraces);
    debug!(
        leak_detection = diagnostics.leak_detection,
        capture_backtraces = diagnostics.capture_backtraces,
        "diagnostics configured"
    );
}

pub(crate) fn register(id: FutureId, created_at: Trace) {
    if ENABLED.load(Ordering::SeqCst) {
        lock(&OUTSTANDING).insert(id, created_at);
    }
}

pub(crate) fn deregister(id: FutureId) {
    if lock(&OUTSTANDING).remove(&id).is_some() {
        trace!(future = %id, "future consumed");
    }
}

pub fn is_outstanding(id: FutureId) -> bool {
    lock(&OUTSTANDING).contains_key(&id)
}

/// Snapshot of every future created but not yet consumed, oldest first.
pub fn outstanding() -> LeakReport {
    let entries = lock(&OUTSTANDING)
        .iter()
        .map(|(id, created_at)| LeakEntry {
            id: *id,
            created_at: created_at.clone(),
        })
        .collect();
    LeakReport { entries }
}

/// Fails with [`FutureError::Outstanding`] if any future was never consumed.
pub fn assert_no_outstanding() -> Result<()> {
    let report = outstanding();
    if report.is_empty() {
        Ok(())
    } else {
        Err(FutureError::Outstanding(report))
    }
}

#[derive(Debug, Clone)]
pub struct LeakEntry {
    pub id: FutureId,
    pub created_at: Trace,
}

#[derive(Debug, Clone, Default)]
pub struct LeakReport {
    entries: Vec<LeakEntry>,
}

impl LeakReport {
    pub fn entries(&self) -> &[LeakEntry] {
        &self.entries
    }

    pub fn ids(&self) -> Vec<FutureId> {
        self.entries.iter().map(|entry| entry.id).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Display for LeakReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "There are outstanding futures. Construction call stacks:")?;
        for (index, entry) in self.entries.iter().enumerate() {
            write!(f, "\n#{} (future {})\n{}", index + 1, entry.id, entry.created_at)?;
        }
        Ok(())
    }
}

impl std::error::Error for LeakReport {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_and_deregister() {
        let id = FutureId::next();
        register(id, Trace::capture());
        assert!(is_outstanding(id));
        assert!(outstanding().ids().contains(&id));

        deregister(id);
        assert!(!is_outstanding(id));
        deregister(id);
        assert!(!is_outstanding(id));
    }

    #[test]
    fn test_report_display() {
        let report = LeakReport {
            entries: vec![LeakEntry {
                id: FutureId::next(),
                created_at: Trace::capture(),
            }],
        };
        let rendered = report.to_string();
        assert!(rendered.starts_with("There are outstanding futures. Construction call stacks:\n#1 (future #"));
        assert!(rendered.contains("registry.rs"));
    }
}
