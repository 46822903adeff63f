//! Blocking a fiber on a set of futures.
//!
//! [`settle`] suspends the calling fiber until every future of a wait-set is
//! resolved; [`wait`] does the same and then surfaces their failures.
//!
//! Waiting on an unstarted fiber-backed future would normally cost a second
//! fiber: one to run its body while this one sits idle. Instead the first such
//! future is run in place, on the waiting fiber, before it suspends.

use crate::any::{AnyFuture, WaitItem};
use crate::error::{FutureError, Result};
use crate::failure::{AggregateFailure, Failure, LinkedFailure};
use crate::trace::Trace;
use core_fiber::unhandled;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{trace, warn};

/// Suspends the current fiber until every future in `items` is resolved.
///
/// Failures are not surfaced and no future counts as consumed; the futures
/// are returned flattened, in input order, for the caller to inspect. Returns
/// without suspending when every future is already resolved.
///
/// # Errors
///
/// - [`FutureError::NoThreadContext`] outside a fiber, even for an empty or
///   fully resolved wait-set
/// - [`FutureError::Fiber`] if the event loop abandons the fiber
#[track_caller]
pub fn settle<I>(items: I) -> Result<Vec<AnyFuture>>
where
    I: IntoIterator,
    I::Item: Into<WaitItem>,
{
    let fiber = core_fiber::current().ok_or(FutureError::NoThreadContext)?;
    let futures: Vec<AnyFuture> = items
        .into_iter()
        .flat_map(|item| item.into().into_futures())
        .collect();

    let mut pending: Vec<AnyFuture> = futures
        .iter()
        .filter(|future| !future.is_resolved())
        .cloned()
        .collect();
    if pending.is_empty() {
        return Ok(futures);
    }

    let reused = pending
        .iter()
        .position(AnyFuture::is_unstarted)
        .map(|index| pending.remove(index));

    let countdown = Arc::new(AtomicUsize::new(pending.len() + usize::from(reused.is_some())));
    trace!(
        fiber = %fiber.id(),
        pending = pending.len(),
        reuse = reused.is_some(),
        "settling futures"
    );

    for future in &pending {
        let countdown = Arc::clone(&countdown);
        let fiber = fiber.clone();
        future.subscribe_settled(Box::new(move || {
            if countdown.fetch_sub(1, Ordering::SeqCst) == 1 {
                if let Err(e) = fiber.run() {
                    warn!(fiber = %fiber.id(), error = %e, "failed to resume waiting fiber");
                    unhandled::report(Arc::new(FutureError::from(e)));
                }
            }
        }));
    }

    if let Some(future) = reused {
        trace!(future = %future.id(), fiber = %fiber.id(), "running fiber future in place");
        if future.start_inline() {
            countdown.fetch_sub(1, Ordering::SeqCst);
        } else {
            let countdown = Arc::clone(&countdown);
            let waiter = fiber.clone();
            future.subscribe_settled(Box::new(move || {
                if countdown.fetch_sub(1, Ordering::SeqCst) == 1 {
                    if let Err(e) = waiter.run() {
                        unhandled::report(Arc::new(FutureError::from(e)));
                    }
                }
            }));
        }
    }

    while countdown.load(Ordering::SeqCst) > 0 {
        core_fiber::yield_now()?;
    }
    Ok(futures)
}

/// Suspends the current fiber until every future in `items` is resolved,
/// then raises their failures.
///
/// Every future counts as consumed.
///
/// # Errors
///
/// - [`FutureError::Failed`] if exactly one future failed
/// - [`FutureError::Aggregate`] with every failure, in input order, if
///   several did
/// - anything [`settle`] fails with
#[track_caller]
pub fn wait<I>(items: I) -> Result<()>
where
    I: IntoIterator,
    I::Item: Into<WaitItem>,
{
    let observed_at = Trace::capture();
    let futures = settle(items)?;

    let mut failures: Vec<Failure> = futures
        .iter()
        .filter_map(|future| {
            future.deregister();
            future.failure()
        })
        .collect();

    match failures.len() {
        0 => Ok(()),
        1 => {
            let failure = failures.remove(0);
            Err(FutureError::Failed(LinkedFailure::new(failure, observed_at)))
        }
        _ => Err(FutureError::Aggregate(AggregateFailure::new(
            failures,
            observed_at,
        ))),
    }
}

/// [`settle`] over futures and lists of futures of mixed value types.
///
/// ```ignore
/// let futures = settle!(&count, &names, &[a, b])?;
/// ```
#[macro_export]
macro_rules! settle {
    ($($item:expr),+ $(,)?) => {
        $crate::settle(::std::vec![$($crate::WaitItem::from($item)),+])
    };
}

/// [`wait`] over futures and lists of futures of mixed value types.
///
/// ```ignore
/// wait!(&count, &names)?;
/// ```
#[macro_export]
macro_rules! wait {
    ($($item:expr),+ $(,)?) => {
        $crate::wait(::std::vec![$($crate::WaitItem::from($item)),+])
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::future::{from_result, Future};

    #[core_fiber::test]
    fn test_settle_resolved_keeps_input_order() {
        let a = from_result(1u8);
        let b = from_result(2u8);
        let c = from_result(3u8);
        let settled = settle([&a, &b, &c]).unwrap();
        assert_eq!(
            settled.iter().map(AnyFuture::id).collect::<Vec<_>>(),
            vec![a.id(), b.id(), c.id()]
        );
        wait([a, b, c]).unwrap();
    }

    #[test]
    fn test_wait_outside_fiber() {
        let pending: Future<u8> = Future::new();
        assert!(matches!(
            wait([&pending]),
            Err(FutureError::NoThreadContext)
        ));
        pending.resolve_value(1).unwrap();
        pending.get().unwrap();
    }

    #[test]
    fn test_resolved_or_empty_sets_still_need_a_fiber() {
        let resolved = from_result(1u8);
        assert!(matches!(
            settle([&resolved]),
            Err(FutureError::NoThreadContext)
        ));
        let empty: Vec<Future<u8>> = Vec::new();
        assert!(matches!(wait(&empty), Err(FutureError::NoThreadContext)));
        assert!(matches!(settle(&empty), Err(FutureError::NoThreadContext)));

        // A single resolved future can still be read without a fiber.
        assert_eq!(resolved.wait().unwrap(), 1);
    }

    #[core_fiber::test]
    fn test_wait_single_failure() {
        let ok = from_result(1u8);
        let failed: Future<u8> = Future::new();
        let failure = Failure::msg("only this one");
        failed.resolve_error(failure.clone()).unwrap();

        match wait([&ok, &failed]) {
            Err(FutureError::Failed(linked)) => assert!(linked.failure().same_as(&failure)),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[core_fiber::test]
    fn test_macros_accept_mixed_types() {
        let number = from_result(1u32);
        let words = vec![from_result("a"), from_result("b")];
        let settled = settle!(&number, &words).unwrap();
        assert_eq!(settled.len(), 3);
        wait!(&number, &words).unwrap();
    }
}
