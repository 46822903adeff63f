//! Integration tests for waiting on futures from fibers.

use core_fiber::{run_after, run_later, Duration, FiberError, RuntimeConfig, UnhandledPolicy};
use core_future::{
    future_fn, settle, spawn, wait, wrap, Failure, Future, FutureError, Outcome, Resolver,
    WaitItem,
};
use core_runtime::{SharedError, UnhandledSink};
use mockall::mock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

mock! {
    pub Sink {}

    impl UnhandledSink for Sink {
        fn report(&self, failure: SharedError);
    }
}

#[core_fiber::test]
fn test_fiber_future_value() {
    let future = spawn(|| Ok(String::from("computed"))).unwrap();
    wait([&future]).unwrap();
    assert_eq!(future.get().unwrap(), "computed");
}

#[core_fiber::test]
fn test_fiber_future_failure_is_reraised() {
    let failure = Failure::msg("body failed");
    let returned = failure.clone();
    let future: Future<u8> = spawn(move || Err(returned)).unwrap();

    match future.wait() {
        Err(FutureError::Failed(linked)) => {
            assert!(linked.failure().same_as(&failure));
            assert_eq!(linked.to_string(), "body failed");
            assert!(linked
                .observed_at()
                .location()
                .file()
                .ends_with("wait_tests.rs"));
        }
        other => panic!("unexpected result: {:?}", other),
    }
}

#[core_fiber::test]
fn test_fiber_future_panic_becomes_failure() {
    let future: Future<u8> = spawn(|| panic!("body panicked")).unwrap();
    let error = future.wait().unwrap_err();
    assert_eq!(error.to_string(), "panicked: body panicked");
}

#[core_fiber::test]
fn test_spawn_never_runs_synchronously() {
    let ran = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&ran);
    let future = spawn(move || {
        flag.store(true, Ordering::SeqCst);
        Ok(())
    })
    .unwrap();

    assert!(!ran.load(Ordering::SeqCst));
    future.wait().unwrap();
    assert!(ran.load(Ordering::SeqCst));
}

#[core_fiber::test]
fn test_wait_reraises_only_failure() {
    let a: Future<u8> = Future::new();
    let b: Future<u8> = Future::new();
    let c: Future<u8> = Future::new();
    let failure = Failure::msg("a failed");

    let (ra, rb, rc, fa) = (a.clone(), b.clone(), c.clone(), failure.clone());
    run_later(move || {
        rb.resolve_value(2).unwrap();
        rc.resolve_value(3).unwrap();
        ra.resolve_error(fa).unwrap();
    })
    .unwrap();

    match wait([&a, &b, &c]) {
        Err(FutureError::Failed(linked)) => assert!(linked.failure().same_as(&failure)),
        other => panic!("unexpected result: {:?}", other),
    }
}

#[core_fiber::test]
fn test_wait_aggregates_failures_in_input_order() {
    let a: Future<u8> = Future::new();
    let b: Future<u8> = Future::new();
    let c: Future<u8> = Future::new();
    let first = Failure::msg("a failed");
    let second = Failure::msg("b failed");

    let (ra, rb, rc) = (a.clone(), b.clone(), c.clone());
    let (fa, fb) = (first.clone(), second.clone());
    run_later(move || {
        // Resolution order differs from input order on purpose.
        rb.resolve_error(fb).unwrap();
        rc.resolve_value(3).unwrap();
        ra.resolve_error(fa).unwrap();
    })
    .unwrap();

    match wait([&a, &b, &c]) {
        Err(FutureError::Aggregate(aggregate)) => {
            assert_eq!(aggregate.len(), 2);
            assert!(aggregate.failures()[0].same_as(&first));
            assert!(aggregate.failures()[1].same_as(&second));
            let rendered = aggregate.to_string();
            assert!(rendered.starts_with("Multiple failures were raised."));
            assert!(rendered.find("a failed").unwrap() < rendered.find("b failed").unwrap());
        }
        other => panic!("unexpected result: {:?}", other),
    }
}

#[core_fiber::test]
fn test_settle_on_resolved_futures_does_not_suspend() {
    let a = core_future::from_result(1u8);
    let b = core_future::from_result(2u8);
    let c = core_future::from_result(3u8);

    let callback_ran = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&callback_ran);
    run_later(move || flag.store(true, Ordering::SeqCst)).unwrap();

    let settled = settle([&a, &b, &c]).unwrap();
    assert_eq!(settled.len(), 3);
    assert!(!callback_ran.load(Ordering::SeqCst));

    wait([a, b, c]).unwrap();
}

#[core_fiber::test]
fn test_settle_does_not_surface_failures() {
    let failed: Future<u8> = Future::new();
    let resolver = failed.clone();
    run_later(move || resolver.resolve_error(Failure::msg("quiet")).unwrap()).unwrap();

    let settled = settle([&failed]).unwrap();
    assert!(settled[0].is_resolved());
    assert!(failed.get().is_err());
}

#[core_fiber::test]
fn test_reused_future_runs_on_waiting_fiber() {
    let waiting_thread = thread::current().id();
    let future = spawn(|| Ok(thread::current().id())).unwrap();
    assert_eq!(future.wait().unwrap(), waiting_thread);
}

#[core_fiber::test]
fn test_only_first_unstarted_future_is_reused() {
    let waiting_thread = thread::current().id();
    let first = spawn(|| Ok(thread::current().id())).unwrap();
    let second = spawn(|| Ok(thread::current().id())).unwrap();

    wait([&first, &second]).unwrap();
    assert_eq!(first.get().unwrap(), waiting_thread);
    assert_ne!(second.get().unwrap(), waiting_thread);
}

#[core_fiber::test]
fn test_suspending_bodies_interleave() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let body = |tag: &'static str, delay: u64, log: Arc<Mutex<Vec<&'static str>>>| {
        move || -> Outcome<&'static str> {
            core_fiber::sleep(Duration::from_millis(delay))?;
            log.lock().unwrap().push(tag);
            Ok(tag)
        }
    };

    let slow = spawn(body("slow", 40, Arc::clone(&log))).unwrap();
    let fast = spawn(body("fast", 5, Arc::clone(&log))).unwrap();
    wait([&slow, &fast]).unwrap();

    assert_eq!(*log.lock().unwrap(), vec!["fast", "slow"]);
    assert_eq!(slow.get().unwrap(), "slow");
    assert_eq!(fast.get().unwrap(), "fast");
}

#[core_fiber::test]
fn test_nested_waits() {
    let outer = spawn(|| {
        let inner = spawn(|| Ok(2u32))?;
        Ok(inner.wait()? * 21)
    })
    .unwrap();
    assert_eq!(outer.wait().unwrap(), 42);
}

#[core_fiber::test]
fn test_mixed_types_with_macro() {
    let count = spawn(|| Ok(3usize)).unwrap();
    let names = vec![
        core_future::from_result(String::from("a")),
        core_future::from_result(String::from("b")),
    ];

    let settled = core_future::settle!(&count, &names).unwrap();
    assert_eq!(settled.len(), 3);
    assert!(settled[0].downcast::<String>().is_err());
    assert_eq!(settled[0].downcast::<usize>().unwrap().get().unwrap(), 3);

    core_future::wait!(&count, &names).unwrap();
    let items = vec![WaitItem::from(&count), WaitItem::from(names.clone())];
    wait(items).unwrap();
}

#[core_fiber::test]
fn test_race_against_timer() {
    let slow: Future<&'static str> = Future::new();
    let timer: Future<&'static str> = Future::new();
    let winner: Future<&'static str> = Future::new();

    for contender in [&slow, &timer] {
        let winner = winner.clone();
        contender.subscribe(move |outcome| {
            let _ = winner.complete(outcome);
        });
    }

    let fire = timer.clone();
    run_after(Duration::from_millis(10), move || {
        fire.resolve_value("timed out").unwrap();
    })
    .unwrap();

    assert_eq!(winner.wait().unwrap(), "timed out");
    assert!(!slow.is_resolved());
}

#[core_fiber::test]
fn test_future_fn_decorator() {
    let square = future_fn(|x: u64| Ok(x * x));
    let futures: Vec<Future<u64>> = (1..=3).map(|x| square.call(x).unwrap()).collect();
    wait(&futures).unwrap();
    let values: Vec<u64> = futures.iter().map(|f| f.get().unwrap()).collect();
    assert_eq!(values, vec![1, 4, 9]);
}

#[core_fiber::test]
fn test_wrap_resolves_on_later_turn() {
    let delayed = wrap(
        |args: Vec<u32>, done: Resolver<u32>| {
            let first = args.first().copied().unwrap_or_default();
            run_later(move || done.call(None, first * 10).unwrap()).unwrap();
        },
        1,
    );

    let future = delayed.call(vec![4]).unwrap();
    assert!(!future.is_resolved());
    assert_eq!(future.wait().unwrap(), 40);
}

#[test]
fn test_continuation_panic_is_isolated() {
    let mut sink = MockSink::new();
    sink.expect_report()
        .withf(|failure| failure.to_string().contains("continuation exploded"))
        .times(1)
        .return_const(());

    let config = RuntimeConfig::builder()
        .unhandled_policy(UnhandledPolicy::Log)
        .unhandled_sink(Arc::new(sink))
        .build()
        .unwrap();

    let seen = core_future::run(&config, || {
        let future: Future<u8> = Future::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        future.subscribe(|_| panic!("continuation exploded"));
        let record = Arc::clone(&seen);
        future.subscribe(move |outcome| record.lock().unwrap().push(outcome.unwrap()));
        future.resolve_value(7).unwrap();
        let seen = seen.lock().unwrap().clone();
        seen
    })
    .unwrap();

    assert_eq!(seen, vec![7]);
}

#[test]
fn test_detached_failure_aborts_loop() {
    let mut sink = MockSink::new();
    sink.expect_report()
        .withf(|failure| failure.to_string() == "nobody waited")
        .times(1)
        .return_const(());

    let config = RuntimeConfig::builder()
        .unhandled_sink(Arc::new(sink))
        .build()
        .unwrap();

    let result = core_future::run(&config, || {
        let future: Future<u8> = spawn(|| Err(Failure::msg("nobody waited"))).unwrap();
        future.detach();
    });

    match result {
        Err(FutureError::Fiber(FiberError::Unhandled(failure))) => {
            assert_eq!(failure.to_string(), "nobody waited")
        }
        other => panic!("unexpected result: {:?}", other),
    }
}

#[test]
fn test_detached_failure_after_sleep_aborts_loop() {
    let result = core_future::run(&RuntimeConfig::default(), || {
        let late: Future<u8> = spawn(|| {
            core_fiber::sleep(Duration::from_millis(20))?;
            Err(Failure::msg("failed after sleeping"))
        })
        .unwrap();
        late.detach();
    });

    match result {
        Err(FutureError::Fiber(FiberError::Unhandled(failure))) => {
            assert_eq!(failure.to_string(), "failed after sleeping")
        }
        other => panic!("unexpected result: {:?}", other),
    }
}

#[test]
fn test_detached_body_completes_after_root() {
    let completed = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&completed);

    core_future::run(&RuntimeConfig::default(), move || {
        spawn(move || {
            core_fiber::sleep(Duration::from_millis(20))?;
            flag.store(true, Ordering::SeqCst);
            Ok(())
        })
        .unwrap()
        .detach();
    })
    .unwrap();

    assert!(completed.load(Ordering::SeqCst));
}

#[test]
fn test_exhausted_pool_fails_the_future() {
    let config = RuntimeConfig::builder().max_fibers(1).build().unwrap();

    let result = core_future::run(&config, || {
        let inline = spawn(|| Ok(1u8)).unwrap();
        let needs_fiber = spawn(|| Ok(2u8)).unwrap();
        let waited = wait([&inline, &needs_fiber]);
        (waited, inline.get())
    })
    .unwrap();

    match result.0 {
        Err(FutureError::Failed(linked)) => assert!(matches!(
            linked.failure().downcast_ref::<FutureError>(),
            Some(FutureError::Fiber(FiberError::PoolExhausted { max: 1 }))
        )),
        other => panic!("unexpected result: {:?}", other),
    }
    assert_eq!(result.1.unwrap(), 1);
}

#[test]
fn test_settle_outside_fiber_on_resolved_set_fails() {
    let resolved = core_future::from_result(1u8);
    assert!(matches!(
        settle([&resolved]),
        Err(FutureError::NoThreadContext)
    ));

    let nothing: Vec<Future<u8>> = Vec::new();
    assert!(matches!(wait(&nothing), Err(FutureError::NoThreadContext)));
    resolved.detach();
}

#[test]
fn test_wait_outside_fiber_fails() {
    let pending: Future<u8> = Future::new();
    assert!(matches!(
        pending.wait(),
        Err(FutureError::NoThreadContext)
    ));
    pending.detach();
}

#[test]
fn test_abandoned_waiter_gets_error() {
    let outcome = Arc::new(Mutex::new(None));
    let slot = Arc::clone(&outcome);

    core_fiber::block_on(move || {
        let never: Future<u8> = Future::new();
        let waiter = core_fiber::Fiber::new(move || {
            *slot.lock().unwrap() = Some(never.wait());
        })
        .unwrap();
        waiter.run().unwrap();
    })
    .unwrap();

    let result = outcome.lock().unwrap().take();
    assert!(matches!(
        result,
        Some(Err(FutureError::Fiber(FiberError::Abandoned)))
    ));
}
