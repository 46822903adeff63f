//! Integration tests for fibers and the event loop.

use core_fiber::{
    current, run_after, run_later, yield_now, Duration, EventLoop, Fiber, FiberError, FiberState,
    RuntimeConfig, UnhandledPolicy,
};
use core_runtime::{SharedError, UnhandledSink};
use mockall::mock;
use std::sync::{Arc, Mutex};

mock! {
    pub Sink {}

    impl UnhandledSink for Sink {
        fn report(&self, failure: SharedError);
    }
}

fn recorder() -> (Arc<Mutex<Vec<String>>>, impl Fn(&str) + Clone + Send + 'static) {
    let log = Arc::new(Mutex::new(Vec::new()));
    let writer = Arc::clone(&log);
    (log, move |entry: &str| writer.lock().unwrap().push(entry.to_string()))
}

#[core_fiber::test]
fn test_root_body_runs_inside_a_fiber() {
    let me = current().expect("root body must run in a fiber");
    assert_eq!(me.state(), FiberState::Running);
}

#[core_fiber::test]
fn test_run_later_preserves_fifo_order() {
    let (log, record) = recorder();
    for i in 0..5 {
        let record = record.clone();
        run_later(move || record(&format!("job {}", i))).unwrap();
    }

    // Park the root fiber until the fifth job has run.
    let root = current().unwrap();
    run_later(move || root.run().unwrap()).unwrap();
    yield_now().unwrap();

    assert_eq!(
        *log.lock().unwrap(),
        vec!["job 0", "job 1", "job 2", "job 3", "job 4"]
    );
}

#[core_fiber::test]
fn test_fiber_resumed_from_callback() {
    let (log, record) = recorder();
    let worker_record = record.clone();
    let worker = Fiber::new(move || {
        worker_record("worker start");
        yield_now().unwrap();
        worker_record("worker end");
    })
    .unwrap();

    worker.run().unwrap();
    record("root");

    let root = current().unwrap();
    let resumed = worker.clone();
    run_later(move || {
        resumed.run().unwrap();
        root.run().unwrap();
    })
    .unwrap();
    yield_now().unwrap();

    assert!(worker.is_finished());
    assert_eq!(
        *log.lock().unwrap(),
        vec!["worker start", "root", "worker end"]
    );
}

#[core_fiber::test]
fn test_fiber_can_run_another_fiber() {
    let (log, record) = recorder();
    let inner_record = record.clone();
    let outer = Fiber::new(move || {
        let inner = Fiber::new({
            let record = inner_record.clone();
            move || record("inner")
        })
        .unwrap();
        inner_record("outer before");
        inner.run().unwrap();
        inner_record("outer after");
    })
    .unwrap();

    outer.run().unwrap();
    assert_eq!(
        *log.lock().unwrap(),
        vec!["outer before", "inner", "outer after"]
    );
}

#[test]
fn test_suspended_root_without_work_is_stalled() {
    let result = EventLoop::new(&RuntimeConfig::default())
        .unwrap()
        .block_on(|| yield_now());
    assert!(matches!(result, Err(FiberError::Stalled)));
}

#[test]
fn test_leftover_fiber_is_abandoned_on_shutdown() {
    let outcome = Arc::new(Mutex::new(None));
    let slot = Arc::clone(&outcome);

    core_fiber::block_on(move || {
        let fiber = Fiber::new(move || {
            let result = yield_now();
            *slot.lock().unwrap() = Some(result);
        })
        .unwrap();
        fiber.run().unwrap();
    })
    .unwrap();

    let result = outcome.lock().unwrap().take();
    assert!(matches!(result, Some(Err(FiberError::Abandoned))));
}

#[test]
fn test_unstarted_fiber_is_discarded_on_shutdown() {
    let ran = Arc::new(Mutex::new(false));
    let flag = Arc::clone(&ran);

    let fiber = core_fiber::block_on(move || {
        Fiber::new(move || *flag.lock().unwrap() = true).unwrap()
    })
    .unwrap();

    assert!(fiber.is_finished());
    assert!(!*ran.lock().unwrap());
    assert!(matches!(Fiber::new(|| {}), Err(FiberError::NoEventLoop)));
}

#[core_fiber::test]
fn test_run_after_fires_later() {
    let (log, record) = recorder();
    let root = current().unwrap();
    let timer_record = record.clone();
    run_after(Duration::from_millis(10), move || {
        timer_record("timer");
        root.run().unwrap();
    })
    .unwrap();
    record("scheduled");
    yield_now().unwrap();

    assert_eq!(*log.lock().unwrap(), vec!["scheduled", "timer"]);
}

#[test]
fn test_loop_handle_feeds_from_another_thread() {
    let event_loop = EventLoop::new(&RuntimeConfig::default()).unwrap();
    let handle = event_loop.handle();

    let value = event_loop
        .block_on(move || {
            let root = current().unwrap();
            let result = Arc::new(Mutex::new(0));
            let slot = Arc::clone(&result);
            std::thread::spawn(move || {
                handle
                    .run_later(move || {
                        *slot.lock().unwrap() = 99;
                        root.run().unwrap();
                    })
                    .unwrap();
            });
            yield_now().unwrap();
            let value = *result.lock().unwrap();
            value
        })
        .unwrap();

    assert_eq!(value, 99);
}

#[test]
fn test_callback_panic_reaches_sink_and_aborts() {
    let mut sink = MockSink::new();
    sink.expect_report()
        .withf(|failure| failure.to_string().contains("callback blew up"))
        .times(1)
        .return_const(());

    let config = RuntimeConfig::builder()
        .unhandled_sink(Arc::new(sink))
        .build()
        .unwrap();

    let result = EventLoop::new(&config).unwrap().block_on(|| {
        run_later(|| panic!("callback blew up")).unwrap();
    });

    match result {
        Err(FiberError::Unhandled(failure)) => {
            assert!(failure.to_string().contains("callback blew up"))
        }
        other => panic!("unexpected result: {:?}", other),
    }
}

#[test]
fn test_log_policy_keeps_running_after_callback_panic() {
    let mut sink = MockSink::new();
    sink.expect_report().times(1).return_const(());

    let config = RuntimeConfig::builder()
        .unhandled_policy(UnhandledPolicy::Log)
        .unhandled_sink(Arc::new(sink))
        .build()
        .unwrap();

    let (log, record) = recorder();
    let result = EventLoop::new(&config).unwrap().block_on(move || {
        run_later(|| panic!("first callback")).unwrap();
        run_later(move || record("second callback")).unwrap();
    });

    assert!(result.is_ok());
    assert_eq!(*log.lock().unwrap(), vec!["second callback"]);
}

#[test]
fn test_root_panic_is_returned() {
    let result = core_fiber::block_on::<(), _>(|| panic!("root failed"));
    match result {
        Err(FiberError::Panicked { message, .. }) => assert_eq!(message, "root failed"),
        other => panic!("unexpected result: {:?}", other),
    }
}

#[test]
fn test_sleeping_fiber_finishes_after_root() {
    let (log, record) = recorder();

    core_fiber::block_on(move || {
        let fiber = Fiber::new(move || {
            core_fiber::sleep(Duration::from_millis(20)).unwrap();
            record("woke");
        })
        .unwrap();
        fiber.run().unwrap();
    })
    .unwrap();

    assert_eq!(*log.lock().unwrap(), vec!["woke"]);
}

#[test]
fn test_fiber_beyond_pool_size_is_refused() {
    let config = RuntimeConfig::builder().max_fibers(1).build().unwrap();
    let result = EventLoop::new(&config)
        .unwrap()
        .block_on(|| Fiber::new(|| {}).map(|_| ()));
    assert!(matches!(
        result,
        Ok(Err(FiberError::PoolExhausted { max: 1 }))
    ));
}
