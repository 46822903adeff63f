//! The host event loop.
//!
//! [`EventLoop`] owns a Tokio runtime whose blocking pool backs the fibers and
//! whose single worker drives timers. Work scheduled with [`run_later`] lands
//! in a FIFO queue that the loop thread drains between fiber turns, so a
//! callback never runs synchronously inside the code that scheduled it.
//!
//! ```ignore
//! use core_fiber::{EventLoop, RuntimeConfig};
//!
//! let answer = EventLoop::new(&RuntimeConfig::default())?.block_on(|| {
//!     core_fiber::run_later(|| tracing::info!("later")).unwrap();
//!     42
//! })?;
//! ```

use crate::context::{self, Context};
use crate::error::{FiberError, Result};
use crate::fiber::{panic_message, Fiber, FiberInner, FiberState};
use crate::sync::{lock, mpsc};
use core_runtime::{RuntimeConfig, SharedError, UnhandledPolicy, UnhandledSink};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;
use tokio::runtime::{Builder, Handle, Runtime};
use tokio::sync::mpsc::error::TryRecvError;
use tracing::{debug, error, trace};

pub(crate) type Callback = Box<dyn FnOnce() + Send + 'static>;

pub(crate) enum Job {
    Run(Callback),
    /// Nudges a loop blocked on an empty queue to re-check for a stall.
    Wake,
    Unhandled(SharedError),
}

/// State shared by the loop, its fibers, its handles and its timers.
pub(crate) struct LoopShared {
    runtime: Handle,
    jobs: mpsc::UnboundedSender<Job>,
    closed: AtomicBool,
    /// Armed timers. The loop outlives its root fiber until these fire.
    timers: AtomicUsize,
    /// Live `LoopHandle`s. They only keep a suspended root fiber from being
    /// reported as stalled.
    handles: AtomicUsize,
    /// Fibers admitted and not yet finished, capped at `max_fibers`.
    live_fibers: AtomicUsize,
    max_fibers: usize,
    fibers: Mutex<Vec<Weak<FiberInner>>>,
}

impl LoopShared {
    pub(crate) fn runtime(&self) -> &Handle {
        &self.runtime
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub(crate) fn track(&self, fiber: &Arc<FiberInner>) {
        let mut fibers = lock(&self.fibers);
        fibers.retain(|weak| weak.strong_count() > 0);
        fibers.push(Arc::downgrade(fiber));
    }

    pub(crate) fn schedule(&self, job: Job) -> Result<()> {
        if self.is_closed() {
            return Err(FiberError::LoopClosed);
        }
        self.jobs.send(job).map_err(|_| FiberError::LoopClosed)
    }

    fn schedule_after(self: &Arc<Self>, delay: Duration, callback: Callback) -> Result<()> {
        if self.is_closed() {
            return Err(FiberError::LoopClosed);
        }

        self.timers.fetch_add(1, Ordering::SeqCst);
        let shared = Arc::clone(self);
        self.runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = shared.jobs.send(Job::Run(callback));
            shared.release(&shared.timers);
        });
        Ok(())
    }

    /// The callback (if any) must be queued before the count drops, so a loop
    /// that observes zero always finds it on its final queue check.
    fn release(&self, counter: &AtomicUsize) {
        counter.fetch_sub(1, Ordering::SeqCst);
        let _ = self.jobs.send(Job::Wake);
    }

    fn has_timers(&self) -> bool {
        self.timers.load(Ordering::SeqCst) > 0
    }

    fn has_handles(&self) -> bool {
        self.handles.load(Ordering::SeqCst) > 0
    }

    /// Claims a slot for a new fiber.
    pub(crate) fn admit_fiber(&self) -> Result<()> {
        self.live_fibers
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |live| {
                (live < self.max_fibers).then_some(live + 1)
            })
            .map(|_| ())
            .map_err(|_| FiberError::PoolExhausted {
                max: self.max_fibers,
            })
    }

    pub(crate) fn retire_fiber(&self) {
        self.live_fibers.fetch_sub(1, Ordering::SeqCst);
    }
}

/// A single-threaded event loop hosting cooperative fibers.
pub struct EventLoop {
    runtime: Option<Runtime>,
    shared: Arc<LoopShared>,
    jobs: mpsc::UnboundedReceiver<Job>,
    policy: UnhandledPolicy,
    sink: Option<Arc<dyn UnhandledSink>>,
}

impl EventLoop {
    /// Builds the loop and its runtime.
    ///
    /// # Errors
    ///
    /// - [`FiberError::Config`] if `config` fails validation
    /// - [`FiberError::Runtime`] if Tokio cannot start
    pub fn new(config: &RuntimeConfig) -> Result<Self> {
        config.validate()?;

        // Fiber admission is capped at `max_fibers`; the spare thread covers a
        // finished fiber whose thread has not yet returned to the pool.
        let mut builder = Builder::new_multi_thread();
        builder
            .worker_threads(1)
            .max_blocking_threads(config.max_fibers + 1)
            .thread_name(config.thread_name.clone())
            .enable_time();
        if let Some(size) = config.fiber_stack_size {
            builder.thread_stack_size(size);
        }
        let runtime = builder
            .build()
            .map_err(|e| FiberError::Runtime(e.to_string()))?;

        let (sender, jobs) = mpsc::unbounded_channel();
        let shared = Arc::new(LoopShared {
            runtime: runtime.handle().clone(),
            jobs: sender,
            closed: AtomicBool::new(false),
            timers: AtomicUsize::new(0),
            handles: AtomicUsize::new(0),
            live_fibers: AtomicUsize::new(0),
            max_fibers: config.max_fibers,
            fibers: Mutex::new(Vec::new()),
        });

        debug!(
            max_fibers = config.max_fibers,
            policy = ?config.unhandled_policy,
            "event loop created"
        );

        Ok(Self {
            runtime: Some(runtime),
            shared,
            jobs,
            policy: config.unhandled_policy,
            sink: config.unhandled_sink.clone(),
        })
    }

    /// Returns a handle for scheduling onto this loop from any thread.
    pub fn handle(&self) -> LoopHandle {
        LoopHandle::new(Arc::clone(&self.shared))
    }

    /// Runs `f` inside a root fiber and drives the loop until the root fiber
    /// has finished, the queue is empty and no timer is armed, then shuts the
    /// loop down.
    ///
    /// # Errors
    ///
    /// - [`FiberError::Panicked`] if `f` panicked
    /// - [`FiberError::Stalled`] if the root fiber is suspended and nothing
    ///   remains that could resume it
    /// - [`FiberError::Unhandled`] for the first unhandled failure under
    ///   [`UnhandledPolicy::Abort`]
    pub fn block_on<T, F>(mut self, f: F) -> Result<T>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let _context = context::enter(Context::root(Arc::clone(&self.shared)));
        let result = self.drive(f);
        self.shutdown();
        result
    }

    fn drive<T, F>(&mut self, f: F) -> Result<T>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let outcome = Arc::new(Mutex::new(None));
        let slot = Arc::clone(&outcome);
        let root = Fiber::new(move || {
            let result = panic::catch_unwind(AssertUnwindSafe(f));
            *lock(&slot) = Some(result);
        })?;
        let root_id = root.id();

        root.run()?;

        loop {
            let job = match self.jobs.try_recv() {
                Ok(job) => job,
                Err(TryRecvError::Disconnected) => break,
                Err(TryRecvError::Empty) => {
                    let root_finished = root.is_finished();
                    let fed = self.shared.has_timers()
                        || (!root_finished && self.shared.has_handles());
                    if fed {
                        match self.jobs.blocking_recv() {
                            Some(job) => job,
                            None => break,
                        }
                    } else {
                        match self.jobs.try_recv() {
                            Ok(job) => job,
                            Err(_) if root_finished => break,
                            Err(_) => {
                                debug!(fiber = %root_id, "event loop stalled");
                                return Err(FiberError::Stalled);
                            }
                        }
                    }
                }
            };
            self.dispatch(job)?;
        }

        let result = lock(&outcome).take();
        match result {
            Some(Ok(value)) => Ok(value),
            Some(Err(payload)) => Err(FiberError::Panicked {
                fiber: root_id,
                message: panic_message(payload.as_ref()),
            }),
            None => Err(FiberError::Stalled),
        }
    }

    fn dispatch(&self, job: Job) -> Result<()> {
        match job {
            Job::Run(callback) => {
                trace!("running scheduled callback");
                if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(callback)) {
                    let failure: SharedError = Arc::new(FiberError::CallbackPanicked(
                        panic_message(payload.as_ref()),
                    ));
                    self.unhandled(failure)?;
                }
                Ok(())
            }
            Job::Wake => Ok(()),
            Job::Unhandled(failure) => self.unhandled(failure),
        }
    }

    fn unhandled(&self, failure: SharedError) -> Result<()> {
        error!(error = %failure, "unhandled failure");
        if let Some(sink) = &self.sink {
            sink.report(Arc::clone(&failure));
        }
        match self.policy {
            UnhandledPolicy::Abort => Err(FiberError::Unhandled(failure)),
            UnhandledPolicy::Log => Ok(()),
        }
    }

    /// Closes the loop and lets every leftover fiber unwind.
    fn shutdown(&mut self) {
        self.shared.closed.store(true, Ordering::SeqCst);

        let fibers: Vec<Fiber> = lock(&self.shared.fibers)
            .drain(..)
            .filter_map(|weak| weak.upgrade())
            .map(Fiber::from_inner)
            .collect();

        let mut abandoned = 0usize;
        for fiber in fibers {
            match fiber.state() {
                FiberState::Created | FiberState::Suspended => {
                    abandoned += 1;
                    if let Err(e) = fiber.abandon() {
                        debug!(fiber = %fiber.id(), error = %e, "abandoned fiber did not unwind cleanly");
                    }
                }
                FiberState::Running | FiberState::Finished => {}
            }
        }

        debug!(abandoned, "event loop shut down");
    }
}

impl Drop for EventLoop {
    fn drop(&mut self) {
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}

/// Schedules work onto an event loop from any thread.
///
/// While a handle is alive and the root fiber is suspended, the loop assumes
/// more work may arrive and waits for it instead of reporting a stall. A
/// handle does not keep the loop running once the root fiber has finished.
pub struct LoopHandle {
    shared: Arc<LoopShared>,
}

impl LoopHandle {
    fn new(shared: Arc<LoopShared>) -> Self {
        shared.handles.fetch_add(1, Ordering::SeqCst);
        Self { shared }
    }

    /// Queues `callback` for a later turn of the loop.
    pub fn run_later<F>(&self, callback: F) -> Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        self.shared.schedule(Job::Run(Box::new(callback)))
    }

    /// Queues `callback` once `delay` has elapsed.
    pub fn run_after<F>(&self, delay: Duration, callback: F) -> Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        self.shared.schedule_after(delay, Box::new(callback))
    }

    /// Hands `failure` to the loop's unhandled-failure channel.
    pub fn report_unhandled(&self, failure: SharedError) -> Result<()> {
        self.shared.schedule(Job::Unhandled(failure))
    }

    pub fn is_closed(&self) -> bool {
        self.shared.is_closed()
    }
}

impl Clone for LoopHandle {
    fn clone(&self) -> Self {
        Self::new(Arc::clone(&self.shared))
    }
}

impl Drop for LoopHandle {
    fn drop(&mut self) {
        self.shared.release(&self.shared.handles);
    }
}

impl std::fmt::Debug for LoopHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoopHandle")
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Queues `callback` on the current thread's event loop for a later turn.
///
/// Callbacks run in FIFO order on the loop thread, never synchronously.
///
/// # Errors
///
/// - [`FiberError::NoEventLoop`] outside of an event loop
/// - [`FiberError::LoopClosed`] once the loop has shut down
pub fn run_later<F>(callback: F) -> Result<()>
where
    F: FnOnce() + Send + 'static,
{
    let shared = context::event_loop().ok_or(FiberError::NoEventLoop)?;
    shared.schedule(Job::Run(Box::new(callback)))
}

/// Queues `callback` on the current event loop once `delay` has elapsed.
pub fn run_after<F>(delay: Duration, callback: F) -> Result<()>
where
    F: FnOnce() + Send + 'static,
{
    let shared = context::event_loop().ok_or(FiberError::NoEventLoop)?;
    shared.schedule_after(delay, Box::new(callback))
}

/// Returns a handle to the current thread's event loop.
pub fn handle() -> Result<LoopHandle> {
    context::event_loop()
        .map(LoopHandle::new)
        .ok_or(FiberError::NoEventLoop)
}

/// Runs `f` on a default-configured event loop.
///
/// See [`EventLoop::block_on`].
pub fn block_on<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    EventLoop::new(&RuntimeConfig::default())?.block_on(f)
}
