//! Cooperative fibers.
//!
//! A [`Fiber`] is a sequential body of code that can suspend itself with
//! [`yield_now`] and be resumed with [`Fiber::run`]. Each fiber is backed by a
//! thread from the Tokio blocking pool, but control is handed over explicitly:
//! `run` blocks its caller until the fiber yields or finishes, and a yielding
//! fiber blocks until somebody runs it again. Exactly one of all these threads
//! makes progress at any instant, which gives fibers the scheduling guarantees
//! of a single-threaded runtime.
//!
//! ```ignore
//! let fiber = Fiber::new(|| {
//!     step_one();
//!     core_fiber::yield_now()?; // back to whoever called run()
//!     step_two();
//! })?;
//! fiber.run()?; // executes step_one
//! fiber.run()?; // executes step_two
//! ```

use crate::context::{self, Context};
use crate::error::{FiberError, Result};
use crate::event_loop::LoopShared;
use crate::sync::{lock, mpsc, oneshot};
use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tracing::trace;

static NEXT_FIBER_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique fiber identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FiberId(u64);

impl FiberId {
    fn next() -> Self {
        Self(NEXT_FIBER_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for FiberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Lifecycle of a fiber.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FiberState {
    /// Constructed, body not started.
    Created,
    /// Holding the baton.
    Running,
    /// Parked in [`yield_now`], waiting for [`Fiber::run`].
    Suspended,
    /// Body returned or panicked, or the fiber was discarded unstarted.
    Finished,
}

/// Signal delivered to a suspended fiber.
#[derive(Debug)]
pub(crate) enum Resume {
    Continue,
    Abandon,
}

/// Signal delivered back to whoever ran the fiber.
#[derive(Debug)]
enum Handback {
    Yielded,
    Finished,
    Panicked(String),
}

type Body = Box<dyn FnOnce() + Send + 'static>;

struct Control {
    state: FiberState,
    handback: Option<oneshot::Sender<Handback>>,
    resume_rx: Option<mpsc::UnboundedReceiver<Resume>>,
}

pub(crate) struct FiberInner {
    id: FiberId,
    event_loop: Arc<LoopShared>,
    control: Mutex<Control>,
    body: Mutex<Option<Body>>,
    resume_tx: mpsc::UnboundedSender<Resume>,
    /// Holds one of the loop's `max_fibers` slots until the fiber finishes.
    admitted: AtomicBool,
}

impl FiberInner {
    fn retire(&self) {
        if self.admitted.swap(false, Ordering::SeqCst) {
            self.event_loop.retire_fiber();
        }
    }
}

impl Drop for FiberInner {
    fn drop(&mut self) {
        self.retire();
    }
}

/// Handle to a cooperative fiber. Clones refer to the same fiber.
#[derive(Clone)]
pub struct Fiber {
    inner: Arc<FiberInner>,
}

impl fmt::Debug for Fiber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Fiber")
            .field("id", &self.inner.id)
            .field("state", &self.state())
            .finish()
    }
}

impl Fiber {
    /// Creates a fiber that will execute `body` when first run.
    ///
    /// # Errors
    ///
    /// - [`FiberError::NoEventLoop`] outside of an event loop
    /// - [`FiberError::LoopClosed`] once the loop has shut down
    /// - [`FiberError::PoolExhausted`] while `max_fibers` fibers are alive;
    ///   a fiber stops counting once it finishes or is dropped unstarted
    pub fn new<F>(body: F) -> Result<Self>
    where
        F: FnOnce() + Send + 'static,
    {
        let event_loop = context::event_loop().ok_or(FiberError::NoEventLoop)?;
        if event_loop.is_closed() {
            return Err(FiberError::LoopClosed);
        }
        event_loop.admit_fiber()?;

        let (resume_tx, resume_rx) = mpsc::unbounded_channel();
        let inner = Arc::new(FiberInner {
            id: FiberId::next(),
            event_loop,
            control: Mutex::new(Control {
                state: FiberState::Created,
                handback: None,
                resume_rx: Some(resume_rx),
            }),
            body: Mutex::new(Some(Box::new(body))),
            resume_tx,
            admitted: AtomicBool::new(true),
        });
        inner.event_loop.track(&inner);

        trace!(fiber = %inner.id, "fiber created");
        Ok(Self { inner })
    }

    pub(crate) fn from_inner(inner: Arc<FiberInner>) -> Self {
        Self { inner }
    }

    pub fn id(&self) -> FiberId {
        self.inner.id
    }

    pub fn state(&self) -> FiberState {
        lock(&self.inner.control).state
    }

    pub fn is_finished(&self) -> bool {
        self.state() == FiberState::Finished
    }

    /// Starts or resumes the fiber and blocks until it yields or finishes.
    ///
    /// # Errors
    ///
    /// - [`FiberError::AlreadyRunning`] if the fiber holds the baton
    /// - [`FiberError::Finished`] if its body has already completed
    /// - [`FiberError::Panicked`] if the body panicked during this run
    /// - [`FiberError::LoopClosed`] when starting after loop shutdown
    pub fn run(&self) -> Result<()> {
        self.resume_with(Resume::Continue)
    }

    /// Resumes a suspended fiber with the abandon signal so it can unwind.
    /// An unstarted fiber is discarded without running its body.
    pub(crate) fn abandon(&self) -> Result<()> {
        self.resume_with(Resume::Abandon)
    }

    fn resume_with(&self, signal: Resume) -> Result<()> {
        let id = self.inner.id;
        let (sender, receiver) = oneshot::channel();

        {
            let mut control = lock(&self.inner.control);
            let state = control.state;
            match state {
                FiberState::Running => return Err(FiberError::AlreadyRunning(id)),
                FiberState::Finished => return Err(FiberError::Finished(id)),
                FiberState::Created => {
                    if matches!(signal, Resume::Abandon) {
                        control.state = FiberState::Finished;
                        drop(control);
                        drop(lock(&self.inner.body).take());
                        self.inner.retire();
                        trace!(fiber = %id, "unstarted fiber discarded");
                        return Ok(());
                    }
                    if self.inner.event_loop.is_closed() {
                        return Err(FiberError::LoopClosed);
                    }

                    control.state = FiberState::Running;
                    control.handback = Some(sender);
                    let resume_rx = control.resume_rx.take();
                    let inner = Arc::clone(&self.inner);
                    self.inner
                        .event_loop
                        .runtime()
                        .spawn_blocking(move || fiber_main(inner, resume_rx));
                }
                FiberState::Suspended => {
                    control.state = FiberState::Running;
                    control.handback = Some(sender);
                    if self.inner.resume_tx.send(signal).is_err() {
                        control.state = FiberState::Finished;
                        control.handback = None;
                        return Err(FiberError::Finished(id));
                    }
                    trace!(fiber = %id, "fiber resumed");
                }
            }
        }

        match receiver.blocking_recv() {
            Ok(Handback::Yielded) | Ok(Handback::Finished) => Ok(()),
            Ok(Handback::Panicked(message)) => Err(FiberError::Panicked { fiber: id, message }),
            Err(_) => Err(FiberError::Finished(id)),
        }
    }
}

fn fiber_main(inner: Arc<FiberInner>, resume_rx: Option<mpsc::UnboundedReceiver<Resume>>) {
    let id = inner.id;
    let body = lock(&inner.body).take();

    let outcome = {
        let fiber = Fiber::from_inner(Arc::clone(&inner));
        let _context = context::enter(Context::fiber(
            Arc::clone(&inner.event_loop),
            fiber,
            resume_rx,
        ));
        trace!(fiber = %id, "fiber started");
        match body {
            Some(body) => panic::catch_unwind(AssertUnwindSafe(body)),
            None => Ok(()),
        }
    };

    let handback = match outcome {
        Ok(()) => Handback::Finished,
        Err(payload) => Handback::Panicked(panic_message(payload.as_ref())),
    };
    trace!(fiber = %id, ?handback, "fiber finished");

    let sender = {
        let mut control = lock(&inner.control);
        control.state = FiberState::Finished;
        control.handback.take()
    };
    inner.retire();
    if let Some(sender) = sender {
        let _ = sender.send(handback);
    }
}

/// Returns the fiber running on this thread, if any.
pub fn current() -> Option<Fiber> {
    context::fiber()
}

/// Suspends the current fiber and hands control back to whoever ran it.
///
/// Returns once another piece of code calls [`Fiber::run`] on this fiber.
///
/// # Errors
///
/// - [`FiberError::NoFiber`] when called outside a fiber
/// - [`FiberError::Abandoned`] when the event loop shut down while (or
///   before) the fiber was suspended; the fiber should unwind and return
pub fn yield_now() -> Result<()> {
    let fiber = current().ok_or(FiberError::NoFiber)?;
    if fiber.inner.event_loop.is_closed() {
        return Err(FiberError::Abandoned);
    }

    {
        let mut control = lock(&fiber.inner.control);
        control.state = FiberState::Suspended;
        if let Some(handback) = control.handback.take() {
            let _ = handback.send(Handback::Yielded);
        }
    }
    trace!(fiber = %fiber.id(), "fiber suspended");
    drop(fiber);

    match context::with_resume(|resume| resume.blocking_recv()) {
        Some(Some(Resume::Continue)) => Ok(()),
        Some(Some(Resume::Abandon)) | Some(None) => Err(FiberError::Abandoned),
        None => Err(FiberError::NoFiber),
    }
}

/// Renders a panic payload the way the default panic hook does.
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "Box<dyn Any>".to_string()
    }
}
