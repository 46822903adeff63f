use crate::fiber::FiberId;
use core_runtime::SharedError;
use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum FiberError {
    #[error("No event loop is running on this thread")]
    NoEventLoop,

    #[error("Not running inside a fiber")]
    NoFiber,

    #[error("Fiber {0} is already running")]
    AlreadyRunning(FiberId),

    #[error("Fiber {0} has already finished")]
    Finished(FiberId),

    #[error("Fiber {fiber} panicked: {message}")]
    Panicked { fiber: FiberId, message: String },

    #[error("Scheduled callback panicked: {0}")]
    CallbackPanicked(String),

    #[error("Fiber was abandoned by its event loop")]
    Abandoned,

    #[error("Fiber pool exhausted: {max} fibers are already alive")]
    PoolExhausted { max: usize },

    #[error("The event loop has shut down")]
    LoopClosed,

    #[error("Event loop stalled: the root fiber is suspended and nothing is left to resume it")]
    Stalled,

    #[error("Unhandled failure: {0}")]
    Unhandled(SharedError),

    #[error("Failed to start the fiber runtime: {0}")]
    Runtime(String),

    #[error(transparent)]
    Config(#[from] core_runtime::Error),
}

pub type Result<T> = std::result::Result<T, FiberError>;
