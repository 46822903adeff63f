use crate::failure::{AggregateFailure, LinkedFailure};
use crate::future::FutureId;
use crate::registry::LeakReport;
use core_fiber::FiberError;
use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum FutureError {
    #[error("Future {0} has already been resolved")]
    ConcurrentResolution(FutureId),

    #[error("A future cannot be rejected with a failure whose message is empty")]
    EmptyFailure,

    #[error("Future {0} is not resolved yet")]
    NotResolved(FutureId),

    #[error("Future {id} resolves to `{actual}`, not `{expected}`")]
    TypeMismatch {
        id: FutureId,
        expected: &'static str,
        actual: &'static str,
    },

    #[error("Callback sits at argument {max}, but {got} arguments were passed")]
    ArgumentCountExceeded { max: usize, got: usize },

    #[error("Can only wait on futures from inside a fiber")]
    NoThreadContext,

    #[error(transparent)]
    Failed(LinkedFailure),

    #[error(transparent)]
    Aggregate(AggregateFailure),

    #[error(transparent)]
    Outstanding(LeakReport),

    #[error(transparent)]
    Fiber(#[from] FiberError),
}

impl FutureError {
    /// The single failure behind a `Failed` error, if that is what this is.
    pub fn as_failure(&self) -> Option<&crate::Failure> {
        match self {
            FutureError::Failed(linked) => Some(linked.failure()),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, FutureError>;
