//! Closed error sum for the task engine (see the ERROR HANDLING DESIGN notes).

use std::fmt;
use thiserror::Error;

/// What a process or output function may return instead of success.
///
/// Distinct from [`EngineError`]: this is the type callbacks deal in, before
/// the engine has decided whether a given error came from processing or from
/// output.
#[derive(Debug, Error)]
pub enum TaskError<E: fmt::Display> {
    /// Returned by the cancellation predicate (or propagated from it) to
    /// mean the run should stop.
    #[error("cancelled")]
    Cancelled,
    /// Any other, caller-domain error.
    #[error("{0}")]
    Err(E),
}

impl<E: fmt::Display> TaskError<E> {
    pub fn cancelled() -> Self {
        TaskError::Cancelled
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, TaskError::Cancelled)
    }
}

/// The error `run()` returns.
///
/// Cancellation, a process-function error and an output-function error are
/// kept distinct so callers can tell which phase failed; an internal
/// invariant violation is reserved for defects in this crate itself rather
/// than anything a caller can trigger.
#[derive(Debug, Error)]
pub enum EngineError<E: fmt::Display> {
    #[error("run was cancelled")]
    Cancelled,
    #[error("task processing failed: {0}")]
    Process(E),
    #[error("output callback failed: {0}")]
    Output(E),
    #[error("task engine invariant violated: {0}")]
    Invariant(&'static str),
}

impl<E: fmt::Display> EngineError<E> {
    pub(crate) fn from_process(err: TaskError<E>) -> Self {
        match err {
            TaskError::Cancelled => EngineError::Cancelled,
            TaskError::Err(e) => EngineError::Process(e),
        }
    }

    pub(crate) fn from_output(err: TaskError<E>) -> Self {
        match err {
            TaskError::Cancelled => EngineError::Cancelled,
            TaskError::Err(e) => EngineError::Output(e),
        }
    }
}
