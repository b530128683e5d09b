//! The cancellation predicate contract shared by process and output functions.

use std::fmt;

use crate::error::TaskError;

/// A polling predicate process and output functions call at their own
/// checkpoints. `Ok(())` means keep going; `Err` means stop, and the engine
/// treats the returned error exactly like any other task error once it
/// surfaces during drain.
///
/// The engine itself never calls this — it has no suspension points of its
/// own (see the CONCURRENCY & RESOURCE MODEL notes). Callbacks call it and
/// propagate the result with `?`.
pub type CancelFn<E> = dyn Fn() -> Result<(), TaskError<E>> + Send + Sync;

/// A cancel function that never cancels, for callers with no external
/// cancellation source.
pub fn never<E: fmt::Display>() -> Result<(), TaskError<E>> {
    Ok(())
}
