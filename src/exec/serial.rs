//! The single-threaded reference execution loop.
//!
//! This is the semantics every other execution mode is tested against: pick
//! the next ready task, unready it, process it, drain whatever output that
//! unblocked, repeat until the tree is empty or an error surfaces.

use std::fmt;

use tracing::debug;

use crate::cancel::CancelFn;
use crate::error::EngineError;
use crate::exec::{drain, process_task};
use crate::handle::TreeRef;
use crate::tree::{TaskId, Tree};

pub(crate) fn run<P, O, C, E>(
    tree: &mut Tree<P, O, C, E>,
    ctx: &C,
    cancel: &CancelFn<E>,
) -> Result<(), EngineError<E>>
where
    P: Send + 'static,
    O: Send + 'static,
    E: fmt::Display + Send + 'static,
{
    let mut current = Some(TaskId::ROOT);
    while let Some(task) = current {
        debug_assert_eq!(
            Some(task),
            tree.pick(),
            "drain bookmark diverged from the first-ready pick"
        );
        tree.unready(task);
        process_task(TreeRef::Exclusive(tree), task, ctx, cancel);
        current = drain(TreeRef::Exclusive(tree), Some(task), cancel)?;
    }
    debug!("serial run complete");
    Ok(())
}
