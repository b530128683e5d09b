//! The capability a process or output function is given to spawn sub-tasks.

use std::fmt;
use std::sync::{Arc, Mutex};

use crate::cancel::CancelFn;
use crate::error::TaskError;
use crate::tree::{BoxedOutputFn, Callbacks, TaskId, Tree};

/// Either direct, exclusive access to the tree (the serial loop, where the
/// caller already holds the only reference) or access mediated by the tree
/// mutex (the worker pool, where a process function runs outside the lock
/// but still needs to link new tasks under it).
pub(crate) enum TreeRef<'t, P, O, C, E: fmt::Display> {
    Exclusive(&'t mut Tree<P, O, C, E>),
    Shared(&'t Mutex<Tree<P, O, C, E>>),
}

impl<'t, P, O, C, E: fmt::Display> TreeRef<'t, P, O, C, E> {
    pub(crate) fn with<R>(&mut self, f: impl FnOnce(&mut Tree<P, O, C, E>) -> R) -> R {
        match self {
            TreeRef::Exclusive(tree) => f(tree),
            TreeRef::Shared(mutex) => {
                let mut guard = mutex.lock().unwrap_or_else(|p| p.into_inner());
                f(&mut guard)
            }
        }
    }
}

/// Passed to every process and output function call. The only way to spawn
/// sub-tasks — `spawn` for a fresh process/output pair, `spawn_similar` to
/// reuse the calling task's own callbacks.
pub struct Handle<'t, P, O, C, E: fmt::Display> {
    pub(crate) tree: TreeRef<'t, P, O, C, E>,
    pub(crate) current: TaskId,
}

impl<'t, P, O, C, E> Handle<'t, P, O, C, E>
where
    P: Send + 'static,
    O: Send + 'static,
    E: fmt::Display + Send + 'static,
{
    /// The task this callback is running for.
    pub fn id(&self) -> TaskId {
        self.current
    }

    /// Spawns a new sub-task of the current one, with its own process
    /// function and optional output function.
    ///
    /// `partial_output` is output already known before `baton` starts
    /// processing; it is emitted ahead of the new task's own output, in the
    /// position the new task occupies among its siblings.
    pub fn spawn<F, G>(
        &mut self,
        partial_output: Option<O>,
        baton: P,
        process_fn: F,
        output_fn: Option<G>,
    ) -> TaskId
    where
        F: for<'u> Fn(&mut Handle<'u, P, O, C, E>, &C, P, &CancelFn<E>) -> Result<Option<O>, TaskError<E>>
            + Send
            + Sync
            + 'static,
        G: for<'u> Fn(&mut Handle<'u, P, O, C, E>, O, &CancelFn<E>) -> Result<(), TaskError<E>>
            + Send
            + Sync
            + 'static,
    {
        let output_fn: Option<BoxedOutputFn<P, O, C, E>> =
            output_fn.map(|f| Box::new(f) as BoxedOutputFn<P, O, C, E>);
        let callbacks = Arc::new(Callbacks::new(Box::new(process_fn), output_fn));
        let current = self.current;
        self.tree
            .with(|tree| tree.spawn(current, partial_output, callbacks, baton))
    }

    /// Spawns a new sub-task that shares this task's process and output
    /// functions — the "similar sibling" shortcut for fan-out over a single
    /// kind of work.
    pub fn spawn_similar(&mut self, partial_output: Option<O>, baton: P) -> TaskId {
        let current = self.current;
        self.tree
            .with(|tree| tree.spawn_similar(current, partial_output, baton))
    }
}
