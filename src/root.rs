//! The public entry point: configuring and running one task tree to completion.

use std::fmt;
use std::sync::Arc;

use tracing::debug;

use crate::cancel::CancelFn;
use crate::error::{EngineError, TaskError};
use crate::exec::{parallel, serial};
use crate::handle::Handle;
use crate::tree::{BoxedOutputFn, Callbacks, Tree};

/// How siblings are ordered when more than one is ready at once.
///
/// Only creation order is implemented today — the only ordering the task
/// tree itself tracks (`sub_task_idx`) — but the field exists so a future
/// comparator-based order doesn't need a breaking change to [`RunConfig`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[non_exhaustive]
pub enum SiblingOrder {
    #[default]
    CreationOrder,
}

/// Configuration for one [`run`] invocation.
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Number of worker threads. `0` or `1` selects the single-threaded
    /// reference loop; anything higher runs the worker pool.
    pub worker_count: usize,
    /// Reserved for future sibling-ordering strategies.
    pub sibling_order: SiblingOrder,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            worker_count: 0,
            sibling_order: SiblingOrder::default(),
        }
    }
}

/// Runs a root task — and everything it transitively spawns — to completion.
///
/// `process_fn`/`root_baton`/`output_fn` describe the root task exactly as
/// [`Handle::spawn`] describes any other. `context_ctor` builds the
/// per-worker thread context (called once, up front, in serial mode; once
/// per worker thread in parallel mode). `cancel_fn` is the polling predicate
/// passed down to every process and output function call.
#[allow(clippy::too_many_arguments)]
pub fn run<P, O, C, E, F, G, X, K>(
    config: RunConfig,
    root_baton: P,
    process_fn: F,
    output_fn: Option<G>,
    context_ctor: X,
    cancel_fn: K,
) -> Result<(), EngineError<E>>
where
    P: Send + 'static,
    O: Send + 'static,
    C: Send + 'static,
    E: fmt::Display + Send + 'static,
    F: for<'t> Fn(&mut Handle<'t, P, O, C, E>, &C, P, &CancelFn<E>) -> Result<Option<O>, TaskError<E>>
        + Send
        + Sync
        + 'static,
    G: for<'t> Fn(&mut Handle<'t, P, O, C, E>, O, &CancelFn<E>) -> Result<(), TaskError<E>>
        + Send
        + Sync
        + 'static,
    X: Fn() -> Result<C, TaskError<E>> + Send + Sync + 'static,
    K: Fn() -> Result<(), TaskError<E>> + Send + Sync + 'static,
{
    let output_fn: Option<BoxedOutputFn<P, O, C, E>> =
        output_fn.map(|f| Box::new(f) as BoxedOutputFn<P, O, C, E>);
    let callbacks = Arc::new(Callbacks::new(Box::new(process_fn), output_fn));
    let mut tree = Tree::with_root(callbacks, root_baton);
    let cancel: Arc<CancelFn<E>> = Arc::new(cancel_fn);

    debug!(worker_count = config.worker_count, "starting run");

    if config.worker_count <= 1 {
        let ctx = context_ctor().map_err(EngineError::from_process)?;
        serial::run(&mut tree, &ctx, cancel.as_ref())
    } else {
        parallel::run(tree, config.worker_count, Arc::new(context_ctor), cancel)
    }
}
