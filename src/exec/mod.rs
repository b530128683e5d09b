//! The execution loop: picking the next task, running its process function,
//! and draining the output it and its already-finished descendants produced.
//!
//! [`process_task`] and [`drain`] are shared between the serial reference
//! loop ([`serial`]) and the worker pool ([`parallel`]) — both just supply a
//! different [`TreeRef`], exclusive for the former, mutex-mediated for the
//! latter. The algorithm itself never changes with the threading mode.

pub mod parallel;
pub mod serial;

use std::fmt;

use tracing::{debug, warn};

use crate::cancel::CancelFn;
use crate::error::EngineError;
use crate::handle::{Handle, TreeRef};
use crate::tree::TaskId;

/// Runs `task`'s process function to completion and records its outcome.
///
/// The function itself runs with the tree unlocked (or, in the exclusive
/// case, simply with ordinary exclusive access) — only the brief moments
/// before and after, where the baton is taken and the results are written
/// back, touch the tree.
pub(crate) fn process_task<P, O, C, E>(
    mut tree: TreeRef<'_, P, O, C, E>,
    task: TaskId,
    ctx: &C,
    cancel: &CancelFn<E>,
) where
    P: Send + 'static,
    O: Send + 'static,
    E: fmt::Display + Send + 'static,
{
    debug!(%task, "processing task");
    let (callbacks, baton, has_output_fn) = tree.with(|t| {
        let callbacks = std::sync::Arc::clone(&t.node(task).callbacks);
        let baton = t
            .node_mut(task)
            .process_baton
            .take()
            .expect("process_task called on an already-processed task");
        let has_output_fn = callbacks.output_fn.is_some();
        (callbacks, baton, has_output_fn)
    });

    let mut handle = Handle { tree, current: task };
    let outcome = (callbacks.process_fn)(&mut handle, ctx, baton, cancel);
    let mut tree = handle.tree;

    tree.with(|t| {
        let results = t.ensure_results(task);
        match outcome {
            Ok(output) => {
                if has_output_fn {
                    results.output = output;
                }
            }
            Err(e) => results.error = Some(e),
        }
        t.collapse_results_if_trivial(task);
    });
}

/// Emits every output fragment that is now fully determined and prunes the
/// corresponding, now-finished prefix of the tree.
///
/// Starts at `current` (a task that has just finished processing, or whose
/// last pending child just retired) and walks forward in pre-order, stopping
/// either at the first not-yet-processed task (the new bookmark to return)
/// or once the whole tree has been consumed (`None`).
pub(crate) fn drain<P, O, C, E>(
    mut tree: TreeRef<'_, P, O, C, E>,
    mut current: Option<TaskId>,
    cancel: &CancelFn<E>,
) -> Result<Option<TaskId>, EngineError<E>>
where
    P: Send + 'static,
    O: Send + 'static,
    E: fmt::Display + Send + 'static,
{
    loop {
        let Some(id) = current else { return Ok(None) };
        if !tree.with(|t| t.is_processed(id)) {
            return Ok(Some(id));
        }

        let first_child = tree.with(|t| t.node(id).first_child);
        if let Some(first_child) = first_child {
            let prior = tree.with(|t| {
                t.node_mut(first_child)
                    .results
                    .as_mut()
                    .and_then(|r| r.prior_parent_output.take())
            });
            if let Some(prior) = prior {
                let callbacks = tree.with(|t| std::sync::Arc::clone(&t.node(id).callbacks));
                if callbacks.output_fn.is_some() {
                    let mut handle = Handle { tree, current: id };
                    let result = (callbacks.output_fn.as_ref().unwrap())(&mut handle, prior, cancel);
                    tree = handle.tree;
                    result.map_err(|e| {
                        let err = EngineError::from_output(e);
                        warn!(%id, error = %err, "output callback failed on prior-parent output");
                        err
                    })?;
                }
            }
            current = Some(first_child);
            continue;
        }

        let results = tree.with(|t| t.node_mut(id).results.take());
        if let Some(mut results) = results {
            if let Some(err) = results.error.take() {
                let err = EngineError::from_process(err);
                warn!(%id, error = %err, "task processing failed");
                return Err(err);
            }
            if let Some(output) = results.output.take() {
                let callbacks = tree.with(|t| std::sync::Arc::clone(&t.node(id).callbacks));
                if callbacks.output_fn.is_some() {
                    let mut handle = Handle { tree, current: id };
                    let result = (callbacks.output_fn.as_ref().unwrap())(&mut handle, output, cancel);
                    tree = handle.tree;
                    result.map_err(|e| {
                        let err = EngineError::from_output(e);
                        warn!(%id, error = %err, "output callback failed");
                        err
                    })?;
                }
            }
        }

        let (has_children, parent) =
            tree.with(|t| (t.node(id).first_child.is_some(), t.node(id).parent));
        if has_children {
            current = tree.with(|t| t.node(id).first_child);
        } else {
            tree.with(|t| t.retire(id));
            debug!(%id, "retired task");
            current = parent;
        }
    }
}
