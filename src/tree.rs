//! The arena-backed task tree: node storage, linking, readiness tracking.
//!
//! A [`Tree`] is the Rust analogue of the root context's task pool: every
//! task a run ever creates lives in `Tree::slots`, indexed by [`TaskId`].
//! Retiring a task clears its slot instead of freeing a pool, since nothing
//! else can reach a retired index once its parent has unlinked it.

use std::fmt;
use std::sync::Arc;

use crate::cancel::CancelFn;
use crate::error::TaskError;
use crate::handle::Handle;

/// Index into a [`Tree`]'s arena. Stable for the lifetime of the task it
/// names; never reused after the task retires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskId(pub(crate) usize);

impl TaskId {
    pub(crate) const ROOT: TaskId = TaskId(0);
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task#{}", self.0)
    }
}

pub(crate) type BoxedProcessFn<P, O, C, E> = Box<
    dyn for<'t> Fn(&mut Handle<'t, P, O, C, E>, &C, P, &CancelFn<E>) -> Result<Option<O>, TaskError<E>>
        + Send
        + Sync,
>;

pub(crate) type BoxedOutputFn<P, O, C, E> = Box<
    dyn for<'t> Fn(&mut Handle<'t, P, O, C, E>, O, &CancelFn<E>) -> Result<(), TaskError<E>>
        + Send
        + Sync,
>;

/// The process function and (optional) output function shared by a family of
/// "similar" tasks — one allocation, referenced by every sibling spawned via
/// [`crate::handle::Handle::spawn_similar`].
pub struct Callbacks<P, O, C, E: fmt::Display> {
    pub(crate) process_fn: BoxedProcessFn<P, O, C, E>,
    pub(crate) output_fn: Option<BoxedOutputFn<P, O, C, E>>,
}

impl<P, O, C, E: fmt::Display> Callbacks<P, O, C, E> {
    pub(crate) fn new(
        process_fn: BoxedProcessFn<P, O, C, E>,
        output_fn: Option<BoxedOutputFn<P, O, C, E>>,
    ) -> Self {
        Self {
            process_fn,
            output_fn,
        }
    }
}

/// A task's accumulated output, error and inherited partial output.
///
/// Exists only while one of these fields is non-trivial; `process` and
/// `drain` both collapse it back to `None` the moment it has nothing left to
/// carry, so a task with nothing to say costs nothing beyond its node.
pub(crate) struct Results<O, E: fmt::Display> {
    pub(crate) output: Option<O>,
    pub(crate) error: Option<TaskError<E>>,
    pub(crate) prior_parent_output: Option<O>,
}

impl<O, E: fmt::Display> Default for Results<O, E> {
    fn default() -> Self {
        Self {
            output: None,
            error: None,
            prior_parent_output: None,
        }
    }
}

impl<O, E: fmt::Display> Results<O, E> {
    fn is_trivial(&self) -> bool {
        self.output.is_none() && self.error.is_none() && self.prior_parent_output.is_none()
    }
}

pub(crate) struct Node<P, O, C, E: fmt::Display> {
    pub(crate) parent: Option<TaskId>,
    pub(crate) first_child: Option<TaskId>,
    pub(crate) last_child: Option<TaskId>,
    pub(crate) next_sibling: Option<TaskId>,
    pub(crate) sub_task_idx: usize,
    pub(crate) first_ready: Option<TaskId>,
    pub(crate) callbacks: Arc<Callbacks<P, O, C, E>>,
    pub(crate) process_baton: Option<P>,
    pub(crate) results: Option<Results<O, E>>,
}

enum Slot<P, O, C, E: fmt::Display> {
    Occupied(Node<P, O, C, E>),
    Retired,
}

/// The task tree for one `run()` invocation.
///
/// Not constructible or usable from outside this crate — callers only ever
/// see it indirectly, through [`crate::Handle`]. Public so [`TaskId`] and
/// [`Callbacks`] have somewhere to point.
pub struct Tree<P, O, C, E: fmt::Display> {
    slots: Vec<Slot<P, O, C, E>>,
}

impl<P, O, C, E: fmt::Display> Tree<P, O, C, E> {
    pub(crate) fn with_root(callbacks: Arc<Callbacks<P, O, C, E>>, baton: P) -> Self {
        let root = Node {
            parent: None,
            first_child: None,
            last_child: None,
            next_sibling: None,
            sub_task_idx: 0,
            first_ready: Some(TaskId::ROOT),
            callbacks,
            process_baton: Some(baton),
            results: None,
        };
        Tree {
            slots: vec![Slot::Occupied(root)],
        }
    }

    pub(crate) fn node(&self, id: TaskId) -> &Node<P, O, C, E> {
        match &self.slots[id.0] {
            Slot::Occupied(n) => n,
            Slot::Retired => panic!("use of retired {id}"),
        }
    }

    pub(crate) fn node_mut(&mut self, id: TaskId) -> &mut Node<P, O, C, E> {
        match &mut self.slots[id.0] {
            Slot::Occupied(n) => n,
            Slot::Retired => panic!("use of retired {id}"),
        }
    }

    pub(crate) fn is_processed(&self, id: TaskId) -> bool {
        self.node(id).process_baton.is_none()
    }

    pub(crate) fn ensure_results(&mut self, id: TaskId) -> &mut Results<O, E> {
        let node = self.node_mut(id);
        node.results.get_or_insert_with(Results::default)
    }

    pub(crate) fn collapse_results_if_trivial(&mut self, id: TaskId) {
        let trivial = self
            .node(id)
            .results
            .as_ref()
            .is_some_and(Results::is_trivial);
        if trivial {
            self.node_mut(id).results = None;
        }
    }

    /// Allocates a new task under `parent`, carrying `partial_output` to it
    /// as prior-parent output when the parent has an output function (dropped
    /// silently otherwise, since nothing would ever read it).
    pub(crate) fn spawn(
        &mut self,
        parent: TaskId,
        partial_output: Option<O>,
        callbacks: Arc<Callbacks<P, O, C, E>>,
        baton: P,
    ) -> TaskId {
        let id = TaskId(self.slots.len());
        self.slots.push(Slot::Occupied(Node {
            parent: Some(parent),
            first_child: None,
            last_child: None,
            next_sibling: None,
            sub_task_idx: 0,
            first_ready: None,
            callbacks,
            process_baton: Some(baton),
            results: None,
        }));
        if let Some(output) = partial_output {
            if self.node(parent).callbacks.output_fn.is_some() {
                self.ensure_results(id).prior_parent_output = Some(output);
            }
        }
        self.link(parent, id);
        id
    }

    /// Allocates a new task under `parent`, reusing `parent`'s callbacks —
    /// the "similar sibling" shortcut.
    pub(crate) fn spawn_similar(
        &mut self,
        parent: TaskId,
        partial_output: Option<O>,
        baton: P,
    ) -> TaskId {
        let callbacks = Arc::clone(&self.node(parent).callbacks);
        self.spawn(parent, partial_output, callbacks, baton)
    }

    /// Appends `child` to `parent`'s child list and propagates the
    /// first-ready pointer up the ancestor chain.
    fn link(&mut self, parent: TaskId, child: TaskId) {
        let idx = match self.node(parent).last_child {
            Some(last) => self.node(last).sub_task_idx + 1,
            None => 0,
        };
        self.node_mut(child).sub_task_idx = idx;

        if let Some(last) = self.node(parent).last_child {
            self.node_mut(last).next_sibling = Some(child);
        }
        self.node_mut(parent).last_child = Some(child);
        if self.node(parent).first_child.is_none() {
            self.node_mut(parent).first_child = Some(child);
        }
        self.node_mut(child).first_ready = Some(child);

        let mut current = child;
        let mut walk = Some(parent);
        while let Some(p) = walk {
            let should_update = match self.node(p).first_ready {
                None => true,
                Some(_) => self.first_ready_sub_idx(p) >= self.node(current).sub_task_idx,
            };
            if !should_update {
                break;
            }
            self.node_mut(p).first_ready = Some(child);
            current = p;
            walk = self.node(p).parent;
        }
    }

    /// The `sub_task_idx` of the nearest direct child of `task` that lies on
    /// the path to `task`'s first-ready descendant. Requires `task` to
    /// actually have a ready descendant.
    fn first_ready_sub_idx(&self, task: TaskId) -> usize {
        let mut sub = self
            .node(task)
            .first_ready
            .expect("first_ready_sub_idx called on a task with no ready descendant");
        debug_assert_ne!(sub, task, "task's first-ready points at itself, not a child");
        while self.node(sub).parent != Some(task) {
            sub = self
                .node(sub)
                .parent
                .expect("walked past the root looking for a direct child");
        }
        self.node(sub).sub_task_idx
    }

    /// The earliest task at or after `from` (walking `next_sibling`) with any
    /// ready descendant of its own.
    fn next_ready(&self, mut from: Option<TaskId>) -> Option<TaskId> {
        while let Some(id) = from {
            if self.node(id).first_ready.is_some() {
                return Some(id);
            }
            from = self.node(id).next_sibling;
        }
        None
    }

    /// Descends from the root via first-ready pointers to the task that is
    /// its own first-ready target — the next task due for processing, or
    /// `None` if nothing in the tree is ready.
    pub(crate) fn pick(&self) -> Option<TaskId> {
        let mut current = TaskId::ROOT;
        loop {
            match self.node(current).first_ready {
                Some(fr) if fr == current => return Some(current),
                Some(fr) => current = fr,
                None => return None,
            }
        }
    }

    /// Marks `task` as no longer ready (it is about to be processed) and
    /// re-derives every ancestor's `first_ready` that pointed at it.
    pub(crate) fn unready(&mut self, task: TaskId) {
        debug_assert_eq!(self.node(task).first_ready, Some(task));
        debug_assert!(self.node(task).first_child.is_none());
        self.node_mut(task).first_ready = None;

        let mut first_ready_found: Option<TaskId> = None;
        let mut current = task;
        loop {
            let parent = match self.node(current).parent {
                Some(p) => p,
                None => break,
            };
            if self.node(parent).first_ready != Some(task) {
                break;
            }
            if first_ready_found.is_none() {
                let next_sibling = self.node(current).next_sibling;
                if let Some(sibling) = self.next_ready(next_sibling) {
                    first_ready_found = self.node(sibling).first_ready;
                }
            }
            self.node_mut(parent).first_ready = first_ready_found;
            current = parent;
        }
    }

    /// Removes a fully-drained, childless task from its parent's child list
    /// and discards its slot. Tasks always retire in order — the one being
    /// retired is always still its parent's `first_child`.
    pub(crate) fn retire(&mut self, task: TaskId) {
        debug_assert!(self.node(task).first_ready.is_none());
        debug_assert!(self.node(task).first_child.is_none());
        if let Some(parent) = self.node(task).parent {
            debug_assert_eq!(
                self.node(parent).first_child,
                Some(task),
                "tasks must retire in pre-order"
            );
            let next = self.node(task).next_sibling;
            self.node_mut(parent).first_child = next;
            if self.node(parent).last_child == Some(task) {
                self.node_mut(parent).last_child = None;
            }
        }
        self.slots[task.0] = Slot::Retired;
    }
}
