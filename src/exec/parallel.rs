//! The worker-pool execution model.
//!
//! A coordinator thread drains output — and only the coordinator ever does,
//! so output ordering is exactly as in the serial loop — while a pool of
//! worker threads pick ready tasks, unready them, and run their process
//! functions off the tree lock. Linking, unreadying and results bookkeeping
//! all happen under one `Mutex<Tree>`, matching the "same critical section"
//! requirement for tree mutation; processing itself runs unlocked.

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};

use tracing::debug;

use crate::cancel::CancelFn;
use crate::error::{EngineError, TaskError};
use crate::exec::{drain, process_task};
use crate::handle::TreeRef;
use crate::tree::{TaskId, Tree};

struct Shared<P, O, C, E: fmt::Display> {
    tree: Mutex<Tree<P, O, C, E>>,
    cv: Condvar,
    inflight: AtomicUsize,
    worker_error: Mutex<Option<EngineError<E>>>,
}

impl<P, O, C, E: fmt::Display> Shared<P, O, C, E> {
    fn fail(&self, err: EngineError<E>) {
        let mut slot = self.worker_error.lock().unwrap_or_else(|p| p.into_inner());
        if slot.is_none() {
            *slot = Some(err);
        }
        self.cv.notify_all();
    }

    fn has_failed(&self) -> bool {
        self.worker_error
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .is_some()
    }
}

pub(crate) fn run<P, O, C, E>(
    tree: Tree<P, O, C, E>,
    worker_count: usize,
    context_ctor: Arc<dyn Fn() -> Result<C, TaskError<E>> + Send + Sync>,
    cancel: Arc<CancelFn<E>>,
) -> Result<(), EngineError<E>>
where
    P: Send + 'static,
    O: Send + 'static,
    C: Send + 'static,
    E: fmt::Display + Send + 'static,
{
    let shared = Shared {
        tree: Mutex::new(tree),
        cv: Condvar::new(),
        inflight: AtomicUsize::new(0),
        worker_error: Mutex::new(None),
    };

    std::thread::scope(|scope| {
        for _ in 0..worker_count {
            let shared = &shared;
            let context_ctor = Arc::clone(&context_ctor);
            let cancel = Arc::clone(&cancel);
            scope.spawn(move || {
                let ctx = match context_ctor() {
                    Ok(ctx) => ctx,
                    Err(e) => {
                        shared.fail(EngineError::from_process(e));
                        return;
                    }
                };
                worker_loop(shared, &ctx, cancel.as_ref());
            });
        }

        coordinator_loop(&shared, cancel.as_ref())
    })
}

fn worker_loop<P, O, C, E>(shared: &Shared<P, O, C, E>, ctx: &C, cancel: &CancelFn<E>)
where
    P: Send + 'static,
    O: Send + 'static,
    E: fmt::Display + Send + 'static,
{
    loop {
        let task = {
            let mut guard = shared.tree.lock().unwrap_or_else(|p| p.into_inner());
            loop {
                if shared.has_failed() {
                    return;
                }
                if let Some(t) = guard.pick() {
                    guard.unready(t);
                    shared.inflight.fetch_add(1, Ordering::SeqCst);
                    break t;
                }
                if shared.inflight.load(Ordering::SeqCst) == 0 {
                    shared.cv.notify_all();
                    return;
                }
                guard = shared.cv.wait(guard).unwrap_or_else(|p| p.into_inner());
            }
        };

        process_task(TreeRef::Shared(&shared.tree), task, ctx, cancel);
        shared.inflight.fetch_sub(1, Ordering::SeqCst);
        shared.cv.notify_all();
    }
}

fn coordinator_loop<P, O, C, E>(
    shared: &Shared<P, O, C, E>,
    cancel: &CancelFn<E>,
) -> Result<(), EngineError<E>>
where
    P: Send + 'static,
    O: Send + 'static,
    E: fmt::Display + Send + 'static,
{
    let mut current = Some(TaskId::ROOT);
    loop {
        if let Some(err) = take_worker_error(shared) {
            return Err(err);
        }
        let Some(task) = current else { break };

        {
            let mut guard = shared.tree.lock().unwrap_or_else(|p| p.into_inner());
            while !guard.is_processed(task) && !shared.has_failed() {
                guard = shared.cv.wait(guard).unwrap_or_else(|p| p.into_inner());
            }
        }
        if let Some(err) = take_worker_error(shared) {
            return Err(err);
        }

        current = drain(TreeRef::Shared(&shared.tree), Some(task), cancel)?;
    }
    debug!("parallel run complete");
    Ok(())
}

fn take_worker_error<P, O, C, E: fmt::Display>(shared: &Shared<P, O, C, E>) -> Option<EngineError<E>> {
    shared
        .worker_error
        .lock()
        .unwrap_or_else(|p| p.into_inner())
        .take()
}
