//! A parallel task execution engine: a tree of tasks where each task spawns
//! its own sub-tasks at process time, and where output is delivered to the
//! caller strictly in pre-order — depth-first, left-to-right — regardless of
//! how many worker threads actually ran the processing.
//!
//! This is the execution core underneath tree-shaped work such as a
//! directory walk, a recursive diff, or a report assembly pass: each task
//! knows how to do its own slice of work and, while doing it, decide what
//! further sub-tasks (if any) are needed, all while the caller sees results
//! stream out in a stable, deterministic order.
//!
//! ```ignore
//! use task_engine::root::{run, RunConfig};
//!
//! run(
//!     RunConfig::default(),
//!     root_baton,
//!     |handle, ctx, baton, cancel| { /* ... */ Ok(Some(output)) },
//!     Some(|handle, output, cancel| { /* ... */ Ok(()) }),
//!     || Ok(thread_context),
//!     task_engine::cancel::never,
//! )?;
//! ```

mod handle;

pub mod cancel;
pub mod error;
pub mod exec;
pub mod root;
pub mod tree;

pub use error::{EngineError, TaskError};
pub use handle::Handle;
pub use root::{run, RunConfig, SiblingOrder};
pub use tree::TaskId;
