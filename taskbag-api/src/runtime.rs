//! # Parallel Runtime Interface
//!
//! The six operations scripts reach through the `coordinator` handle. The
//! `taskbag` crate implements this trait; engines only forward calls to it.

use crate::context::ExecutionContext;
use crate::errors::RuntimeError;
use crate::value::Value;

/// Operations exposed to script code.
///
/// Every method may be called from the main context or re-entrantly from a
/// task running on a worker.
pub trait ParallelRuntime: Send + Sync {
    /// Enqueues `call_text` (e.g. `r = f(a, 1)`), snapshotting its named
    /// parameters out of `source`
    fn parallel(&self, source: &dyn ExecutionContext, call_text: &str) -> Result<(), RuntimeError>;

    /// Blocks until no queued or running task calls `function`
    fn join(&self, function: &str) -> Result<(), RuntimeError>;

    /// Blocks until the queue is empty and every worker is idle
    fn joinall(&self) -> Result<(), RuntimeError>;

    /// Enters the critical section named by `id`; not re-entrant
    fn acquire(&self, id: &Value) -> Result<(), RuntimeError>;

    /// Leaves the critical section named by `id`; ownership is not checked
    fn release(&self, id: &Value) -> Result<(), RuntimeError>;

    /// Resizes the worker pool and returns the resulting size.
    /// `0` or the current size leave the pool untouched.
    fn np(&self, count: usize) -> Result<usize, RuntimeError>;
}
