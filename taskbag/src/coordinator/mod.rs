//! # Coordinator
//!
//! Owner of the worker pool, the shared task queue, the critical section
//! registry and the coordinator-wide execution lock.
//!
//! ## Key Concepts
//! - [`Coordinator`]: the handle the host keeps; dropping it shuts the pool
//!   down
//! - [`Core`]: the shared state; it implements [`ParallelRuntime`] and is
//!   what execution contexts reach when a script calls `coordinator:*`
//!
//! ## Re-entrancy
//! Every operation may be called from the main context or from a task
//! running on a worker. `join` and `joinall` never wait on the worker they
//! are called from. `np` is rejected on worker threads.
//!
//! ## Example
//! ```no_run
//! use std::sync::Arc;
//! use taskbag::{Coordinator, CoordinatorConfig, NativeEngine};
//!
//! let engine = Arc::new(NativeEngine::new());
//! let coordinator = Coordinator::new(engine, CoordinatorConfig::default()).unwrap();
//! coordinator.parallel("r = work(x)").unwrap();
//! coordinator.joinall().unwrap();
//! ```

pub mod state;
pub mod sections;

use std::sync::Arc;

use taskbag_api::{ExecutionContext, ParallelRuntime, RuntimeError, ScriptEngine, Value};
use uuid::Uuid;

use crate::error::CoordinatorError;
use crate::config::CoordinatorConfig;

pub use self::state::{Core, CoordinatorMetrics};
pub use self::sections::CriticalSections;

/// Handle to a running worker pool.
#[derive(Debug)]
pub struct Coordinator {
    core: Arc<Core>,
}

impl Coordinator {
    /// Creates a main context from `engine` and starts the pool
    pub fn new(engine: Arc<dyn ScriptEngine>, config: CoordinatorConfig) -> Result<Self, CoordinatorError> {
        config.validate()?;
        let main: Arc<dyn ExecutionContext> = Arc::from(engine.create_context()?);
        Self::with_main_context(engine, main, config)
    }

    /// Starts the pool around an existing main context. Worker contexts are
    /// spawned from `main`.
    pub fn with_main_context(
        engine: Arc<dyn ScriptEngine>,
        main: Arc<dyn ExecutionContext>,
        config: CoordinatorConfig,
    ) -> Result<Self, CoordinatorError> {
        config.validate()?;
        let core = Core::start(engine, main, config)?;
        Ok(Self { core })
    }

    pub fn id(&self) -> Uuid {
        self.core.id()
    }

    pub fn main_context(&self) -> Arc<dyn ExecutionContext> {
        self.core.main_context_arc()
    }

    /// The runtime scripts reach through `coordinator:*`
    pub fn runtime(&self) -> Arc<dyn ParallelRuntime> {
        self.core.clone()
    }

    /// Enqueues `call_text`, snapshotting parameters from the main context
    pub fn parallel(&self, call_text: &str) -> Result<(), RuntimeError> {
        self.core.parallel(self.core.main_context(), call_text)
    }

    /// Enqueues `call_text`, snapshotting parameters from `source`
    pub fn parallel_from(&self, source: &dyn ExecutionContext, call_text: &str) -> Result<(), RuntimeError> {
        self.core.parallel(source, call_text)
    }

    pub fn join(&self, function: &str) -> Result<(), RuntimeError> {
        self.core.join(function)
    }

    pub fn joinall(&self) -> Result<(), RuntimeError> {
        self.core.joinall()
    }

    pub fn acquire(&self, id: impl Into<Value>) -> Result<(), RuntimeError> {
        self.core.acquire(&id.into())
    }

    pub fn release(&self, id: impl Into<Value>) -> Result<(), RuntimeError> {
        self.core.release(&id.into())
    }

    /// Resizes the pool; `0` only reports the current size
    pub fn np(&self, count: usize) -> Result<usize, RuntimeError> {
        self.core.np(count)
    }

    pub fn pool_size(&self) -> usize {
        self.core.pool_size()
    }

    pub fn queue_len(&self) -> usize {
        self.core.queue().len()
    }

    pub fn busy_workers(&self) -> usize {
        self.core.busy_workers()
    }

    pub fn metrics(&self) -> CoordinatorMetrics {
        self.core.metrics()
    }

    pub fn shutdown(&self) {
        self.core.shutdown();
    }
}

impl Drop for Coordinator {
    fn drop(&mut self) {
        self.core.shutdown();
    }
}
