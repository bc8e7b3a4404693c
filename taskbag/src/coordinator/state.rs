use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use taskbag_api::{ExecutionContext, ParallelRuntime, RuntimeError, ScriptEngine, ScriptError, Value};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::CoordinatorConfig;
use crate::coordinator::sections::CriticalSections;
use crate::scheduler::worker::PrivateContext;
use crate::scheduler::{Activity, TaskQueue, WorkerPool, WorkerUnit};
use crate::task::{CallSpec, TaskDescriptor};

/// Point-in-time view of a coordinator
#[derive(Debug, Clone, PartialEq)]
pub struct CoordinatorMetrics {
    pub id: Uuid,
    /// Worker units alive right now
    pub pool_size: usize,
    pub queue_length: usize,
    pub busy_workers: usize,
    /// Function names being executed right now
    pub executing: Vec<String>,
    pub critical_sections: usize,
    pub tasks_submitted: u64,
    pub tasks_completed: u64,
    pub tasks_failed: u64,
    pub is_shut_down: bool,
}

/// State shared by the coordinator handle, its worker threads and every
/// context bound to it.
pub struct Core {
    id: Uuid,
    this: Weak<Core>,
    config: CoordinatorConfig,
    engine: Arc<dyn ScriptEngine>,
    main: Arc<dyn ExecutionContext>,
    queue: TaskQueue,
    sections: CriticalSections,
    execution_lock: Mutex<()>,
    pool: Mutex<WorkerPool>,
    pool_size: AtomicUsize,
    activity: Activity,
    shut_down: AtomicBool,
    tasks_submitted: AtomicU64,
    tasks_completed: AtomicU64,
    tasks_failed: AtomicU64,
}

impl fmt::Debug for Core {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Core")
            .field("id", &self.id)
            .field("engine", &self.engine.name())
            .field("main", &self.main.id())
            .field("pool_size", &self.pool_size())
            .field("queue", &self.queue)
            .field("sections", &self.sections)
            .finish()
    }
}

impl Core {
    /// Builds the shared state, binds the main context to it and starts
    /// `config.pool_size` workers.
    pub(crate) fn start(
        engine: Arc<dyn ScriptEngine>,
        main: Arc<dyn ExecutionContext>,
        config: CoordinatorConfig,
    ) -> Result<Arc<Self>, RuntimeError> {
        let pool_size = config.pool_size;
        let core = Arc::new_cyclic(|this| Core {
            id: Uuid::new_v4(),
            this: this.clone(),
            config,
            engine,
            main,
            queue: TaskQueue::new(),
            sections: CriticalSections::new(),
            execution_lock: Mutex::new(()),
            pool: Mutex::new(WorkerPool::new()),
            pool_size: AtomicUsize::new(pool_size),
            activity: Activity::new(),
            shut_down: AtomicBool::new(false),
            tasks_submitted: AtomicU64::new(0),
            tasks_completed: AtomicU64::new(0),
            tasks_failed: AtomicU64::new(0),
        });

        core.main.bind_runtime(core.runtime_ref());
        if let Err(err) = core.spawn_workers(pool_size) {
            core.shutdown();
            return Err(err);
        }

        info!(
            coordinator = %core.id,
            engine = core.engine.name(),
            pool_size,
            "Coordinator started"
        );
        Ok(core)
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    pub fn main_context(&self) -> &dyn ExecutionContext {
        self.main.as_ref()
    }

    pub(crate) fn main_context_arc(&self) -> Arc<dyn ExecutionContext> {
        Arc::clone(&self.main)
    }

    pub fn queue(&self) -> &TaskQueue {
        &self.queue
    }

    pub fn sections(&self) -> &CriticalSections {
        &self.sections
    }

    pub fn activity(&self) -> &Activity {
        &self.activity
    }

    /// Desired number of workers
    pub fn pool_size(&self) -> usize {
        self.pool_size.load(Ordering::SeqCst)
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::SeqCst)
    }

    /// Serializes writes into the main context
    pub(crate) fn execution_lock(&self) -> MutexGuard<'_, ()> {
        self.execution_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub(crate) fn pool(&self) -> MutexGuard<'_, WorkerPool> {
        self.pool.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub(crate) fn record_completion(&self) {
        self.tasks_completed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_failure(&self) {
        self.tasks_failed.fetch_add(1, Ordering::Relaxed);
    }

    fn runtime_ref(&self) -> Weak<dyn ParallelRuntime> {
        self.this.clone()
    }

    /// Spawns a context from the main context, binds it to this runtime and
    /// registers it with the engine
    pub(crate) fn spawn_private_context(&self) -> Result<PrivateContext, ScriptError> {
        let context = self.engine.spawn_context(self.main.as_ref())?;
        context.bind_runtime(self.runtime_ref());
        let registration = self.engine.register(context.as_ref());
        Ok(PrivateContext::new(context, registration))
    }

    fn spawn_workers(&self, count: usize) -> Result<(), RuntimeError> {
        let core = self.this.upgrade().ok_or(RuntimeError::ShutDown)?;
        for id in 0..count {
            let worker = WorkerUnit::spawn(id, Arc::clone(&core))?;
            self.pool().push(worker);
        }
        crate::log_pool!(self.id, "spawned", count);
        Ok(())
    }

    fn ensure_running(&self) -> Result<(), RuntimeError> {
        if self.is_shut_down() {
            return Err(RuntimeError::ShutDown);
        }
        Ok(())
    }

    /// Starts idle workers while tasks are queued
    fn drive(&self) -> usize {
        let pending = self.queue.len();
        if pending == 0 {
            return 0;
        }
        self.pool().start_idle(pending)
    }

    pub fn busy_workers(&self) -> usize {
        self.pool().busy_workers()
    }

    pub fn metrics(&self) -> CoordinatorMetrics {
        let pool = self.pool().metrics();
        CoordinatorMetrics {
            id: self.id,
            pool_size: pool.pool_size,
            queue_length: self.queue.len(),
            busy_workers: pool.busy_workers,
            executing: pool.executing,
            critical_sections: self.sections.len(),
            tasks_submitted: self.tasks_submitted.load(Ordering::Relaxed),
            tasks_completed: self.tasks_completed.load(Ordering::Relaxed),
            tasks_failed: self.tasks_failed.load(Ordering::Relaxed),
            is_shut_down: self.is_shut_down(),
        }
    }

    /// Stops every worker after its current run and joins its thread.
    /// Tasks still queued are discarded.
    pub fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::SeqCst) {
            return;
        }
        let workers = self.pool().take_all();
        let count = workers.len();
        for worker in workers {
            worker.stop();
        }
        self.activity.notify();

        let pending = self.queue.len();
        if pending > 0 {
            warn!(coordinator = %self.id, pending, "Coordinator shut down with tasks still queued");
        }
        crate::log_pool!(self.id, "stopped", count);
        info!(coordinator = %self.id, "Coordinator shut down");
    }
}

impl ParallelRuntime for Core {
    fn parallel(&self, source: &dyn ExecutionContext, call_text: &str) -> Result<(), RuntimeError> {
        self.ensure_running()?;
        let call = CallSpec::parse(call_text)?;

        let task = if source.id() == self.main.id() {
            let _execution = self.execution_lock();
            TaskDescriptor::capture(call, source)
        } else {
            TaskDescriptor::capture(call, source)
        };
        debug!(
            coordinator = %self.id,
            function = task.function(),
            call = task.call_text(),
            "Task enqueued"
        );

        self.queue.push_back(task);
        self.tasks_submitted.fetch_add(1, Ordering::Relaxed);
        self.activity.notify();
        self.pool().start_first_idle();
        Ok(())
    }

    fn join(&self, function: &str) -> Result<(), RuntimeError> {
        self.ensure_running()?;
        let poll = self.config.poll_interval();
        debug!(coordinator = %self.id, function, "Joining tasks");

        loop {
            let seen = self.activity.generation();
            // queue first: a popped task is marked as current before it
            // leaves the queue
            let pending = self.queue.contains_function(function);
            let running = self.pool().is_executing(function);
            if !pending && !running && self.activity.generation() == seen {
                break;
            }
            if pending {
                self.drive();
            }
            self.ensure_running()?;
            self.activity.wait_since(seen, poll);
        }
        Ok(())
    }

    fn joinall(&self) -> Result<(), RuntimeError> {
        self.ensure_running()?;
        let poll = self.config.poll_interval();
        debug!(coordinator = %self.id, "Joining all tasks");

        {
            let pool = self.pool();
            if pool.on_worker_thread() && pool.len() == 1 {
                warn!(coordinator = %self.id, "joinall called from the only worker; queued tasks cannot run until it returns");
            }
        }

        loop {
            let seen = self.activity.generation();
            self.drive();
            // workers first: with every worker idle only this thread can
            // still enqueue
            let idle = self.pool().all_idle();
            if idle && self.queue.is_empty() && self.activity.generation() == seen {
                break;
            }
            self.ensure_running()?;
            self.activity.wait_since(seen, poll);
        }
        Ok(())
    }

    fn acquire(&self, id: &Value) -> Result<(), RuntimeError> {
        let name = CriticalSections::section_name(id)?;
        self.sections.acquire(&name);
        Ok(())
    }

    fn release(&self, id: &Value) -> Result<(), RuntimeError> {
        let name = CriticalSections::section_name(id)?;
        self.sections.release(&name);
        Ok(())
    }

    fn np(&self, count: usize) -> Result<usize, RuntimeError> {
        self.ensure_running()?;
        let current = self.pool_size();
        if count == 0 || count == current {
            return Ok(current);
        }
        if self.pool().on_worker_thread() {
            return Err(RuntimeError::ResizeFromTask);
        }

        self.joinall()?;
        // take the workers out first so no lock is held while their threads
        // finish
        let workers = self.pool().take_all();
        for worker in workers {
            worker.stop();
        }

        if let Err(err) = self.spawn_workers(count) {
            // the pool keeps whatever did start; its size must say so
            let started = self.pool().len();
            self.pool_size.store(started, Ordering::SeqCst);
            warn!(coordinator = %self.id, requested = count, started, error = %err, "Worker pool resize incomplete");
            self.drive();
            return Err(err);
        }
        self.pool_size.store(count, Ordering::SeqCst);
        self.drive();
        info!(coordinator = %self.id, from = current, to = count, "Worker pool resized");
        Ok(count)
    }
}
