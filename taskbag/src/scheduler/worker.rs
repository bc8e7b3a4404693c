//! # Worker Unit
//!
//! One OS thread with a private execution context that drains the bag of
//! tasks.
//!
//! ## Lifecycle
//! A worker is created with the pool (at coordinator construction or when
//! the pool is resized) and lives until the pool is torn down. Its thread
//! sleeps on a command channel; the coordinator sends `Run` when the worker
//! is idle and tasks are pending, and `Shutdown` when the pool goes away.
//!
//! ## Run Loop
//! 1. While the queue is non-empty, pop the next task (an empty pop ends
//!    the run; another worker won the race)
//! 2. Publish the task's function name for `join`
//! 3. Load the parameter snapshot into the private context
//! 4. Invoke the function
//! 5. Under the coordinator's execution lock, copy the named results into
//!    the main context
//! 6. If the call errored, replace the private context with a fresh one
//! 7. Clear the published name and continue
//! 8. When the queue held no more tasks than there are workers at the start
//!    of the run, stop after one task so idle siblings get a turn
//!
//! ## Error Isolation
//! Errors and panics raised by the task never leave the worker: they are
//! logged with the callee name and the context is replaced.

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle, ThreadId};
use std::time::Instant;

use flume::{Receiver, Sender};
use taskbag_api::{ExecutionContext, Invocation, Registration, RuntimeError, ScriptError, Value};
use tracing::{debug, error, trace, warn};

use crate::coordinator::state::Core;
use crate::copier;
use crate::task::{Argument, TaskDescriptor};

/// Commands understood by a worker thread
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WorkerCommand {
    /// Drain the queue once
    Run,
    /// Leave the command loop and release the private context
    Shutdown,
}

/// Status of a worker as seen by the coordinator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerStatus {
    /// Waiting for a `Run` command
    Idle,
    /// Draining the queue
    Running,
}

/// A worker's private execution context together with the token that keeps
/// it registered with the engine.
pub(crate) struct PrivateContext {
    context: Box<dyn ExecutionContext>,
    _registration: Registration,
}

impl PrivateContext {
    pub(crate) fn new(context: Box<dyn ExecutionContext>, registration: Registration) -> Self {
        Self {
            context,
            _registration: registration,
        }
    }

    pub(crate) fn get(&self) -> &dyn ExecutionContext {
        self.context.as_ref()
    }
}

impl fmt::Debug for PrivateContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PrivateContext")
            .field("id", &self.context.id())
            .finish()
    }
}

/// State shared between a worker thread and the coordinator
#[derive(Debug, Default)]
pub(crate) struct WorkerState {
    running: AtomicBool,
    current: Mutex<Option<String>>,
    completed: AtomicU64,
    failed: AtomicU64,
}

impl WorkerState {
    fn current(&self) -> MutexGuard<'_, Option<String>> {
        self.current.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Handle the coordinator keeps for each worker thread.
pub struct WorkerUnit {
    id: usize,
    state: Arc<WorkerState>,
    commands: Sender<WorkerCommand>,
    thread_id: ThreadId,
    thread: Option<JoinHandle<()>>,
}

impl fmt::Debug for WorkerUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerUnit")
            .field("id", &self.id)
            .field("status", &self.status())
            .field("current", &self.current_task())
            .finish()
    }
}

impl WorkerUnit {
    /// Creates the worker's private context and starts its thread
    pub(crate) fn spawn(id: usize, core: Arc<Core>) -> Result<Self, RuntimeError> {
        let context = core.spawn_private_context().map_err(|e| RuntimeError::WorkerStart {
            id,
            reason: e.to_string(),
        })?;
        let state = Arc::new(WorkerState::default());
        let (commands, inbox) = flume::unbounded();
        let name = format!("{}{}", core.config().thread_name_prefix, id);

        let worker_loop = WorkerLoop {
            id,
            core,
            state: Arc::clone(&state),
            context,
        };
        // log through whatever subscriber the spawning thread uses
        let dispatch = crate::logging::current_subscriber();
        let thread = thread::Builder::new()
            .name(name)
            .spawn(move || tracing::dispatcher::with_default(&dispatch, || worker_loop.run(inbox)))
            .map_err(|e| RuntimeError::WorkerStart {
                id,
                reason: e.to_string(),
            })?;

        debug!(worker = id, "Worker started");
        Ok(Self {
            id,
            state,
            commands,
            thread_id: thread.thread().id(),
            thread: Some(thread),
        })
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn status(&self) -> WorkerStatus {
        if self.state.running.load(Ordering::SeqCst) {
            WorkerStatus::Running
        } else {
            WorkerStatus::Idle
        }
    }

    pub fn is_idle(&self) -> bool {
        self.status() == WorkerStatus::Idle
    }

    /// Function name of the task being executed, if any
    pub fn current_task(&self) -> Option<String> {
        self.state.current().clone()
    }

    pub fn is_executing(&self, function: &str) -> bool {
        self.state.current().as_deref() == Some(function)
    }

    /// Whether the calling thread is this worker's thread
    pub fn is_current_thread(&self) -> bool {
        thread::current().id() == self.thread_id
    }

    pub fn tasks_completed(&self) -> u64 {
        self.state.completed.load(Ordering::Relaxed)
    }

    pub fn tasks_failed(&self) -> u64 {
        self.state.failed.load(Ordering::Relaxed)
    }

    /// Starts a run if the worker is idle. Returns whether a run was started.
    pub(crate) fn try_start(&self) -> bool {
        if self
            .state
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return false;
        }
        if self.commands.send(WorkerCommand::Run).is_err() {
            warn!(worker = self.id, "Worker thread is gone; cannot start a run");
            self.state.running.store(false, Ordering::SeqCst);
            return false;
        }
        trace!(worker = self.id, "Worker run requested");
        true
    }

    /// Asks the thread to exit after its current run and waits for it
    pub(crate) fn stop(mut self) {
        let _ = self.commands.send(WorkerCommand::Shutdown);
        if self.is_current_thread() {
            // a thread cannot join itself; it exits once the current run ends
            debug!(worker = self.id, "Worker detached from its own thread");
            return;
        }
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                error!(worker = self.id, "Worker thread panicked during shutdown");
            }
        }
        debug!(worker = self.id, "Worker stopped");
    }
}

/// The part of a worker that lives on its thread
struct WorkerLoop {
    id: usize,
    core: Arc<Core>,
    state: Arc<WorkerState>,
    context: PrivateContext,
}

impl WorkerLoop {
    fn run(mut self, inbox: Receiver<WorkerCommand>) {
        let span = crate::worker_span!(self.id);
        let _guard = span.enter();

        while let Ok(command) = inbox.recv() {
            match command {
                WorkerCommand::Run => {
                    self.drain();
                    self.state.running.store(false, Ordering::SeqCst);
                    self.core.activity().notify();
                }
                WorkerCommand::Shutdown => break,
            }
        }
        trace!(worker = self.id, "Worker command loop finished");
    }

    fn drain(&mut self) {
        let core = Arc::clone(&self.core);
        let queue = core.queue();
        let drain_once = queue.len() <= core.pool_size();

        while !queue.is_empty() {
            // publish the function name while the queue lock is still held so
            // `join` never sees the task in neither place
            let state = Arc::clone(&self.state);
            let Some(task) = queue.try_pop_front_with(|task| {
                *state.current() = Some(task.function().to_string());
            }) else {
                break;
            };

            self.execute(task);

            *self.state.current() = None;
            core.activity().notify();

            if drain_once {
                break;
            }
        }
    }

    fn execute(&mut self, mut task: TaskDescriptor) {
        let span = crate::task_span!(task.function(), self.id);
        let _guard = span.enter();
        let started = Instant::now();
        let context = self.context.get();

        if let Some(snapshot) = task.take_snapshot() {
            for (name, value) in snapshot.into_entries() {
                copier::transfer_in(context, &name, value);
            }
        }

        let arguments: Vec<Value> = task
            .arguments()
            .iter()
            .map(|argument| match argument {
                Argument::Global(name) => context.global(name).unwrap_or_default(),
                Argument::Literal(value) => value.clone(),
            })
            .collect();

        let outcome = invoke_guarded(context, task.function(), arguments);
        let status = outcome.status();

        let execution = self.core.execution_lock();
        match outcome {
            Invocation::Errored(err) => {
                drop(execution);
                self.state.failed.fetch_add(1, Ordering::Relaxed);
                self.core.record_failure();
                error!(
                    function = task.function(),
                    worker = self.id,
                    call = task.call_text(),
                    error = %err,
                    "Task failed; replacing worker context"
                );
                self.replace_context();
            }
            outcome => {
                let results = outcome.into_results();
                if !task.returns().is_empty() {
                    let main = self.core.main_context();
                    for (index, name) in task.returns().iter().enumerate() {
                        let value = results.get(index).cloned().unwrap_or_default();
                        context.set_global(name, value);
                        copier::transfer_global(context, name, main, name);
                    }
                }
                drop(execution);
                self.state.completed.fetch_add(1, Ordering::Relaxed);
                self.core.record_completion();
                let queued_us = started.duration_since(task.enqueued_at()).as_micros() as u64;
                let elapsed_us = started.elapsed().as_micros() as u64;
                crate::log_task!(
                    task.function(),
                    status,
                    worker = self.id,
                    queued_us = queued_us,
                    elapsed_us = elapsed_us
                );
            }
        }
    }

    fn replace_context(&mut self) {
        match self.core.spawn_private_context() {
            Ok(fresh) => {
                debug!(
                    worker = self.id,
                    old = %self.context.get().id(),
                    new = %fresh.get().id(),
                    "Worker context replaced"
                );
                self.context = fresh;
            }
            Err(err) => {
                error!(worker = self.id, error = %err, "Failed to spawn a replacement context; keeping the old one");
            }
        }
    }
}

/// Invokes `function`, turning a panic into an errored invocation
fn invoke_guarded(context: &dyn ExecutionContext, function: &str, arguments: Vec<Value>) -> Invocation {
    match panic::catch_unwind(AssertUnwindSafe(|| context.invoke(function, arguments))) {
        Ok(outcome) => outcome,
        Err(payload) => {
            let message = if let Some(s) = payload.downcast_ref::<String>() {
                s.clone()
            } else if let Some(s) = payload.downcast_ref::<&str>() {
                s.to_string()
            } else {
                "unknown panic".to_string()
            };
            Invocation::Errored(ScriptError::Panic {
                function: function.to_string(),
                message,
            })
        }
    }
}
