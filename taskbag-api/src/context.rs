//! # Execution Contexts
//!
//! An execution context is one independent instance of the scripting
//! engine's global state. The parallel runtime needs very little from it:
//!
//! - read and write named globals
//! - invoke a global function by name with a resumable-call outcome
//! - load and run a chunk of script text
//! - learn which runtime to forward `coordinator:*` calls to
//!
//! Engines create contexts through [`ScriptEngine`]. A context spawned for a
//! worker is derived from the main context (same function definitions, its
//! own globals) and registered with the engine for as long as the worker
//! holds it, so the engine does not reclaim it early.

use std::fmt;
use std::sync::Weak;

use uuid::Uuid;

use crate::errors::ScriptError;
use crate::runtime::ParallelRuntime;
use crate::value::Value;

/// Identity of an execution context
pub type ContextId = Uuid;

/// Outcome of a resumable invocation.
#[derive(Debug, Clone, PartialEq)]
pub enum Invocation {
    /// The function returned normally with these results
    Completed(Vec<Value>),
    /// The function yielded and is still runnable; values yielded so far
    Suspended(Vec<Value>),
    /// The function raised an error; the context may be corrupted
    Errored(ScriptError),
}

impl Invocation {
    /// `Completed` and `Suspended` leave the context usable
    pub fn is_healthy(&self) -> bool {
        !matches!(self, Invocation::Errored(_))
    }

    /// Status label for logs
    pub fn status(&self) -> &'static str {
        match self {
            Invocation::Completed(_) => "completed",
            Invocation::Suspended(_) => "suspended",
            Invocation::Errored(_) => "errored",
        }
    }

    /// Results left behind by the call, empty when it errored
    pub fn into_results(self) -> Vec<Value> {
        match self {
            Invocation::Completed(values) | Invocation::Suspended(values) => values,
            Invocation::Errored(_) => Vec::new(),
        }
    }
}

/// One independent instance of the engine's global state.
///
/// Methods take `&self`: contexts synchronize their own state so the main
/// context can be written by workers (under the coordinator's execution
/// lock) while the main script keeps running.
pub trait ExecutionContext: fmt::Debug + Send + Sync {
    fn id(&self) -> ContextId;

    /// Returns a copy of the named global, `None` when unset
    fn global(&self, name: &str) -> Option<Value>;

    /// Sets a named global; setting `Nil` clears it
    fn set_global(&self, name: &str, value: Value);

    /// Whether a callable global with this name exists
    fn has_function(&self, name: &str) -> bool;

    /// Looks up `function` and calls it with `args`
    fn invoke(&self, function: &str, args: Vec<Value>) -> Invocation;

    /// Loads a chunk of script text and runs it to completion
    fn load(&self, chunk: &str, source: &str) -> Result<(), ScriptError>;

    /// Binds the runtime that `coordinator:*` calls in this context reach.
    ///
    /// Weak so a context stored inside the runtime does not keep it alive.
    fn bind_runtime(&self, runtime: Weak<dyn ParallelRuntime>);
}

/// Token that keeps a context registered with its engine.
///
/// Dropping the token releases the registration.
pub struct Registration {
    context: ContextId,
    release: Option<Box<dyn FnOnce(ContextId) + Send + Sync>>,
}

impl Registration {
    pub fn new(context: ContextId, release: impl FnOnce(ContextId) + Send + Sync + 'static) -> Self {
        Self {
            context,
            release: Some(Box::new(release)),
        }
    }

    /// Registration for engines that do not track contexts
    pub fn detached(context: ContextId) -> Self {
        Self { context, release: None }
    }

    pub fn context(&self) -> ContextId {
        self.context
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        if let Some(release) = self.release.take() {
            release(self.context);
        }
    }
}

impl fmt::Debug for Registration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registration")
            .field("context", &self.context)
            .field("tracked", &self.release.is_some())
            .finish()
    }
}

/// Factory for execution contexts.
pub trait ScriptEngine: fmt::Debug + Send + Sync {
    /// Engine name, used in logs
    fn name(&self) -> &str;

    /// Creates a fresh top-level (main) context
    fn create_context(&self) -> Result<Box<dyn ExecutionContext>, ScriptError>;

    /// Spawns a context that shares `parent`'s definitions but owns its globals
    fn spawn_context(
        &self,
        parent: &dyn ExecutionContext,
    ) -> Result<Box<dyn ExecutionContext>, ScriptError>;

    /// Registers a context so the engine keeps it alive until the token drops
    fn register(&self, context: &dyn ExecutionContext) -> Registration;
}
