use std::cell::Cell;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use taskbag_api::{ContextId, ExecutionContext, Invocation, ParallelRuntime, ScriptError, Value};
use tracing::trace;
use uuid::Uuid;

use super::library::FunctionLibrary;
use super::script::Chunk;

/// Execution context of the native engine: a set of globals plus the
/// engine's shared function library.
///
/// The globals sit behind a mutex that is never held while a function runs,
/// so a host function can read and write globals of its own context and
/// workers can write results into the main context while it is busy.
pub struct NativeContext {
    id: ContextId,
    library: Arc<FunctionLibrary>,
    globals: Mutex<HashMap<String, Value>>,
    runtime: Mutex<Option<Weak<dyn ParallelRuntime>>>,
}

impl fmt::Debug for NativeContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeContext")
            .field("id", &self.id)
            .field("globals", &self.globals().len())
            .field("runtime_bound", &self.runtime_slot().is_some())
            .finish()
    }
}

impl NativeContext {
    pub fn new(library: Arc<FunctionLibrary>) -> Self {
        Self {
            id: Uuid::new_v4(),
            library,
            globals: Mutex::new(HashMap::new()),
            runtime: Mutex::new(None),
        }
    }

    fn globals(&self) -> MutexGuard<'_, HashMap<String, Value>> {
        self.globals.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn runtime_slot(&self) -> MutexGuard<'_, Option<Weak<dyn ParallelRuntime>>> {
        self.runtime.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// The runtime `coordinator:*` calls reach, if it is still alive
    pub fn runtime(&self) -> Result<Arc<dyn ParallelRuntime>, ScriptError> {
        self.runtime_slot()
            .as_ref()
            .and_then(Weak::upgrade)
            .ok_or(ScriptError::RuntimeUnavailable)
    }

    /// Names of the globals currently set, sorted
    pub fn global_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.globals().keys().cloned().collect();
        names.sort();
        names
    }

    /// Calls `function` and returns its results, or the error it raised
    pub fn call(&self, function: &str, args: Vec<Value>) -> Result<Vec<Value>, ScriptError> {
        self.call_in_scope(function, args).map(|(results, _)| results)
    }

    fn call_in_scope(&self, function: &str, args: Vec<Value>) -> Result<(Vec<Value>, bool), ScriptError> {
        let host = self
            .library
            .get(function)
            .ok_or_else(|| ScriptError::FunctionNotFound(function.to_string()))?;
        let scope = CallScope {
            context: self,
            function,
            suspended: Cell::new(false),
        };
        match host(&scope, args) {
            Ok(results) => Ok((results, scope.suspended.get())),
            Err(err) => Err(match err.downcast::<ScriptError>() {
                Ok(script) => script,
                Err(other) => ScriptError::Runtime {
                    function: function.to_string(),
                    message: format!("{:#}", other),
                },
            }),
        }
    }
}

impl ExecutionContext for NativeContext {
    fn id(&self) -> ContextId {
        self.id
    }

    fn global(&self, name: &str) -> Option<Value> {
        self.globals().get(name).cloned()
    }

    fn set_global(&self, name: &str, value: Value) {
        let mut globals = self.globals();
        if value.is_nil() {
            globals.remove(name);
        } else {
            globals.insert(name.to_string(), value);
        }
    }

    fn has_function(&self, name: &str) -> bool {
        self.library.contains(name)
    }

    fn invoke(&self, function: &str, args: Vec<Value>) -> Invocation {
        trace!(context = %self.id, function, "Invoking");
        match self.call_in_scope(function, args) {
            Ok((results, false)) => Invocation::Completed(results),
            Ok((results, true)) => Invocation::Suspended(results),
            Err(err) => Invocation::Errored(err),
        }
    }

    fn load(&self, chunk: &str, source: &str) -> Result<(), ScriptError> {
        let parsed = Chunk::parse(chunk, source)?;
        parsed.run(self)
    }

    fn bind_runtime(&self, runtime: Weak<dyn ParallelRuntime>) {
        *self.runtime_slot() = Some(runtime);
    }
}

/// What a host function sees of the context calling it.
pub struct CallScope<'a> {
    context: &'a NativeContext,
    function: &'a str,
    suspended: Cell<bool>,
}

impl CallScope<'_> {
    /// Name the function was called under
    pub fn function(&self) -> &str {
        self.function
    }

    pub fn context(&self) -> &NativeContext {
        self.context
    }

    pub fn context_id(&self) -> ContextId {
        self.context.id
    }

    pub fn global(&self, name: &str) -> Option<Value> {
        self.context.global(name)
    }

    pub fn set_global(&self, name: &str, value: impl Into<Value>) {
        self.context.set_global(name, value.into());
    }

    /// The parallel runtime bound to the calling context
    pub fn runtime(&self) -> Result<Arc<dyn ParallelRuntime>, ScriptError> {
        self.context.runtime()
    }

    /// Calls another function in the same context
    pub fn call(&self, function: &str, args: Vec<Value>) -> Result<Vec<Value>, ScriptError> {
        self.context.call(function, args)
    }

    /// Marks the call as suspended: it returns as still runnable instead
    /// of completed
    pub fn suspend(&self) {
        self.suspended.set(true);
    }
}
