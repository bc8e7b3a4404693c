//! # Native Engine
//!
//! A small [`ScriptEngine`] whose functions are Rust closures and whose
//! scripts are line statements. It is the engine the runtime is tested
//! against and the one the bootstrap uses when no other engine is plugged
//! in.
//!
//! ## Key Concepts
//! - Function library: definitions shared by every context of the engine
//! - Contexts: independent sets of globals; spawned contexts start empty
//! - Registration: the engine tracks which contexts workers are holding
//!
//! ## Example
//! ```
//! use taskbag::NativeEngine;
//! use taskbag_api::{ExecutionContext, ScriptEngine, Value};
//!
//! let engine = NativeEngine::new();
//! engine.function("double", |_, args| {
//!     let n = args.first().and_then(Value::as_number).unwrap_or(0.0);
//!     Ok(vec![Value::from(n * 2.0)])
//! });
//!
//! let context = engine.create_context().unwrap();
//! context.load("main", "x = double(21)").unwrap();
//! assert_eq!(context.global("x"), Some(Value::from(42)));
//! ```

mod context;
mod library;
mod script;

use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use taskbag_api::{ContextId, ExecutionContext, Registration, ScriptEngine, ScriptError, Value};
use tracing::trace;

pub use context::{CallScope, NativeContext};
pub use library::{CoordinatorObject, FunctionLibrary, HostFunction};
pub use script::Chunk;

/// Engine of closures and line scripts.
pub struct NativeEngine {
    library: Arc<FunctionLibrary>,
    registered: Arc<Mutex<HashSet<ContextId>>>,
}

impl fmt::Debug for NativeEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeEngine")
            .field("library", &self.library)
            .field("registered", &self.registered_contexts())
            .finish()
    }
}

impl Default for NativeEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl NativeEngine {
    /// An engine with the builtins `Coordinator`, `print` and `type`
    pub fn new() -> Self {
        Self {
            library: Arc::new(FunctionLibrary::with_builtins()),
            registered: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Defines a function visible to every context of this engine,
    /// including contexts created earlier
    pub fn function<F>(&self, name: &str, function: F) -> &Self
    where
        F: Fn(&CallScope<'_>, Vec<Value>) -> anyhow::Result<Vec<Value>> + Send + Sync + 'static,
    {
        self.library.define(name, Arc::new(function));
        self
    }

    pub fn library(&self) -> &FunctionLibrary {
        &self.library
    }

    fn registry(&self) -> MutexGuard<'_, HashSet<ContextId>> {
        self.registered.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Number of contexts currently registered by workers
    pub fn registered_contexts(&self) -> usize {
        self.registry().len()
    }

    pub fn is_registered(&self, context: ContextId) -> bool {
        self.registry().contains(&context)
    }
}

impl ScriptEngine for NativeEngine {
    fn name(&self) -> &str {
        "native"
    }

    fn create_context(&self) -> Result<Box<dyn ExecutionContext>, ScriptError> {
        Ok(Box::new(NativeContext::new(Arc::clone(&self.library))))
    }

    fn spawn_context(&self, parent: &dyn ExecutionContext) -> Result<Box<dyn ExecutionContext>, ScriptError> {
        let context = NativeContext::new(Arc::clone(&self.library));
        trace!(parent = %parent.id(), child = %context.id(), "Spawned context");
        Ok(Box::new(context))
    }

    fn register(&self, context: &dyn ExecutionContext) -> Registration {
        let id = context.id();
        self.registry().insert(id);
        let registered = Arc::clone(&self.registered);
        Registration::new(id, move |id| {
            registered
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .remove(&id);
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Weak;
    use taskbag_api::{Invocation, ParallelRuntime, RuntimeError};

    #[test]
    fn test_functions_shared_between_contexts() {
        let engine = NativeEngine::new();
        let main = engine.create_context().unwrap();
        let child = engine.spawn_context(main.as_ref()).unwrap();

        engine.function("answer", |_, _| Ok(vec![Value::from(42)]));
        assert!(main.has_function("answer"));
        assert!(child.has_function("answer"));

        main.set_global("x", Value::from(1));
        assert_eq!(child.global("x"), None);
    }

    #[test]
    fn test_invoke_outcomes() {
        let engine = NativeEngine::new();
        engine
            .function("ok", |_, args| Ok(args))
            .function("fails", |_, _| anyhow::bail!("boom"))
            .function("yields", |scope, _| {
                scope.suspend();
                Ok(vec![Value::from(1)])
            });
        let context = engine.create_context().unwrap();

        assert_eq!(
            context.invoke("ok", vec![Value::from(3)]),
            Invocation::Completed(vec![Value::from(3)])
        );
        assert_eq!(
            context.invoke("yields", vec![]),
            Invocation::Suspended(vec![Value::from(1)])
        );
        match context.invoke("fails", vec![]) {
            Invocation::Errored(ScriptError::Runtime { function, message }) => {
                assert_eq!(function, "fails");
                assert_eq!(message, "boom");
            }
            other => panic!("unexpected outcome {:?}", other),
        }
        assert_eq!(
            context.invoke("missing", vec![]),
            Invocation::Errored(ScriptError::FunctionNotFound("missing".to_string()))
        );
    }

    #[test]
    fn test_script_errors_pass_through() {
        let engine = NativeEngine::new();
        engine.function("strict", |scope, _| {
            Err(ScriptError::runtime(scope.function(), "bad input").into())
        });
        let context = engine.create_context().unwrap();
        assert_eq!(
            context.invoke("strict", vec![]),
            Invocation::Errored(ScriptError::runtime("strict", "bad input"))
        );
    }

    #[test]
    fn test_registration_released_on_drop() {
        let engine = NativeEngine::new();
        let context = engine.create_context().unwrap();
        let registration = engine.register(context.as_ref());
        assert!(engine.is_registered(context.id()));
        assert_eq!(engine.registered_contexts(), 1);

        drop(registration);
        assert!(!engine.is_registered(context.id()));
    }

    #[test]
    fn test_load_runs_statements() {
        let engine = NativeEngine::new();
        engine.function("pair", |_, _| Ok(vec![Value::from(1), Value::from(2)]));
        let context = engine.create_context().unwrap();

        context
            .load("main", "a, b = pair()\nc, d = pair(), 9\nlocal e\nt = type(a)")
            .unwrap();
        assert_eq!(context.global("a"), Some(Value::from(1)));
        assert_eq!(context.global("b"), Some(Value::from(2)));
        assert_eq!(context.global("c"), Some(Value::from(1)));
        assert_eq!(context.global("d"), Some(Value::from(9)));
        assert_eq!(context.global("e"), None);
        assert_eq!(context.global("t"), Some(Value::from("number")));
    }

    #[test]
    fn test_load_error_carries_line() {
        let engine = NativeEngine::new();
        let context = engine.create_context().unwrap();
        let err = context.load("main", "x = 1\ny = nothing_here()").unwrap_err();
        assert_eq!(err.line(), Some(2));
        assert!(err.to_string().contains("Function not found: nothing_here"));
        assert_eq!(context.global("x"), Some(Value::from(1)));
    }

    #[test]
    fn test_coordinator_requires_bound_runtime() {
        let engine = NativeEngine::new();
        let context = engine.create_context().unwrap();
        let err = context.load("main", "coordinator = Coordinator()").unwrap_err();
        assert!(err.to_string().contains("No parallel runtime bound"));

        let gone: Weak<dyn ParallelRuntime> = Weak::<Recorder>::new();
        context.bind_runtime(gone);
        assert!(context.load("main", "coordinator = Coordinator()").is_err());
    }

    #[derive(Default)]
    struct Recorder {
        calls: Mutex<Vec<String>>,
    }

    impl Recorder {
        fn record(&self, call: String) -> Result<(), RuntimeError> {
            self.calls.lock().unwrap().push(call);
            Ok(())
        }
    }

    impl ParallelRuntime for Recorder {
        fn parallel(&self, _source: &dyn ExecutionContext, call_text: &str) -> Result<(), RuntimeError> {
            self.record(format!("parallel {}", call_text))
        }
        fn join(&self, function: &str) -> Result<(), RuntimeError> {
            self.record(format!("join {}", function))
        }
        fn joinall(&self) -> Result<(), RuntimeError> {
            self.record("joinall".to_string())
        }
        fn acquire(&self, id: &Value) -> Result<(), RuntimeError> {
            self.record(format!("acquire {}", id))
        }
        fn release(&self, id: &Value) -> Result<(), RuntimeError> {
            self.record(format!("release {}", id))
        }
        fn np(&self, count: usize) -> Result<usize, RuntimeError> {
            self.record(format!("np {}", count))?;
            Ok(count)
        }
    }

    #[test]
    fn test_coordinator_methods_dispatch_to_runtime() {
        let engine = NativeEngine::new();
        let context = engine.create_context().unwrap();
        let recorder = Arc::new(Recorder::default());
        let runtime: Arc<dyn ParallelRuntime> = recorder.clone();
        context.bind_runtime(Arc::downgrade(&runtime));

        let script = [
            "coordinator = Coordinator()",
            "coordinator:parallel(\"r = f(x)\")",
            "coordinator:join(\"f\")",
            "coordinator:acquire(1)",
            "coordinator:release(\"grid\")",
            "size = coordinator:np(3)",
            "coordinator:joinall()",
        ]
        .join("\n");
        context.load("main", &script).unwrap();

        assert_eq!(
            *recorder.calls.lock().unwrap(),
            vec![
                "parallel r = f(x)",
                "join f",
                "acquire 1",
                "release grid",
                "np 3",
                "joinall",
            ]
        );
        assert_eq!(context.global("size"), Some(Value::from(3)));
    }

    #[test]
    fn test_method_on_non_coordinator_fails() {
        let engine = NativeEngine::new();
        let context = engine.create_context().unwrap();
        let err = context.load("main", "x = 1\nx:joinall()").unwrap_err();
        assert_eq!(err.line(), Some(2));
        assert!(err.to_string().contains("attempt to call a method on a number value"));
    }
}
