use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use taskbag_api::{HostHandle, HostObject, Value};
use tracing::info;

use super::context::CallScope;

/// A host function callable from native scripts and as a task.
///
/// Receives the calling scope and the positional arguments; returns the
/// call's results in order.
pub type HostFunction = Arc<dyn Fn(&CallScope<'_>, Vec<Value>) -> anyhow::Result<Vec<Value>> + Send + Sync>;

/// Function definitions shared by every context of one engine.
#[derive(Default)]
pub struct FunctionLibrary {
    functions: RwLock<HashMap<String, HostFunction>>,
}

impl fmt::Debug for FunctionLibrary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<String> = self.read().keys().cloned().collect();
        names.sort();
        f.debug_struct("FunctionLibrary")
            .field("functions", &names)
            .finish()
    }
}

impl FunctionLibrary {
    /// A library holding only the builtins
    pub fn with_builtins() -> Self {
        let library = Self::default();
        library.define("Coordinator", Arc::new(coordinator_builtin));
        library.define("print", Arc::new(print_builtin));
        library.define("type", Arc::new(type_builtin));
        library
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, HostFunction>> {
        self.functions.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, HostFunction>> {
        self.functions.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Adds or replaces a definition
    pub fn define(&self, name: &str, function: HostFunction) {
        self.write().insert(name.to_string(), function);
    }

    pub fn get(&self, name: &str) -> Option<HostFunction> {
        self.read().get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.read().contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }
}

/// Host object behind the handle `Coordinator()` returns.
///
/// Carries no state: method calls on it are forwarded to the runtime bound
/// to the calling context.
#[derive(Debug, Default)]
pub struct CoordinatorObject;

impl HostObject for CoordinatorObject {
    fn class_name(&self) -> &str {
        "Coordinator"
    }
}

fn coordinator_builtin(scope: &CallScope<'_>, _args: Vec<Value>) -> anyhow::Result<Vec<Value>> {
    // fail early when no runtime is bound, rather than at the first method
    scope.runtime()?;
    Ok(vec![Value::Handle(HostHandle::new(CoordinatorObject))])
}

fn print_builtin(scope: &CallScope<'_>, args: Vec<Value>) -> anyhow::Result<Vec<Value>> {
    let line = args
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("\t");
    info!(context = %scope.context_id(), "{}", line);
    println!("{}", line);
    Ok(Vec::new())
}

fn type_builtin(_scope: &CallScope<'_>, args: Vec<Value>) -> anyhow::Result<Vec<Value>> {
    let value = args.into_iter().next().unwrap_or_default();
    Ok(vec![Value::from(value.type_name())])
}
