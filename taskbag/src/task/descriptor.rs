use std::fmt;
use std::time::Instant;

use taskbag_api::{ExecutionContext, Value};

use crate::copier;
use super::call::{Argument, CallSpec};

/// Copies of a task's named parameters, taken when the task was enqueued.
///
/// The snapshot is isolated from every execution context: later writes to
/// the calling context's globals do not reach it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParameterSnapshot {
    entries: Vec<(String, Value)>,
}

impl ParameterSnapshot {
    /// Transfers each named global out of `source`; repeated names are taken once
    pub fn capture<'a>(source: &dyn ExecutionContext, names: impl IntoIterator<Item = &'a str>) -> Self {
        let mut entries: Vec<(String, Value)> = Vec::new();
        for name in names {
            if entries.iter().any(|(n, _)| n == name) {
                continue;
            }
            entries.push((name.to_string(), copier::transfer_out(source, name)));
        }
        Self { entries }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.entries.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn into_entries(self) -> Vec<(String, Value)> {
        self.entries
    }
}

/// One deferred call: what to run, with which captured parameters, and
/// where to store its results in the main context.
///
/// Immutable once built; the worker that dequeues it consumes it.
pub struct TaskDescriptor {
    call_text: String,
    function: String,
    arguments: Vec<Argument>,
    returns: Vec<String>,
    snapshot: Option<ParameterSnapshot>,
    enqueued_at: Instant,
}

impl TaskDescriptor {
    /// Builds a descriptor for `call`, snapshotting its named parameters out of `source`
    pub fn capture(call: CallSpec, source: &dyn ExecutionContext) -> Self {
        let snapshot = if call.parameter_names().next().is_some() {
            Some(ParameterSnapshot::capture(source, call.parameter_names()))
        } else {
            None
        };
        let (call_text, function, arguments, returns) = call.into_parts();

        Self {
            call_text,
            function,
            arguments,
            returns,
            snapshot,
            enqueued_at: Instant::now(),
        }
    }

    pub fn call_text(&self) -> &str {
        &self.call_text
    }

    pub fn function(&self) -> &str {
        &self.function
    }

    pub fn arguments(&self) -> &[Argument] {
        &self.arguments
    }

    pub fn parameter_names(&self) -> impl Iterator<Item = &str> {
        self.arguments.iter().filter_map(|a| match a {
            Argument::Global(name) => Some(name.as_str()),
            Argument::Literal(_) => None,
        })
    }

    pub fn returns(&self) -> &[String] {
        &self.returns
    }

    pub fn snapshot(&self) -> Option<&ParameterSnapshot> {
        self.snapshot.as_ref()
    }

    pub fn enqueued_at(&self) -> Instant {
        self.enqueued_at
    }

    /// Hands the snapshot over to the consuming worker
    pub fn take_snapshot(&mut self) -> Option<ParameterSnapshot> {
        self.snapshot.take()
    }
}

impl fmt::Debug for TaskDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskDescriptor")
            .field("call", &self.call_text)
            .field("function", &self.function)
            .field("returns", &self.returns)
            .field("snapshot_len", &self.snapshot.as_ref().map(ParameterSnapshot::len))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::native::NativeEngine;
    use taskbag_api::ScriptEngine;

    #[test]
    fn test_snapshot_is_isolated_from_later_writes() {
        let engine = NativeEngine::new();
        let main = engine.create_context().unwrap();
        main.set_global("a", Value::from(1));
        main.set_global("b", Value::from("two"));

        let mut task = TaskDescriptor::capture(CallSpec::parse("r = f(a, b, a, 3)").unwrap(), main.as_ref());
        main.set_global("a", Value::from(100));

        let snapshot = task.take_snapshot().unwrap();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot.get("a"), Some(&Value::from(1)));
        assert_eq!(snapshot.get("b"), Some(&Value::from("two")));
        assert!(task.take_snapshot().is_none());
    }

    #[test]
    fn test_no_snapshot_without_named_parameters() {
        let engine = NativeEngine::new();
        let main = engine.create_context().unwrap();
        let task = TaskDescriptor::capture(CallSpec::parse("f(1, \"x\")").unwrap(), main.as_ref());
        assert!(task.snapshot().is_none());
        assert_eq!(task.parameter_names().count(), 0);
        assert_eq!(task.arguments().len(), 2);
        assert!(task.returns().is_empty());
    }

    #[test]
    fn test_missing_globals_snapshot_as_nil() {
        let engine = NativeEngine::new();
        let main = engine.create_context().unwrap();
        let task = TaskDescriptor::capture(CallSpec::parse("f(ghost)").unwrap(), main.as_ref());
        assert_eq!(task.snapshot().and_then(|s| s.get("ghost")), Some(&Value::Nil));
    }
}
