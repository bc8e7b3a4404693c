//! # Taskbag API
//!
//! The collaborator interface between the `taskbag` parallel runtime and an
//! embedded scripting engine.
//!
//! The runtime distributes script function calls ("tasks") across worker
//! threads, each of which owns an independent execution context of the
//! engine. To do that it needs the engine to provide contexts, named
//! globals and a resumable call primitive, and it needs a value model that
//! says which values may be copied between contexts and which must be moved.
//!
//! ## Module Organization
//!
//! - [`value`]: the tagged value union and tables
//! - [`handle`]: host handles and the [`HostObject`] trait
//! - [`context`]: execution contexts, engines and registration tokens
//! - [`runtime`]: the operations scripts call on the coordinator
//! - [`errors`]: error types

pub mod context;
pub mod errors;
pub mod handle;
pub mod runtime;
pub mod value;

pub use context::{ContextId, ExecutionContext, Invocation, Registration, ScriptEngine};
pub use errors::{RuntimeError, ScriptError};
pub use handle::{HostHandle, HostObject, Ownership};
pub use runtime::ParallelRuntime;
pub use value::{Table, Value, ValueKind};
