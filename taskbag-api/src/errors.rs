//! # Error Types
//!
//! Errors shared by engines and the parallel runtime.
//!
//! - [`ScriptError`]: raised by an execution context while loading a chunk or
//!   invoking a function.
//! - [`RuntimeError`]: raised by the parallel runtime API (`parallel`,
//!   `join`, `np`, ...).
//!
//! Task invocation errors never reach the caller of `parallel`: the worker
//! that ran the task logs them and recovers. Only runtime misuse that can be
//! detected up front (malformed call text, resizing from inside a task) is
//! reported through [`RuntimeError`].

use thiserror::Error;

/// Errors produced by an execution context.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ScriptError {
    /// No global function with this name exists in the context
    #[error("Function not found: {0}")]
    FunctionNotFound(String),

    /// The function raised an error while running
    #[error("Error in {function}: {message}")]
    Runtime { function: String, message: String },

    /// The function panicked (host closures only)
    #[error("Panic in {function}: {message}")]
    Panic { function: String, message: String },

    /// A chunk failed to parse or run at the given line
    #[error("{chunk}:{line}: {message}")]
    Load {
        chunk: String,
        line: usize,
        message: String,
    },

    /// The script called the parallel runtime but none is bound to the context
    #[error("No parallel runtime bound to this context")]
    RuntimeUnavailable,

    /// A call into the parallel runtime failed
    #[error("Parallel runtime error: {0}")]
    Parallel(#[from] RuntimeError),

    /// The engine could not create an execution context
    #[error("Failed to create execution context: {0}")]
    ContextCreation(String),
}

impl ScriptError {
    /// Line number embedded in load errors
    pub fn line(&self) -> Option<usize> {
        match self {
            ScriptError::Load { line, .. } => Some(*line),
            _ => None,
        }
    }

    /// Builds a runtime error from any error raised by a host function
    pub fn runtime(function: &str, error: impl std::fmt::Display) -> Self {
        ScriptError::Runtime {
            function: function.to_string(),
            message: error.to_string(),
        }
    }
}

/// Errors produced by the parallel runtime API.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RuntimeError {
    /// The call text handed to `parallel` could not be parsed
    #[error("Malformed call `{text}`: {reason}")]
    MalformedCall { text: String, reason: String },

    /// A critical section id was neither a number nor a string
    #[error("Invalid critical section id of type {0}")]
    InvalidSectionId(String),

    /// `np` was called from a worker thread of the same coordinator
    #[error("The worker pool cannot be resized from inside a running task")]
    ResizeFromTask,

    /// The coordinator backing this handle is gone
    #[error("Coordinator has shut down")]
    ShutDown,

    /// A worker thread or its private context could not be created
    #[error("Failed to start worker {id}: {reason}")]
    WorkerStart { id: usize, reason: String },
}
