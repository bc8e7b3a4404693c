use std::io;
use std::path::PathBuf;

use taskbag_api::{RuntimeError, ScriptError};
use thiserror::Error;

/// Tokenizer failure at a column of the input line (1-based).
#[derive(Error, Debug, Clone, PartialEq)]
#[error("column {column}: {message}")]
pub struct SyntaxError {
    pub column: usize,
    pub message: String,
}

/// Errors raised while rewriting directives. All of them are fatal: no part
/// of the script runs when translation fails.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TranslateError {
    #[error("line {line}: PARALLEL must be followed by a call expression")]
    MissingCall { line: usize },
    #[error("line {line}: malformed call after PARALLEL: {reason}")]
    MalformedCall { line: usize, reason: String },
    #[error("line {line}: {directive} requires an argument")]
    MissingArgument { line: usize, directive: &'static str },
    #[error("line {line}: invalid argument `{argument}` for {directive}: {reason}")]
    InvalidArgument {
        line: usize,
        directive: &'static str,
        argument: String,
        reason: String,
    },
    #[error("line {line}: unknown directive `{keyword}`")]
    UnknownDirective { line: usize, keyword: String },
}

impl TranslateError {
    /// 1-based source line the error refers to
    pub fn line(&self) -> usize {
        match self {
            TranslateError::MissingCall { line }
            | TranslateError::MalformedCall { line, .. }
            | TranslateError::MissingArgument { line, .. }
            | TranslateError::InvalidArgument { line, .. }
            | TranslateError::UnknownDirective { line, .. } => *line,
        }
    }
}

/// Errors raised while preparing and loading an instrumented script.
#[derive(Error, Debug)]
pub enum BootstrapError {
    #[error("Failed to read {}: {}", .path.display(), .source)]
    Read { path: PathBuf, source: io::Error },

    #[error("Failed to write {}: {}", .path.display(), .source)]
    Write { path: PathBuf, source: io::Error },

    #[error("Failed to translate {}: {}", .path.display(), .source)]
    Translate {
        path: PathBuf,
        source: TranslateError,
    },

    /// The instrumented chunk failed to load. `line` is the line in the
    /// instrumented file, `source_line` the matching line of the original.
    #[error("{}:{}: {}", .path.display(), .line, .message)]
    Load {
        path: PathBuf,
        line: usize,
        source_line: Option<usize>,
        message: String,
    },

    #[error("Script error: {0}")]
    Script(#[from] ScriptError),

    #[error("Runtime error: {0}")]
    Runtime(#[from] RuntimeError),

    #[error("Coordinator error: {0}")]
    Coordinator(#[from] CoordinatorError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Errors raised while constructing a coordinator.
#[derive(Error, Debug)]
pub enum CoordinatorError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Failed to create the main context: {0}")]
    Context(#[from] ScriptError),

    #[error("Failed to start the worker pool: {0}")]
    Pool(#[from] RuntimeError),
}

/// Errors raised while reading configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read configuration {}: {}", .path.display(), .source)]
    Io { path: PathBuf, source: io::Error },
    #[error("Invalid configuration: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}
