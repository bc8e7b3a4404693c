// Integration tests for error types in taskbag::error and taskbag_api

use std::io;
use std::path::PathBuf;

use taskbag::{BootstrapError, ConfigError, CoordinatorError, SyntaxError, TranslateError};
use taskbag_api::{RuntimeError, ScriptError};

#[test]
fn test_runtime_error_display() {
    assert_eq!(
        RuntimeError::MalformedCall {
            text: "f(".to_string(),
            reason: "expected `)`".to_string()
        }
        .to_string(),
        "Malformed call `f(`: expected `)`"
    );
    assert_eq!(
        RuntimeError::InvalidSectionId("table".to_string()).to_string(),
        "Invalid critical section id of type table"
    );
    assert_eq!(
        RuntimeError::ResizeFromTask.to_string(),
        "The worker pool cannot be resized from inside a running task"
    );
    assert_eq!(RuntimeError::ShutDown.to_string(), "Coordinator has shut down");
    assert_eq!(
        RuntimeError::WorkerStart {
            id: 2,
            reason: "spawn failed".to_string()
        }
        .to_string(),
        "Failed to start worker 2: spawn failed"
    );
}

#[test]
fn test_script_error_display() {
    assert_eq!(ScriptError::FunctionNotFound("f".to_string()).to_string(), "Function not found: f");
    assert_eq!(ScriptError::runtime("f", "bad input").to_string(), "Error in f: bad input");
    assert_eq!(
        ScriptError::Load {
            chunk: "__parallel_run.lua".to_string(),
            line: 4,
            message: "syntax error".to_string()
        }
        .to_string(),
        "__parallel_run.lua:4: syntax error"
    );
    assert_eq!(
        ScriptError::RuntimeUnavailable.to_string(),
        "No parallel runtime bound to this context"
    );

    let wrapped = ScriptError::from(RuntimeError::ShutDown);
    assert_eq!(wrapped.to_string(), "Parallel runtime error: Coordinator has shut down");
    assert_eq!(wrapped.line(), None);
}

#[test]
fn test_translate_error_display_and_line() {
    let cases = [
        (TranslateError::MissingCall { line: 3 }, "line 3: PARALLEL must be followed by a call expression"),
        (
            TranslateError::MissingArgument { line: 5, directive: "JOIN" },
            "line 5: JOIN requires an argument",
        ),
        (
            TranslateError::UnknownDirective {
                line: 9,
                keyword: "JION".to_string(),
            },
            "line 9: unknown directive `JION`",
        ),
    ];
    for (err, expected) in cases {
        assert_eq!(err.to_string(), expected);
    }

    let invalid = TranslateError::InvalidArgument {
        line: 7,
        directive: "NP",
        argument: "-1".to_string(),
        reason: "expected a non-negative integer".to_string(),
    };
    assert_eq!(invalid.line(), 7);
    assert_eq!(
        invalid.to_string(),
        "line 7: invalid argument `-1` for NP: expected a non-negative integer"
    );
}

#[test]
fn test_syntax_error_display() {
    let err = SyntaxError {
        column: 12,
        message: "unterminated string".to_string(),
    };
    assert_eq!(err.to_string(), "column 12: unterminated string");
}

#[test]
fn test_bootstrap_error_display() {
    let read = BootstrapError::Read {
        path: PathBuf::from("/models/run.lua"),
        source: io::Error::new(io::ErrorKind::NotFound, "no such file"),
    };
    assert_eq!(read.to_string(), "Failed to read /models/run.lua: no such file");

    let translate = BootstrapError::Translate {
        path: PathBuf::from("run.lua"),
        source: TranslateError::MissingCall { line: 2 },
    };
    assert_eq!(
        translate.to_string(),
        "Failed to translate run.lua: line 2: PARALLEL must be followed by a call expression"
    );

    let load = BootstrapError::Load {
        path: PathBuf::from("__parallel_run.lua"),
        line: 8,
        source_line: Some(7),
        message: "Function not found: g".to_string(),
    };
    assert_eq!(load.to_string(), "__parallel_run.lua:8: Function not found: g");
}

#[test]
fn test_error_conversions() {
    let config: BootstrapError = ConfigError::Invalid("pool_size must be at least 1".to_string()).into();
    assert_eq!(config.to_string(), "Invalid configuration: pool_size must be at least 1");

    let coordinator: CoordinatorError = RuntimeError::WorkerStart {
        id: 0,
        reason: "out of threads".to_string(),
    }
    .into();
    assert!(coordinator.to_string().starts_with("Failed to start the worker pool:"));

    let bootstrap: BootstrapError = coordinator.into();
    assert!(bootstrap.to_string().contains("out of threads"));

    let runtime: BootstrapError = RuntimeError::ShutDown.into();
    assert_eq!(runtime.to_string(), "Runtime error: Coordinator has shut down");
}

#[test]
fn test_errors_convert_into_anyhow() {
    fn fails() -> anyhow::Result<()> {
        Err(RuntimeError::ResizeFromTask)?
    }
    let err = fails().unwrap_err();
    assert!(err.downcast_ref::<RuntimeError>().is_some());
}
