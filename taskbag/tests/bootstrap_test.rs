// End-to-end tests: annotated script file -> instrumented sibling -> run.


use std::fs;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use taskbag::{load_file, translate_file, BootstrapError, NativeEngine, TaskbagConfig, TranslateError, TranslatorConfig};
use taskbag_api::{ExecutionContext, Value};
use test_helpers::{number_arg, scratch_dir};

fn config(pool_size: usize) -> TaskbagConfig {
    taskbag::logging::init_test();
    let mut config = TaskbagConfig::default();
    config.coordinator.pool_size = pool_size;
    config
}

#[test]
fn test_translate_file_writes_prefixed_sibling() {
    let scratch = scratch_dir();
    let dir = scratch.path();
    let script = dir.join("model.lua");
    fs::write(&script, "x = 1\r\n--# PARALLEL\r\nr = f(x)\r\n--# JOINALL\r\n").unwrap();

    let output = translate_file(&script, &TranslatorConfig::default()).unwrap();

    assert_eq!(output, dir.join("__parallel_model.lua"));
    let text = fs::read_to_string(&output).unwrap();
    assert!(!text.contains('\r'));
    assert_eq!(
        text.lines().collect::<Vec<_>>(),
        vec![
            "coordinator = Coordinator()",
            "x = 1",
            "--# PARALLEL",
            "coordinator:parallel(\"r = f(x)\")",
            "coordinator:joinall()",
        ]
    );
}

#[test]
fn test_translate_file_missing_source() {
    let scratch = scratch_dir();
    let dir = scratch.path();
    let err = translate_file(dir.join("absent.lua"), &TranslatorConfig::default()).unwrap_err();
    assert!(matches!(err, BootstrapError::Read { .. }));
}

#[test]
fn test_translation_error_names_file_and_line() {
    let scratch = scratch_dir();
    let dir = scratch.path();
    let script = dir.join("bad.lua");
    fs::write(&script, "x = 1\n--# NP many\n").unwrap();

    let err = translate_file(&script, &TranslatorConfig::default()).unwrap_err();
    match &err {
        BootstrapError::Translate { source, .. } => {
            assert_eq!(source.line(), 2);
            assert!(matches!(source, TranslateError::InvalidArgument { directive: "NP", .. }));
        }
        other => panic!("unexpected error {:?}", other),
    }
    assert!(!dir.join("__parallel_bad.lua").exists());
}

#[test]
fn test_annotated_script_runs_in_parallel() {
    let scratch = scratch_dir();
    let dir = scratch.path();
    let script = dir.join("sum.lua");
    fs::write(
        &script,
        [
            "-- partial sums over four slices",
            "n = 250",
            "--# NP 3",
            "--# PARALLEL",
            "s1 = partial(0, n)",
            "--# PARALLEL",
            "s2 = partial(n, n)",
            "--# PARALLEL",
            "s3 = partial(500, n)",
            "--# PARALLEL",
            "s4 = partial(750, n)",
            "--# JOIN partial",
            "total = sum(s1, s2, s3, s4)",
        ]
        .join("\n"),
    )
    .unwrap();

    let engine = Arc::new(NativeEngine::new());
    let calls = Arc::new(AtomicUsize::new(0));
    {
        let calls = Arc::clone(&calls);
        engine.function("partial", move |_, args| {
            calls.fetch_add(1, Ordering::SeqCst);
            let (start, len) = (number_arg(&args, 0), number_arg(&args, 1));
            let sum: f64 = (start as u64..(start + len) as u64).map(|i| i as f64).sum();
            Ok(vec![Value::from(sum)])
        });
    }
    engine.function("sum", |_, args| {
        Ok(vec![Value::from(args.iter().filter_map(Value::as_number).sum::<f64>())])
    });

    let loaded = load_file(&script, engine, &config(2)).unwrap();

    assert_eq!(loaded.instrumented_path(), dir.join("__parallel_sum.lua"));
    assert_eq!(loaded.translation().directives(), 6);
    assert_eq!(loaded.coordinator().pool_size(), 3);
    assert_eq!(calls.load(Ordering::SeqCst), 4);
    assert_eq!(loaded.main_context().global("total"), Some(Value::from(499500)));

    let coordinator = loaded.finish().unwrap();
    assert!(coordinator.metrics().is_shut_down);
}

#[test]
fn test_critical_section_directives() {
    let scratch = scratch_dir();
    let dir = scratch.path();
    let script = dir.join("guarded.lua");
    fs::write(
        &script,
        [
            "--# ACQUIRE \"log\"",
            "note(\"main\")",
            "--# RELEASE \"log\"",
            "--# PARALLEL",
            "guarded()",
            "--# JOINALL",
        ]
        .join("\n"),
    )
    .unwrap();

    let engine = Arc::new(NativeEngine::new());
    let notes = Arc::new(AtomicUsize::new(0));
    {
        let notes = Arc::clone(&notes);
        engine.function("note", move |_, _| {
            notes.fetch_add(1, Ordering::SeqCst);
            Ok(vec![])
        });
    }
    engine.function("guarded", |scope, _| {
        let runtime = scope.runtime()?;
        runtime.acquire(&Value::from("log"))?;
        scope.call("note", vec![Value::from("task")])?;
        runtime.release(&Value::from("log"))?;
        Ok(vec![])
    });

    let loaded = load_file(&script, engine, &config(2)).unwrap();
    assert_eq!(notes.load(Ordering::SeqCst), 2);
    assert_eq!(loaded.coordinator().metrics().critical_sections, 1);
}

#[test]
fn test_load_error_maps_back_to_source_line() {
    let scratch = scratch_dir();
    let dir = scratch.path();
    let script = dir.join("broken.lua");
    fs::write(&script, "x = 1\n--# JOINALL\ny = missing_function(x)\n").unwrap();

    let err = load_file(&script, Arc::new(NativeEngine::new()), &config(1)).unwrap_err();
    match err {
        BootstrapError::Load {
            path,
            line,
            source_line,
            message,
        } => {
            assert_eq!(path, dir.join("__parallel_broken.lua"));
            assert_eq!(line, 4);
            assert_eq!(source_line, Some(3));
            assert!(message.contains("missing_function"));
        }
        other => panic!("unexpected error {:?}", other),
    }
}

#[test]
fn test_unknown_directive_stops_before_running() {
    let scratch = scratch_dir();
    let dir = scratch.path();
    let script = dir.join("typo.lua");
    fs::write(&script, "--# JION f\n").unwrap();

    let err = load_file(&script, Arc::new(NativeEngine::new()), &config(1)).unwrap_err();
    assert!(err.to_string().contains("unknown directive `JION`"));
}
