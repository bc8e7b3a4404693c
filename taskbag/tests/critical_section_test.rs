// Critical sections serialize read-modify-write sequences across workers.


use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

use taskbag::NativeEngine;
use taskbag_api::{RuntimeError, Value};
use test_helpers::coordinator_with;

const TASKS: usize = 40;

/// Defines `bump(id)`: an unprotected load/sleep/store on `counter`
/// wrapped in `acquire(id)`/`release(id)`
fn install_bump(engine: &NativeEngine, counter: Arc<AtomicUsize>) {
    engine.function("bump", move |scope, args| {
        let runtime = scope.runtime()?;
        let id = args.into_iter().next().unwrap_or_default();
        runtime.acquire(&id)?;
        let seen = counter.load(Ordering::SeqCst);
        thread::sleep(Duration::from_micros(200));
        counter.store(seen + 1, Ordering::SeqCst);
        runtime.release(&id)?;
        Ok(vec![])
    });
}

#[test]
fn test_counter_equals_task_count_for_any_pool_size() {
    for pool_size in [1, 2, 4, 8] {
        let engine = Arc::new(NativeEngine::new());
        let counter = Arc::new(AtomicUsize::new(0));
        install_bump(&engine, Arc::clone(&counter));
        let coordinator = coordinator_with(&engine, pool_size);

        for _ in 0..TASKS {
            coordinator.parallel("bump(1)").unwrap();
        }
        coordinator.joinall().unwrap();

        assert_eq!(counter.load(Ordering::SeqCst), TASKS, "pool size {}", pool_size);
        assert_eq!(coordinator.metrics().critical_sections, 1);
    }
}

#[test]
fn test_numeric_and_string_ids_name_the_same_kind_of_section() {
    let engine = Arc::new(NativeEngine::new());
    let counter = Arc::new(AtomicUsize::new(0));
    install_bump(&engine, Arc::clone(&counter));
    let coordinator = coordinator_with(&engine, 4);

    for _ in 0..TASKS / 2 {
        coordinator.parallel("bump(\"grid\")").unwrap();
    }
    coordinator.joinall().unwrap();

    assert_eq!(counter.load(Ordering::SeqCst), TASKS / 2);
    assert_eq!(coordinator.metrics().critical_sections, 1);
}

#[test]
fn test_main_thread_acquire_blocks_tasks() {
    let engine = Arc::new(NativeEngine::new());
    let counter = Arc::new(AtomicUsize::new(0));
    install_bump(&engine, Arc::clone(&counter));
    let coordinator = coordinator_with(&engine, 2);

    coordinator.acquire(7).unwrap();
    coordinator.parallel("bump(7)").unwrap();
    thread::sleep(Duration::from_millis(50));
    assert_eq!(counter.load(Ordering::SeqCst), 0);

    coordinator.release(7).unwrap();
    coordinator.joinall().unwrap();
    assert_eq!(counter.load(Ordering::SeqCst), 1);
}

#[test]
fn test_release_of_free_section_is_harmless() {
    let engine = Arc::new(NativeEngine::new());
    let coordinator = coordinator_with(&engine, 1);
    coordinator.release("never-acquired").unwrap();
    coordinator.acquire("x").unwrap();
    coordinator.release("x").unwrap();
    coordinator.release("x").unwrap();
}

#[test]
fn test_invalid_section_ids() {
    let engine = Arc::new(NativeEngine::new());
    let coordinator = coordinator_with(&engine, 1);
    assert_eq!(
        coordinator.acquire(Value::Nil),
        Err(RuntimeError::InvalidSectionId("nil".to_string()))
    );
    assert_eq!(
        coordinator.release(true),
        Err(RuntimeError::InvalidSectionId("boolean".to_string()))
    );
}
