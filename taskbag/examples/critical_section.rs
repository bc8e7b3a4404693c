use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;
use std::time::Duration;

use taskbag::{logging, Coordinator, CoordinatorConfig, NativeEngine};
use taskbag_api::Value;

const TASKS: usize = 32;

fn main() -> anyhow::Result<()> {
    logging::init_development();

    // shared "file" the tasks append to; each append is a read-modify-write
    let balance = Arc::new(AtomicU64::new(0));

    let engine = Arc::new(NativeEngine::new());
    {
        let balance = Arc::clone(&balance);
        engine.function("deposit", move |scope, args| {
            let amount = args.first().and_then(Value::as_number).unwrap_or(0.0) as u64;
            let guarded = args.get(1).is_some_and(Value::is_truthy);
            let runtime = scope.runtime()?;

            if guarded {
                runtime.acquire(&Value::from("ledger"))?;
            }
            let seen = balance.load(Ordering::SeqCst);
            thread::sleep(Duration::from_millis(1));
            balance.store(seen + amount, Ordering::SeqCst);
            if guarded {
                runtime.release(&Value::from("ledger"))?;
            }
            Ok(vec![])
        });
    }

    let coordinator = Coordinator::new(engine, CoordinatorConfig::default().with_pool_size(4))?;

    for guarded in [false, true] {
        balance.store(0, Ordering::SeqCst);
        for _ in 0..TASKS {
            coordinator.parallel(&format!("deposit(10, {})", guarded))?;
        }
        coordinator.joinall()?;
        println!(
            "guarded={:<5} expected {} got {}",
            guarded,
            TASKS * 10,
            balance.load(Ordering::SeqCst)
        );
    }

    coordinator.shutdown();
    Ok(())
}
