use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;
use taskbag::{load_file, logging, NativeEngine, TaskbagConfig};
use taskbag_api::{ExecutionContext, Value};

// Annotated script: four partial sums run in parallel, then the main
// script combines them once `partial` has drained.
const SCRIPT: &str = r#"-- sum of 0..n-1 in four slices
n = 4000000
q = 1000000
--# NP 4
--# PARALLEL
s1 = partial(0, q)
--# PARALLEL
s2 = partial(q, q)
--# PARALLEL
s3 = partial(2000000, q)
--# PARALLEL
s4 = partial(3000000, q)
--# JOIN partial
total = add(s1, s2, s3, s4)
print("total", total)
"#;

fn main() -> anyhow::Result<()> {
    logging::init_development();

    let dir = tempfile::tempdir().context("creating scratch directory")?;
    let script = dir.path().join("sum.lua");
    std::fs::write(&script, SCRIPT).context("writing example script")?;

    let engine = Arc::new(NativeEngine::new());
    engine
        .function("partial", |scope, args| {
            let start = args.first().and_then(Value::as_number).unwrap_or(0.0) as u64;
            let len = args.get(1).and_then(Value::as_number).unwrap_or(0.0) as u64;
            // simulate a slow kernel
            std::thread::sleep(Duration::from_millis(200));
            let sum: u64 = (start..start + len).sum();
            println!("  [{}] partial({}, {}) = {}", scope.context_id(), start, len, sum);
            Ok(vec![Value::from(sum as f64)])
        })
        .function("add", |_, args| {
            Ok(vec![Value::from(args.iter().filter_map(Value::as_number).sum::<f64>())])
        });

    let started = Instant::now();
    let loaded = load_file(&script, engine, &TaskbagConfig::default())?;
    println!(
        "Ran {} with {} workers in {:?}",
        loaded.instrumented_path().display(),
        loaded.coordinator().pool_size(),
        started.elapsed()
    );
    println!("total = {}", loaded.main_context().global("total").unwrap_or_default());

    let coordinator = loaded.finish()?;
    println!("{:#?}", coordinator.metrics());
    Ok(())
}
