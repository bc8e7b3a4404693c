// Worker threads log through the subscriber of the thread that started them.

use std::io;
use std::sync::{Arc, Mutex};

use taskbag::{Coordinator, CoordinatorConfig, NativeEngine};
use taskbag_api::Value;

#[derive(Clone, Default)]
struct Captured(Arc<Mutex<Vec<u8>>>);

impl Captured {
    fn text(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl io::Write for Captured {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[test]
fn test_task_failures_reach_the_scoped_subscriber() {
    let captured = Captured::default();
    let writer = captured.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_ansi(false)
        .with_max_level(tracing::Level::ERROR)
        .with_writer(move || writer.clone())
        .finish();

    let engine = Arc::new(NativeEngine::new());
    engine.function("diverge", |_, _| -> anyhow::Result<Vec<Value>> {
        anyhow::bail!("simulation diverged")
    });

    tracing::subscriber::with_default(subscriber, || {
        let coordinator = Coordinator::new(engine.clone(), CoordinatorConfig::default().with_pool_size(1)).unwrap();
        coordinator.parallel("diverge()").unwrap();
        coordinator.joinall().unwrap();
        coordinator.shutdown();
    });

    let text = captured.text();
    assert!(text.contains("Task failed"), "captured: {}", text);
    assert!(text.contains("simulation diverged"), "captured: {}", text);
}
