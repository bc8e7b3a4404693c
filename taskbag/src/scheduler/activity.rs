use std::fmt;
use std::sync::{Condvar, Mutex};
use std::time::Duration;

/// Progress signal between workers and threads blocked in `join`/`joinall`.
///
/// Workers bump a generation counter whenever a task finishes or a run
/// ends. A waiter reads the generation, checks its condition, and then waits
/// until the generation moves past what it read, so a notification sent
/// between the check and the wait is never lost. Waits are bounded by a
/// timeout as a backstop.
#[derive(Default)]
pub struct Activity {
    generation: Mutex<u64>,
    changed: Condvar,
}

impl fmt::Debug for Activity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Activity")
            .field("generation", &self.generation())
            .finish()
    }
}

impl Activity {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn generation(&self) -> u64 {
        *self.generation.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn notify(&self) {
        let mut generation = self.generation.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        *generation = generation.wrapping_add(1);
        drop(generation);
        self.changed.notify_all();
    }

    /// Waits until the generation differs from `seen` or `timeout` elapses
    pub fn wait_since(&self, seen: u64, timeout: Duration) {
        let generation = self.generation.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let _ = self
            .changed
            .wait_timeout_while(generation, timeout, |current| *current == seen);
    }
}
