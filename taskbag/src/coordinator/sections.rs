use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Condvar, Mutex, MutexGuard};

use taskbag_api::{RuntimeError, Value};
use tracing::{debug, warn};

/// A lock that can be taken in one call and released in another.
///
/// Not re-entrant and not owner-checked: a second `lock` from the thread
/// that holds it blocks forever, and any thread may `unlock`.
#[derive(Debug, Default)]
struct SectionLock {
    held: Mutex<bool>,
    freed: Condvar,
}

impl SectionLock {
    fn state(&self) -> MutexGuard<'_, bool> {
        self.held.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn lock(&self) {
        let mut held = self.state();
        while *held {
            held = self
                .freed
                .wait(held)
                .unwrap_or_else(|poisoned| poisoned.into_inner());
        }
        *held = true;
    }

    /// Returns whether the lock was held
    fn unlock(&self) -> bool {
        let mut held = self.state();
        let was_held = *held;
        *held = false;
        drop(held);
        self.freed.notify_one();
        was_held
    }

    fn is_held(&self) -> bool {
        *self.state()
    }
}

/// Named critical sections, created on first use and kept for the
/// coordinator's lifetime.
///
/// The map itself is guarded by a meta-mutex so that two threads acquiring
/// the same new name race safely to create one entry.
#[derive(Default)]
pub struct CriticalSections {
    sections: Mutex<HashMap<String, Arc<SectionLock>>>,
}

impl fmt::Debug for CriticalSections {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CriticalSections")
            .field("sections", &self.len())
            .finish()
    }
}

impl CriticalSections {
    pub fn new() -> Self {
        Self::default()
    }

    fn registry(&self) -> MutexGuard<'_, HashMap<String, Arc<SectionLock>>> {
        self.sections.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Stringified section name for an id; numbers and strings only
    pub fn section_name(id: &Value) -> Result<String, RuntimeError> {
        match id {
            Value::Number(_) | Value::String(_) => Ok(id.to_string()),
            other => Err(RuntimeError::InvalidSectionId(other.type_name().to_string())),
        }
    }

    /// Blocks until the section named `name` is free, then takes it
    pub fn acquire(&self, name: &str) {
        let section = {
            let mut sections = self.registry();
            Arc::clone(sections.entry(name.to_string()).or_insert_with(|| {
                debug!(section = name, "Creating critical section");
                Arc::new(SectionLock::default())
            }))
        };
        section.lock();
    }

    /// Frees the section named `name`. Releasing a section that is not held
    /// is not an error; it is logged and ignored.
    pub fn release(&self, name: &str) {
        let section = self.registry().get(name).cloned();
        match section {
            Some(section) => {
                if !section.unlock() {
                    warn!(section = name, "Released a critical section that was not held");
                }
            }
            None => warn!(section = name, "Released a critical section that was never acquired"),
        }
    }

    pub fn is_held(&self, name: &str) -> bool {
        self.registry().get(name).is_some_and(|s| s.is_held())
    }

    /// Number of sections created so far
    pub fn len(&self) -> usize {
        self.registry().len()
    }

    pub fn is_empty(&self) -> bool {
        self.registry().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_section_names() {
        assert_eq!(CriticalSections::section_name(&Value::Number(1.0)).unwrap(), "1");
        assert_eq!(CriticalSections::section_name(&Value::from("grid")).unwrap(), "grid");
        assert!(matches!(
            CriticalSections::section_name(&Value::Nil),
            Err(RuntimeError::InvalidSectionId(_))
        ));
    }

    #[test]
    fn test_entries_created_lazily_and_kept() {
        let sections = CriticalSections::new();
        assert!(sections.is_empty());

        sections.acquire("a");
        assert!(sections.is_held("a"));
        sections.release("a");
        assert!(!sections.is_held("a"));
        assert_eq!(sections.len(), 1);
    }

    #[test]
    fn test_release_without_acquire_is_ignored() {
        let sections = CriticalSections::new();
        sections.release("never");
        sections.acquire("x");
        sections.release("x");
        sections.release("x");
        assert!(!sections.is_held("x"));
    }

    #[test]
    fn test_mutual_exclusion() {
        let sections = Arc::new(CriticalSections::new());
        let inside = Arc::new(AtomicUsize::new(0));
        let overlaps = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let sections = Arc::clone(&sections);
                let inside = Arc::clone(&inside);
                let overlaps = Arc::clone(&overlaps);
                thread::spawn(move || {
                    for _ in 0..20 {
                        sections.acquire("counter");
                        if inside.fetch_add(1, Ordering::SeqCst) > 0 {
                            overlaps.fetch_add(1, Ordering::SeqCst);
                        }
                        thread::sleep(Duration::from_micros(50));
                        inside.fetch_sub(1, Ordering::SeqCst);
                        sections.release("counter");
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(overlaps.load(Ordering::SeqCst), 0);
    }
}
