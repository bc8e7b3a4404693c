use std::collections::VecDeque;
use std::fmt;
use std::sync::{Mutex, MutexGuard};

use crate::task::TaskDescriptor;

/// The bag of tasks: a FIFO of pending descriptors behind one mutex.
///
/// Every operation holds the lock only for its own duration. There is no
/// blocking pop; consumers re-check emptiness in their own loop.
///
/// # Guarantees
/// - Descriptors are dequeued in the order they were pushed
/// - A descriptor is handed to at most one caller of `try_pop_front`
/// - Completion order across workers is not ordered by the queue
#[derive(Default)]
pub struct TaskQueue {
    tasks: Mutex<VecDeque<TaskDescriptor>>,
}

impl fmt::Debug for TaskQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskQueue")
            .field("len", &self.len())
            .finish()
    }
}

impl TaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    // A panic while holding the lock cannot leave the deque half-updated.
    fn lock(&self) -> MutexGuard<'_, VecDeque<TaskDescriptor>> {
        self.tasks.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Appends a descriptor at the back of the queue
    pub fn push_back(&self, task: TaskDescriptor) {
        self.lock().push_back(task);
    }

    /// Removes the oldest descriptor, or returns `None` when the queue is empty
    pub fn try_pop_front(&self) -> Option<TaskDescriptor> {
        self.lock().pop_front()
    }

    /// Like [`try_pop_front`](Self::try_pop_front), but runs `claim` on the
    /// descriptor before the queue lock is released
    pub fn try_pop_front_with<F>(&self, claim: F) -> Option<TaskDescriptor>
    where
        F: FnOnce(&TaskDescriptor),
    {
        let mut tasks = self.lock();
        let task = tasks.pop_front()?;
        claim(&task);
        Some(task)
    }

    /// Snapshot of the queue length; may change as soon as it is returned
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Whether a pending descriptor calls `function`
    pub fn contains_function(&self, function: &str) -> bool {
        self.lock().iter().any(|task| task.function() == function)
    }
}
