use std::fmt;

use tracing::trace;

use super::worker::{WorkerStatus, WorkerUnit};

/// Point-in-time view of the worker pool
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolMetrics {
    /// Number of worker units
    pub pool_size: usize,

    /// Workers currently draining the queue
    pub busy_workers: usize,

    /// Function names being executed right now, one per busy worker
    pub executing: Vec<String>,

    /// Tasks finished normally, summed over the current workers
    pub tasks_completed: u64,

    /// Tasks that errored, summed over the current workers
    pub tasks_failed: u64,
}

/// The coordinator's vector of worker units.
///
/// Scans skip the worker whose thread is calling, so a task that calls
/// `join` or `joinall` from inside a worker does not wait on itself.
#[derive(Default)]
pub struct WorkerPool {
    workers: Vec<WorkerUnit>,
}

impl fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerPool")
            .field("workers", &self.workers)
            .finish()
    }
}

impl WorkerPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push(&mut self, worker: WorkerUnit) {
        self.workers.push(worker);
    }

    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    fn others(&self) -> impl Iterator<Item = &WorkerUnit> {
        self.workers.iter().filter(|w| !w.is_current_thread())
    }

    /// Starts the first idle worker. Returns its id if one was started.
    pub(crate) fn start_first_idle(&self) -> Option<usize> {
        let started = self.others().find(|w| w.try_start()).map(WorkerUnit::id);
        if started.is_none() {
            trace!("No idle worker to start; task stays queued");
        }
        started
    }

    /// Starts up to `limit` idle workers. Returns how many were started.
    pub(crate) fn start_idle(&self, limit: usize) -> usize {
        let mut started = 0;
        for worker in self.others() {
            if started == limit {
                break;
            }
            if worker.try_start() {
                started += 1;
            }
        }
        started
    }

    /// Whether another worker is executing a task calling `function`
    pub fn is_executing(&self, function: &str) -> bool {
        self.others().any(|w| w.is_executing(function))
    }

    /// Whether every other worker is idle
    pub fn all_idle(&self) -> bool {
        self.others().all(WorkerUnit::is_idle)
    }

    /// Whether the calling thread belongs to one of the workers
    pub fn on_worker_thread(&self) -> bool {
        self.workers.iter().any(WorkerUnit::is_current_thread)
    }

    pub fn busy_workers(&self) -> usize {
        self.workers
            .iter()
            .filter(|w| w.status() == WorkerStatus::Running)
            .count()
    }

    /// Removes every worker, leaving the pool empty
    pub(crate) fn take_all(&mut self) -> Vec<WorkerUnit> {
        std::mem::take(&mut self.workers)
    }

    pub fn metrics(&self) -> PoolMetrics {
        PoolMetrics {
            pool_size: self.workers.len(),
            busy_workers: self.busy_workers(),
            executing: self.workers.iter().filter_map(WorkerUnit::current_task).collect(),
            tasks_completed: self.workers.iter().map(WorkerUnit::tasks_completed).sum(),
            tasks_failed: self.workers.iter().map(WorkerUnit::tasks_failed).sum(),
        }
    }
}
