//! # Scheduler Module
//!
//! The moving parts behind the coordinator: the shared task queue, the
//! worker units that drain it, the pool that holds them, and the activity
//! signal that lets `join`/`joinall` sleep between checks.
//!
//! ## Key Concepts
//! - Bag of tasks: one FIFO shared by every worker
//! - Persistent workers: one OS thread and one private context each
//! - Polling barriers: waiters re-check their condition on every signal
//!
//! ## Thread Safety
//! - The queue and the per-worker state are the only structures touched by
//!   more than one thread
//! - A worker's private context never leaves its thread

pub mod activity;
pub mod pool;
pub mod queue;
pub mod worker;

pub use activity::Activity;
pub use pool::{PoolMetrics, WorkerPool};
pub use queue::TaskQueue;
pub use worker::{WorkerStatus, WorkerUnit};
