//! # Tasks
//!
//! A task is one deferred function call: the parsed call text, copies of
//! the named parameters taken when it was enqueued, and the names its
//! results are stored under in the main context.

pub mod call;
pub mod descriptor;

pub use call::{Argument, CallSpec};
pub use descriptor::{ParameterSnapshot, TaskDescriptor};
