// taskbag: bag-of-tasks parallel runtime for embedded scripting engines
//
// Script authors annotate a script with directives (`--# PARALLEL`,
// `--# JOIN f`, ...). The translator rewrites them into calls on a
// coordinator, which runs the annotated function calls on a pool of worker
// threads, each with its own execution context of the engine.
//
// Module map:
// - translate: directive translator
// - task: call parser and task descriptors
// - scheduler: shared queue, worker units and pool
// - coordinator: public runtime API and critical sections
// - copier: moving values between execution contexts
// - native: reference engine of host closures and line scripts
// - bootstrap: file-level entry point
// - config, error, logging: ambient plumbing

pub mod bootstrap;
pub mod config;
pub mod coordinator;
pub mod copier;
pub mod error;
pub mod logging;
pub mod native;
pub mod scheduler;
pub mod syntax;
pub mod task;
pub mod translate;

// Re-export commonly used types
pub use bootstrap::{load_file, LoadedScript};
pub use config::{CoordinatorConfig, TaskbagConfig, TranslatorConfig};
pub use coordinator::{Coordinator, CoordinatorMetrics};
pub use error::{BootstrapError, ConfigError, CoordinatorError, SyntaxError, TranslateError};
pub use native::NativeEngine;
pub use translate::{translate_file, translate_lines, translate_source, Translation};

pub use taskbag_api;
