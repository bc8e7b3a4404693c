// Logging for taskbag
//
// The runtime logs through `tracing`. Nothing is printed until the host
// installs a subscriber; this module offers ready-made ones.
//
// # Usage Examples
//
// ## Basic Initialization
//
// ```rust
// use taskbag::logging;
//
// // INFO level, console output
// logging::init(logging::LogConfig::default());
// ```
//
// ## Development / Production
//
// ```rust
// use taskbag::logging;
//
// // DEBUG level, worker transitions at TRACE, file/line info
// logging::init_development();
//
// // or: INFO level, JSON lines for log aggregators
// logging::init_production();
// ```
//
// ## File Logging
//
// ```rust
// use taskbag::logging;
//
// logging::init_with_file(logging::LogConfig::default(), "/var/log/taskbag/run.log").unwrap();
// ```
//
// ## Span Macros
//
// Workers enter a `worker` span for their whole life and a `task` span per
// task, so every event emitted by a task carries the worker id and the
// function name:
//
// ```rust
// let span = taskbag::task_span!("integrate", 3);
// let _guard = span.enter();
// ```

use std::fs::OpenOptions;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Once;

use tracing::{Level, Subscriber};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Configuration for the logging system
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Minimum log level to display
    pub level: Level,
    /// Whether to use JSON format for logs
    pub json_format: bool,
    /// Whether to include file and line information
    pub show_file_line: bool,
    /// Whether to include thread name/id; worker threads are named after
    /// their worker id
    pub show_thread_info: bool,
    /// Whether to include timestamps
    pub show_time: bool,
    /// Target filter expressions (format: "target=level,target2=level2,...")
    pub target_filters: Option<String>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            json_format: false,
            show_file_line: true,
            show_thread_info: true,
            show_time: true,
            target_filters: None,
        }
    }
}

// Only the first initialization takes effect
static INIT: Once = Once::new();

fn env_filter(config: &LogConfig) -> EnvFilter {
    let mut filter = EnvFilter::from_default_env().add_directive(config.level.into());
    if let Some(filters) = &config.target_filters {
        for directive in filters.split(',').filter_map(|f| f.trim().parse().ok()) {
            filter = filter.add_directive(directive);
        }
    }
    filter
}

/// Installs the global subscriber described by `config`.
///
/// Safe to call more than once; later calls are ignored.
pub fn init(config: LogConfig) {
    INIT.call_once(|| {
        let registry = tracing_subscriber::registry().with(env_filter(&config));

        let subscriber: Box<dyn Subscriber + Send + Sync> = match (config.json_format, config.show_time) {
            (true, _) => Box::new(registry.with(fmt::layer().json().flatten_event(true))),
            (false, true) => Box::new(registry.with(
                fmt::layer()
                    .with_ansi(atty::is(atty::Stream::Stdout))
                    .with_file(config.show_file_line)
                    .with_line_number(config.show_file_line)
                    .with_thread_names(config.show_thread_info)
                    .with_thread_ids(config.show_thread_info),
            )),
            (false, false) => Box::new(registry.with(
                fmt::layer()
                    .without_time()
                    .with_ansi(atty::is(atty::Stream::Stdout))
                    .with_file(config.show_file_line)
                    .with_line_number(config.show_file_line)
                    .with_thread_names(config.show_thread_info)
                    .with_thread_ids(config.show_thread_info),
            )),
        };

        set_global_subscriber(subscriber);
    });
}

fn set_global_subscriber<S>(subscriber: S)
where
    S: Subscriber + Send + Sync + 'static,
{
    if let Err(err) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Error setting global tracing subscriber: {}", err);
    }
}

/// Opens `path` for appending, creating it if needed
pub fn file_writer(path: &Path) -> io::Result<Box<dyn io::Write + Send + Sync + 'static>> {
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    Ok(Box::new(file))
}

/// Logs to the console and to `log_file`. File output is always plain text
/// with file/line and thread information.
///
/// The file is opened once up front so a bad path is reported here rather
/// than swallowed by the writer.
pub fn init_with_file(config: LogConfig, log_file: impl AsRef<Path>) -> io::Result<()> {
    let path: PathBuf = log_file.as_ref().to_path_buf();
    drop(file_writer(&path)?);

    INIT.call_once(|| {
        let console_layer = fmt::layer()
            .with_ansi(atty::is(atty::Stream::Stdout))
            .with_file(config.show_file_line)
            .with_line_number(config.show_file_line)
            .with_thread_names(config.show_thread_info)
            .with_thread_ids(config.show_thread_info);

        let file_layer = fmt::layer()
            .with_ansi(false)
            .with_writer(move || match file_writer(&path) {
                Ok(writer) => writer,
                Err(_) => Box::new(io::stderr()),
            })
            .with_file(true)
            .with_line_number(true)
            .with_thread_names(true)
            .with_thread_ids(true);

        let subscriber = tracing_subscriber::registry()
            .with(env_filter(&config))
            .with(console_layer)
            .with(file_layer);

        set_global_subscriber(subscriber);
    });

    Ok(())
}

/// DEBUG level, worker and queue transitions at TRACE, colored output with
/// file/line and thread information.
pub fn init_development() {
    init(LogConfig {
        level: Level::DEBUG,
        json_format: false,
        show_file_line: true,
        show_thread_info: true,
        show_time: true,
        target_filters: Some("taskbag=debug,taskbag::scheduler=trace".to_string()),
    });
}

/// INFO level JSON lines without file/line information.
pub fn init_production() {
    init(LogConfig {
        level: Level::INFO,
        json_format: true,
        show_file_line: false,
        show_thread_info: true,
        show_time: true,
        target_filters: None,
    });
}

/// WARN level, compact plain output for test runs.
pub fn init_test() {
    init(LogConfig {
        level: Level::WARN,
        json_format: false,
        show_file_line: true,
        show_thread_info: false,
        show_time: false,
        target_filters: None,
    });
}

/// The current dispatcher, for threads that should log with the same
/// configuration as their parent.
#[inline]
pub fn current_subscriber() -> tracing::Dispatch {
    tracing::dispatcher::get_default(|d| d.clone())
}

/// Span covering the life of a worker thread
#[macro_export]
macro_rules! worker_span {
    ($worker:expr) => {
        tracing::info_span!("worker", id = $worker)
    };
    ($worker:expr, $($fields:tt)*) => {
        tracing::info_span!("worker", id = $worker, $($fields)*)
    };
}

/// Span covering the execution of one task
///
/// ```rust
/// let span = taskbag::task_span!("integrate", 0, call = "r = integrate(a, b)");
/// let _guard = span.enter();
/// ```
#[macro_export]
macro_rules! task_span {
    ($function:expr, $worker:expr) => {
        tracing::debug_span!("task", function = $function, worker = $worker)
    };
    ($function:expr, $worker:expr, $($fields:tt)*) => {
        tracing::debug_span!("task", function = $function, worker = $worker, $($fields)*)
    };
}

/// Log the end of a task with its invocation status
#[macro_export]
macro_rules! log_task {
    ($function:expr, $status:expr) => {
        tracing::debug!(function = $function, status = $status, "Task finished");
    };
    ($function:expr, $status:expr, $($fields:tt)*) => {
        tracing::debug!(function = $function, status = $status, $($fields)*, "Task finished");
    };
}

/// Log worker pool lifecycle events
#[macro_export]
macro_rules! log_pool {
    ($coordinator:expr, $event:expr, $workers:expr) => {
        tracing::info!(coordinator = %$coordinator, event = $event, workers = $workers, "Worker pool {}", $event);
    };
}

/// Log error events
///
/// ```rust
/// let error = std::io::Error::new(std::io::ErrorKind::NotFound, "script not found");
/// taskbag::log_error!(error, path = "model.lua");
/// ```
#[macro_export]
macro_rules! log_error {
    ($error:expr) => {
        tracing::error!(error = %$error);
    };
    ($error:expr, $($fields:tt)*) => {
        tracing::error!(error = %$error, $($fields)*);
    };
}
