use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;

pub const DEFAULT_POLL_INTERVAL_MS: u64 = 10;
pub const DEFAULT_DIRECTIVE_MARKER: &str = "--#";
pub const DEFAULT_RECEIVER: &str = "coordinator";
pub const DEFAULT_OUTPUT_PREFIX: &str = "__parallel_";

// --- Coordinator Configuration ---

/// Configuration for the [`Coordinator`](crate::Coordinator).
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct CoordinatorConfig {
    /// Number of worker units; defaults to the logical CPU count.
    pub pool_size: usize,

    /// Upper bound on how long `join`/`joinall` sleep between checks when
    /// no worker signals progress.
    pub poll_interval_ms: u64,

    /// Worker threads are named `<prefix><id>`.
    pub thread_name_prefix: String,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            pool_size: num_cpus::get(),
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            thread_name_prefix: "taskbag-worker-".to_string(),
        }
    }
}

impl CoordinatorConfig {
    pub fn with_pool_size(mut self, pool_size: usize) -> Self {
        self.pool_size = pool_size;
        self
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.pool_size == 0 {
            return Err(ConfigError::Invalid("pool_size must be at least 1".to_string()));
        }
        Ok(())
    }
}

// --- Translator Configuration ---

/// Configuration for the directive translator.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct TranslatorConfig {
    /// Token that starts a directive line, e.g. `--# PARALLEL`.
    pub marker: String,

    /// Global holding the coordinator handle in the instrumented script.
    pub receiver: String,

    /// First line of every instrumented script. `None` uses
    /// `<receiver> = Coordinator()`.
    pub header: Option<String>,

    /// Prefix added to the file name of the instrumented copy.
    pub output_prefix: String,
}

impl Default for TranslatorConfig {
    fn default() -> Self {
        Self {
            marker: DEFAULT_DIRECTIVE_MARKER.to_string(),
            receiver: DEFAULT_RECEIVER.to_string(),
            header: None,
            output_prefix: DEFAULT_OUTPUT_PREFIX.to_string(),
        }
    }
}

impl TranslatorConfig {
    pub fn header_line(&self) -> String {
        self.header
            .clone()
            .unwrap_or_else(|| format!("{} = Coordinator()", self.receiver))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.marker.trim().is_empty() {
            return Err(ConfigError::Invalid("marker must not be empty".to_string()));
        }
        if !crate::syntax::is_identifier(&self.receiver) {
            return Err(ConfigError::Invalid(format!(
                "receiver `{}` is not a valid global name",
                self.receiver
            )));
        }
        if self.output_prefix.is_empty() || self.output_prefix.contains(['/', '\\']) {
            return Err(ConfigError::Invalid(
                "output_prefix must be a non-empty file name prefix".to_string(),
            ));
        }
        Ok(())
    }
}

// --- Combined Configuration ---

/// Everything a bootstrap needs, as read from a JSON file.
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct TaskbagConfig {
    pub coordinator: CoordinatorConfig,
    pub translator: TranslatorConfig,
}

impl TaskbagConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&text)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.coordinator.validate()?;
        self.translator.validate()
    }
}
