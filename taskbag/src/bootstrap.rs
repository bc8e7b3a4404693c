//! # Bootstrap
//!
//! Turns an annotated script file into a running program:
//!
//! 1. read the script and translate its directives
//! 2. write the instrumented copy next to the original
//! 3. start a coordinator around a fresh main context
//! 4. load the instrumented copy into the main context
//!
//! Load errors are reported against the instrumented file, with the line of
//! the original script alongside so the author can find it.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use taskbag_api::{ExecutionContext, ScriptEngine, ScriptError};
use tracing::info;

use crate::config::TaskbagConfig;
use crate::coordinator::Coordinator;
use crate::error::BootstrapError;
use crate::translate::{self, Translation};

/// A script that has been translated and loaded.
///
/// Dropping it shuts the coordinator down; call [`finish`](Self::finish)
/// first to wait for outstanding tasks.
#[derive(Debug)]
pub struct LoadedScript {
    source: PathBuf,
    instrumented: PathBuf,
    translation: Translation,
    coordinator: Coordinator,
}

impl LoadedScript {
    /// Path of the original script
    pub fn source_path(&self) -> &Path {
        &self.source
    }

    /// Path of the instrumented copy that was loaded
    pub fn instrumented_path(&self) -> &Path {
        &self.instrumented
    }

    pub fn translation(&self) -> &Translation {
        &self.translation
    }

    pub fn coordinator(&self) -> &Coordinator {
        &self.coordinator
    }

    pub fn main_context(&self) -> Arc<dyn ExecutionContext> {
        self.coordinator.main_context()
    }

    /// Waits for every queued and running task, then shuts the pool down
    pub fn finish(self) -> Result<Coordinator, BootstrapError> {
        self.coordinator.joinall()?;
        self.coordinator.shutdown();
        Ok(self.coordinator)
    }
}

/// Translates, writes and loads the script at `path`.
pub fn load_file(
    path: impl AsRef<Path>,
    engine: Arc<dyn ScriptEngine>,
    config: &TaskbagConfig,
) -> Result<LoadedScript, BootstrapError> {
    let path = path.as_ref();
    config.translator.validate()?;

    let (instrumented, translation) = translate::translate_file_with_map(path, &config.translator)?;
    let coordinator = Coordinator::new(engine, config.coordinator.clone())?;

    let chunk = instrumented
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| instrumented.display().to_string());
    let main = coordinator.main_context();

    if let Err(err) = main.load(&chunk, &translation.to_source()) {
        let err = match err {
            ScriptError::Load { line, message, .. } => BootstrapError::Load {
                path: instrumented.clone(),
                line,
                source_line: translation.source_line(line),
                message,
            },
            other => BootstrapError::Script(other),
        };
        crate::log_error!(err, script = %path.display());
        return Err(err);
    }

    info!(
        script = %path.display(),
        coordinator = %coordinator.id(),
        directives = translation.directives(),
        "Script loaded"
    );
    Ok(LoadedScript {
        source: path.to_path_buf(),
        instrumented,
        translation,
        coordinator,
    })
}
