//! Execution error types.

use std::time::Duration;

use crate::events::CallbackError;

/// Errors raised by the execution facade.
#[derive(thiserror::Error, Debug)]
pub enum ExecError {
    /// Neither a listener nor any callback was supplied.
    #[error("Either a process listener or on_finish/on_data callbacks must be passed")]
    NoDispatchTarget,

    /// A JavaScript helper was called without a working directory.
    #[error("working_dir is required")]
    WorkingDirRequired,

    /// The program to run was not found.
    #[error("Program not found: {0}")]
    NotFound(String),

    /// Permission denied when spawning.
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// The process exceeded its deadline and was killed.
    #[error("Process timed out after {0:?}")]
    TimedOut(Duration),

    /// The process was cancelled through its handle.
    #[error("Process cancelled")]
    Cancelled,

    /// A listener callback returned an error.
    #[error(transparent)]
    Callback(#[from] CallbackError),

    /// Spawning requires a running tokio runtime.
    #[error("No async runtime available")]
    NoRuntime,

    /// The execution task ended abnormally.
    #[error("Execution task failed: {0}")]
    Task(String),

    /// Other I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ExecError {
    /// Create an `ExecError` from a spawn failure, classifying common cases.
    pub(crate) fn from_spawn(program: &str, err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => Self::NotFound(program.to_string()),
            std::io::ErrorKind::PermissionDenied => Self::PermissionDenied(program.to_string()),
            _ => Self::Io(err),
        }
    }

    /// Whether this error was raised before any process was spawned.
    #[must_use]
    pub fn is_invocation_error(&self) -> bool {
        matches!(self, Self::NoDispatchTarget | Self::WorkingDirRequired)
    }
}
