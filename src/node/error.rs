//! Resolution errors and user-facing reporting.

use std::path::PathBuf;

use crate::exec::ExecError;

/// Errors raised while resolving a usable node executable.
#[derive(thiserror::Error, Debug)]
pub enum ResolveError {
    /// Neither settings nor the environment probe produced a path.
    #[error("Could not find any path to node via system installed or nvm")]
    NotFound,

    /// The configured or resolved path does not exist.
    #[error("The node_path setting is invalid, \"{}\"", .0.display())]
    InvalidPath(PathBuf),

    /// The probe process could not run to completion.
    #[error("Environment probe failed: {0}")]
    Exec(#[from] ExecError),

    /// The probe process ended without delivering a result.
    #[error("Environment probe finished without reporting a result")]
    NoResult,
}

/// Channel for messages the user must see, such as a modal error dialog.
pub trait Notifier: Send + Sync {
    /// Show an error message.
    fn error_message(&self, message: &str);
}

/// Notifier that writes to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn error_message(&self, message: &str) {
        tracing::error!(message = %message, "Node resolution failed");
    }
}
