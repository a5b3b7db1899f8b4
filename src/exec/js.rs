//! Helpers for running JavaScript through a Node interpreter.

use std::path::Path;

use crate::exec::{exec_cmd_with, CommandLine, Dispatch, ExecError, ExecOptions, ProcessHandle};
use crate::exec::{ProcessSpawner, TokioSpawner};

/// Interpreter used when no explicit node path is given.
pub const DEFAULT_NODE: &str = "node";

fn node_program(node_path: Option<&Path>) -> String {
    node_path.map_or_else(
        || DEFAULT_NODE.to_string(),
        |p| p.to_string_lossy().into_owned(),
    )
}

/// Argument vector for evaluating inline source.
#[must_use]
pub fn js_eval_args(content: &str, node_path: Option<&Path>) -> Vec<String> {
    vec![node_program(node_path), "-e".to_string(), content.to_string()]
}

/// Argument vector for running a script file.
#[must_use]
pub fn js_file_args(file: &Path, args: &[String], node_path: Option<&Path>) -> Vec<String> {
    let mut argv = vec![node_program(node_path), file.to_string_lossy().into_owned()];
    argv.extend(args.iter().cloned());
    argv
}

fn require_working_dir(options: &ExecOptions) -> Result<(), ExecError> {
    if options.get_working_dir().is_none() {
        return Err(ExecError::WorkingDirRequired);
    }
    Ok(())
}

/// Evaluate `content` with node.
///
/// The working directory is the base from which `require` resolves modules,
/// so it must be set in `options`.
///
/// # Errors
///
/// Returns `ExecError::WorkingDirRequired` when no working directory is set,
/// plus any error from [`exec_cmd`](crate::exec::exec_cmd).
pub fn execjs(
    content: &str,
    node_path: Option<&Path>,
    options: &ExecOptions,
    dispatch: Dispatch,
) -> Result<ProcessHandle, ExecError> {
    execjs_with(&TokioSpawner, content, node_path, options, dispatch)
}

/// [`execjs`] through a specific spawner.
///
/// # Errors
///
/// Same as [`execjs`].
pub fn execjs_with(
    spawner: &dyn ProcessSpawner,
    content: &str,
    node_path: Option<&Path>,
    options: &ExecOptions,
    dispatch: Dispatch,
) -> Result<ProcessHandle, ExecError> {
    require_working_dir(options)?;
    let line = CommandLine::Argv(js_eval_args(content, node_path));
    exec_cmd_with(spawner, line, options, dispatch)
}

/// Run the script at `file` with `args`.
///
/// # Errors
///
/// Returns `ExecError::WorkingDirRequired` when no working directory is set,
/// plus any error from [`exec_cmd`](crate::exec::exec_cmd).
pub fn execjsfile(
    file: &Path,
    args: &[String],
    node_path: Option<&Path>,
    options: &ExecOptions,
    dispatch: Dispatch,
) -> Result<ProcessHandle, ExecError> {
    execjsfile_with(&TokioSpawner, file, args, node_path, options, dispatch)
}

/// [`execjsfile`] through a specific spawner.
///
/// # Errors
///
/// Same as [`execjsfile`].
pub fn execjsfile_with(
    spawner: &dyn ProcessSpawner,
    file: &Path,
    args: &[String],
    node_path: Option<&Path>,
    options: &ExecOptions,
    dispatch: Dispatch,
) -> Result<ProcessHandle, ExecError> {
    require_working_dir(options)?;
    let line = CommandLine::Argv(js_file_args(file, args, node_path));
    exec_cmd_with(spawner, line, options, dispatch)
}
