//! Asynchronous process execution.
//!
//! [`exec_cmd`] validates the dispatch target, launches the command through a
//! [`ProcessSpawner`], and returns a [`ProcessHandle`] immediately. Output is
//! streamed to a [`ProcessListener`] from a background task; the handle can
//! be awaited, cancelled, or bounded with a timeout.

use std::collections::HashMap;
use std::ffi::OsString;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::events::{callback, Callback, CallbackError};
use crate::exec::{ExecError, ProcessEvent, ProcessListener, DATA_EVENT, FINISH_EVENT};

/// Default buffer size for the output chunk channel.
pub const DEFAULT_CHANNEL_BUFFER: usize = 64;

/// Default grace period between SIGTERM and SIGKILL.
pub const DEFAULT_TERMINATE_TIMEOUT: Duration = Duration::from_secs(2);

/// How long to keep draining pipes after a killed process exits.
const DRAIN_GRACE: Duration = Duration::from_millis(200);

const READ_CHUNK: usize = 4096;

/// What to run: a shell command line or an argument vector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandLine {
    /// Interpreted by the platform shell (`sh -c` or `cmd /C`).
    Shell(String),
    /// Executed directly; the first element is the program.
    Argv(Vec<String>),
}

impl CommandLine {
    /// A shell command line.
    #[must_use]
    pub fn shell(command: impl Into<String>) -> Self {
        Self::Shell(command.into())
    }

    /// An argument vector.
    #[must_use]
    pub fn argv<I, S>(args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Argv(args.into_iter().map(Into::into).collect())
    }

    /// Whether this runs through the shell.
    #[must_use]
    pub fn is_shell(&self) -> bool {
        matches!(self, Self::Shell(_))
    }

    /// The program that will be launched.
    #[must_use]
    pub fn program(&self) -> &str {
        match self {
            Self::Shell(_) => shell_program(),
            Self::Argv(args) => args.first().map_or("", String::as_str),
        }
    }

    /// Build the tokio command for this line.
    fn to_command(&self) -> Result<Command, ExecError> {
        match self {
            Self::Shell(line) => {
                let mut cmd = Command::new(shell_program());
                cmd.arg(shell_flag());
                // cmd.exe does its own parsing; quoting would mangle it.
                #[cfg(windows)]
                cmd.raw_arg(line);
                #[cfg(not(windows))]
                cmd.arg(line);
                Ok(cmd)
            }
            Self::Argv(args) => {
                let (program, rest) = args.split_first().ok_or_else(|| {
                    ExecError::Io(std::io::Error::new(
                        std::io::ErrorKind::InvalidInput,
                        "empty argument vector",
                    ))
                })?;
                let mut cmd = Command::new(program);
                cmd.args(rest);
                Ok(cmd)
            }
        }
    }
}

impl fmt::Display for CommandLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Shell(line) => f.write_str(line),
            Self::Argv(args) => f.write_str(&args.join(" ")),
        }
    }
}

#[cfg(windows)]
fn shell_program() -> &'static str {
    "cmd"
}

#[cfg(not(windows))]
fn shell_program() -> &'static str {
    "sh"
}

#[cfg(windows)]
fn shell_flag() -> &'static str {
    "/C"
}

#[cfg(not(windows))]
fn shell_flag() -> &'static str {
    "-c"
}

/// Options applied to the spawned child.
#[derive(Debug, Clone, Default)]
pub struct ExecOptions {
    working_dir: Option<PathBuf>,
    env: HashMap<String, String>,
    path: Option<OsString>,
    timeout: Option<Duration>,
}

impl ExecOptions {
    /// Create empty options.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the child's working directory. The parent's cwd is not touched.
    #[must_use]
    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Add an environment override.
    #[must_use]
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Add several environment overrides.
    #[must_use]
    pub fn envs<I, K, V>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.env
            .extend(vars.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// Prepend entries to the child's `PATH`.
    #[must_use]
    pub fn path(mut self, path: impl Into<OsString>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Kill the child if it runs longer than `timeout`.
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Get the working directory, if set.
    #[must_use]
    pub fn get_working_dir(&self) -> Option<&Path> {
        self.working_dir.as_deref()
    }

    /// Get the environment overrides.
    #[must_use]
    pub fn get_env(&self) -> &HashMap<String, String> {
        &self.env
    }

    /// Get the extra `PATH` entries, if set.
    #[must_use]
    pub fn get_path(&self) -> Option<&OsString> {
        self.path.as_ref()
    }

    /// Get the timeout, if set.
    #[must_use]
    pub fn get_timeout(&self) -> Option<Duration> {
        self.timeout
    }

    fn apply(&self, cmd: &mut Command) {
        if let Some(ref dir) = self.working_dir {
            cmd.current_dir(dir);
        }

        cmd.envs(&self.env);

        if let Some(ref extra) = self.path {
            let mut entries: Vec<PathBuf> = std::env::split_paths(extra).collect();
            let existing = self
                .env
                .get("PATH")
                .map(OsString::from)
                .or_else(|| std::env::var_os("PATH"));
            if let Some(existing) = existing {
                entries.extend(std::env::split_paths(&existing));
            }
            match std::env::join_paths(entries) {
                Ok(joined) => {
                    cmd.env("PATH", joined);
                }
                Err(e) => tracing::warn!(error = %e, "Ignoring unusable extra PATH entries"),
            }
        }
    }
}

/// Where process events go: a listener, callbacks, or both.
#[derive(Default)]
pub struct Dispatch {
    listener: Option<ProcessListener>,
    on_finish: Option<Callback<ProcessEvent>>,
    on_data: Option<Callback<ProcessEvent>>,
}

impl Dispatch {
    /// An empty dispatch. Passing it unchanged to `exec_cmd` is an error.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver events to an existing listener.
    #[must_use]
    pub fn listener(mut self, listener: ProcessListener) -> Self {
        self.listener = Some(listener);
        self
    }

    /// Call `f` with the full transcript when the process finishes.
    #[must_use]
    pub fn on_finish<F>(mut self, f: F) -> Self
    where
        F: Fn(&ProcessEvent) -> Result<(), CallbackError> + Send + Sync + 'static,
    {
        self.on_finish = Some(callback(f));
        self
    }

    /// Call `f` for every output chunk.
    #[must_use]
    pub fn on_data<F>(mut self, f: F) -> Self
    where
        F: Fn(&ProcessEvent) -> Result<(), CallbackError> + Send + Sync + 'static,
    {
        self.on_data = Some(callback(f));
        self
    }

    /// Whether any target is present.
    #[must_use]
    pub fn has_target(&self) -> bool {
        self.listener.is_some() || self.on_finish.is_some() || self.on_data.is_some()
    }

    /// Resolve to a single listener with the callbacks wired to it.
    ///
    /// Callbacks given alongside an explicit listener are registered on that
    /// listener after its existing subscriptions.
    ///
    /// # Errors
    ///
    /// Returns `ExecError::NoDispatchTarget` if nothing was supplied.
    pub fn into_listener(self) -> Result<ProcessListener, ExecError> {
        if !self.has_target() {
            return Err(ExecError::NoDispatchTarget);
        }

        let listener = self.listener.unwrap_or_default();
        if let Some(cb) = self.on_finish {
            listener.emitter().on(FINISH_EVENT, cb);
        }
        if let Some(cb) = self.on_data {
            listener.emitter().on(DATA_EVENT, cb);
        }
        Ok(listener)
    }
}

impl fmt::Debug for Dispatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatch")
            .field("listener", &self.listener.is_some())
            .field("on_finish", &self.on_finish.is_some())
            .field("on_data", &self.on_data.is_some())
            .finish()
    }
}

/// Result of a completed process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessOutcome {
    /// OS process id.
    pub pid: Option<u32>,
    /// Exit code, absent when terminated by a signal.
    pub exit_code: Option<i32>,
    /// Whether the process exited successfully.
    pub success: bool,
    /// Combined stdout/stderr transcript.
    pub output: Vec<u8>,
    /// Wall time from spawn to finish.
    pub elapsed: Duration,
}

impl ProcessOutcome {
    /// Output decoded as UTF-8, replacing invalid sequences.
    #[must_use]
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.output).into_owned()
    }
}

/// Handle to a spawned process.
///
/// Dropping the handle does not stop the process; events keep flowing to
/// the listener until it exits.
#[derive(Debug)]
pub struct ProcessHandle {
    pid: Option<u32>,
    cancel: CancellationToken,
    task: JoinHandle<Result<ProcessOutcome, ExecError>>,
}

impl ProcessHandle {
    /// Wrap a running execution task.
    ///
    /// Custom spawners use this to hand back their own tasks.
    #[must_use]
    pub fn new(
        pid: Option<u32>,
        cancel: CancellationToken,
        task: JoinHandle<Result<ProcessOutcome, ExecError>>,
    ) -> Self {
        Self { pid, cancel, task }
    }

    /// The OS process id.
    #[must_use]
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Request termination. The finish event still fires once the process
    /// exits, and `wait` returns `ExecError::Cancelled`.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Token that cancels this process when triggered.
    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Whether the execution task has completed.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the process to finish.
    ///
    /// # Errors
    ///
    /// Returns `ExecError::TimedOut` or `ExecError::Cancelled` when the
    /// process was stopped, `ExecError::Callback` when a listener callback
    /// failed, or an I/O error from reaping the child.
    pub async fn wait(self) -> Result<ProcessOutcome, ExecError> {
        match self.task.await {
            Ok(result) => result,
            Err(e) => Err(ExecError::Task(e.to_string())),
        }
    }
}

/// The process-spawn boundary.
pub trait ProcessSpawner: Send + Sync {
    /// Launch `line` and stream its events to `listener`.
    ///
    /// # Errors
    ///
    /// Returns an error if the process cannot be started.
    fn spawn(
        &self,
        line: &CommandLine,
        options: &ExecOptions,
        listener: ProcessListener,
    ) -> Result<ProcessHandle, ExecError>;
}

/// Spawner backed by `tokio::process`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSpawner;

impl ProcessSpawner for TokioSpawner {
    fn spawn(
        &self,
        line: &CommandLine,
        options: &ExecOptions,
        listener: ProcessListener,
    ) -> Result<ProcessHandle, ExecError> {
        if tokio::runtime::Handle::try_current().is_err() {
            return Err(ExecError::NoRuntime);
        }

        let mut cmd = line.to_command()?;
        options.apply(&mut cmd);
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd
            .spawn()
            .map_err(|e| ExecError::from_spawn(line.program(), e))?;
        let pid = child.id();
        tracing::debug!(?pid, command = %line, shell = line.is_shell(), "Spawned process");

        let (tx, rx) = mpsc::channel(DEFAULT_CHANNEL_BUFFER);
        let mut pumps = Vec::with_capacity(2);
        if let Some(stdout) = child.stdout.take() {
            pumps.push(pump(stdout, tx.clone()));
        }
        if let Some(stderr) = child.stderr.take() {
            pumps.push(pump(stderr, tx.clone()));
        }
        drop(tx);

        let cancel = CancellationToken::new();
        let run = Run {
            child,
            pid,
            listener,
            timeout: options.timeout,
            cancel: cancel.clone(),
        };
        let task = tokio::spawn(run.drive(rx, pumps));

        Ok(ProcessHandle::new(pid, cancel, task))
    }
}

fn pump<R>(mut reader: R, tx: mpsc::Sender<Vec<u8>>) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut buf = vec![0u8; READ_CHUNK];
        loop {
            match reader.read(&mut buf).await {
                Ok(0) => break,
                Ok(n) => {
                    if tx.send(buf[..n].to_vec()).await.is_err() {
                        break;
                    }
                }
                Err(e) => {
                    tracing::debug!(error = %e, "Output pipe read failed");
                    break;
                }
            }
        }
    })
}

/// State owned by the execution task.
struct Run {
    child: Child,
    pid: Option<u32>,
    listener: ProcessListener,
    timeout: Option<Duration>,
    cancel: CancellationToken,
}

impl Run {
    async fn drive(
        mut self,
        mut rx: mpsc::Receiver<Vec<u8>>,
        pumps: Vec<JoinHandle<()>>,
    ) -> Result<ProcessOutcome, ExecError> {
        let started = Instant::now();
        let deadline = self.timeout.map(|t| started + t);
        let mut callback_error: Option<CallbackError> = None;
        let mut stopped: Option<ExecError> = None;

        loop {
            tokio::select! {
                chunk = rx.recv() => match chunk {
                    Some(bytes) => self.deliver(&bytes, &mut callback_error),
                    None => break,
                },
                () = self.cancel.cancelled() => {
                    stopped = Some(self.stop_reason(None));
                    break;
                }
                () = sleep_until_opt(deadline) => {
                    stopped = Some(self.stop_reason(self.timeout));
                    break;
                }
            }
        }

        // Pipes can close long before the child exits; keep honouring the
        // deadline and cancellation while reaping.
        let mut exited = None;
        if stopped.is_none() {
            tokio::select! {
                status = self.child.wait() => exited = Some(status?),
                () = self.cancel.cancelled() => stopped = Some(self.stop_reason(None)),
                () = sleep_until_opt(deadline) => stopped = Some(self.stop_reason(self.timeout)),
            }
        }

        if stopped.is_some() {
            if let Err(e) = terminate(&mut self.child, self.pid, DEFAULT_TERMINATE_TIMEOUT).await {
                tracing::warn!(pid = ?self.pid, error = %e, "Failed to terminate process");
            }
            // A grandchild may still hold the pipes open; only drain briefly.
            while let Ok(Some(bytes)) = tokio::time::timeout(DRAIN_GRACE, rx.recv()).await {
                self.deliver(&bytes, &mut callback_error);
            }
            for p in &pumps {
                p.abort();
            }
        }

        let status = match exited {
            Some(status) => status,
            None => self.child.wait().await?,
        };
        tracing::debug!(pid = ?self.pid, status = %status, "Process exited");

        if let Err(e) = self.listener.handle_finished(self.pid) {
            tracing::warn!(pid = ?self.pid, error = %e, "Finish callback failed");
            callback_error.get_or_insert(e);
        }

        if let Some(err) = stopped {
            return Err(err);
        }
        if let Some(err) = callback_error {
            return Err(err.into());
        }

        Ok(ProcessOutcome {
            pid: self.pid,
            exit_code: status.code(),
            success: status.success(),
            output: self.listener.transcript(),
            elapsed: started.elapsed(),
        })
    }

    /// Log why the run is being stopped. `timeout` is set for deadline stops.
    fn stop_reason(&self, timeout: Option<Duration>) -> ExecError {
        match timeout {
            Some(timeout) => {
                tracing::warn!(pid = ?self.pid, ?timeout, "Process timed out");
                ExecError::TimedOut(timeout)
            }
            None => {
                tracing::info!(pid = ?self.pid, "Cancelling process");
                ExecError::Cancelled
            }
        }
    }

    fn deliver(&self, bytes: &[u8], callback_error: &mut Option<CallbackError>) {
        if let Err(e) = self.listener.handle_data(self.pid, bytes) {
            tracing::warn!(pid = ?self.pid, error = %e, "Data callback failed");
            callback_error.get_or_insert(e);
        }
    }
}

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(d) => tokio::time::sleep_until(d).await,
        None => std::future::pending().await,
    }
}

/// Attempt graceful termination with a timeout.
///
/// On Unix, sends SIGTERM first, then SIGKILL after the timeout.
/// On other platforms, falls back to immediate kill.
async fn terminate(child: &mut Child, pid: Option<u32>, timeout: Duration) -> std::io::Result<()> {
    #[cfg(unix)]
    {
        use nix::sys::signal::{kill, Signal};
        use nix::unistd::Pid;

        let Some(pid) = pid else {
            // Process already exited
            return Ok(());
        };
        let nix_pid = Pid::from_raw(i32::try_from(pid).unwrap_or(i32::MAX));
        let _ = kill(nix_pid, Signal::SIGTERM);

        match tokio::time::timeout(timeout, child.wait()).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(e)) => Err(e),
            Err(_) => child.kill().await,
        }
    }

    #[cfg(not(unix))]
    {
        let _ = (pid, timeout);
        child.kill().await
    }
}

/// Execute `line` with the default spawner.
///
/// Exactly one dispatch target is required: a listener, or at least one of
/// the `on_finish`/`on_data` callbacks. The call returns as soon as the
/// process has started.
///
/// # Errors
///
/// Returns `ExecError::NoDispatchTarget` before spawning when `dispatch` is
/// empty, or a spawn error.
pub fn exec_cmd(
    line: CommandLine,
    options: &ExecOptions,
    dispatch: Dispatch,
) -> Result<ProcessHandle, ExecError> {
    exec_cmd_with(&TokioSpawner, line, options, dispatch)
}

/// Execute `line` through a specific spawner.
///
/// # Errors
///
/// Same as [`exec_cmd`].
pub fn exec_cmd_with(
    spawner: &dyn ProcessSpawner,
    line: CommandLine,
    options: &ExecOptions,
    dispatch: Dispatch,
) -> Result<ProcessHandle, ExecError> {
    let listener = dispatch.into_listener()?;
    spawner.spawn(&line, options, listener)
}

/// Run `line` to completion on a private runtime.
///
/// For synchronous callers; must not be called from inside an async
/// runtime.
///
/// # Errors
///
/// Returns an error if the runtime cannot be built, the process cannot be
/// spawned, or it is stopped by its timeout.
pub fn exec_blocking(line: CommandLine, options: &ExecOptions) -> Result<ProcessOutcome, ExecError> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    runtime.block_on(async {
        let handle = TokioSpawner.spawn(&line, options, ProcessListener::new())?;
        handle.wait().await
    })
}
