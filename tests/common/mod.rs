//! Shared fixtures for integration tests.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use sublime_tools::exec::{
    CommandLine, ExecError, ExecOptions, ProcessHandle, ProcessListener, ProcessOutcome,
    ProcessSpawner,
};
use tokio_util::sync::CancellationToken;

/// Spawner that replays canned output instead of running anything.
#[derive(Default)]
pub struct FakeSpawner {
    output: Mutex<Vec<u8>>,
    delay: Duration,
    calls: AtomicUsize,
    lines: Mutex<Vec<String>>,
    working_dirs: Mutex<Vec<Option<PathBuf>>>,
}

impl FakeSpawner {
    pub fn new(output: impl Into<Vec<u8>>) -> Self {
        Self {
            output: Mutex::new(output.into()),
            ..Default::default()
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn set_output(&self, output: impl Into<Vec<u8>>) {
        *self.output.lock().unwrap() = output.into();
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().unwrap().clone()
    }

    pub fn working_dirs(&self) -> Vec<Option<PathBuf>> {
        self.working_dirs.lock().unwrap().clone()
    }
}

impl ProcessSpawner for FakeSpawner {
    fn spawn(
        &self,
        line: &CommandLine,
        options: &ExecOptions,
        listener: ProcessListener,
    ) -> Result<ProcessHandle, ExecError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.lines.lock().unwrap().push(line.to_string());
        self.working_dirs
            .lock()
            .unwrap()
            .push(options.get_working_dir().map(Path::to_path_buf));

        let output = self.output.lock().unwrap().clone();
        let delay = self.delay;
        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            listener.handle_data(Some(42), &output)?;
            listener.handle_finished(Some(42))?;
            Ok::<_, ExecError>(ProcessOutcome {
                pid: Some(42),
                exit_code: Some(0),
                success: true,
                output: listener.transcript(),
                elapsed: delay,
            })
        });

        Ok(ProcessHandle::new(Some(42), CancellationToken::new(), task))
    }
}

/// Shared handle so tests can inspect the spawner after handing it over.
pub fn shared(spawner: FakeSpawner) -> Arc<FakeSpawner> {
    Arc::new(spawner)
}

/// Create `<root>/<name>/node` and `<root>/<name>/npm` as empty files.
pub fn fake_install(root: &Path, name: &str) -> PathBuf {
    let bin = root.join(name);
    std::fs::create_dir_all(&bin).unwrap();
    std::fs::write(bin.join("node"), "").unwrap();
    std::fs::write(bin.join("npm"), "").unwrap();
    bin.join("node")
}

/// Write an executable shell script.
#[cfg(unix)]
pub fn write_script(path: &Path, body: &str) {
    use std::os::unix::fs::PermissionsExt;

    std::fs::write(path, format!("#!/bin/sh\n{body}\n")).unwrap();
    let mut perms = std::fs::metadata(path).unwrap().permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(path, perms).unwrap();
}
