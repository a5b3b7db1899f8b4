//! Tests for node environment resolution.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use sublime_tools::config::{Platform, Prefer, ProbeConfig, SettingsSource, ToolsConfig};
use sublime_tools::exec::ProcessSpawner;
use sublime_tools::node::{get_node_env, NodeEnvResolver, Notifier, ResolveError};

use crate::common::{fake_install, shared, FakeSpawner};

#[derive(Default)]
struct Recorder(Mutex<Vec<String>>);

impl Notifier for Recorder {
    fn error_message(&self, message: &str) {
        self.0.lock().unwrap().push(message.to_string());
    }
}

fn no_nvm() -> ProbeConfig {
    ProbeConfig {
        nvm_dir: Some(PathBuf::from("/nonexistent/sublime-tools-nvm")),
        ..Default::default()
    }
}

fn with_nvm(dir: &Path) -> ProbeConfig {
    std::fs::write(dir.join("nvm.sh"), "").unwrap();
    ProbeConfig {
        nvm_dir: Some(dir.to_path_buf()),
        ..Default::default()
    }
}

fn system_output(node: &Path) -> String {
    format!(
        "system_node_path={}\nsystem_node_version=v18.0.0\nsystem_npm_path=\nsystem_npm_version=9.0.0\n",
        node.display()
    )
}

fn resolver(spawner: &Arc<FakeSpawner>, config: ProbeConfig) -> NodeEnvResolver {
    let spawner: Arc<dyn ProcessSpawner> = spawner.clone();
    NodeEnvResolver::with_spawner(spawner, config).platform(Platform::Linux)
}

#[tokio::test]
async fn resolve_falls_back_to_system_node() {
    let temp = tempfile::tempdir().unwrap();
    let node = fake_install(temp.path(), "system");
    let spawner = shared(FakeSpawner::new(system_output(&node)));
    let resolver = resolver(&spawner, no_nvm());

    let env = resolver.resolve().await.unwrap();

    assert_eq!(env.node_path.as_deref(), Some(node.as_path()));
    assert_eq!(env.npm_path, Some(temp.path().join("system").join("npm")));
    assert_eq!(env.system_node_version.as_deref(), Some("v18.0.0"));
    assert_eq!(env.system_npm_version.as_deref(), Some("9.0.0"));
    assert!(env.nvm_default_path.is_none());
    assert!(!spawner.lines()[0].contains("nvm_default_path"));
}

#[tokio::test]
async fn nvm_default_is_preferred() {
    let temp = tempfile::tempdir().unwrap();
    let system = fake_install(temp.path(), "system");
    let nvm = fake_install(temp.path(), "nvm");
    let output = format!(
        "{}nvm_default_path={}\n",
        system_output(&system),
        nvm.display()
    );
    let spawner = shared(FakeSpawner::new(output));
    let resolver = resolver(&spawner, with_nvm(temp.path()));

    let env = resolver.resolve().await.unwrap();

    assert_eq!(env.node_path.as_deref(), Some(nvm.as_path()));
    assert_eq!(env.npm_path, Some(temp.path().join("nvm").join("npm")));
    assert_eq!(env.system_node_path.as_deref(), Some(system.as_path()));
    assert!(spawner.lines()[0].contains("nvm which default"));
}

#[tokio::test]
async fn missing_probe_line_does_not_shift_fields() {
    let temp = tempfile::tempdir().unwrap();
    let node = fake_install(temp.path(), "system");
    let output = format!(
        "system_node_path={}\nsystem_npm_version=9.0.0\n",
        node.display()
    );
    let spawner = shared(FakeSpawner::new(output));
    let resolver = resolver(&spawner, no_nvm());

    let env = resolver.resolve().await.unwrap();

    assert!(env.system_node_version.is_none());
    assert_eq!(env.system_npm_version.as_deref(), Some("9.0.0"));
}

#[tokio::test]
async fn concurrent_resolves_share_one_probe() {
    let temp = tempfile::tempdir().unwrap();
    let node = fake_install(temp.path(), "system");
    let spawner =
        shared(FakeSpawner::new(system_output(&node)).with_delay(Duration::from_millis(100)));
    let resolver = resolver(&spawner, no_nvm());

    let (a, b) = tokio::join!(resolver.resolve(), resolver.resolve());
    let (a, b) = (a.unwrap(), b.unwrap());

    assert_eq!(spawner.calls(), 1);
    assert!(Arc::ptr_eq(&a, &b));
    assert!(Arc::ptr_eq(&a, &resolver.current().unwrap()));
}

#[tokio::test]
async fn sequential_resolves_replace_snapshot() {
    let temp = tempfile::tempdir().unwrap();
    let first = fake_install(temp.path(), "first");
    let second = fake_install(temp.path(), "second");
    let spawner = shared(FakeSpawner::new(system_output(&first)));
    let resolver = resolver(&spawner, no_nvm());

    let before = resolver.resolve().await.unwrap();
    spawner.set_output(system_output(&second));
    let after = resolver.resolve().await.unwrap();

    assert_eq!(spawner.calls(), 2);
    assert_eq!(before.node_path.as_deref(), Some(first.as_path()));
    assert_eq!(after.node_path.as_deref(), Some(second.as_path()));
    assert_eq!(resolver.current().unwrap().node_path, after.node_path);
}

#[tokio::test]
async fn get_or_resolve_probes_once() {
    let temp = tempfile::tempdir().unwrap();
    let node = fake_install(temp.path(), "system");
    let spawner = shared(FakeSpawner::new(system_output(&node)));
    let resolver = resolver(&spawner, no_nvm());

    assert!(resolver.current().is_none());
    resolver.get_or_resolve().await.unwrap();
    resolver.get_or_resolve().await.unwrap();

    assert_eq!(spawner.calls(), 1);
}

#[tokio::test]
async fn get_node_env_invokes_callback() {
    let temp = tempfile::tempdir().unwrap();
    let node = fake_install(temp.path(), "system");
    let spawner = FakeSpawner::new(system_output(&node));
    let (tx, rx) = tokio::sync::oneshot::channel();

    let handle = get_node_env(&spawner, &no_nvm(), Platform::Linux, move |env| {
        let _ = tx.send(env);
    })
    .unwrap();
    handle.wait().await.unwrap();

    let env = rx.await.unwrap();
    assert_eq!(env.system_node_path.as_deref(), Some(node.as_path()));
}

#[tokio::test]
async fn windows_probe_uses_where_npm() {
    let spawner = shared(FakeSpawner::new(""));
    let resolver = resolver(&spawner, no_nvm()).platform(Platform::Windows);

    let env = resolver.resolve().await.unwrap();

    assert!(env.node_path.is_none());
    let line = &spawner.lines()[0];
    assert!(line.contains("where npm"));
    assert!(line.contains(" & "));
}

#[tokio::test]
async fn assert_node_path_reports_missing_node() {
    let temp = tempfile::tempdir().unwrap();
    let node = fake_install(temp.path(), "system");
    let spawner = shared(FakeSpawner::new(system_output(&node)));
    let resolver = resolver(&spawner, no_nvm());
    let notifier = Recorder::default();
    let sources: [&dyn SettingsSource; 0] = [];

    let err = resolver.assert_node_path(&sources, &notifier).unwrap_err();
    assert!(matches!(err, ResolveError::NotFound));
    assert_eq!(notifier.0.lock().unwrap().len(), 1);

    resolver.resolve().await.unwrap();
    let path = resolver.assert_node_path(&sources, &notifier).unwrap();
    assert_eq!(path, node);
}

#[tokio::test]
async fn assert_node_path_rejects_invalid_setting() {
    let spawner = shared(FakeSpawner::new(""));
    let resolver = resolver(&spawner, no_nvm());
    let notifier = Recorder::default();
    let settings: toml::Table = toml::from_str("[node_path]\nlinux = \"/gone/node\"\n").unwrap();

    let sources: [&dyn SettingsSource; 1] = [&settings];

    let err = resolver.assert_node_path(&sources, &notifier).unwrap_err();

    assert!(matches!(err, ResolveError::InvalidPath(ref p) if p == Path::new("/gone/node")));
    assert_eq!(
        notifier.0.lock().unwrap()[0],
        "The node_path setting is invalid, \"/gone/node\""
    );
}

#[tokio::test]
async fn nvm_current_for_dir_runs_in_project() {
    let temp = tempfile::tempdir().unwrap();
    let project = temp.path().join("project");
    std::fs::create_dir_all(&project).unwrap();
    let current = fake_install(temp.path(), "v16");
    let spawner = shared(FakeSpawner::new(format!(
        "nvm_current_path={}\n",
        current.display()
    )));
    let resolver = resolver(&spawner, with_nvm(temp.path()));

    let found = resolver.nvm_current_for_dir(&project).await.unwrap();

    assert_eq!(found, Some(current));
    assert_eq!(spawner.working_dirs(), vec![Some(project)]);
    assert!(spawner.lines()[0].contains("nvm which current"));
}

#[tokio::test]
async fn nvm_current_without_version_uses_system_node() {
    let temp = tempfile::tempdir().unwrap();
    let project = temp.path().join("project");
    std::fs::create_dir_all(&project).unwrap();
    let system = fake_install(temp.path(), "system");
    let spawner = shared(FakeSpawner::new(system_output(&system)));
    let resolver = resolver(&spawner, with_nvm(temp.path()));
    resolver.resolve().await.unwrap();

    spawner.set_output("nvm_current_path=N/A: version \"system\" is not yet installed\n");
    let found = resolver.nvm_current_for_dir(&project).await.unwrap();

    assert_eq!(found, Some(system));
}

#[tokio::test]
async fn preferred_node_path_follows_prefer_setting() {
    let temp = tempfile::tempdir().unwrap();
    let system = fake_install(temp.path(), "system");
    let nvm = fake_install(temp.path(), "nvm");
    let output = format!(
        "{}nvm_default_path={}\n",
        system_output(&system),
        nvm.display()
    );
    let spawner = shared(FakeSpawner::new(output));
    let resolver = resolver(&spawner, with_nvm(temp.path()));
    resolver.resolve().await.unwrap();

    let prefer_system = ToolsConfig {
        prefer: Some(Prefer::System),
        ..Default::default()
    };
    let prefer_nvm = ToolsConfig {
        prefer: Some(Prefer::NvmDefault),
        ..Default::default()
    };
    let system_sources: [&dyn SettingsSource; 1] = [&prefer_system];
    let nvm_sources: [&dyn SettingsSource; 1] = [&prefer_nvm];

    assert_eq!(resolver.preferred_node_path(&system_sources), Some(system));
    assert_eq!(resolver.preferred_node_path(&nvm_sources), Some(nvm));
}

#[tokio::test]
async fn nvm_current_for_missing_dir_is_none() {
    let temp = tempfile::tempdir().unwrap();
    let spawner = shared(FakeSpawner::new(""));
    let resolver = resolver(&spawner, with_nvm(temp.path()));

    let found = resolver
        .nvm_current_for_dir(&temp.path().join("missing"))
        .await
        .unwrap();

    assert!(found.is_none());
    assert_eq!(spawner.calls(), 0);
}

#[cfg(unix)]
#[tokio::test]
async fn resolves_real_probe_with_extra_path() {
    use crate::common::write_script;

    let temp = tempfile::tempdir().unwrap();
    let bin = temp.path().join("bin");
    std::fs::create_dir_all(&bin).unwrap();
    write_script(&bin.join("node"), "echo v20.0.0");
    write_script(&bin.join("npm"), "echo 10.0.0");

    let config = ProbeConfig {
        extra_path: Some(bin.clone()),
        ..no_nvm()
    };
    let resolver = NodeEnvResolver::new(config).platform(Platform::Linux);

    let env = resolver.resolve().await.unwrap();

    assert_eq!(env.node_path, Some(bin.join("node")));
    assert_eq!(env.npm_path, Some(bin.join("npm")));
    assert_eq!(env.system_node_version.as_deref(), Some("v20.0.0"));
    assert_eq!(env.system_npm_version.as_deref(), Some("10.0.0"));
}
