//! Tests for the JavaScript helpers.

use std::path::Path;

use sublime_tools::exec::{execjs, execjs_with, execjsfile_with, Dispatch, ExecError, ExecOptions};

use crate::common::FakeSpawner;

#[test]
fn execjs_without_working_dir_fails() {
    let spawner = FakeSpawner::new("");
    let err = execjs_with(
        &spawner,
        "console.log(1)",
        None,
        &ExecOptions::new(),
        Dispatch::new().on_finish(|_| Ok(())),
    )
    .unwrap_err();

    assert!(matches!(err, ExecError::WorkingDirRequired));
    assert_eq!(spawner.calls(), 0);
}

#[tokio::test]
async fn execjsfile_builds_node_invocation() {
    let spawner = FakeSpawner::new("done\n");
    let args = vec!["--prefer-doge".to_string(), "true".to_string()];

    let handle = execjsfile_with(
        &spawner,
        Path::new("/users/you/memes.js"),
        &args,
        Some(Path::new("/opt/node/bin/node")),
        &ExecOptions::new().working_dir("/users/you"),
        Dispatch::new().on_finish(|_| Ok(())),
    )
    .unwrap();
    handle.wait().await.unwrap();

    assert_eq!(
        spawner.lines(),
        vec!["/opt/node/bin/node /users/you/memes.js --prefer-doge true".to_string()]
    );
    assert_eq!(
        spawner.working_dirs(),
        vec![Some(std::path::PathBuf::from("/users/you"))]
    );
}

#[cfg(unix)]
#[tokio::test]
async fn execjs_runs_given_interpreter() {
    let temp = tempfile::tempdir().unwrap();
    let node = temp.path().join("fake-node");
    crate::common::write_script(&node, "printf '%s|' \"$@\"");

    let handle = execjs(
        "console.log('hi')",
        Some(&node),
        &ExecOptions::new().working_dir(temp.path()),
        Dispatch::new().on_finish(|_| Ok(())),
    )
    .unwrap();

    let outcome = handle.wait().await.unwrap();
    assert_eq!(outcome.text(), "-e|console.log('hi')|");
}
