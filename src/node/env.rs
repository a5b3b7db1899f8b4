//! Node environment descriptor and path precedence.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::config::{
    get_settings_node_path, get_settings_prefer, Platform, Prefer, SettingsSource,
};
use crate::node::commands::{
    NVM_DEFAULT_PATH, SYSTEM_NODE_PATH, SYSTEM_NODE_VERSION, SYSTEM_NPM_PATH, SYSTEM_NPM_VERSION,
};
use crate::node::{Notifier, ResolveError};
use crate::probe::ProbeResults;

/// Raw values reported by the environment probe, before validation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProbeOutput {
    pub system_node_path: Option<String>,
    pub system_node_version: Option<String>,
    pub system_npm_path: Option<String>,
    pub system_npm_version: Option<String>,
    pub nvm_default_path: Option<String>,
}

impl ProbeOutput {
    /// Pull the node probe values out of keyed results.
    #[must_use]
    pub fn from_results(mut results: ProbeResults) -> Self {
        Self {
            system_node_path: results.take(SYSTEM_NODE_PATH),
            system_node_version: results.take(SYSTEM_NODE_VERSION),
            system_npm_path: results.take(SYSTEM_NPM_PATH),
            system_npm_version: results.take(SYSTEM_NPM_VERSION),
            nvm_default_path: results.take(NVM_DEFAULT_PATH),
        }
    }
}

/// Snapshot of the discovered node installations.
///
/// Every field is optional; an absent value means it was not found.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeEnv {
    pub system_node_path: Option<PathBuf>,
    pub system_node_version: Option<String>,
    pub system_npm_path: Option<PathBuf>,
    pub system_npm_version: Option<String>,
    pub nvm_default_path: Option<PathBuf>,
    pub nvm_default_npm_path: Option<PathBuf>,
    /// Node executable chosen by precedence.
    pub node_path: Option<PathBuf>,
    /// npm belonging to `node_path`.
    pub npm_path: Option<PathBuf>,
}

impl NodeEnv {
    /// The node path the user most likely wants.
    ///
    /// Precedence: an explicit `node_path` for `platform` in the first source
    /// that has one; then the `prefer` option (`system` or `nvm_default`);
    /// then the system path. No existence check is made.
    #[must_use]
    pub fn get_preferred(
        &self,
        sources: &[&dyn SettingsSource],
        platform: Platform,
    ) -> Option<PathBuf> {
        if let Some(path) = get_settings_node_path(sources, platform) {
            return Some(path);
        }

        match get_settings_prefer(sources) {
            Prefer::System => self.system_node_path.clone(),
            Prefer::NvmDefault => self.nvm_default_path.clone(),
        }
    }

    /// `(name, value)` rows for display, sorted by name.
    #[must_use]
    pub fn rows(&self) -> Vec<(&'static str, Option<String>)> {
        let path = |p: &Option<PathBuf>| p.as_ref().map(|p| p.display().to_string());
        vec![
            ("node_path", path(&self.node_path)),
            ("npm_path", path(&self.npm_path)),
            ("nvm_default_npm_path", path(&self.nvm_default_npm_path)),
            ("nvm_default_path", path(&self.nvm_default_path)),
            ("system_node_path", path(&self.system_node_path)),
            ("system_node_version", self.system_node_version.clone()),
            ("system_npm_path", path(&self.system_npm_path)),
            ("system_npm_version", self.system_npm_version.clone()),
        ]
    }
}

/// npm installed next to `node`, falling back to a probed npm path.
fn sibling_npm(node: &Path, probed: Option<&str>) -> Option<PathBuf> {
    let dir = node.parent()?;
    let names: &[&str] = if cfg!(windows) {
        &["npm.cmd", "npm"]
    } else {
        &["npm"]
    };

    names
        .iter()
        .map(|name| dir.join(name))
        .find(|candidate| candidate.exists())
        .or_else(|| probed.map(PathBuf::from).filter(|p| p.exists()))
}

fn existing(path: Option<String>) -> Option<PathBuf> {
    path.map(PathBuf::from).filter(|p| p.exists())
}

/// Validate probe output and choose the resolved node path.
///
/// Paths that do not exist are dropped. Without a system node the system
/// npm and version fields are cleared. The nvm default wins over the system
/// installation when it exists.
#[must_use]
pub fn normalize_node_result(output: ProbeOutput) -> NodeEnv {
    let nvm_default_path = existing(output.nvm_default_path);
    let nvm_default_npm_path = nvm_default_path
        .as_deref()
        .and_then(|node| sibling_npm(node, None));

    let system_node_path = existing(output.system_node_path);
    let (system_node_version, system_npm_path, system_npm_version) = match &system_node_path {
        Some(node) => (
            output.system_node_version,
            sibling_npm(node, output.system_npm_path.as_deref()),
            output.system_npm_version,
        ),
        None => (None, None, None),
    };

    let (node_path, npm_path) = if nvm_default_path.is_some() {
        (nvm_default_path.clone(), nvm_default_npm_path.clone())
    } else if system_node_path.is_some() {
        (system_node_path.clone(), system_npm_path.clone())
    } else {
        (None, None)
    };

    NodeEnv {
        system_node_path,
        system_node_version,
        system_npm_path,
        system_npm_version,
        nvm_default_path,
        nvm_default_npm_path,
        node_path,
        npm_path,
    }
}

/// A node path that exists on disk, or a reported error.
///
/// Uses the settings `node_path` for `platform` when present, otherwise the
/// snapshot's resolved path. Failures are shown through `notifier` and also
/// returned.
///
/// # Errors
///
/// Returns `ResolveError::NotFound` when no path is known and
/// `ResolveError::InvalidPath` when the chosen path does not exist.
pub fn assert_node_path(
    sources: &[&dyn SettingsSource],
    env: Option<&NodeEnv>,
    platform: Platform,
    notifier: &dyn Notifier,
) -> Result<PathBuf, ResolveError> {
    let node_path = get_settings_node_path(sources, platform)
        .or_else(|| env.and_then(|e| e.node_path.clone()));

    let result = match node_path {
        None => Err(ResolveError::NotFound),
        Some(path) if !path.exists() => Err(ResolveError::InvalidPath(path)),
        Some(path) => Ok(path),
    };

    if let Err(ref e) = result {
        notifier.error_message(&e.to_string());
    }
    result
}
