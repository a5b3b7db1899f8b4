//! Platform-specific probe commands for the node environment.

use std::borrow::Cow;
use std::path::Path;

use crate::config::{Platform, ProbeConfig};
use crate::probe::ProbeBatch;

pub const SYSTEM_NODE_PATH: &str = "system_node_path";
pub const SYSTEM_NODE_VERSION: &str = "system_node_version";
pub const SYSTEM_NPM_PATH: &str = "system_npm_path";
pub const SYSTEM_NPM_VERSION: &str = "system_npm_version";
pub const NVM_DEFAULT_PATH: &str = "nvm_default_path";
pub const NVM_CURRENT_PATH: &str = "nvm_current_path";

const FIND_NODE_VERSION: &str = "node --version";
const FIND_NPM_VERSION: &str = "npm --version";

fn locate(platform: Platform, program: &str) -> String {
    if platform == Platform::Windows {
        format!("where {program}")
    } else {
        format!("command -v {program}")
    }
}

/// Shell fragment that loads nvm from `script` and runs `nvm which <alias>`.
#[must_use]
pub fn nvm_which(script: &Path, alias: &str) -> String {
    let script = shell_escape::unix::escape(Cow::Owned(script.to_string_lossy().into_owned()));
    format!(". {script} >/dev/null 2>&1 && nvm which {alias}")
}

/// Probe batch discovering system node/npm and the nvm default alias.
///
/// The nvm probe is only added on non-Windows platforms with an `nvm.sh`
/// present; otherwise the nvm default is simply absent from the results.
#[must_use]
pub fn node_probe_batch(platform: Platform, config: &ProbeConfig) -> ProbeBatch {
    let mut batch = ProbeBatch::new(platform)
        .probe(SYSTEM_NODE_PATH, locate(platform, "node"))
        .probe(SYSTEM_NODE_VERSION, FIND_NODE_VERSION)
        .probe(SYSTEM_NPM_PATH, locate(platform, "npm"))
        .probe(SYSTEM_NPM_VERSION, FIND_NPM_VERSION);

    if platform != Platform::Windows {
        if let Some(script) = config.nvm_script() {
            batch = batch.probe(NVM_DEFAULT_PATH, nvm_which(&script, "default"));
        } else {
            tracing::debug!("No nvm.sh found, skipping nvm default probe");
        }
    }

    batch
}
