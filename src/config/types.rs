//! Configuration types.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Which discovered node installation to favour when no explicit path is set.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Prefer {
    #[default]
    System,
    NvmDefault,
}

impl Prefer {
    /// Settings value for this preference.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::System => "system",
            Self::NvmDefault => "nvm_default",
        }
    }
}

impl fmt::Display for Prefer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Prefer {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "system" => Ok(Self::System),
            "nvm_default" => Ok(Self::NvmDefault),
            other => Err(format!("unknown prefer value: {other}")),
        }
    }
}

/// Settings for the environment probe.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProbeConfig {
    /// Seconds before a probe process is killed.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// nvm installation directory. Defaults to `$NVM_DIR`, then `~/.nvm`.
    #[serde(default)]
    pub nvm_dir: Option<PathBuf>,
    /// Directories prepended to `PATH` for probes.
    #[serde(default)]
    pub extra_path: Option<PathBuf>,
}

fn default_timeout_secs() -> u64 {
    10
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            nvm_dir: None,
            extra_path: None,
        }
    }
}

impl ProbeConfig {
    /// Probe deadline.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// The nvm directory to use, after applying defaults.
    #[must_use]
    pub fn resolved_nvm_dir(&self) -> Option<PathBuf> {
        self.nvm_dir
            .clone()
            .or_else(|| std::env::var_os("NVM_DIR").map(PathBuf::from))
            .or_else(|| dirs::home_dir().map(|h| h.join(".nvm")))
    }

    /// Path to `nvm.sh` if the nvm directory contains one.
    #[must_use]
    pub fn nvm_script(&self) -> Option<PathBuf> {
        self.resolved_nvm_dir()
            .map(|dir| dir.join("nvm.sh"))
            .filter(|script| script.is_file())
    }
}

/// Probe keys as written in one config file.
///
/// Unset keys fall through to lower-priority files; see
/// [`ProbeConfig::from_layers`].
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct ProbeLayer {
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    #[serde(default)]
    pub nvm_dir: Option<PathBuf>,
    #[serde(default)]
    pub extra_path: Option<PathBuf>,
}

impl ProbeConfig {
    /// Merge layers, highest priority first. Each key comes from the first
    /// layer that sets it, otherwise the default.
    #[must_use]
    pub fn from_layers<'a, I>(layers: I) -> Self
    where
        I: IntoIterator<Item = &'a ProbeLayer>,
    {
        let mut merged = ProbeLayer::default();
        for layer in layers {
            merged.timeout_secs = merged.timeout_secs.or(layer.timeout_secs);
            merged.nvm_dir = merged.nvm_dir.or_else(|| layer.nvm_dir.clone());
            merged.extra_path = merged.extra_path.or_else(|| layer.extra_path.clone());
        }

        Self {
            timeout_secs: merged.timeout_secs.unwrap_or_else(default_timeout_secs),
            nvm_dir: merged.nvm_dir,
            extra_path: merged.extra_path,
        }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct ToolsConfig {
    /// Explicit node executable per platform (`osx`, `linux`, `windows`).
    #[serde(default)]
    pub node_path: BTreeMap<String, PathBuf>,
    /// Which discovered installation to favour.
    #[serde(default)]
    pub prefer: Option<Prefer>,
    /// Probe settings set in this file.
    #[serde(default)]
    pub probe: ProbeLayer,
}

impl ToolsConfig {
    /// Probe settings merged across `layers`, highest priority first.
    #[must_use]
    pub fn merged_probe(layers: &[ToolsConfig]) -> ProbeConfig {
        ProbeConfig::from_layers(layers.iter().map(|c| &c.probe))
    }
}
