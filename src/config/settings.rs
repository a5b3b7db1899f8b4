//! Key-value settings sources.
//!
//! Consumers search a list of sources in order (project, user, defaults)
//! and take the first hit.

use std::path::PathBuf;

use toml::Value;

use super::{Platform, Prefer, ToolsConfig};

/// Settings key holding the platform-keyed node path map.
pub const NODE_PATH_KEY: &str = "node_path";

/// Settings key holding the `prefer` option.
pub const PREFER_KEY: &str = "prefer";

/// A read-only key-value settings store.
pub trait SettingsSource {
    /// Value stored under `key`, if any.
    fn get(&self, key: &str) -> Option<Value>;

    /// Value under `key`, or `default` when absent.
    fn get_or(&self, key: &str, default: Value) -> Value {
        self.get(key).unwrap_or(default)
    }
}

impl SettingsSource for toml::Table {
    fn get(&self, key: &str) -> Option<Value> {
        toml::Table::get(self, key).cloned()
    }
}

impl SettingsSource for ToolsConfig {
    fn get(&self, key: &str) -> Option<Value> {
        match key {
            NODE_PATH_KEY if !self.node_path.is_empty() => Some(Value::Table(
                self.node_path
                    .iter()
                    .map(|(os, path)| (os.clone(), Value::String(path.display().to_string())))
                    .collect(),
            )),
            PREFER_KEY => self.prefer.map(|p| Value::String(p.as_str().to_string())),
            _ => None,
        }
    }
}

/// The `node_path` for `platform` from the first source that defines it.
///
/// Sources whose `node_path` is not a table, or has no string entry for the
/// platform, are skipped. The path is not checked for existence.
#[must_use]
pub fn get_settings_node_path(
    sources: &[&dyn SettingsSource],
    platform: Platform,
) -> Option<PathBuf> {
    sources.iter().find_map(|source| {
        source
            .get(NODE_PATH_KEY)?
            .get(platform.as_str())?
            .as_str()
            .map(PathBuf::from)
    })
}

/// The `prefer` option from the first source that sets it.
///
/// An unrecognized value falls back to the default preference.
#[must_use]
pub fn get_settings_prefer(sources: &[&dyn SettingsSource]) -> Prefer {
    let Some(value) = sources.iter().find_map(|source| source.get(PREFER_KEY)) else {
        return Prefer::default();
    };

    match value.as_str().map(str::parse::<Prefer>) {
        Some(Ok(prefer)) => prefer,
        _ => {
            tracing::warn!(value = %value, "Unrecognized prefer setting, using default");
            Prefer::default()
        }
    }
}
