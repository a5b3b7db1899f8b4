//! Layered config file discovery.
//!
//! Files are read as TOML into [`ToolsConfig`]. The project file in the
//! working directory outranks the per-user file; callers receive every
//! layer that exists and search them in that order.

use std::path::{Path, PathBuf};

use super::ToolsConfig;

/// Project-local config file name.
pub const PROJECT_CONFIG_FILE: &str = ".sublime-tools.toml";

const APP_DIR: &str = "sublime-tools";
const USER_CONFIG_FILE: &str = "config.toml";

/// `<config_dir>/sublime-tools/config.toml`, when the platform has a config dir.
fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(APP_DIR).join(USER_CONFIG_FILE))
}

/// Reads config layers from an ordered list of candidate files.
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    search_paths: Vec<PathBuf>,
}

impl ConfigLoader {
    /// Project file, then user file.
    #[must_use]
    pub fn new() -> Self {
        let search_paths = std::iter::once(PathBuf::from(PROJECT_CONFIG_FILE))
            .chain(user_config_path())
            .collect();
        Self { search_paths }
    }

    /// Only `path`, as given with `--config`.
    #[must_use]
    pub fn with_path(path: PathBuf) -> Self {
        Self::with_paths(vec![path])
    }

    /// Explicit candidates, highest priority first.
    #[must_use]
    pub fn with_paths(search_paths: Vec<PathBuf>) -> Self {
        Self { search_paths }
    }

    /// The highest-priority layer, or defaults when no file exists.
    ///
    /// # Errors
    ///
    /// Returns an error if that file cannot be read or parsed.
    pub fn load(&self) -> Result<ToolsConfig, ConfigError> {
        match self.find_config_file() {
            Some(path) => read_layer(&path),
            None => {
                tracing::debug!("No config file found, using defaults");
                Ok(ToolsConfig::default())
            }
        }
    }

    /// Every existing layer, highest priority first.
    ///
    /// # Errors
    ///
    /// Returns an error if any existing file cannot be read or parsed.
    pub fn load_all(&self) -> Result<Vec<ToolsConfig>, ConfigError> {
        self.existing().map(read_layer).collect()
    }

    #[must_use]
    pub fn search_paths(&self) -> &[PathBuf] {
        &self.search_paths
    }

    #[must_use]
    pub fn find_config_file(&self) -> Option<PathBuf> {
        self.existing().next().map(Path::to_path_buf)
    }

    fn existing(&self) -> impl Iterator<Item = &Path> {
        self.search_paths
            .iter()
            .map(PathBuf::as_path)
            .filter(|p| p.is_file())
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

fn read_layer(path: &Path) -> Result<ToolsConfig, ConfigError> {
    tracing::debug!(path = %path.display(), "Reading config layer");
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::ReadError {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&content).map_err(|source| ConfigError::ParseError {
        path: path.to_path_buf(),
        source,
    })
}

/// A config file exists but is unusable.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    ReadError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    ParseError {
        path: PathBuf,
        source: toml::de::Error,
    },
}
