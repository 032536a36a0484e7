//! Module for application configuration settings.
//!
//! User configurations may be specified in a configuration file; command-line arguments override
//! them.

use exposefs::backing::{BackingSource, is_valid_entry_name};
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use std::ffi::OsStr;
use std::path::{Path, PathBuf};

fn exposefs_runtime_dir() -> Option<PathBuf> {
    let runtime_dir = dirs::runtime_dir();
    if let Some(path) = runtime_dir {
        return Some(path.join("exposefs"));
    }

    let home_dir = dirs::home_dir();
    if let Some(path) = home_dir {
        return Some(path.join(".local").join("share").join("exposefs"));
    }

    None
}

fn default_mount_point() -> PathBuf {
    exposefs_runtime_dir().map_or_else(|| PathBuf::from("/tmp/exposefs/mnt"), |rd| rd.join("mnt"))
}

fn default_fs_name() -> String {
    "exposefs".to_owned()
}

fn default_allow_other() -> bool {
    true
}

/// One backing resource to expose.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct SourceConfig {
    /// Path of the file or block device.
    pub path: PathBuf,

    /// Name inside the mount. Defaults to the last path component plus `name-suffix`.
    #[serde(default)]
    pub name: Option<String>,
}

impl From<&SourceConfig> for BackingSource {
    fn from(source: &SourceConfig) -> Self {
        match &source.name {
            Some(name) => Self::named(&source.path, name),
            None => Self::new(&source.path),
        }
    }
}

/// Application configuration structure.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Config {
    /// The mount point for the filesystem.
    #[serde(default = "default_mount_point")]
    pub mount_point: PathBuf,

    /// Backing resources, in listing order.
    #[serde(default)]
    pub sources: Vec<SourceConfig>,

    /// Appended to every derived entry name.
    #[serde(default)]
    pub name_suffix: String,

    /// Filesystem name reported to the mount table.
    #[serde(default = "default_fs_name")]
    pub fs_name: String,

    /// Let users other than the mounting one see the filesystem.
    #[serde(default = "default_allow_other")]
    pub allow_other: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            mount_point: default_mount_point(),
            sources: Vec::new(),
            name_suffix: String::new(),
            fs_name: default_fs_name(),
            allow_other: default_allow_other(),
        }
    }
}

/// Why a configuration file could not be loaded.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file is not valid TOML for [`Config`].
    #[error("Deserialization error: {0}")]
    DeserializationError(#[from] toml::de::Error),

    /// The file could not be read.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

impl Config {
    /// Validate the correctness of the configuration.
    ///
    /// Returns:
    /// - `Ok(())` if the configuration is valid.
    /// - `Err(Vec<String>)` containing every validation error message otherwise.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.fs_name.is_empty() {
            errors.push("fs-name must not be empty.".to_owned());
        }

        if self.name_suffix.contains('/') {
            errors.push(format!(
                "name-suffix '{}' must not contain '/'.",
                self.name_suffix
            ));
        }

        for source in &self.sources {
            if let Some(name) = &source.name
                && !is_valid_entry_name(OsStr::new(name))
            {
                errors.push(format!(
                    "Source '{}' has invalid name '{name}'.",
                    source.path.display()
                ));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Returns config file paths in descending priority order.
    /// On macOS, skips `dirs::config_dir()` (resolves to ~/Library/Application Support/).
    fn config_search_paths() -> Vec<PathBuf> {
        let mut paths = Vec::new();

        #[cfg(not(target_os = "macos"))]
        if let Some(xdg) = dirs::config_dir() {
            paths.push(xdg.join("exposefs").join("config.toml"));
        }

        if let Some(home) = dirs::home_dir() {
            paths.push(home.join(".config").join("exposefs").join("config.toml"));
        }

        paths.push(PathBuf::from("/etc/exposefs/config.toml"));

        paths
    }

    /// Finds the first existing config file from search paths.
    fn find_config_file() -> Option<PathBuf> {
        Self::config_search_paths().into_iter().find(|p| p.exists())
    }

    /// Loads config from a single TOML file.
    fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        debug!(path = ?path, "Loading configuration file.");
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Loads configuration from the first found config file, or the external path if given.
    pub fn load(external_config_path: Option<&Path>) -> Option<Result<Self, ConfigError>> {
        if let Some(path) = external_config_path {
            return Some(Self::load_from_file(path));
        }

        Self::find_config_file().map(|path| Self::load_from_file(&path))
    }

    /// Loads config, falling back to defaults if no file exists.
    /// Errors if a config file exists but is malformed.
    pub fn load_or_default(external_config_path: Option<&Path>) -> Result<Self, ConfigError> {
        match Self::load(external_config_path) {
            Some(res) => {
                let config = res?;
                debug!("Loaded configuration successfully.");
                Ok(config)
            }
            None => {
                debug!("No configuration file found, using defaults.");
                Ok(Self::default())
            }
        }
    }

    /// The configured sources, in listing order.
    pub fn backing_sources(&self) -> impl Iterator<Item = BackingSource> + '_ {
        self.sources.iter().map(BackingSource::from)
    }
}
