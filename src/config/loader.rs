//! Locating and reading the configuration file.
//!
//! Precedence, highest first: explicit overrides (`--worker`, `--config`),
//! the `HATLINK_WORKER` / `HATLINK_CONFIG` environment variables, the config
//! file, built-in defaults.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use super::HatlinkConfig;

/// Environment variable naming the config file.
pub const CONFIG_ENV: &str = "HATLINK_CONFIG";

/// Environment variable naming the worker executable.
pub const WORKER_ENV: &str = "HATLINK_WORKER";

#[derive(Debug, Clone, PartialEq, Eq)]
enum Source {
    /// First existing candidate wins; none means defaults.
    Search(Vec<PathBuf>),
    /// A file the user asked for; it must exist.
    Explicit(PathBuf),
}

/// Builds a [`HatlinkConfig`] from files, environment and overrides.
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    source: Source,
    worker: Option<PathBuf>,
}

impl ConfigLoader {
    /// Search `./.hatlink.toml`, then `<config dir>/hatlink/config.toml`.
    #[must_use]
    pub fn new() -> Self {
        let mut candidates = vec![PathBuf::from(".hatlink.toml")];
        if let Some(config_dir) = dirs::config_dir() {
            candidates.push(config_dir.join("hatlink").join("config.toml"));
        }
        Self {
            source: Source::Search(candidates),
            worker: None,
        }
    }

    /// Read exactly `path`; a missing file is an error.
    #[must_use]
    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self {
            source: Source::Explicit(path.into()),
            worker: None,
        }
    }

    /// Default search, adjusted by `HATLINK_CONFIG` and `HATLINK_WORKER`.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_vars(std::env::var_os(CONFIG_ENV), std::env::var_os(WORKER_ENV))
    }

    fn from_vars(config: Option<OsString>, worker: Option<OsString>) -> Self {
        let non_empty = |value: Option<OsString>| value.filter(|v| !v.is_empty()).map(PathBuf::from);
        Self::new()
            .config_file(non_empty(config))
            .worker(non_empty(worker))
    }

    /// Use `path` as the config file, if given.
    #[must_use]
    pub fn config_file(self, path: Option<PathBuf>) -> Self {
        match path {
            Some(path) => Self {
                source: Source::Explicit(path),
                ..self
            },
            None => self,
        }
    }

    /// Override the worker executable, if given.
    #[must_use]
    pub fn worker(mut self, path: Option<PathBuf>) -> Self {
        if path.is_some() {
            self.worker = path;
        }
        self
    }

    /// Files that would be considered, in order.
    #[must_use]
    pub fn candidates(&self) -> &[PathBuf] {
        match &self.source {
            Source::Search(paths) => paths,
            Source::Explicit(path) => std::slice::from_ref(path),
        }
    }

    /// The file `load` would read, if any.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::NotFound` if an explicit file does not exist.
    pub fn locate(&self) -> Result<Option<PathBuf>, ConfigError> {
        match &self.source {
            Source::Search(paths) => Ok(paths.iter().find(|p| p.is_file()).cloned()),
            Source::Explicit(path) if path.is_file() => Ok(Some(path.clone())),
            Source::Explicit(path) => Err(ConfigError::NotFound { path: path.clone() }),
        }
    }

    /// Read the config file (or defaults) and apply the overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if an explicit file is missing, or a file exists but
    /// cannot be read or parsed.
    pub fn load(&self) -> Result<HatlinkConfig, ConfigError> {
        let mut config = match self.locate()? {
            Some(path) => {
                tracing::debug!(path = %path.display(), "Loading config file");
                read_config(&path)?
            }
            None => {
                tracing::debug!("No config file found, using defaults");
                HatlinkConfig::default()
            }
        };

        if let Some(worker) = &self.worker {
            tracing::debug!(path = %worker.display(), "Worker path overridden");
            config.worker.path.clone_from(worker);
        }
        Ok(config)
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

fn read_config(path: &Path) -> Result<HatlinkConfig, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&content).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Errors from loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Config file {} does not exist", path.display())]
    NotFound { path: PathBuf },

    #[error("Failed to read config file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid config file {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}
