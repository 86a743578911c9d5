//! Configuration types.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Top-level configuration file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HatlinkConfig {
    #[serde(default)]
    pub worker: WorkerConfig,
}

/// Configuration for the supervised worker process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Worker executable. Relative paths resolve against the directory
    /// holding the running binary.
    #[serde(default = "default_path")]
    pub path: PathBuf,
    /// Extra environment for the worker.
    #[serde(default = "default_env")]
    pub env: BTreeMap<String, String>,
    /// Delay before restarting a worker that exited unexpectedly.
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,
    /// Grace period between the last client leaving and worker teardown.
    #[serde(default = "default_teardown_delay_ms")]
    pub teardown_delay_ms: u64,
    /// How long the worker may take to honor `stop` before it is killed.
    #[serde(default)]
    pub stop_grace_ms: u64,
}

fn default_path() -> PathBuf {
    PathBuf::from("automationhatlink.o1")
}

fn default_env() -> BTreeMap<String, String> {
    BTreeMap::from([("PYTHONUNBUFFERED".to_string(), "1".to_string())])
}

fn default_reconnect_delay_ms() -> u64 {
    5000
}

fn default_teardown_delay_ms() -> u64 {
    3000
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            path: default_path(),
            env: default_env(),
            reconnect_delay_ms: default_reconnect_delay_ms(),
            teardown_delay_ms: default_teardown_delay_ms(),
            stop_grace_ms: 0,
        }
    }
}

impl WorkerConfig {
    /// Config for the worker at `path` with default timings.
    #[must_use]
    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Default::default()
        }
    }

    #[must_use]
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    #[must_use]
    pub fn teardown_delay(&self) -> Duration {
        Duration::from_millis(self.teardown_delay_ms)
    }

    #[must_use]
    pub fn stop_grace(&self) -> Duration {
        Duration::from_millis(self.stop_grace_ms)
    }

    /// Absolute path of the worker executable.
    ///
    /// # Errors
    ///
    /// Returns an error if the path is relative and the location of the
    /// running binary cannot be determined.
    pub fn resolve_path(&self) -> std::io::Result<PathBuf> {
        if self.path.is_absolute() {
            return Ok(self.path.clone());
        }
        let exe = std::env::current_exe()?;
        let install_dir = exe.parent().ok_or_else(|| {
            std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "running binary has no parent directory",
            )
        })?;
        Ok(install_dir.join(&self.path))
    }
}
