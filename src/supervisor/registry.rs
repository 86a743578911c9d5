//! Registry of supervisors keyed by worker executable.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::config::WorkerConfig;
use crate::supervisor::{Supervisor, SupervisorError};

/// Hands out one shared [`Supervisor`] per worker executable.
///
/// Construct it once at startup and pass it to whatever creates clients.
#[derive(Debug, Default)]
pub struct SupervisorRegistry {
    supervisors: Mutex<HashMap<PathBuf, Supervisor>>,
}

impl SupervisorRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<PathBuf, Supervisor>> {
        self.supervisors
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Get the supervisor for `config.path`, creating it on first use.
    ///
    /// # Errors
    ///
    /// Returns `SupervisorError` if the supervisor has to be created and the
    /// worker executable is unusable.
    pub fn get_or_init(&self, config: &WorkerConfig) -> Result<Supervisor, SupervisorError> {
        let path = config.resolve_path().map_err(SupervisorError::InstallDir)?;
        let mut supervisors = self.lock();
        if let Some(supervisor) = supervisors.get(&path) {
            return Ok(supervisor.clone());
        }

        let supervisor = Supervisor::new(config)?;
        tracing::debug!(path = %path.display(), "Supervisor created");
        supervisors.insert(path, supervisor.clone());
        Ok(supervisor)
    }

    /// Get an existing supervisor by resolved worker path.
    #[must_use]
    pub fn get(&self, path: &Path) -> Option<Supervisor> {
        self.lock().get(path).cloned()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Shut down and forget every supervisor.
    pub async fn shutdown_all(&self) {
        let supervisors: Vec<Supervisor> = self.lock().drain().map(|(_, s)| s).collect();
        for supervisor in supervisors {
            supervisor.shutdown().await;
        }
    }
}
