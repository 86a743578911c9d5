//! Worker process spawning and control.
//!
//! The supervisor never touches `tokio::process` directly. It asks a
//! [`Launcher`] for a [`WorkerProcess`]: three byte streams plus a
//! [`WorkerControl`] that owns the process identity. [`CommandLauncher`] is
//! the real implementation; tests substitute an in-memory one.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::process::{Child, Command};

/// Error type for worker spawning operations.
#[derive(thiserror::Error, Debug)]
pub enum SpawnError {
    /// The worker executable does not exist.
    #[error("Worker executable not found: {}", path.display())]
    NotFound { path: PathBuf },
    /// The worker executable lacks the execute permission bit.
    #[error("Worker '{}' must be executable (755)", path.display())]
    NotExecutable { path: PathBuf },
    /// Permission denied when spawning.
    #[error("Permission denied")]
    PermissionDenied,
    /// A standard stream was not piped.
    #[error("Worker {0} not available")]
    MissingPipe(&'static str),
    /// Other I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SpawnError {
    /// Create a `SpawnError` from an I/O error, classifying common cases.
    fn from_io(err: std::io::Error, path: &Path) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => Self::NotFound {
                path: path.to_path_buf(),
            },
            std::io::ErrorKind::PermissionDenied => Self::PermissionDenied,
            _ => Self::Io(err),
        }
    }
}

/// Verify that `path` is a regular file with at least one execute bit set.
///
/// # Errors
///
/// Returns `SpawnError::NotFound` if the file is missing and
/// `SpawnError::NotExecutable` if it cannot be executed.
pub fn check_executable(path: &Path) -> Result<(), SpawnError> {
    let meta = std::fs::metadata(path).map_err(|e| SpawnError::from_io(e, path))?;
    if !meta.is_file() {
        return Err(SpawnError::NotExecutable {
            path: path.to_path_buf(),
        });
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if meta.permissions().mode() & 0o111 == 0 {
            return Err(SpawnError::NotExecutable {
                path: path.to_path_buf(),
            });
        }
    }

    Ok(())
}

/// How a worker process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerExit {
    /// Exit code, if the process exited normally.
    pub code: Option<i32>,
    /// Terminating signal number, if the process was killed.
    pub signal: Option<i32>,
}

impl WorkerExit {
    /// A normal exit with the given code.
    #[must_use]
    pub fn code(code: i32) -> Self {
        Self {
            code: Some(code),
            signal: None,
        }
    }

    /// Termination by the given signal.
    #[must_use]
    pub fn signal(signal: i32) -> Self {
        Self {
            code: None,
            signal: Some(signal),
        }
    }
}

impl From<ExitStatus> for WorkerExit {
    fn from(status: ExitStatus) -> Self {
        #[cfg(unix)]
        let signal = std::os::unix::process::ExitStatusExt::signal(&status);
        #[cfg(not(unix))]
        let signal = None;

        Self {
            code: status.code(),
            signal,
        }
    }
}

impl fmt::Display for WorkerExit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.code, self.signal) {
            (Some(code), _) => write!(f, "code {code}"),
            (None, Some(signal)) => write!(f, "signal {}", signal_name(signal)),
            (None, None) => f.write_str("unknown status"),
        }
    }
}

#[cfg(unix)]
fn signal_name(signal: i32) -> String {
    nix::sys::signal::Signal::try_from(signal)
        .map_or_else(|_| signal.to_string(), |s| s.as_str().to_string())
}

#[cfg(not(unix))]
fn signal_name(signal: i32) -> String {
    signal.to_string()
}

/// Writable end of the worker's input stream.
pub type WorkerInput = Box<dyn AsyncWrite + Send + Unpin>;

/// Readable end of one of the worker's output streams.
pub type WorkerOutput = Box<dyn AsyncRead + Send + Unpin>;

/// Lifetime control over a spawned worker.
#[async_trait]
pub trait WorkerControl: Send {
    /// OS process id, if still known.
    fn id(&self) -> Option<u32>;

    /// Wait for the process to exit.
    ///
    /// Must be cancel-safe: the supervisor races it against kill requests.
    async fn wait(&mut self) -> std::io::Result<WorkerExit>;

    /// Forcefully kill the process and reap it.
    async fn kill(&mut self) -> std::io::Result<WorkerExit>;
}

/// A freshly spawned worker, split into its parts.
pub struct WorkerProcess {
    pub stdin: WorkerInput,
    pub stdout: WorkerOutput,
    pub stderr: WorkerOutput,
    pub control: Box<dyn WorkerControl>,
}

impl fmt::Debug for WorkerProcess {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerProcess")
            .field("pid", &self.control.id())
            .finish_non_exhaustive()
    }
}

/// Something that can start a worker.
pub trait Launcher: Send + Sync + 'static {
    /// Human-readable name used in logs.
    fn name(&self) -> String;

    /// Spawn a new worker process.
    ///
    /// # Errors
    ///
    /// Returns `SpawnError` if the process fails to spawn.
    fn launch(&self) -> Result<WorkerProcess, SpawnError>;
}

/// Launches the worker executable with piped stdio.
#[derive(Debug, Clone)]
pub struct CommandLauncher {
    path: PathBuf,
    env: BTreeMap<String, String>,
}

impl CommandLauncher {
    /// Create a launcher for the executable at `path`.
    ///
    /// # Errors
    ///
    /// Returns `SpawnError` if the executable is missing or not executable.
    pub fn new(
        path: impl Into<PathBuf>,
        env: BTreeMap<String, String>,
    ) -> Result<Self, SpawnError> {
        let path = path.into();
        check_executable(&path)?;
        Ok(Self { path, env })
    }

    /// Path of the worker executable.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Environment applied on top of the inherited one.
    #[must_use]
    pub fn env(&self) -> &BTreeMap<String, String> {
        &self.env
    }
}

impl Launcher for CommandLauncher {
    fn name(&self) -> String {
        self.path
            .file_name()
            .map_or_else(|| self.path.display().to_string(), |n| {
                n.to_string_lossy().into_owned()
            })
    }

    fn launch(&self) -> Result<WorkerProcess, SpawnError> {
        let mut child = Command::new(&self.path)
            .envs(&self.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| SpawnError::from_io(e, &self.path))?;

        let stdin = child.stdin.take().ok_or(SpawnError::MissingPipe("stdin"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or(SpawnError::MissingPipe("stdout"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or(SpawnError::MissingPipe("stderr"))?;

        Ok(WorkerProcess {
            stdin: Box::new(stdin),
            stdout: Box::new(stdout),
            stderr: Box::new(stderr),
            control: Box::new(ChildControl { child }),
        })
    }
}

/// [`WorkerControl`] over a real child process.
#[derive(Debug)]
struct ChildControl {
    child: Child,
}

#[async_trait]
impl WorkerControl for ChildControl {
    fn id(&self) -> Option<u32> {
        self.child.id()
    }

    async fn wait(&mut self) -> std::io::Result<WorkerExit> {
        self.child.wait().await.map(WorkerExit::from)
    }

    async fn kill(&mut self) -> std::io::Result<WorkerExit> {
        self.child.kill().await?;
        self.wait().await
    }
}
