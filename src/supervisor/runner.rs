//! Supervisor for the shared device worker.
//!
//! One [`Supervisor`] owns at most one worker process and any number of
//! registered clients. All state lives behind a single mutex; the per-process
//! reader, writer and exit-watch tasks report back through it, tagged with the
//! process generation so that events from a previous worker are ignored.
//!
//! Outbound values are fire-and-forget: [`Supervisor::send`] writes to the
//! live worker or drops the value. Nothing is queued across reconnects.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch};
use tokio_stream::StreamExt;

use crate::config::WorkerConfig;
use crate::supervisor::timer::Timer;
use crate::supervisor::{ClientHandle, ClientId, LinkState, LinkStats, LinkStatus};
use crate::worker::{
    classified_lines, diagnostic_chunks, write_line, CommandLauncher, Launcher, Line, LineLevel,
    Payload, SpawnError, WorkerControl, WorkerExit, WorkerInput, WorkerOutput, WorkerProcess,
};

/// Default delay before restarting a worker that exited unexpectedly.
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Default grace period between the last client leaving and teardown.
pub const DEFAULT_TEARDOWN_DELAY: Duration = Duration::from_secs(3);

/// Directive asking the worker to shut down.
pub const STOP_DIRECTIVE: &str = "stop";

/// Error type for supervisor construction.
#[derive(thiserror::Error, Debug)]
pub enum SupervisorError {
    /// The worker path is relative and the install directory is unknown.
    #[error("Cannot resolve worker path: {0}")]
    InstallDir(#[source] std::io::Error),
    /// The worker executable is unusable.
    #[error(transparent)]
    Worker(#[from] SpawnError),
}

/// Delays governing reconnect and teardown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timings {
    pub reconnect_delay: Duration,
    pub teardown_delay: Duration,
    /// Time the worker gets to honor `stop` before it is killed.
    pub stop_grace: Duration,
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            teardown_delay: DEFAULT_TEARDOWN_DELAY,
            stop_grace: Duration::ZERO,
        }
    }
}

impl From<&WorkerConfig> for Timings {
    fn from(config: &WorkerConfig) -> Self {
        Self {
            reconnect_delay: config.reconnect_delay(),
            teardown_delay: config.teardown_delay(),
            stop_grace: config.stop_grace(),
        }
    }
}

/// Supervisor-side view of one running worker.
#[derive(Debug)]
struct Connection {
    generation: u64,
    pid: Option<u32>,
    input: mpsc::UnboundedSender<String>,
    /// Taken by the first stop request.
    kill: Option<oneshot::Sender<Duration>>,
}

impl Connection {
    fn is_stopping(&self) -> bool {
        self.kill.is_none()
    }

    /// Write the stop directive and have the worker killed after `grace`.
    ///
    /// Returns `false` if a stop was already requested.
    fn stop(&mut self, grace: Duration) -> bool {
        let Some(kill) = self.kill.take() else {
            return false;
        };
        let _ = self.input.send(format!("{STOP_DIRECTIVE}\n"));
        let _ = kill.send(grace);
        true
    }
}

/// Worker lifecycle with the resources each state owns.
#[derive(Debug)]
enum Link {
    Disconnected,
    Connected(Connection),
    TeardownPending { conn: Connection, timer: Timer },
    Stopping(Connection),
    ReconnectPending(Timer),
}

impl Link {
    fn state(&self) -> LinkState {
        match self {
            Self::Disconnected => LinkState::Disconnected,
            Self::Connected(_) => LinkState::Connected,
            Self::TeardownPending { .. } => LinkState::TeardownPending,
            Self::Stopping(_) => LinkState::Stopping,
            Self::ReconnectPending(_) => LinkState::ReconnectPending,
        }
    }

    fn connection(&self) -> Option<&Connection> {
        match self {
            Self::Connected(conn) | Self::TeardownPending { conn, .. } | Self::Stopping(conn) => {
                Some(conn)
            }
            Self::Disconnected | Self::ReconnectPending(_) => None,
        }
    }

    fn connection_mut(&mut self) -> Option<&mut Connection> {
        match self {
            Self::Connected(conn) | Self::TeardownPending { conn, .. } | Self::Stopping(conn) => {
                Some(conn)
            }
            Self::Disconnected | Self::ReconnectPending(_) => None,
        }
    }

    /// The connection accepting outbound values, if any.
    fn writable(&self) -> Option<&Connection> {
        match self {
            Self::Connected(conn) | Self::TeardownPending { conn, .. } if !conn.is_stopping() => {
                Some(conn)
            }
            _ => None,
        }
    }
}

struct Inner {
    this: Weak<Mutex<Inner>>,
    name: String,
    launcher: Box<dyn Launcher>,
    timings: Timings,
    link: Link,
    clients: HashMap<ClientId, ClientHandle>,
    /// Set by `shutdown`; no worker is started afterwards.
    closed: bool,
    generation: u64,
    next_timer: u64,
    stats: LinkStats,
    state_tx: watch::Sender<LinkState>,
}

fn lock(shared: &Mutex<Inner>) -> MutexGuard<'_, Inner> {
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Inner {
    fn take_link(&mut self) -> Link {
        std::mem::replace(&mut self.link, Link::Disconnected)
    }

    fn transition(&mut self, link: Link) {
        let to = link.state();
        self.link = link;
        let name = &self.name;
        self.state_tx.send_if_modified(|state| {
            if *state == to {
                return false;
            }
            tracing::debug!(worker = %name, from = ?state, ?to, "State transition");
            *state = to;
            true
        });
    }

    fn broadcast(&self, status: LinkStatus) {
        for client in self.clients.values() {
            client.notify(status);
        }
    }

    fn connection_mut(&mut self, generation: u64) -> Option<&mut Connection> {
        self.link
            .connection_mut()
            .filter(|conn| conn.generation == generation)
    }

    fn start_timer(&mut self, delay: Duration, on_fire: fn(&mut Inner, u64)) -> Timer {
        self.next_timer += 1;
        let id = self.next_timer;
        let this = self.this.clone();
        Timer::schedule(id, delay, move || {
            if let Some(shared) = this.upgrade() {
                on_fire(&mut lock(&shared), id);
            }
        })
    }

    fn register(&mut self, handle: ClientHandle) -> LinkStatus {
        let id = handle.id();
        if self.closed {
            tracing::warn!(worker = %self.name, client = %id, "Supervisor is shut down, not starting worker");
            handle.notify(LinkStatus::Disconnected);
            self.clients.insert(id, handle);
            return LinkStatus::Disconnected;
        }

        match self.take_link() {
            Link::TeardownPending { conn, .. } => {
                tracing::debug!(worker = %self.name, "Pending teardown canceled");
                self.transition(Link::Connected(conn));
            }
            Link::Disconnected => self.connect(),
            link => self.transition(link),
        }

        let status = self.link.state().status();
        handle.notify(status);
        if self.clients.insert(id, handle).is_some() {
            tracing::debug!(worker = %self.name, client = %id, "Client registered twice");
        }
        tracing::info!(
            worker = %self.name,
            client = %id,
            count = self.clients.len(),
            "Adding client"
        );
        status
    }

    fn unregister(&mut self, id: ClientId) {
        if self.clients.remove(&id).is_none() {
            tracing::warn!(worker = %self.name, client = %id, "Ignoring unregister of unknown client");
            return;
        }
        tracing::info!(
            worker = %self.name,
            client = %id,
            count = self.clients.len(),
            "Removing client"
        );
        if !self.clients.is_empty() {
            return;
        }

        match self.take_link() {
            Link::Connected(conn) => {
                let delay = self.timings.teardown_delay;
                let timer = self.start_timer(delay, Inner::on_teardown_timer);
                tracing::debug!(worker = %self.name, ?delay, "Teardown scheduled");
                self.transition(Link::TeardownPending { conn, timer });
            }
            Link::ReconnectPending(_) => {
                tracing::info!(worker = %self.name, "No clients left, reconnect canceled");
                self.transition(Link::Disconnected);
            }
            link => self.transition(link),
        }
    }

    fn send(&self, payload: &Payload) {
        let Some(conn) = self.link.writable() else {
            tracing::trace!(worker = %self.name, %payload, "No worker connected, dropping value");
            return;
        };
        if conn.input.send(payload.to_line()).is_ok() {
            tracing::trace!(worker = %self.name, %payload, "Sending value to worker");
        }
    }

    /// Start a worker. Only called when no process exists.
    fn connect(&mut self) {
        // Drops a pending reconnect timer.
        drop(self.take_link());
        self.generation += 1;
        let generation = self.generation;

        match self.launcher.launch() {
            Ok(worker) => {
                let conn = self.attach(generation, worker);
                tracing::info!(worker = %self.name, pid = ?conn.pid, generation, "Worker started");
                self.stats.record_spawn();
                self.transition(Link::Connected(conn));
                self.broadcast(LinkStatus::Connected);
            }
            Err(e) => {
                tracing::error!(worker = %self.name, error = %e, "Failed to start worker");
                self.stats.record_spawn_failure();
                self.transition(Link::Disconnected);
                self.schedule_reconnect();
            }
        }
    }

    fn attach(&self, generation: u64, worker: WorkerProcess) -> Connection {
        let WorkerProcess {
            stdin,
            stdout,
            stderr,
            control,
        } = worker;
        let pid = control.id();
        let (input_tx, input_rx) = mpsc::unbounded_channel();
        let (kill_tx, kill_rx) = oneshot::channel();

        tokio::spawn(forward_input(self.name.clone(), stdin, input_rx));
        tokio::spawn(read_output(self.this.clone(), generation, stdout));
        tokio::spawn(read_diagnostics(self.this.clone(), generation, stderr));
        tokio::spawn(watch_exit(self.this.clone(), generation, control, kill_rx));

        Connection {
            generation,
            pid,
            input: input_tx,
            kill: Some(kill_tx),
        }
    }

    fn schedule_reconnect(&mut self) {
        if !matches!(self.link, Link::Disconnected) {
            return;
        }
        let delay = self.timings.reconnect_delay;
        tracing::info!(worker = %self.name, ?delay, "Attempting reconnect");
        let timer = self.start_timer(delay, Inner::on_reconnect_timer);
        self.transition(Link::ReconnectPending(timer));
    }

    fn on_reconnect_timer(&mut self, id: u64) {
        if matches!(&self.link, Link::ReconnectPending(timer) if timer.id() == id) {
            self.connect();
        }
    }

    fn on_teardown_timer(&mut self, id: u64) {
        match self.take_link() {
            Link::TeardownPending { mut conn, timer } if timer.id() == id => {
                drop(timer);
                tracing::info!(worker = %self.name, pid = ?conn.pid, "No clients left, stopping worker");
                self.stats.record_teardown();
                conn.stop(self.timings.stop_grace);
                self.transition(Link::Stopping(conn));
            }
            link => self.transition(link),
        }
    }

    fn on_line(&mut self, generation: u64, line: &Line) {
        let text = line.text.as_str();
        match line.level {
            LineLevel::Informational => tracing::info!(worker = %self.name, "{text}"),
            LineLevel::Warning => tracing::warn!(worker = %self.name, "{text}"),
            LineLevel::Unrecognized => tracing::trace!(worker = %self.name, "{text}"),
            LineLevel::Error => tracing::error!(worker = %self.name, "{text}"),
            LineLevel::Fatal => tracing::error!(worker = %self.name, fatal = true, "{text}"),
        }
        if line.level != LineLevel::Fatal {
            return;
        }

        let grace = self.timings.stop_grace;
        if self
            .connection_mut(generation)
            .is_some_and(|conn| conn.stop(grace))
        {
            self.stats.record_device_fault();
            tracing::warn!(worker = %self.name, generation, "Fatal device error, stopping worker");
        }
    }

    fn on_diagnostic(&mut self, generation: u64, text: &str) {
        tracing::error!(worker = %self.name, "Process error: {}", text.trim_end());
        if self
            .connection_mut(generation)
            .is_some_and(|conn| conn.stop(Duration::ZERO))
        {
            self.stats.record_device_fault();
            tracing::warn!(worker = %self.name, generation, "Worker wrote to stderr, killing it");
        }
    }

    fn on_exit(&mut self, generation: u64, exit: &std::io::Result<WorkerExit>) {
        if self.connection_mut(generation).is_none() {
            tracing::debug!(worker = %self.name, generation, "Ignoring exit of a stale worker");
            return;
        }
        let intentional = matches!(self.link, Link::Stopping(_));
        match exit {
            Ok(status) => {
                tracing::warn!(worker = %self.name, generation, %status, "Process exit");
            }
            Err(e) => {
                tracing::warn!(worker = %self.name, generation, error = %e, "Lost track of worker");
            }
        }

        self.transition(Link::Disconnected);
        self.broadcast(LinkStatus::Disconnected);

        if !intentional {
            self.stats.record_unexpected_exit();
        }
        if self.clients.is_empty() {
            tracing::debug!(worker = %self.name, "No clients left, staying disconnected");
            return;
        }
        if !intentional {
            self.schedule_reconnect();
        } else if !self.closed {
            tracing::info!(worker = %self.name, "Client registered during shutdown, restarting worker");
            self.connect();
        }
    }

    fn close(&mut self) {
        self.closed = true;
        let grace = self.timings.stop_grace;
        match self.take_link() {
            Link::Connected(mut conn)
            | Link::TeardownPending { mut conn, .. }
            | Link::Stopping(mut conn) => {
                tracing::info!(worker = %self.name, pid = ?conn.pid, "Shutting down worker");
                conn.stop(grace);
                self.transition(Link::Stopping(conn));
            }
            Link::ReconnectPending(_) | Link::Disconnected => self.transition(Link::Disconnected),
        }
    }
}

/// Shared supervisor for one worker executable.
///
/// Cheap to clone; all clones drive the same worker. Methods other than
/// [`Supervisor::new`] must be called within a tokio runtime.
#[derive(Clone)]
pub struct Supervisor {
    shared: Arc<Mutex<Inner>>,
}

impl Supervisor {
    /// Create a supervisor for the worker described by `config`.
    ///
    /// # Errors
    ///
    /// Returns `SupervisorError` if the worker executable cannot be found or
    /// lacks the execute permission.
    pub fn new(config: &WorkerConfig) -> Result<Self, SupervisorError> {
        let path = config.resolve_path().map_err(SupervisorError::InstallDir)?;
        let launcher = CommandLauncher::new(path, config.env.clone())?;
        tracing::debug!(path = %launcher.path().display(), "Worker executable verified");
        Ok(Self::with_launcher(launcher, Timings::from(config)))
    }

    /// Create a supervisor around a custom launcher.
    #[must_use]
    pub fn with_launcher(launcher: impl Launcher, timings: Timings) -> Self {
        let name = launcher.name();
        let (state_tx, _) = watch::channel(LinkState::Disconnected);
        let shared = Arc::new_cyclic(|this| {
            Mutex::new(Inner {
                this: this.clone(),
                name,
                launcher: Box::new(launcher),
                timings,
                link: Link::Disconnected,
                clients: HashMap::new(),
                closed: false,
                generation: 0,
                next_timer: 0,
                stats: LinkStats::default(),
                state_tx,
            })
        });
        Self { shared }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        lock(&self.shared)
    }

    /// Register a client, starting the worker if needed.
    ///
    /// The handle is notified once with the returned status. A freshly
    /// started worker is additionally announced to every other client.
    pub fn register(&self, handle: ClientHandle) -> LinkStatus {
        self.lock().register(handle)
    }

    /// Remove a client. The last one out arms the teardown timer.
    pub fn unregister(&self, id: ClientId) {
        self.lock().unregister(id);
    }

    /// Write `payload` to the worker if one is connected; drop it otherwise.
    pub fn send(&self, payload: &Payload) {
        self.lock().send(payload);
    }

    /// Stop the worker now and refuse to start it again.
    ///
    /// Resolves once the worker has exited.
    pub async fn shutdown(&self) {
        let mut states = {
            let mut inner = self.lock();
            inner.close();
            inner.state_tx.subscribe()
        };
        let _ = states.wait_for(|state| !state.has_process()).await;
    }

    /// Name of the worker, for logs and display.
    #[must_use]
    pub fn name(&self) -> String {
        self.lock().name.clone()
    }

    #[must_use]
    pub fn state(&self) -> LinkState {
        self.lock().link.state()
    }

    /// Watch state transitions.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<LinkState> {
        self.lock().state_tx.subscribe()
    }

    #[must_use]
    pub fn client_count(&self) -> usize {
        self.lock().clients.len()
    }

    /// OS process id of the live worker.
    #[must_use]
    pub fn pid(&self) -> Option<u32> {
        self.lock().link.connection().and_then(|conn| conn.pid)
    }

    #[must_use]
    pub fn stats(&self) -> LinkStats {
        self.lock().stats
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Whether both values drive the same worker.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }
}

impl fmt::Debug for Supervisor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.lock();
        f.debug_struct("Supervisor")
            .field("worker", &inner.name)
            .field("state", &inner.link.state())
            .field("clients", &inner.clients.len())
            .finish_non_exhaustive()
    }
}

async fn forward_input(
    name: String,
    mut stdin: WorkerInput,
    mut lines: mpsc::UnboundedReceiver<String>,
) {
    while let Some(line) = lines.recv().await {
        if let Err(e) = write_line(&mut stdin, &line).await {
            tracing::warn!(worker = %name, error = %e, "Failed to write to worker");
            break;
        }
    }
}

async fn read_output(this: Weak<Mutex<Inner>>, generation: u64, stdout: WorkerOutput) {
    let lines = classified_lines(stdout);
    tokio::pin!(lines);

    while let Some(next) = lines.next().await {
        let line = match next {
            Ok(line) => line,
            Err(e) => {
                tracing::debug!(generation, error = %e, "Worker stdout failed");
                break;
            }
        };
        let Some(shared) = this.upgrade() else {
            break;
        };
        lock(&shared).on_line(generation, &line);
    }
}

async fn read_diagnostics(this: Weak<Mutex<Inner>>, generation: u64, stderr: WorkerOutput) {
    let chunks = diagnostic_chunks(stderr);
    tokio::pin!(chunks);

    while let Some(next) = chunks.next().await {
        let text = match next {
            Ok(text) => text,
            Err(e) => {
                tracing::debug!(generation, error = %e, "Worker stderr failed");
                break;
            }
        };
        let Some(shared) = this.upgrade() else {
            break;
        };
        lock(&shared).on_diagnostic(generation, &text);
    }
}

/// Own the worker until it exits, killing it on request.
///
/// A dropped request sender means the supervisor itself is gone, which is
/// treated as an immediate kill.
async fn watch_exit(
    this: Weak<Mutex<Inner>>,
    generation: u64,
    mut control: Box<dyn WorkerControl>,
    mut kill: oneshot::Receiver<Duration>,
) {
    let exit = tokio::select! {
        exit = control.wait() => exit,
        request = &mut kill => {
            terminate(control.as_mut(), request.unwrap_or(Duration::ZERO)).await
        }
    };

    if let Some(shared) = this.upgrade() {
        lock(&shared).on_exit(generation, &exit);
    }
}

async fn terminate(
    control: &mut dyn WorkerControl,
    grace: Duration,
) -> std::io::Result<WorkerExit> {
    if !grace.is_zero() {
        if let Ok(exit) = tokio::time::timeout(grace, control.wait()).await {
            return exit;
        }
    }
    control.kill().await
}
