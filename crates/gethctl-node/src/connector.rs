//! The lifecycle controller: one node process and the link to it.

use std::fmt;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use gethctl_frame::DechunkerConfig;
use gethctl_rpc::{CallError, Connection, ConnectionConfig, RequestIds};
use gethctl_transport::Endpoint;
use serde_json::Value;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::binary::{BinaryProvider, LocalBinary};
use crate::error::{BinaryError, LifecycleError, Result};
use crate::options::{LaunchPlan, NodeOptions};
use crate::slot::{ConnectorSlot, SlotGuard};
use crate::supervisor::{ChildProcess, ProcessSupervisor, TokioSupervisor};

/// Fixed wait used by [`Readiness::GracePeriod`] by default.
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(4);

/// Interval between endpoint probes.
pub const DEFAULT_PROBE_INTERVAL: Duration = Duration::from_millis(250);

/// Upper bound on the probe wait.
pub const DEFAULT_READY_TIMEOUT: Duration = Duration::from_secs(30);

/// How long `stop()` waits for the process to exit after killing it.
pub const DEFAULT_STOP_TIMEOUT: Duration = Duration::from_secs(5);

/// How `start()` decides the node is usable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    /// Sleep for a fixed period after spawning.
    GracePeriod(Duration),
    /// Poll the IPC endpoint until it accepts a connection.
    Probe { interval: Duration, timeout: Duration },
}

impl Default for Readiness {
    fn default() -> Self {
        Readiness::Probe {
            interval: DEFAULT_PROBE_INTERVAL,
            timeout: DEFAULT_READY_TIMEOUT,
        }
    }
}

/// Connector configuration. Collaborators default to the real process
/// spawner and a local binary check.
#[derive(Clone)]
pub struct ConnectorConfig {
    pub readiness: Readiness,
    pub request_timeout: Option<Duration>,
    pub idle_timeout: Option<Duration>,
    pub dechunker: DechunkerConfig,
    pub stop_timeout: Duration,
    pub supervisor: Arc<dyn ProcessSupervisor>,
    pub binary: Arc<dyn BinaryProvider>,
}

impl Default for ConnectorConfig {
    fn default() -> Self {
        Self {
            readiness: Readiness::default(),
            request_timeout: None,
            idle_timeout: None,
            dechunker: DechunkerConfig::default(),
            stop_timeout: DEFAULT_STOP_TIMEOUT,
            supervisor: Arc::new(TokioSupervisor::new()),
            binary: Arc::new(LocalBinary),
        }
    }
}

impl ConnectorConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_readiness(mut self, readiness: Readiness) -> Self {
        self.readiness = readiness;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = Some(timeout);
        self
    }

    pub fn with_stop_timeout(mut self, timeout: Duration) -> Self {
        self.stop_timeout = timeout;
        self
    }

    pub fn with_supervisor(mut self, supervisor: Arc<dyn ProcessSupervisor>) -> Self {
        self.supervisor = supervisor;
        self
    }

    pub fn with_binary_provider(mut self, binary: Arc<dyn BinaryProvider>) -> Self {
        self.binary = binary;
        self
    }
}

impl fmt::Debug for ConnectorConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectorConfig")
            .field("readiness", &self.readiness)
            .field("request_timeout", &self.request_timeout)
            .field("idle_timeout", &self.idle_timeout)
            .field("dechunker", &self.dechunker)
            .field("stop_timeout", &self.stop_timeout)
            .finish_non_exhaustive()
    }
}

/// Identifies one started node process.
///
/// Repeated `start()` calls return an equal handle; a start after `stop()`
/// returns a new generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeHandle {
    pub generation: u64,
    pub pid: Option<u32>,
}

struct Running {
    handle: NodeHandle,
    child: Box<dyn ChildProcess>,
    connection: Arc<Connection>,
}

#[derive(Default)]
struct State {
    options: NodeOptions,
    running: Option<Running>,
    starting: bool,
    generation: u64,
    /// Executable that last passed the binary check.
    binary_checked: Option<PathBuf>,
}

impl State {
    /// Forget a process that exited on its own.
    fn reap_exited(&mut self) {
        let Some(running) = self.running.as_mut() else {
            return;
        };
        match running.child.try_wait() {
            Ok(None) => {}
            Ok(Some(exit)) => {
                warn!(
                    generation = running.handle.generation,
                    code = ?exit.code,
                    "node exited unexpectedly"
                );
                self.running = None;
            }
            Err(err) => warn!(error = %err, "couldn't poll node process"),
        }
    }
}

/// Owns the node process, its options and its connection.
///
/// At most one connector is live per [`ConnectorSlot`]; obtain one with
/// [`Connector::acquire`]. Dropping the connector kills a running node and
/// frees the slot.
pub struct Connector {
    config: ConnectorConfig,
    ids: Arc<RequestIds>,
    state: Mutex<State>,
    lifecycle: tokio::sync::Mutex<()>,
    _slot: SlotGuard,
}

impl Connector {
    /// Claim the process-wide connector.
    ///
    /// Fails with [`LifecycleError::SingletonViolation`] while another
    /// connector is live.
    pub fn acquire(config: ConnectorConfig) -> Result<Self> {
        Self::claim(ConnectorSlot::global(), config)
    }

    /// Claim the connector of a private slot.
    #[cfg(any(test, feature = "test-util"))]
    #[doc(hidden)]
    pub fn acquire_in(slot: &ConnectorSlot, config: ConnectorConfig) -> Result<Self> {
        Self::claim(slot, config)
    }

    fn claim(slot: &ConnectorSlot, config: ConnectorConfig) -> Result<Self> {
        let guard = slot.claim()?;
        Ok(Self {
            config,
            ids: Arc::new(RequestIds::new()),
            state: Mutex::new(State::default()),
            lifecycle: tokio::sync::Mutex::new(()),
            _slot: guard,
        })
    }

    pub fn config(&self) -> &ConnectorConfig {
        &self.config
    }

    /// Replace the options used by the next `start()`.
    ///
    /// Rejected with [`LifecycleError::AlreadyStarted`] while a process is
    /// active or starting.
    pub fn set_options(&self, options: NodeOptions) -> Result<()> {
        options.validate()?;
        let mut state = self.lock();
        state.reap_exited();
        if state.running.is_some() || state.starting {
            return Err(LifecycleError::AlreadyStarted);
        }
        debug!(?options, "node options set");
        state.options = options;
        Ok(())
    }

    /// Options the next `start()` will use.
    pub fn options(&self) -> NodeOptions {
        self.lock().options.clone()
    }

    /// Launch plan derived from the current options.
    pub fn launch_plan(&self) -> Result<LaunchPlan> {
        self.lock().options.resolve()
    }

    /// Start the node, or return the handle of the one already running.
    pub async fn start(&self) -> Result<NodeHandle> {
        self.start_with_cancel(CancellationToken::new()).await
    }

    /// Like [`Connector::start`], with a token that aborts the readiness wait.
    ///
    /// A process that fails to become ready is killed and the connector
    /// stays inactive.
    pub async fn start_with_cancel(&self, cancel: CancellationToken) -> Result<NodeHandle> {
        let _lifecycle = self.lifecycle.lock().await;

        let (plan, check_binary) = {
            let mut state = self.lock();
            state.reap_exited();
            if let Some(running) = &state.running {
                debug!(generation = running.handle.generation, "node already running");
                return Ok(running.handle);
            }
            let plan = state.options.resolve()?;
            let check_binary = state.binary_checked.as_ref() != Some(&plan.executable);
            (plan, check_binary)
        };

        if check_binary {
            if !self.config.binary.ensure_binary_present(&plan.executable)? {
                return Err(BinaryError::NotReady(plan.executable.clone()).into());
            }
            self.lock().binary_checked = Some(plan.executable.clone());
        }

        let starting = StartingFlag::raise(&self.state);
        info!(
            executable = %plan.executable.display(),
            args = ?plan.args,
            "starting node"
        );
        let mut child = self.config.supervisor.spawn(&plan.executable, &plan.args)?;
        let endpoint = plan.endpoint();

        if let Err(err) = self.wait_ready(child.as_mut(), &endpoint, &cancel).await {
            warn!(error = %err, pid = ?child.id(), "node not ready; killing it");
            if let Err(kill_err) = child.kill() {
                debug!(error = %kill_err, "kill after failed start");
            }
            return Err(err);
        }

        let mut connection_config =
            ConnectionConfig::new(endpoint).with_dechunker(self.config.dechunker.clone());
        connection_config.request_timeout = self.config.request_timeout;
        connection_config.idle_timeout = self.config.idle_timeout;
        let connection = Arc::new(Connection::with_request_ids(
            connection_config,
            Arc::clone(&self.ids),
        ));

        let handle = {
            let mut state = self.lock();
            state.generation += 1;
            let handle = NodeHandle {
                generation: state.generation,
                pid: child.id(),
            };
            state.running = Some(Running {
                handle,
                child,
                connection,
            });
            handle
        };
        drop(starting);
        info!(generation = handle.generation, pid = ?handle.pid, "node ready");
        Ok(handle)
    }

    async fn wait_ready(
        &self,
        child: &mut dyn ChildProcess,
        endpoint: &Endpoint,
        cancel: &CancellationToken,
    ) -> Result<()> {
        match self.config.readiness {
            Readiness::GracePeriod(period) => {
                debug!(?period, "waiting grace period");
                tokio::select! {
                    _ = cancel.cancelled() => return Err(LifecycleError::Cancelled),
                    _ = tokio::time::sleep(period) => {}
                }
                check_alive(child)
            }
            Readiness::Probe { interval, timeout } => {
                let deadline = Instant::now() + timeout;
                loop {
                    check_alive(child)?;
                    if endpoint.probe().await.map_err(LifecycleError::Probe)? {
                        return Ok(());
                    }
                    if Instant::now() >= deadline {
                        return Err(LifecycleError::NotReady { timeout });
                    }
                    tokio::select! {
                        _ = cancel.cancelled() => return Err(LifecycleError::Cancelled),
                        _ = tokio::time::sleep(interval) => {}
                    }
                }
            }
        }
    }

    /// True while a started process has not exited.
    pub fn is_running(&self) -> bool {
        let mut state = self.lock();
        state.reap_exited();
        state.running.is_some()
    }

    /// Handle of the running process.
    pub fn handle(&self) -> Option<NodeHandle> {
        let mut state = self.lock();
        state.reap_exited();
        state.running.as_ref().map(|running| running.handle)
    }

    /// Connection to the running process.
    pub fn connection(&self) -> Option<Arc<Connection>> {
        let mut state = self.lock();
        state.reap_exited();
        state
            .running
            .as_ref()
            .map(|running| Arc::clone(&running.connection))
    }

    /// Issue one JSON-RPC call to the running node.
    ///
    /// Fails with [`CallError::NotStarted`] when no process is active,
    /// without touching the socket.
    pub async fn call(
        &self,
        method: &str,
        params: Vec<Value>,
    ) -> std::result::Result<Value, CallError> {
        let Some(connection) = self.connection() else {
            debug!(method, "call while node is not started");
            return Err(CallError::NotStarted);
        };
        connection.call(method, params).await
    }

    /// Close the connection, kill the node and return to "not active".
    ///
    /// Calls still waiting fail with [`CallError::ConnectionClosed`].
    /// Returns the handle of the stopped process, or `None` if none was running.
    pub async fn stop(&self) -> Option<NodeHandle> {
        let _lifecycle = self.lifecycle.lock().await;

        let running = self.lock().running.take();
        let Some(mut running) = running else {
            debug!("stop: node not running");
            return None;
        };

        running.connection.destroy().await;
        let failed = running
            .connection
            .correlator()
            .fail_all(|| CallError::ConnectionClosed);
        if failed > 0 {
            debug!(failed, "failed pending calls on stop");
        }

        if let Err(err) = running.child.kill() {
            debug!(error = %err, "kill on stop");
        }
        match tokio::time::timeout(self.config.stop_timeout, running.child.wait()).await {
            Ok(Ok(exit)) => debug!(code = ?exit.code, "node exited"),
            Ok(Err(err)) => warn!(error = %err, "couldn't wait for node exit"),
            Err(_) => warn!(timeout = ?self.config.stop_timeout, "node did not exit in time"),
        }

        info!(generation = running.handle.generation, "node stopped");
        Some(running.handle)
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for Connector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connector")
            .field("config", &self.config)
            .field("handle", &self.handle())
            .finish_non_exhaustive()
    }
}

fn check_alive(child: &mut dyn ChildProcess) -> Result<()> {
    match child.try_wait() {
        Ok(Some(exit)) => Err(LifecycleError::ExitedDuringStartup { code: exit.code }),
        Ok(None) => Ok(()),
        Err(err) => {
            warn!(error = %err, "couldn't poll node process during startup");
            Ok(())
        }
    }
}

/// Marks a start in progress until dropped.
struct StartingFlag<'a>(&'a Mutex<State>);

impl<'a> StartingFlag<'a> {
    fn raise(state: &'a Mutex<State>) -> Self {
        state.lock().unwrap_or_else(PoisonError::into_inner).starting = true;
        Self(state)
    }
}

impl Drop for StartingFlag<'_> {
    fn drop(&mut self) {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).starting = false;
    }
}
