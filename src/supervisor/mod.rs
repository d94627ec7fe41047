pub mod controller;

use std::future::Future;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use tokio::process::{Child, Command};
use tokio::sync::Mutex;

use crate::config::DevConfig;
use crate::error::SupervisorError;
use crate::port::{wait_for_listen, wait_for_release};

use controller::ProcessController;

/// Lifecycle of the supervised backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Stopped,
    /// Spawned but not yet accepting connections.
    Starting,
    Running,
    Restarting,
}

/// Snapshot of the live backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessHandle {
    pub pid: Option<u32>,
    pub port: u16,
    pub state: LifecycleState,
}

/// Result of a restart request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestartOutcome {
    Restarted,
    /// Another restart was already in flight; this request was dropped.
    Skipped,
}

/// How to launch the backend.
#[derive(Debug, Clone)]
pub struct BackendSpec {
    pub program: String,
    pub args: Vec<String>,
    pub working_dir: PathBuf,
    pub port_env: String,
    pub port: u16,
    pub release_timeout: Duration,
}

impl BackendSpec {
    /// Build from configuration, with `port` already allocated.
    pub fn from_config(config: &DevConfig, port: u16) -> Self {
        let mut argv = config.backend.command.iter().cloned();
        Self {
            program: argv.next().unwrap_or_default(),
            args: argv.collect(),
            working_dir: config.root.clone(),
            port_env: config.backend.port_env.clone(),
            port,
            release_timeout: config.release_timeout(),
        }
    }
}

/// What the rebuild coordinator needs from a backend.
pub trait Backend: Send + Sync + 'static {
    fn restart(&self) -> impl Future<Output = Result<RestartOutcome, SupervisorError>> + Send;

    fn wait_until_listening(
        &self,
        budget: Duration,
    ) -> impl Future<Output = Result<(), SupervisorError>> + Send;
}

struct LiveProcess {
    child: Child,
    pid: Option<u32>,
}

/// Owns the single live backend process and restarts it on request.
pub struct Supervisor {
    spec: BackendSpec,
    controller: Arc<dyn ProcessController>,
    current: Mutex<Option<LiveProcess>>,
    state: StdMutex<LifecycleState>,
    restarting: AtomicBool,
}

/// Clears the in-flight flag however the restart ends.
struct RestartGuard<'a>(&'a AtomicBool);

impl Drop for RestartGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl Supervisor {
    pub fn new(spec: BackendSpec, controller: Arc<dyn ProcessController>) -> Self {
        Self {
            spec,
            controller,
            current: Mutex::new(None),
            state: StdMutex::new(LifecycleState::Stopped),
            restarting: AtomicBool::new(false),
        }
    }

    pub fn port(&self) -> u16 {
        self.spec.port
    }

    pub fn state(&self) -> LifecycleState {
        *self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn set_state(&self, next: LifecycleState) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if *state != next {
            tracing::debug!(from = ?*state, to = ?next, "backend state");
            *state = next;
        }
    }

    /// Current handle, or `None` when nothing is live.
    ///
    /// Notices a backend that exited on its own and moves to `Stopped`.
    pub async fn handle(&self) -> Option<ProcessHandle> {
        let mut current = self.current.lock().await;
        self.reap_exited(&mut current);
        current.as_ref().map(|live| ProcessHandle {
            pid: live.pid,
            port: self.spec.port,
            state: self.state(),
        })
    }

    fn reap_exited(&self, current: &mut Option<LiveProcess>) {
        let Some(live) = current.as_mut() else {
            return;
        };
        if let Ok(Some(status)) = live.child.try_wait() {
            tracing::warn!(pid = ?live.pid, %status, "backend exited on its own");
            // Its descendants may still hold the port.
            if let Some(pid) = live.pid
                && let Err(err) = self.controller.kill_tree(pid, &mut live.child)
            {
                tracing::debug!(pid, error = %err, "no descendants left to kill");
            }
            *current = None;
            self.set_state(LifecycleState::Stopped);
        }
    }

    /// Spawn the backend. A no-op when one is already live.
    pub async fn start(&self) -> Result<(), SupervisorError> {
        let mut current = self.current.lock().await;
        self.reap_exited(&mut current);
        if current.is_some() {
            return Ok(());
        }
        *current = Some(self.spawn()?);
        Ok(())
    }

    /// Kill the live tree, wait for its port to be released, then spawn anew.
    ///
    /// A request that arrives while another restart is in flight returns
    /// [`RestartOutcome::Skipped`]. A failed spawn leaves the supervisor `Stopped`.
    pub async fn restart(&self) -> Result<RestartOutcome, SupervisorError> {
        if self.restarting.swap(true, Ordering::AcqRel) {
            tracing::debug!("restart already in flight, dropping request");
            return Ok(RestartOutcome::Skipped);
        }
        let _guard = RestartGuard(&self.restarting);

        let mut current = self.current.lock().await;
        self.set_state(LifecycleState::Restarting);

        if let Some(old) = current.take() {
            self.terminate(old).await;
        }

        if let Err(err) = wait_for_release(self.spec.port, self.spec.release_timeout).await {
            tracing::warn!(error = %err, "port still held, spawning anyway");
        }

        *current = Some(self.spawn()?);
        Ok(RestartOutcome::Restarted)
    }

    /// Wait for the backend to accept connections; `Starting` becomes `Running`.
    pub async fn wait_until_listening(&self, budget: Duration) -> Result<(), SupervisorError> {
        if !matches!(
            self.state(),
            LifecycleState::Starting | LifecycleState::Running
        ) {
            return Err(SupervisorError::NotRunning);
        }

        wait_for_listen(self.spec.port, budget).await?;

        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if *state == LifecycleState::Starting {
            *state = LifecycleState::Running;
            tracing::info!(port = self.spec.port, "backend listening");
        }
        Ok(())
    }

    /// Kill the live tree, if any.
    pub async fn stop(&self) {
        let mut current = self.current.lock().await;
        if let Some(old) = current.take() {
            self.terminate(old).await;
        }
        self.set_state(LifecycleState::Stopped);
    }

    async fn terminate(&self, mut old: LiveProcess) {
        let killed = match old.pid {
            Some(pid) => self.controller.kill_tree(pid, &mut old.child),
            None => old.child.start_kill(),
        };
        if let Err(err) = killed {
            tracing::warn!(pid = ?old.pid, error = %err, "failed to kill backend tree");
        }
        match tokio::time::timeout(self.spec.release_timeout, old.child.wait()).await {
            Ok(Ok(status)) => tracing::debug!(pid = ?old.pid, %status, "backend exited"),
            Ok(Err(err)) => tracing::warn!(pid = ?old.pid, error = %err, "failed to reap backend"),
            Err(_) => tracing::warn!(pid = ?old.pid, "backend did not exit in time"),
        }
    }

    fn spawn(&self) -> Result<LiveProcess, SupervisorError> {
        let mut command = Command::new(&self.spec.program);
        command
            .args(&self.spec.args)
            .current_dir(&self.spec.working_dir)
            .env(&self.spec.port_env, self.spec.port.to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit());
        self.controller.prepare(&mut command);

        match command.spawn() {
            Ok(child) => {
                let pid = child.id();
                tracing::info!(?pid, port = self.spec.port, program = %self.spec.program, "backend spawned");
                self.set_state(LifecycleState::Starting);
                Ok(LiveProcess { child, pid })
            }
            Err(source) => {
                self.set_state(LifecycleState::Stopped);
                Err(SupervisorError::Spawn {
                    program: self.spec.program.clone(),
                    source,
                })
            }
        }
    }
}

impl Backend for Supervisor {
    fn restart(&self) -> impl Future<Output = Result<RestartOutcome, SupervisorError>> + Send {
        Supervisor::restart(self)
    }

    fn wait_until_listening(
        &self,
        budget: Duration,
    ) -> impl Future<Output = Result<(), SupervisorError>> + Send {
        Supervisor::wait_until_listening(self, budget)
    }
}

impl<B: Backend> Backend for Arc<B> {
    fn restart(&self) -> impl Future<Output = Result<RestartOutcome, SupervisorError>> + Send {
        (**self).restart()
    }

    fn wait_until_listening(
        &self,
        budget: Duration,
    ) -> impl Future<Output = Result<(), SupervisorError>> + Send {
        (**self).wait_until_listening(budget)
    }
}
