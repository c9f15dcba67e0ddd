//! Restart-loop runner.
//!
//! Keeps exactly one instance of an executable running until shutdown is
//! requested. Exits are recovered by respawning; the optional hook
//! regenerates the child's input before every start and chooses a pause
//! after every exit, and the backoff policy may add to that pause.

use crate::backoff::{BackoffPolicy, NoBackoff};
use async_trait::async_trait;
use hsperf_common::{Error, Result, Role, Shutdown};
use hsperf_process::{process_exists, ChildProcess, CommandSpec, LogSink, ProcessStatus};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Default bounded wait between liveness polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Per-restart customisation.
#[async_trait]
pub trait RestartHook: Send {
    /// Called before every spawn, the first one included.
    async fn before_start(&mut self) -> Result<()>;

    /// Called after every observed exit; returns the pause before the next
    /// start.
    ///
    /// Not called for a child stopped by shutdown: no run follows it, so any
    /// state advanced here would never be used.
    async fn after_exit(&mut self, _status: ProcessStatus) -> Duration {
        Duration::ZERO
    }
}

/// Counters shared between a runner task and its observers.
#[derive(Debug, Default)]
pub struct RunnerStatus {
    running: AtomicBool,
    spawns: AtomicU64,
    exits: AtomicU64,
    pid: AtomicU32,
}

impl RunnerStatus {
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Running flag confirmed against the OS.
    pub fn is_alive(&self) -> bool {
        match self.pid() {
            Some(pid) if self.is_running() => process_exists(pid).unwrap_or(false),
            _ => false,
        }
    }

    pub fn spawn_count(&self) -> u64 {
        self.spawns.load(Ordering::SeqCst)
    }

    pub fn exit_count(&self) -> u64 {
        self.exits.load(Ordering::SeqCst)
    }

    /// PID of the current or most recent child.
    pub fn pid(&self) -> Option<u32> {
        match self.pid.load(Ordering::SeqCst) {
            0 => None,
            pid => Some(pid),
        }
    }

    fn record_spawn(&self, pid: u32) {
        self.pid.store(pid, Ordering::SeqCst);
        self.spawns.fetch_add(1, Ordering::SeqCst);
        self.running.store(true, Ordering::SeqCst);
    }

    fn record_exit(&self) {
        self.running.store(false, Ordering::SeqCst);
        self.exits.fetch_add(1, Ordering::SeqCst);
    }

    fn record_stopped(&self) {
        self.running.store(false, Ordering::SeqCst);
    }
}

pub struct RestartLoopRunner {
    role: Role,
    spec: CommandSpec,
    sink: LogSink,
    hook: Option<Box<dyn RestartHook>>,
    backoff: Box<dyn BackoffPolicy>,
    poll_interval: Duration,
    terminate_grace: Duration,
    shutdown: Shutdown,
    status: Arc<RunnerStatus>,
}

impl RestartLoopRunner {
    pub fn new(role: Role, spec: CommandSpec, sink: LogSink, shutdown: Shutdown) -> Self {
        Self {
            role,
            spec,
            sink,
            hook: None,
            backoff: Box::new(NoBackoff),
            poll_interval: DEFAULT_POLL_INTERVAL,
            terminate_grace: Duration::from_secs(10),
            shutdown,
            status: Arc::new(RunnerStatus::default()),
        }
    }

    pub fn with_hook(mut self, hook: impl RestartHook + 'static) -> Self {
        self.hook = Some(Box::new(hook));
        self
    }

    pub fn with_backoff(mut self, backoff: Box<dyn BackoffPolicy>) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_terminate_grace(mut self, grace: Duration) -> Self {
        self.terminate_grace = grace;
        self
    }

    /// Run the hook and spawn the first child, then hand the loop to a
    /// task.
    ///
    /// Errors from the first start are returned here so startup can abort;
    /// later restarts only log failures and retry.
    pub async fn start(mut self) -> Result<RunnerHandle> {
        if let Some(hook) = self.hook.as_mut() {
            hook.before_start().await?;
        }
        let child = ChildProcess::spawn(self.role, &self.spec, &self.sink).await?;
        self.status.record_spawn(child.pid());

        let role = self.role;
        let status = Arc::clone(&self.status);
        info!(role = %role, "Restart loop started");
        let task = tokio::spawn(self.run(child));

        Ok(RunnerHandle { role, status, task })
    }

    async fn run(mut self, mut child: ChildProcess) {
        loop {
            let started = Instant::now();
            let Some(exit) =
                watch_child(&mut child, &self.shutdown, self.poll_interval).await
            else {
                break;
            };

            let exit = child.wait().await.unwrap_or(exit);
            self.status.record_exit();
            info!(
                role = %self.role,
                pid = child.pid(),
                status = ?exit,
                runtime = ?started.elapsed(),
                "Process exited, restarting"
            );

            let mut pause = match self.hook.as_mut() {
                Some(hook) => hook.after_exit(exit).await,
                None => Duration::ZERO,
            };
            pause = pause.saturating_add(self.backoff.next_delay(started.elapsed()));

            if !pause.is_zero() {
                debug!(role = %self.role, ?pause, "Pausing before restart");
                if self.shutdown.wait_or_timeout(pause).await {
                    break;
                }
            }

            match self.respawn().await {
                Some(next) => child = next,
                None => break,
            }
        }

        if self.status.is_running() {
            match child.terminate(self.terminate_grace).await {
                Ok(()) => {}
                Err(e @ Error::ShutdownTimeout { .. }) => {
                    warn!(role = %self.role, error = %e, "Child ignored terminate request")
                }
                Err(e) => error!(role = %self.role, error = %e, "Failed to terminate child"),
            }
        }
        self.status.record_stopped();
        info!(
            role = %self.role,
            spawns = self.status.spawn_count(),
            "Restart loop stopped"
        );
    }

    /// Run the hook and spawn the next child, retrying failures every poll
    /// interval. `None` once shutdown is requested; nothing is spawned after
    /// that.
    async fn respawn(&mut self) -> Option<ChildProcess> {
        loop {
            let hooked = match self.hook.as_mut() {
                Some(hook) => hook.before_start().await,
                None => Ok(()),
            };
            if self.shutdown.is_set() {
                return None;
            }

            let attempt = match hooked {
                Ok(()) => ChildProcess::spawn(self.role, &self.spec, &self.sink).await,
                Err(e) => Err(e),
            };
            match attempt {
                Ok(child) => {
                    self.status.record_spawn(child.pid());
                    return Some(child);
                }
                Err(e) => {
                    error!(role = %self.role, error = %e, "Restart failed, retrying");
                    if self.shutdown.wait_or_timeout(self.poll_interval).await {
                        return None;
                    }
                }
            }
        }
    }
}

/// Poll `child` until it exits (`Some`) or shutdown is requested (`None`).
async fn watch_child(
    child: &mut ChildProcess,
    shutdown: &Shutdown,
    poll_interval: Duration,
) -> Option<ProcessStatus> {
    loop {
        if shutdown.wait_or_timeout(poll_interval).await {
            return None;
        }
        match child.poll() {
            Ok(ProcessStatus::Running) => {}
            Ok(exit) => return Some(exit),
            Err(e) => warn!(role = %child.role(), error = %e, "Failed to poll child"),
        }
    }
}

/// Handle on a running restart loop.
pub struct RunnerHandle {
    role: Role,
    status: Arc<RunnerStatus>,
    task: JoinHandle<()>,
}

impl RunnerHandle {
    pub fn role(&self) -> Role {
        self.role
    }

    pub fn status(&self) -> Arc<RunnerStatus> {
        Arc::clone(&self.status)
    }

    /// Wait for the loop to stop. The child has exited once this returns.
    pub async fn join(self) -> Result<()> {
        debug!(role = %self.role, "Joining restart loop");
        self.task.await.map_err(|e| {
            Error::spawn(self.role, format!("Restart loop task failed: {}", e))
        })
    }
}
