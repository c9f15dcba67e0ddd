//! Process spawning and lifecycle control.
//!
//! A [`ChildProcess`] owns exactly one OS process. Its combined output is
//! appended to a [`LogSink`]; the handle can be polled without blocking and
//! terminated with a grace period.

use crate::output::{spawn_capture_task, LogSink};
use crate::terminate::FORCE_KILL_TIMEOUT;
use crate::validation::validate_executable;
use hsperf_common::{Error, Result, Role};
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::Duration;
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Upper bound on waiting for output capture to drain after exit.
const CAPTURE_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Executable plus arguments for one child.
#[derive(Debug, Clone)]
pub struct CommandSpec {
    pub executable: PathBuf,
    pub args: Vec<String>,
    pub working_directory: Option<PathBuf>,
}

impl CommandSpec {
    pub fn new<I, S>(executable: impl Into<PathBuf>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            executable: executable.into(),
            args: args.into_iter().map(Into::into).collect(),
            working_directory: None,
        }
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_directory = Some(dir.into());
        self
    }
}

/// Result of a non-blocking status check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessStatus {
    Running,
    /// Exit code, or `None` when the process was killed by a signal.
    Exited(Option<i32>),
}

impl ProcessStatus {
    pub fn is_running(&self) -> bool {
        matches!(self, ProcessStatus::Running)
    }
}

/// A spawned, supervised OS process.
pub struct ChildProcess {
    role: Role,
    pid: u32,
    child: Child,
    log_path: PathBuf,
    capture_tasks: Vec<JoinHandle<()>>,
    exit_status: Option<ExitStatus>,
}

impl std::fmt::Debug for ChildProcess {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChildProcess")
            .field("role", &self.role)
            .field("pid", &self.pid)
            .field("log_path", &self.log_path)
            .field("exit_status", &self.exit_status)
            .finish()
    }
}

impl ChildProcess {
    /// Start `spec` with stdout and stderr appended to `sink`.
    ///
    /// Fails with [`Error::Spawn`] if the executable is not runnable or the
    /// log file cannot be opened.
    pub async fn spawn(role: Role, spec: &CommandSpec, sink: &LogSink) -> Result<Self> {
        validate_executable(&spec.executable).map_err(|e| Error::spawn(role, e.to_string()))?;
        let log_file = sink.open(role).await?;

        let mut cmd = Command::new(&spec.executable);
        cmd.args(&spec.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        if let Some(dir) = &spec.working_directory {
            cmd.current_dir(dir);
        }

        // Own process group: a terminal interrupt reaches only the orchestrator,
        // which then stops the children itself.
        #[cfg(unix)]
        cmd.process_group(0);

        let mut child = cmd.spawn().map_err(|e| {
            Error::spawn(
                role,
                format!("Failed to spawn {}: {}", spec.executable.display(), e),
            )
        })?;
        let pid = child.id().unwrap_or(0);

        let log_file = Arc::new(Mutex::new(log_file));
        let mut capture_tasks = Vec::with_capacity(2);
        if let Some(stdout) = child.stdout.take() {
            capture_tasks.push(spawn_capture_task(
                role,
                stdout,
                Arc::clone(&log_file),
                sink.observer(),
            ));
        }
        if let Some(stderr) = child.stderr.take() {
            capture_tasks.push(spawn_capture_task(
                role,
                stderr,
                Arc::clone(&log_file),
                sink.observer(),
            ));
        }

        info!(
            role = %role,
            pid,
            executable = %spec.executable.display(),
            log = %sink.path().display(),
            "Process spawned"
        );

        Ok(Self {
            role,
            pid,
            child,
            log_path: sink.path().to_path_buf(),
            capture_tasks,
            exit_status: None,
        })
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub fn log_path(&self) -> &Path {
        &self.log_path
    }

    /// Exit status, once the process has been observed to exit.
    pub fn exit_status(&self) -> Option<ExitStatus> {
        self.exit_status
    }

    /// Non-blocking status check.
    pub fn poll(&mut self) -> Result<ProcessStatus> {
        if let Some(status) = self.exit_status {
            return Ok(ProcessStatus::Exited(status.code()));
        }

        match self.child.try_wait()? {
            Some(status) => {
                debug!(role = %self.role, pid = self.pid, %status, "Process exited");
                self.exit_status = Some(status);
                Ok(ProcessStatus::Exited(status.code()))
            }
            None => Ok(ProcessStatus::Running),
        }
    }

    /// Block until the process exits and its output has been written out.
    pub async fn wait(&mut self) -> Result<ProcessStatus> {
        let status = match self.exit_status {
            Some(status) => status,
            None => {
                let status = self.child.wait().await?;
                self.exit_status = Some(status);
                status
            }
        };
        self.finish_capture().await;
        Ok(ProcessStatus::Exited(status.code()))
    }

    /// Ask the process to stop and wait up to `grace` for it to exit.
    ///
    /// A process still running after `grace` is force killed and the call
    /// reports [`Error::ShutdownTimeout`]; callers treat that as non-fatal.
    pub async fn terminate(&mut self, grace: Duration) -> Result<()> {
        if !self.poll()?.is_running() {
            self.finish_capture().await;
            return Ok(());
        }

        info!(role = %self.role, pid = self.pid, "Sending termination signal");
        self.request_stop();

        if self.wait_with_timeout(grace).await? {
            info!(role = %self.role, pid = self.pid, "Process terminated gracefully");
            return Ok(());
        }

        warn!(
            role = %self.role,
            pid = self.pid,
            ?grace,
            "Graceful shutdown timed out, force killing"
        );
        self.kill();

        if !self.wait_with_timeout(FORCE_KILL_TIMEOUT).await? {
            error!(
                role = %self.role,
                pid = self.pid,
                "Process still running after force kill"
            );
        }

        Err(Error::ShutdownTimeout {
            role: self.role,
            grace,
        })
    }

    fn request_stop(&mut self) {
        #[cfg(unix)]
        let result = crate::terminate::send_terminate(self.pid);
        #[cfg(not(unix))]
        let result = self.child.start_kill().map_err(Error::from);

        if let Err(e) = result {
            warn!(role = %self.role, pid = self.pid, error = %e, "Failed to send termination signal");
        }
    }

    fn kill(&mut self) {
        // The child is not reaped yet, so its PID cannot have been reused.
        #[cfg(unix)]
        let result = crate::terminate::force_kill(self.pid);
        #[cfg(not(unix))]
        let result = self.child.start_kill().map_err(Error::from);

        if let Err(e) = result {
            error!(role = %self.role, pid = self.pid, error = %e, "Force kill failed");
        }
    }

    async fn wait_with_timeout(&mut self, timeout: Duration) -> Result<bool> {
        match tokio::time::timeout(timeout, self.child.wait()).await {
            Ok(Ok(status)) => {
                self.exit_status = Some(status);
                self.finish_capture().await;
                Ok(true)
            }
            Ok(Err(e)) => Err(e.into()),
            Err(_) => Ok(false),
        }
    }

    async fn finish_capture(&mut self) {
        for mut task in self.capture_tasks.drain(..) {
            if tokio::time::timeout(CAPTURE_DRAIN_TIMEOUT, &mut task)
                .await
                .is_err()
            {
                // A grandchild may still hold the pipe open.
                warn!(role = %self.role, pid = self.pid, "Output capture did not drain, abandoning");
                task.abort();
            }
        }
    }
}
