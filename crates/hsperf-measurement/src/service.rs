//! Anonymity-service processes.
//!
//! Each service runs once per measurement (no restart loop). Its captured
//! output is scanned for `Bootstrapped NN%` lines so startup can block on
//! bootstrap progress.

use crate::deadline::deadline_after;
use hsperf_common::{Error, Result, Role, Shutdown};
use hsperf_process::{ChildProcess, CommandSpec, LogSink, ProcessStatus};
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info};

const EXIT_CHECK_INTERVAL: Duration = Duration::from_millis(500);

/// Extract the percentage from a bootstrap status line.
pub fn parse_bootstrap(line: &str) -> Option<u8> {
    let rest = &line[line.find("Bootstrapped ")? + "Bootstrapped ".len()..];
    let digits = rest.split('%').next()?;
    if digits.len() == rest.len() {
        return None;
    }
    digits.trim().parse::<u8>().ok().filter(|p| *p <= 100)
}

/// A running service process with its bootstrap progress.
pub struct AnonymityService {
    child: ChildProcess,
    control_addr: SocketAddr,
    progress: watch::Receiver<Option<u8>>,
}

impl AnonymityService {
    /// Start `<executable> -f <torrc>` with output appended to `log_path`.
    pub async fn launch(
        role: Role,
        executable: &Path,
        torrc: &Path,
        log_path: &Path,
        control_addr: SocketAddr,
    ) -> Result<Self> {
        let (tx, progress) = watch::channel(None);
        let sink = LogSink::new(log_path).with_observer(move |line| {
            if let Some(percent) = parse_bootstrap(line) {
                tx.send_if_modified(|current| {
                    if current.map_or(true, |c| percent > c) {
                        *current = Some(percent);
                        true
                    } else {
                        false
                    }
                });
            }
        });

        let spec = CommandSpec::new(executable, ["-f".to_string(), torrc.display().to_string()]);
        let child = ChildProcess::spawn(role, &spec, &sink).await?;

        Ok(Self {
            child,
            control_addr,
            progress,
        })
    }

    pub fn role(&self) -> Role {
        self.child.role()
    }

    pub fn pid(&self) -> u32 {
        self.child.pid()
    }

    pub fn control_addr(&self) -> SocketAddr {
        self.control_addr
    }

    /// Highest bootstrap percentage seen so far.
    pub fn progress(&self) -> Option<u8> {
        *self.progress.borrow()
    }

    /// Block until bootstrap reaches `target` percent.
    ///
    /// Fails with [`Error::Bootstrap`] on timeout or if the process exits
    /// first, and with [`Error::Cancelled`] if shutdown is requested.
    pub async fn wait_for_bootstrap(
        &mut self,
        target: u8,
        timeout: Duration,
        shutdown: &Shutdown,
    ) -> Result<u8> {
        let role = self.role();
        let deadline = deadline_after(timeout);
        let mut output_closed = false;
        info!(role = %role, target, "Waiting for bootstrap");

        loop {
            if let Some(percent) = *self.progress.borrow_and_update() {
                debug!(role = %role, percent, "Bootstrap progress");
                if percent >= target {
                    info!(role = %role, percent, "Bootstrap reached target");
                    return Ok(percent);
                }
            }

            tokio::select! {
                biased;
                _ = shutdown.wait() => {
                    return Err(Error::cancelled(format!("{} bootstrap", role)));
                }
                changed = self.progress.changed(), if !output_closed => {
                    if changed.is_err() {
                        // Output closed; the process may still be running,
                        // so fall back to polling for its exit.
                        debug!(role = %role, "Service output closed");
                        output_closed = true;
                    }
                }
                _ = tokio::time::sleep(EXIT_CHECK_INTERVAL) => {
                    if let status @ ProcessStatus::Exited(_) = self.child.poll()? {
                        if self.progress().map_or(true, |p| p < target) {
                            return Err(self.exited_early(target, status));
                        }
                    }
                }
                _ = tokio::time::sleep_until(deadline) => {
                    return Err(Error::bootstrap(
                        role,
                        format!(
                            "did not reach {}% within {:?} (last seen: {:?})",
                            target,
                            timeout,
                            self.progress()
                        ),
                    ));
                }
            }
        }
    }

    fn exited_early(&self, target: u8, status: ProcessStatus) -> Error {
        Error::bootstrap(
            self.role(),
            format!(
                "process exited ({:?}) before reaching {}% (last seen: {:?})",
                status,
                target,
                self.progress()
            ),
        )
    }

    pub fn poll(&mut self) -> Result<ProcessStatus> {
        self.child.poll()
    }

    pub async fn terminate(&mut self, grace: Duration) -> Result<()> {
        self.child.terminate(grace).await
    }
}
