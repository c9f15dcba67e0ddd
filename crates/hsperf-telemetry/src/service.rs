//! Control-event logger.

use crate::control::ControlConnection;
use crate::events::{EventCategory, DEFAULT_EVENTS};
use crate::output::EventLogWriter;
use crate::types::LoggerStatus;
use hsperf_common::{Error, Result, Role, Shutdown};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Configuration for one service's event capture.
#[derive(Debug, Clone)]
pub struct ControlLoggerConfig {
    pub role: Role,
    pub control_addr: SocketAddr,
    pub log_path: PathBuf,
    pub events: Vec<EventCategory>,
    pub password: Option<String>,
    pub connect_timeout: Duration,
}

impl ControlLoggerConfig {
    pub fn new(role: Role, control_addr: SocketAddr, log_path: impl Into<PathBuf>) -> Self {
        Self {
            role,
            control_addr,
            log_path: log_path.into(),
            events: DEFAULT_EVENTS.to_vec(),
            password: None,
            connect_timeout: Duration::from_secs(30),
        }
    }
}

/// Captures one service's control events until shutdown.
pub struct ControlEventLogger;

impl ControlEventLogger {
    /// Connect, authenticate and subscribe, then log events in the background.
    ///
    /// Any failure before the subscription is in place is returned here:
    /// without a control connection no telemetry is collected at all, so the
    /// caller must not carry on silently.
    pub async fn start(config: ControlLoggerConfig, shutdown: Shutdown) -> Result<LoggerHandle> {
        let role = config.role;
        info!(
            role = %role,
            addr = %config.control_addr,
            log = %config.log_path.display(),
            "Starting control-event logger"
        );

        let writer = EventLogWriter::open(role, &config.log_path)?;
        let mut connection =
            ControlConnection::connect(role, config.control_addr, config.connect_timeout).await?;
        connection.authenticate(config.password.as_deref()).await?;
        connection.set_events(&config.events).await?;

        let status = Arc::new(LoggerStatus::default());
        status.set_connected(true);

        let task = tokio::spawn(Self::event_loop(
            role,
            connection,
            writer,
            shutdown,
            Arc::clone(&status),
        ));

        Ok(LoggerHandle { role, status, task })
    }

    async fn event_loop(
        role: Role,
        mut connection: ControlConnection,
        mut writer: EventLogWriter,
        shutdown: Shutdown,
        status: Arc<LoggerStatus>,
    ) -> Result<()> {
        loop {
            let next = match shutdown.run_until(connection.next_event()).await {
                Some(next) => next,
                None => break,
            };

            match next {
                Ok(Some(event)) => match writer.append(&event.raw_text()) {
                    Ok(entry) => status.record_event(entry.timestamp),
                    Err(e) => warn!(role = %role, error = %e, "Failed to append control event"),
                },
                Ok(None) => {
                    warn!(role = %role, "Control channel closed by service");
                    status.set_connected(false);
                    shutdown.wait().await;
                    break;
                }
                Err(e) => {
                    error!(role = %role, error = %e, "Control channel read failed");
                    status.set_connected(false);
                    shutdown.wait().await;
                    break;
                }
            }
        }

        status.set_connected(false);
        if let Err(e) = writer.flush() {
            warn!(role = %role, error = %e, "Failed to flush event log");
        }
        connection.close().await?;

        info!(
            role = %role,
            events = status.events_logged(),
            "Control-event logger stopped"
        );
        Ok(())
    }
}

/// Handle on a running logger.
pub struct LoggerHandle {
    role: Role,
    status: Arc<LoggerStatus>,
    task: JoinHandle<Result<()>>,
}

impl LoggerHandle {
    pub fn role(&self) -> Role {
        self.role
    }

    pub fn status(&self) -> Arc<LoggerStatus> {
        Arc::clone(&self.status)
    }

    /// Wait for the logger to finish; its log is flushed once this returns.
    pub async fn join(self) -> Result<()> {
        debug!(role = %self.role, "Joining control-event logger");
        match self.task.await {
            Ok(result) => result,
            Err(e) => Err(Error::channel(self.role, format!("Logger task failed: {}", e))),
        }
    }
}
