//! Output capture for supervised children.
//!
//! Both output streams of a child are appended, line by line, to the same
//! log file. The file is opened in append mode and never truncated, so a
//! restarted child keeps writing after its predecessor's output.

use hsperf_common::{Error, Result, Role};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Callback invoked with every captured output line, before it is logged.
pub type LineObserver = Arc<dyn Fn(&str) + Send + Sync>;

/// Destination for a child's combined stdout/stderr.
#[derive(Clone)]
pub struct LogSink {
    path: PathBuf,
    observer: Option<LineObserver>,
}

impl std::fmt::Debug for LogSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogSink")
            .field("path", &self.path)
            .field("observed", &self.observer.is_some())
            .finish()
    }
}

impl LogSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            observer: None,
        }
    }

    /// Attach an observer that sees each output line.
    pub fn with_observer<F>(mut self, observer: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.observer = Some(Arc::new(observer));
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub(crate) fn observer(&self) -> Option<LineObserver> {
        self.observer.clone()
    }

    /// Open the log file for appending, creating parent directories.
    pub(crate) async fn open(&self, role: Role) -> Result<File> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                Error::spawn(
                    role,
                    format!("Failed to create log directory {}: {}", parent.display(), e),
                )
            })?;
        }

        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| {
                Error::spawn(
                    role,
                    format!("Failed to open log file {}: {}", self.path.display(), e),
                )
            })
    }
}

/// Spawn a task copying `stream` into the shared log file.
pub(crate) fn spawn_capture_task<R>(
    role: Role,
    stream: R,
    file: Arc<Mutex<File>>,
    observer: Option<LineObserver>,
) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut reader = BufReader::new(stream);
        let mut line = Vec::new();
        let mut lines = 0u64;

        loop {
            line.clear();
            match reader.read_until(b'\n', &mut line).await {
                Ok(0) => break,
                Ok(_) => {
                    lines += 1;
                    if let Some(observer) = &observer {
                        let text = String::from_utf8_lossy(&line);
                        observer(text.trim_end_matches(['\r', '\n']));
                    }
                    if !line.ends_with(b"\n") {
                        line.push(b'\n');
                    }

                    let mut file = file.lock().await;
                    let written = match file.write_all(&line).await {
                        Ok(()) => file.flush().await,
                        Err(e) => Err(e),
                    };
                    if let Err(e) = written {
                        warn!(role = %role, error = %e, "Failed to append process output to log");
                    }
                }
                Err(e) => {
                    warn!(role = %role, error = %e, "Error reading process output");
                    break;
                }
            }
        }

        debug!(role = %role, lines, "Output capture finished");
    })
}
