//! Read-once access to the published service endpoint.
//!
//! The serving service writes its address to a file once bootstrap is
//! done. The fetcher's configuration hook reads it through an
//! [`EndpointReader`], which checks the file exists before reading and
//! caches the first successful read.

use crate::deadline::deadline_after;
use hsperf_common::{Error, Result, Shutdown};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::OnceCell;
use tokio::time::Instant;
use tracing::{debug, info};

const PUBLISH_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Rendezvous address of the serving role.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceEndpoint {
    pub host: String,
    pub port: u16,
}

impl fmt::Display for ServiceEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

#[derive(Debug)]
pub struct EndpointReader {
    path: PathBuf,
    port: u16,
    endpoint: OnceCell<ServiceEndpoint>,
}

impl EndpointReader {
    /// `port` is the virtual port the service advertises.
    pub fn new(path: impl Into<PathBuf>, port: u16) -> Self {
        Self {
            path: path.into(),
            port,
            endpoint: OnceCell::new(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The endpoint, read from disk on first use.
    ///
    /// Fails with [`Error::Endpoint`] if the file does not exist yet or has
    /// no address on its first line. A failed read is not cached.
    pub async fn get(&self) -> Result<ServiceEndpoint> {
        self.endpoint
            .get_or_try_init(|| async { self.read() })
            .await
            .cloned()
    }

    /// Block until the file appears, then read it.
    pub async fn wait_until_published(
        &self,
        timeout: Duration,
        shutdown: &Shutdown,
    ) -> Result<ServiceEndpoint> {
        let deadline = deadline_after(timeout);
        info!(path = %self.path.display(), "Waiting for service endpoint");

        while !self.path.exists() {
            if Instant::now() >= deadline {
                return Err(Error::endpoint(
                    &self.path,
                    format!("not published within {:?}", timeout),
                ));
            }
            if shutdown.wait_or_timeout(PUBLISH_POLL_INTERVAL).await {
                return Err(Error::cancelled("endpoint wait"));
            }
        }

        let endpoint = self.get().await?;
        info!(endpoint = %endpoint, "Service endpoint published");
        Ok(endpoint)
    }

    fn read(&self) -> Result<ServiceEndpoint> {
        if !self.path.is_file() {
            return Err(Error::endpoint(&self.path, "file does not exist"));
        }

        let content = std::fs::read_to_string(&self.path)
            .map_err(|e| Error::endpoint(&self.path, e.to_string()))?;
        let host = content.lines().next().map(str::trim).unwrap_or_default();
        if host.is_empty() {
            return Err(Error::endpoint(&self.path, "first line is empty"));
        }

        debug!(host, "Read service endpoint");
        Ok(ServiceEndpoint {
            host: host.to_string(),
            port: self.port,
        })
    }
}
