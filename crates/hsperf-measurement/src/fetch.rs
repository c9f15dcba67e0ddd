//! Per-run configuration for the fetching traffic generator.

use crate::endpoint::EndpointReader;
use crate::runner::RestartHook;
use crate::schedule::{BurstSchedule, Pause};
use crate::tgen::{GraphTemplate, TemplateVars};
use async_trait::async_trait;
use hsperf_common::Result;
use hsperf_process::ProcessStatus;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Rewrites the fetcher's document with the next transfer size before each
/// run and paces runs according to the burst schedule.
pub struct FetchCycle {
    template: GraphTemplate,
    config_path: PathBuf,
    socks_port: u16,
    endpoint: Arc<EndpointReader>,
    schedule: BurstSchedule,
}

impl FetchCycle {
    pub fn new(
        template: GraphTemplate,
        config_path: impl Into<PathBuf>,
        socks_port: u16,
        endpoint: Arc<EndpointReader>,
        schedule: BurstSchedule,
    ) -> Self {
        Self {
            template,
            config_path: config_path.into(),
            socks_port,
            endpoint,
            schedule,
        }
    }
}

#[async_trait]
impl RestartHook for FetchCycle {
    async fn before_start(&mut self) -> Result<()> {
        let endpoint = self.endpoint.get().await?;
        let peer = endpoint.to_string();
        let size = self.schedule.current();

        self.template.write(
            &self.config_path,
            &TemplateVars {
                socksport: Some(self.socks_port),
                peers: Some(&peer),
                size: Some(size.as_str()),
                ..Default::default()
            },
        )?;

        info!(peer = %peer, size = %size, "Rendered fetch configuration");
        Ok(())
    }

    async fn after_exit(&mut self, _status: ProcessStatus) -> Duration {
        let pause = self.schedule.advance();
        match pause {
            Pause::Burst(delay) => info!(?delay, "Burst complete, cooling down"),
            Pause::Transfer(delay) => debug!(
                ?delay,
                completed = self.schedule.completed_in_burst(),
                "Transfer finished"
            ),
        }
        pause.duration()
    }
}
