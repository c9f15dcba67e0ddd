//! Measurement orchestrator.
//!
//! Owns every component of a run and drives it through three phases.
//!
//! ## Startup
//!
//! Strictly sequential; each step needs the one before it:
//!
//! 1. serving traffic generator (restart loop)
//! 2. server-side anonymity service, blocking until bootstrap reaches 100%
//! 3. published endpoint, read from the service's identity file
//! 4. client-side anonymity service, blocking only until its control
//!    listener is up
//! 5. one control-event logger per service
//! 6. warm-up delay
//! 7. fetching traffic generator (restart loop with [`FetchCycle`])
//!
//! ## Steady state
//!
//! A heartbeat every `heartbeat_interval` logs the completed-transfer count
//! and the liveness of all four processes. A dead process is reported, not
//! acted on.
//!
//! ## Shutdown
//!
//! Triggered by the shutdown signal at any point, startup included:
//! restart loops are joined first, then loggers, then the services are
//! terminated. After a settle delay the server's identity directory is
//! removed. Only what was actually started is torn down.

use crate::config::MeasurementConfig;
use crate::endpoint::EndpointReader;
use crate::fetch::FetchCycle;
use crate::layout::{create_private_dir, Layout};
use crate::progress::count_completed_transfers;
use crate::runner::{RestartLoopRunner, RunnerHandle};
use crate::schedule::{BurstSchedule, TransferSize};
use crate::service::AnonymityService;
use crate::tgen::{GraphTemplate, TemplateVars};
use crate::torrc::{control_addr, write_torrc};
use hsperf_common::{Error, Result, Role, Shutdown};
use hsperf_process::{resolve_executable, CommandSpec, LogSink, ProcessStatus};
use hsperf_telemetry::{ControlEventLogger, ControlLoggerConfig, LoggerHandle};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};


/// Percentage the serving side must reach before its endpoint is usable.
const SERVER_BOOTSTRAP_TARGET: u8 = 100;

/// Any bootstrap line means the client's control listener is open.
const CLIENT_BOOTSTRAP_TARGET: u8 = 0;

/// Everything started so far in a run.
#[derive(Default)]
struct RunState {
    server_runner: Option<RunnerHandle>,
    client_runner: Option<RunnerHandle>,
    server_service: Option<AnonymityService>,
    client_service: Option<AnonymityService>,
    loggers: Vec<LoggerHandle>,
}

pub struct Orchestrator {
    config: MeasurementConfig,
    tor_path: PathBuf,
    tgen_path: PathBuf,
    layout: Layout,
    shutdown: Shutdown,
}

impl Orchestrator {
    /// Validate `config`; nothing is spawned if this fails.
    pub fn new(config: MeasurementConfig) -> Result<Self> {
        config.validate()?;
        let tor_path = resolve_executable(&config.tor_path)?;
        let tgen_path = resolve_executable(&config.tgen_path)?;
        let layout = Layout::new(&config.prefix);

        Ok(Self {
            config,
            tor_path,
            tgen_path,
            layout,
            shutdown: Shutdown::new(),
        })
    }

    /// Handle for requesting shutdown from outside, e.g. a signal handler.
    pub fn shutdown_handle(&self) -> Shutdown {
        self.shutdown.clone()
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    /// Run until shutdown is requested.
    ///
    /// Returns the startup error if startup failed for any reason other
    /// than shutdown; otherwise the result of cleanup.
    pub async fn run(&self) -> Result<()> {
        let mut state = RunState::default();

        let outcome = match self.start(&mut state).await {
            Ok(()) => {
                info!("Measurement running");
                self.heartbeat_loop(&mut state).await;
                Ok(())
            }
            Err(e) if e.is_cancelled() && self.shutdown.is_set() => {
                info!(error = %e, "Shutdown requested during startup");
                Ok(())
            }
            Err(e) => {
                error!(error = %e, "Startup failed");
                Err(e)
            }
        };

        self.shutdown.signal_shutdown();
        let cleanup = self.stop(state).await;
        if let (Err(_), Err(e)) = (&outcome, &cleanup) {
            warn!(error = %e, "Cleanup failed");
        }
        outcome.and(cleanup)
    }

    async fn start(&self, state: &mut RunState) -> Result<()> {
        let timing = &self.config.timing;
        let ports = &self.config.ports;

        self.layout.create_all()?;
        create_private_dir(&self.layout.data_dir(Role::ServerControl))?;
        create_private_dir(&self.layout.data_dir(Role::ClientControl))?;

        info!("Step 1/7: starting serving traffic generator");
        let server_template = GraphTemplate::load_or(
            self.config.templates.server.as_deref(),
            GraphTemplate::default_server,
        )?;
        server_template.write(
            &self.layout.tgen_config(Role::ServerServe),
            &TemplateVars {
                serverport: Some(ports.tgen_server),
                ..Default::default()
            },
        )?;
        state.server_runner = Some(self.runner(Role::ServerServe).start().await?);
        self.check_shutdown("server traffic generator start")?;

        info!("Step 2/7: starting server anonymity service");
        let mut server = self.launch_service(Role::ServerControl).await?;
        let bootstrap = server
            .wait_for_bootstrap(SERVER_BOOTSTRAP_TARGET, timing.bootstrap_timeout, &self.shutdown)
            .await;
        state.server_service = Some(server);
        bootstrap?;

        info!("Step 3/7: reading published endpoint");
        let endpoint = Arc::new(EndpointReader::new(
            self.layout.hostname_file(),
            ports.hs_virtual,
        ));
        let published = endpoint
            .wait_until_published(timing.endpoint_timeout, &self.shutdown)
            .await?;
        info!(endpoint = %published, "Serving endpoint known");

        info!("Step 4/7: starting client anonymity service");
        let mut client = self.launch_service(Role::ClientControl).await?;
        let bootstrap = client
            .wait_for_bootstrap(CLIENT_BOOTSTRAP_TARGET, timing.bootstrap_timeout, &self.shutdown)
            .await;
        state.client_service = Some(client);
        bootstrap?;

        info!("Step 5/7: starting control-event loggers");
        for role in [Role::ServerControl, Role::ClientControl] {
            let logger = self.start_logger(role).await?;
            state.loggers.push(logger);
        }

        info!(warmup = ?timing.warmup, "Step 6/7: warming up");
        if self.shutdown.wait_or_timeout(timing.warmup).await {
            return Err(Error::cancelled("warm-up"));
        }

        info!("Step 7/7: starting fetching traffic generator");
        let cycle = self.fetch_cycle(Arc::clone(&endpoint))?;
        state.client_runner = Some(
            self.runner(Role::ClientFetch)
                .with_hook(cycle)
                .start()
                .await?,
        );

        Ok(())
    }

    fn runner(&self, role: Role) -> RestartLoopRunner {
        let spec = CommandSpec::new(
            &self.tgen_path,
            [self.layout.tgen_config(role).display().to_string()],
        )
        .current_dir(self.layout.role_dir(role));

        RestartLoopRunner::new(
            role,
            spec,
            LogSink::new(self.layout.tgen_log(role)),
            self.shutdown.clone(),
        )
        .with_backoff(self.config.restart_backoff.build())
        .with_poll_interval(self.config.timing.restart_poll_interval)
        .with_terminate_grace(self.config.timing.terminate_grace)
    }

    fn fetch_cycle(&self, endpoint: Arc<EndpointReader>) -> Result<FetchCycle> {
        let burst = &self.config.burst;
        let sizes = burst
            .sizes
            .iter()
            .map(|s| TransferSize::parse(s))
            .collect::<Result<Vec<_>>>()?;
        let schedule =
            BurstSchedule::new(sizes, burst.count, burst.transfer_delay, burst.interval)?;
        let template = GraphTemplate::load_or(
            self.config.templates.client.as_deref(),
            GraphTemplate::default_client,
        )?;

        Ok(FetchCycle::new(
            template,
            self.layout.tgen_config(Role::ClientFetch),
            self.config.ports.client_socks,
            endpoint,
            schedule,
        ))
    }

    async fn launch_service(&self, role: Role) -> Result<AnonymityService> {
        let options = match role {
            Role::ServerControl => &self.config.server,
            _ => &self.config.client,
        };
        let torrc = write_torrc(role, &self.layout, &self.config.ports, options)?;

        AnonymityService::launch(
            role,
            &self.tor_path,
            &torrc,
            &self.layout.tor_log(role),
            control_addr(role, &self.config.ports),
        )
        .await
    }

    async fn start_logger(&self, role: Role) -> Result<LoggerHandle> {
        let options = match role {
            Role::ServerControl => &self.config.server,
            _ => &self.config.client,
        };
        let mut logger_config = ControlLoggerConfig::new(
            role,
            control_addr(role, &self.config.ports),
            self.layout.control_log(role),
        );
        logger_config.password = options.control_password.clone();
        logger_config.connect_timeout = self.config.timing.connect_timeout;

        self.shutdown
            .run_until(ControlEventLogger::start(logger_config, self.shutdown.clone()))
            .await
            .unwrap_or_else(|| Err(Error::cancelled(format!("{} logger start", role))))
    }

    fn check_shutdown(&self, operation: &str) -> Result<()> {
        if self.shutdown.is_set() {
            return Err(Error::cancelled(operation));
        }
        Ok(())
    }

    async fn heartbeat_loop(&self, state: &mut RunState) {
        loop {
            self.heartbeat(state);
            if self
                .shutdown
                .wait_or_timeout(self.config.timing.heartbeat_interval)
                .await
            {
                break;
            }
        }
    }

    fn heartbeat(&self, state: &mut RunState) {
        let fetch_log = self.layout.tgen_log(Role::ClientFetch);
        let completed = match count_completed_transfers(&fetch_log) {
            Ok(count) => count,
            Err(e) => {
                warn!(error = %e, log = %fetch_log.display(), "Failed to scan fetch log");
                0
            }
        };

        let server_serve = state
            .server_runner
            .as_ref()
            .is_some_and(|r| r.status().is_alive());
        let client_fetch = state
            .client_runner
            .as_ref()
            .is_some_and(|r| r.status().is_alive());
        let fetch_runs = state
            .client_runner
            .as_ref()
            .map_or(0, |r| r.status().spawn_count());
        let server_control = service_alive(state.server_service.as_mut());
        let client_control = service_alive(state.client_service.as_mut());
        let events: Vec<u64> = state
            .loggers
            .iter()
            .map(|l| l.status().events_logged())
            .collect();
        let loggers_connected = state.loggers.iter().all(|l| l.status().is_connected());

        // The fetcher is idle between transfers, so it does not count
        // towards degraded status.
        if server_serve && server_control && client_control && loggers_connected {
            info!(
                completed,
                fetch_runs,
                server_serve,
                client_fetch,
                server_control,
                client_control,
                ?events,
                "Heartbeat"
            );
        } else {
            warn!(
                completed,
                fetch_runs,
                server_serve,
                client_fetch,
                server_control,
                client_control,
                loggers_connected,
                ?events,
                "Heartbeat: degraded"
            );
        }
    }

    async fn stop(&self, state: RunState) -> Result<()> {
        info!("Shutting down");
        let grace = self.config.timing.terminate_grace;

        for runner in [state.server_runner, state.client_runner].into_iter().flatten() {
            let role = runner.role();
            if let Err(e) = runner.join().await {
                warn!(role = %role, error = %e, "Restart loop ended abnormally");
            }
        }

        for logger in state.loggers {
            let role = logger.role();
            if let Err(e) = logger.join().await {
                warn!(role = %role, error = %e, "Logger ended abnormally");
            }
        }

        for mut service in [state.server_service, state.client_service]
            .into_iter()
            .flatten()
        {
            if let Err(e) = service.terminate(grace).await {
                warn!(role = %service.role(), error = %e, "Service did not stop cleanly");
            }
        }

        tokio::time::sleep(self.config.timing.settle_delay).await;
        self.remove_identity_dir()
    }

    fn remove_identity_dir(&self) -> Result<()> {
        let hs_dir = self.layout.hs_dir();
        match std::fs::remove_dir_all(&hs_dir) {
            Ok(()) => {
                info!(path = %hs_dir.display(), "Removed service identity directory");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::cleanup(&hs_dir, e.to_string())),
        }
    }
}

fn service_alive(service: Option<&mut AnonymityService>) -> bool {
    match service.map(|s| s.poll()) {
        Some(Ok(ProcessStatus::Running)) => true,
        Some(Ok(ProcessStatus::Exited(_))) | None => false,
        Some(Err(e)) => {
            warn!(error = %e, "Failed to poll service");
            false
        }
    }
}
