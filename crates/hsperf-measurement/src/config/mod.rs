//! Measurement configuration.
//!
//! Every field has a default, so a YAML file only needs to name what it
//! changes. Command-line arguments are applied on top of the file.

use crate::backoff::BackoffConfig;
use hsperf_common::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub mod validation;

/// Top-level configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeasurementConfig {
    /// Anonymity-service executable.
    #[serde(default = "default_tor_path")]
    pub tor_path: PathBuf,

    /// Traffic-generator executable.
    #[serde(default = "default_tgen_path")]
    pub tgen_path: PathBuf,

    /// Working directory holding every per-role subtree.
    #[serde(default = "default_prefix")]
    pub prefix: PathBuf,

    #[serde(default)]
    pub burst: BurstConfig,

    #[serde(default)]
    pub timing: TimingConfig,

    #[serde(default)]
    pub ports: PortConfig,

    #[serde(default)]
    pub server: ServiceOptions,

    #[serde(default)]
    pub client: ServiceOptions,

    #[serde(default)]
    pub templates: TemplateConfig,

    #[serde(default)]
    pub restart_backoff: BackoffConfig,
}

/// Transfer pacing for the fetching role.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BurstConfig {
    /// Transfers per burst (N).
    #[serde(default = "default_burst_count")]
    pub count: u32,

    /// Pause after every N transfers.
    #[serde(default = "default_burst_interval", with = "duration_serde")]
    pub interval: Duration,

    /// Pause between transfers within a burst.
    #[serde(default = "default_transfer_delay", with = "duration_serde")]
    pub transfer_delay: Duration,

    /// Transfer sizes, cycled in order.
    #[serde(default = "default_sizes")]
    pub sizes: Vec<String>,
}

/// Waits and timeouts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimingConfig {
    /// Pause between service bootstrap and the first transfer.
    #[serde(default = "default_warmup", with = "duration_serde")]
    pub warmup: Duration,

    #[serde(default = "default_heartbeat_interval", with = "duration_serde")]
    pub heartbeat_interval: Duration,

    /// Bounded wait between liveness polls inside restart loops.
    #[serde(default = "default_restart_poll_interval", with = "duration_serde")]
    pub restart_poll_interval: Duration,

    #[serde(default = "default_terminate_grace", with = "duration_serde")]
    pub terminate_grace: Duration,

    /// Pause between joining everything and removing key material.
    #[serde(default = "default_settle_delay", with = "duration_serde")]
    pub settle_delay: Duration,

    #[serde(default = "default_bootstrap_timeout", with = "duration_serde")]
    pub bootstrap_timeout: Duration,

    /// How long the published endpoint file may take to appear.
    #[serde(default = "default_endpoint_timeout", with = "duration_serde")]
    pub endpoint_timeout: Duration,

    #[serde(default = "default_connect_timeout", with = "duration_serde")]
    pub connect_timeout: Duration,
}

/// Local ports, all bound on 127.0.0.1.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortConfig {
    #[serde(default = "default_tgen_server_port")]
    pub tgen_server: u16,
    /// Port advertised by the hidden service.
    #[serde(default = "default_hs_virtual_port")]
    pub hs_virtual: u16,
    #[serde(default = "default_server_control_port")]
    pub server_control: u16,
    #[serde(default = "default_client_control_port")]
    pub client_control: u16,
    #[serde(default = "default_client_socks_port")]
    pub client_socks: u16,
}

/// Per-side anonymity-service options.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServiceOptions {
    /// Lines appended verbatim to the generated service config.
    #[serde(default)]
    pub extra_config: Vec<String>,

    /// Control-channel password, for services without cookie auth.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub control_password: Option<String>,
}

/// Caller-supplied traffic-generator templates.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TemplateConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client: Option<PathBuf>,
}

impl MeasurementConfig {
    /// Defaults with the two executables set.
    pub fn new(tor_path: impl Into<PathBuf>, tgen_path: impl Into<PathBuf>) -> Self {
        Self {
            tor_path: tor_path.into(),
            tgen_path: tgen_path.into(),
            ..Self::default()
        }
    }

    /// Load configuration from a YAML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path).map_err(|e| {
            Error::config(format!(
                "Failed to read config file {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;

        Self::load_from_string(&content)
    }

    /// Load configuration from a YAML string
    pub fn load_from_string(content: &str) -> Result<Self> {
        serde_yaml::from_str(content)
            .map_err(|e| Error::config(format!("Failed to parse YAML configuration: {}", e)))
    }

    /// Validate the configuration, executables included.
    pub fn validate(&self) -> Result<()> {
        validation::validate_config(self)
    }
}

impl Default for MeasurementConfig {
    fn default() -> Self {
        Self {
            tor_path: default_tor_path(),
            tgen_path: default_tgen_path(),
            prefix: default_prefix(),
            burst: BurstConfig::default(),
            timing: TimingConfig::default(),
            ports: PortConfig::default(),
            server: ServiceOptions::default(),
            client: ServiceOptions::default(),
            templates: TemplateConfig::default(),
            restart_backoff: BackoffConfig::default(),
        }
    }
}

impl Default for BurstConfig {
    fn default() -> Self {
        Self {
            count: default_burst_count(),
            interval: default_burst_interval(),
            transfer_delay: default_transfer_delay(),
            sizes: default_sizes(),
        }
    }
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            warmup: default_warmup(),
            heartbeat_interval: default_heartbeat_interval(),
            restart_poll_interval: default_restart_poll_interval(),
            terminate_grace: default_terminate_grace(),
            settle_delay: default_settle_delay(),
            bootstrap_timeout: default_bootstrap_timeout(),
            endpoint_timeout: default_endpoint_timeout(),
            connect_timeout: default_connect_timeout(),
        }
    }
}

impl Default for PortConfig {
    fn default() -> Self {
        Self {
            tgen_server: default_tgen_server_port(),
            hs_virtual: default_hs_virtual_port(),
            server_control: default_server_control_port(),
            client_control: default_client_control_port(),
            client_socks: default_client_socks_port(),
        }
    }
}

// Default value functions
fn default_tor_path() -> PathBuf {
    PathBuf::from("tor")
}

fn default_tgen_path() -> PathBuf {
    PathBuf::from("tgen")
}

fn default_prefix() -> PathBuf {
    PathBuf::from("hsperf-data")
}

fn default_burst_count() -> u32 {
    10
}

fn default_burst_interval() -> Duration {
    Duration::from_secs(3600)
}

fn default_transfer_delay() -> Duration {
    Duration::from_secs(60)
}

fn default_sizes() -> Vec<String> {
    vec!["5 MiB".to_string(), "1 MiB".to_string(), "50 KiB".to_string()]
}

fn default_warmup() -> Duration {
    Duration::from_secs(60)
}

fn default_heartbeat_interval() -> Duration {
    Duration::from_secs(3600)
}

fn default_restart_poll_interval() -> Duration {
    Duration::from_secs(5)
}

fn default_terminate_grace() -> Duration {
    Duration::from_secs(10)
}

fn default_settle_delay() -> Duration {
    Duration::from_secs(2)
}

fn default_bootstrap_timeout() -> Duration {
    Duration::from_secs(600)
}

fn default_endpoint_timeout() -> Duration {
    Duration::from_secs(120)
}

fn default_connect_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_tgen_server_port() -> u16 {
    58888
}

fn default_hs_virtual_port() -> u16 {
    8080
}

fn default_server_control_port() -> u16 {
    59051
}

fn default_client_control_port() -> u16 {
    59151
}

fn default_client_socks_port() -> u16 {
    59050
}

// Custom serialization for Duration
pub(crate) mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        if duration.subsec_millis() > 0 {
            serializer.serialize_str(&format!("{}ms", duration.as_millis()))
        } else {
            serializer.serialize_str(&format!("{}s", duration.as_secs()))
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        parse_duration(&s).map_err(serde::de::Error::custom)
    }

    pub fn parse_duration(s: &str) -> Result<Duration, String> {
        let s = s.trim();
        let parse = |num: &str| -> Result<u64, String> {
            num.trim().parse().map_err(|_| format!("Invalid duration: {}", s))
        };

        // Check for "ms" BEFORE "s" since "ms" ends with 's'
        if let Some(num) = s.strip_suffix("ms") {
            Ok(Duration::from_millis(parse(num)?))
        } else if let Some(num) = s.strip_suffix('s') {
            Ok(Duration::from_secs(parse(num)?))
        } else if let Some(num) = s.strip_suffix('m') {
            scaled(parse(num)?, 60)
        } else if let Some(num) = s.strip_suffix('h') {
            scaled(parse(num)?, 3600)
        } else {
            Err(format!("Duration must end with 'ms', 's', 'm' or 'h': {}", s))
        }
    }

    fn scaled(value: u64, unit_secs: u64) -> Result<Duration, String> {
        value
            .checked_mul(unit_secs)
            .map(Duration::from_secs)
            .ok_or_else(|| format!("Duration out of range: {} x {}s", value, unit_secs))
    }
}
