//! # hsperf measurement
//!
//! Orchestration of a hidden-service performance measurement.
//!
//! This crate provides:
//! - Orchestrator - startup, heartbeat and shutdown of a run
//! - Restart-loop runner with pluggable hooks and backoff
//! - Burst schedule and per-run fetch configuration
//! - Traffic-generator and anonymity-service config rendering
//! - Configuration loading and validation

pub mod backoff;
pub mod config;
mod deadline;
pub mod endpoint;
pub mod fetch;
pub mod layout;
pub mod orchestrator;
pub mod progress;
pub mod runner;
pub mod schedule;
pub mod service;
pub mod tgen;
pub mod torrc;

// Re-export main types
pub use backoff::{BackoffConfig, BackoffPolicy, ExponentialBackoff, NoBackoff};
pub use config::{
    BurstConfig, MeasurementConfig, PortConfig, ServiceOptions, TemplateConfig, TimingConfig,
};
pub use endpoint::{EndpointReader, ServiceEndpoint};
pub use fetch::FetchCycle;
pub use layout::Layout;
pub use orchestrator::Orchestrator;
pub use progress::{count_completed_transfers, TRANSFER_COMPLETE_MARKER};
pub use runner::{RestartHook, RestartLoopRunner, RunnerHandle, RunnerStatus};
pub use schedule::{BurstSchedule, Pause, TransferSize};
pub use service::{parse_bootstrap, AnonymityService};
pub use tgen::GraphTemplate;

pub use hsperf_common::{Error, Result, Role, Shutdown};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
