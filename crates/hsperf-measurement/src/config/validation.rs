use super::*;
use crate::schedule::TransferSize;
use hsperf_process::resolve_executable;
use std::collections::HashSet;

/// Validate the complete configuration
pub fn validate_config(config: &MeasurementConfig) -> Result<()> {
    validate_executables(config)?;
    validate_burst(&config.burst)?;
    validate_timing(&config.timing)?;
    validate_ports(&config.ports)?;
    validate_templates(&config.templates)?;
    Ok(())
}

fn validate_executables(config: &MeasurementConfig) -> Result<()> {
    resolve_executable(&config.tor_path).map_err(|e| e.context("Invalid anonymity-service binary"))?;
    resolve_executable(&config.tgen_path).map_err(|e| e.context("Invalid traffic-generator binary"))?;
    Ok(())
}

/// Validate burst pacing and the size schedule
pub(crate) fn validate_burst(burst: &BurstConfig) -> Result<()> {
    if burst.count == 0 {
        return Err(Error::config("Burst count must be at least 1"));
    }

    if burst.sizes.is_empty() {
        return Err(Error::config("At least one transfer size must be configured"));
    }

    for size in &burst.sizes {
        TransferSize::parse(size)?;
    }

    Ok(())
}

fn validate_timing(timing: &TimingConfig) -> Result<()> {
    if timing.restart_poll_interval.is_zero() {
        return Err(Error::config("Restart poll interval must be greater than 0"));
    }

    if timing.heartbeat_interval.is_zero() {
        return Err(Error::config("Heartbeat interval must be greater than 0"));
    }

    if timing.bootstrap_timeout.is_zero() || timing.endpoint_timeout.is_zero() {
        return Err(Error::config("Bootstrap and endpoint timeouts must be greater than 0"));
    }

    Ok(())
}

/// Validate that every locally bound port is set and distinct
pub(crate) fn validate_ports(ports: &PortConfig) -> Result<()> {
    if ports.hs_virtual == 0 {
        return Err(Error::config("Hidden-service virtual port must be between 1 and 65535"));
    }

    let bound = [
        ("tgen_server", ports.tgen_server),
        ("server_control", ports.server_control),
        ("client_control", ports.client_control),
        ("client_socks", ports.client_socks),
    ];

    let mut seen = HashSet::new();
    for (name, port) in bound {
        if port == 0 {
            return Err(Error::config(format!(
                "Port {} must be between 1 and 65535, got: 0",
                name
            )));
        }
        if !seen.insert(port) {
            return Err(Error::config(format!("Duplicate port {} ({})", port, name)));
        }
    }

    Ok(())
}

fn validate_templates(templates: &TemplateConfig) -> Result<()> {
    for path in [&templates.server, &templates.client].into_iter().flatten() {
        if !path.is_file() {
            return Err(Error::config(format!(
                "Template file not found: {}",
                path.display()
            )));
        }
    }
    Ok(())
}
