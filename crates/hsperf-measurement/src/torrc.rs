//! Anonymity-service configuration files.

use crate::config::{PortConfig, ServiceOptions};
use crate::layout::Layout;
use crate::tgen::write_atomic;
use hsperf_common::{Result, Role, Side};
use std::fmt::Write as _;
use std::net::{Ipv4Addr, SocketAddr};

/// Address of the control listener for a service role.
pub fn control_addr(role: Role, ports: &PortConfig) -> SocketAddr {
    let port = match role.side() {
        Side::Server => ports.server_control,
        Side::Client => ports.client_control,
    };
    SocketAddr::from((Ipv4Addr::LOCALHOST, port))
}

/// Render the service config for `role` (a control role).
pub fn render_torrc(
    role: Role,
    layout: &Layout,
    ports: &PortConfig,
    options: &ServiceOptions,
) -> String {
    let mut torrc = String::new();
    let _ = writeln!(torrc, "DataDirectory {}", layout.data_dir(role).display());
    let _ = writeln!(torrc, "ControlPort {}", control_addr(role, ports));
    torrc.push_str("CookieAuthentication 1\n");
    torrc.push_str("Log notice stdout\n");

    match role.side() {
        Side::Server => {
            torrc.push_str("SocksPort 0\n");
            let _ = writeln!(torrc, "HiddenServiceDir {}", layout.hs_dir().display());
            let _ = writeln!(
                torrc,
                "HiddenServicePort {} 127.0.0.1:{}",
                ports.hs_virtual, ports.tgen_server
            );
        }
        Side::Client => {
            let _ = writeln!(torrc, "SocksPort 127.0.0.1:{}", ports.client_socks);
        }
    }

    for line in &options.extra_config {
        torrc.push_str(line.trim_end());
        torrc.push('\n');
    }

    torrc
}

/// Render and write the service config, returning its path.
pub fn write_torrc(
    role: Role,
    layout: &Layout,
    ports: &PortConfig,
    options: &ServiceOptions,
) -> Result<std::path::PathBuf> {
    let path = layout.torrc(role);
    write_atomic(&path, render_torrc(role, layout, ports, options).as_bytes())?;
    Ok(path)
}
