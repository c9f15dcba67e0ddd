//! Domain types shared across the harness.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Which half of the measurement pair a process belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Server,
    Client,
}

impl Side {
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Server => "server",
            Side::Client => "client",
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of a managed process.
///
/// The traffic generator runs in the serving and fetching roles; the
/// anonymity service runs once per side and exposes the control channel.
///
/// # Example
/// ```
/// use hsperf_common::{Role, Side};
///
/// assert_eq!(Role::ClientFetch.side(), Side::Client);
/// assert_eq!(Role::ServerControl.to_string(), "server-control");
/// assert_eq!(Role::ServerServe.subdir(), "server/tgen");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Role {
    /// Traffic generator answering transfer requests.
    ServerServe,
    /// Traffic generator performing timed transfers.
    ClientFetch,
    /// Anonymity service publishing the rendezvous endpoint.
    ServerControl,
    /// Anonymity service the fetcher connects through.
    ClientControl,
}

impl Role {
    pub const ALL: [Role; 4] = [
        Role::ServerServe,
        Role::ServerControl,
        Role::ClientControl,
        Role::ClientFetch,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::ServerServe => "server-serve",
            Role::ClientFetch => "client-fetch",
            Role::ServerControl => "server-control",
            Role::ClientControl => "client-control",
        }
    }

    pub fn side(&self) -> Side {
        match self {
            Role::ServerServe | Role::ServerControl => Side::Server,
            Role::ClientFetch | Role::ClientControl => Side::Client,
        }
    }

    /// True for the anonymity-service roles that expose a control channel.
    pub fn has_control_channel(&self) -> bool {
        matches!(self, Role::ServerControl | Role::ClientControl)
    }

    /// Relative directory holding this role's configuration and logs.
    pub fn subdir(&self) -> String {
        let program = if self.has_control_channel() { "tor" } else { "tgen" };
        format!("{}/{}", self.side(), program)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
