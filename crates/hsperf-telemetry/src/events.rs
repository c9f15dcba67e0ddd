//! Control-channel event categories.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Event categories a control channel can be subscribed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventCategory {
    /// Relay connection state.
    OrConn,
    /// Circuit state.
    Circ,
    /// Stream state.
    Stream,
    /// Bandwidth used per second.
    Bw,
    /// Entry guard selection.
    Guard,
    Info,
    Notice,
    Warn,
    Err,
    /// Hidden-service descriptor publication and fetches.
    HsDesc,
    /// New relay descriptors.
    NewDesc,
    /// Circuit build timeout calibration.
    BuildTimeoutSet,
    /// Our own descriptor changed.
    DescChanged,
    NewConsensus,
    StatusClient,
    StatusGeneral,
    StatusServer,
}

/// The fixed subscription set used for every monitored service.
pub const DEFAULT_EVENTS: &[EventCategory] = &[
    EventCategory::OrConn,
    EventCategory::Circ,
    EventCategory::Stream,
    EventCategory::Bw,
    EventCategory::Guard,
    EventCategory::Info,
    EventCategory::Notice,
    EventCategory::Warn,
    EventCategory::Err,
    EventCategory::HsDesc,
    EventCategory::NewDesc,
    EventCategory::BuildTimeoutSet,
    EventCategory::DescChanged,
    EventCategory::NewConsensus,
    EventCategory::StatusClient,
    EventCategory::StatusGeneral,
    EventCategory::StatusServer,
];

impl EventCategory {
    /// Keyword used on the wire.
    pub fn keyword(&self) -> &'static str {
        match self {
            EventCategory::OrConn => "ORCONN",
            EventCategory::Circ => "CIRC",
            EventCategory::Stream => "STREAM",
            EventCategory::Bw => "BW",
            EventCategory::Guard => "GUARD",
            EventCategory::Info => "INFO",
            EventCategory::Notice => "NOTICE",
            EventCategory::Warn => "WARN",
            EventCategory::Err => "ERR",
            EventCategory::HsDesc => "HS_DESC",
            EventCategory::NewDesc => "NEWDESC",
            EventCategory::BuildTimeoutSet => "BUILDTIMEOUT_SET",
            EventCategory::DescChanged => "DESCCHANGED",
            EventCategory::NewConsensus => "NEWCONSENSUS",
            EventCategory::StatusClient => "STATUS_CLIENT",
            EventCategory::StatusGeneral => "STATUS_GENERAL",
            EventCategory::StatusServer => "STATUS_SERVER",
        }
    }
}

impl fmt::Display for EventCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.keyword())
    }
}

/// Render the subscription command for `events`.
pub fn setevents_command(events: &[EventCategory]) -> String {
    let keywords: Vec<&str> = events.iter().map(EventCategory::keyword).collect();
    format!("SETEVENTS {}", keywords.join(" "))
}
