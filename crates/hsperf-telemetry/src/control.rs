//! Control-channel client.
//!
//! Line-based protocol: the client sends one command per line and the
//! service answers with a reply made of `NNN-` (continuation), `NNN+`
//! (data block terminated by a lone `.`) and a final `NNN ` line. Status
//! `650` marks an asynchronous event, which may arrive at any point after
//! a subscription.

use crate::events::{setevents_command, EventCategory};
use hsperf_common::{Error, Result, Role};
use std::collections::VecDeque;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tracing::{debug, info};

/// Status code of asynchronous event notifications.
pub const EVENT_STATUS: u16 = 650;

/// One complete reply or event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlReply {
    pub status: u16,
    /// Reply text with the status code and separator stripped.
    pub lines: Vec<String>,
    /// Lines exactly as received, minus line terminators.
    pub raw: Vec<String>,
}

impl ControlReply {
    pub fn is_ok(&self) -> bool {
        self.status == 250
    }

    pub fn is_event(&self) -> bool {
        self.status == EVENT_STATUS
    }

    pub fn raw_text(&self) -> String {
        self.raw.join("\n")
    }
}

/// Authentication facts advertised by the service.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProtocolInfo {
    pub auth_methods: Vec<String>,
    pub cookie_file: Option<PathBuf>,
}

impl ProtocolInfo {
    fn parse(reply: &ControlReply) -> Self {
        let mut info = ProtocolInfo::default();
        for line in &reply.lines {
            let Some(rest) = line.strip_prefix("AUTH ") else {
                continue;
            };
            if let Some(methods) = rest
                .split(' ')
                .find_map(|field| field.strip_prefix("METHODS="))
            {
                info.auth_methods = methods.split(',').map(str::to_string).collect();
            }
            if let Some(quoted) = rest.split_once("COOKIEFILE=").map(|(_, v)| v) {
                info.cookie_file = Some(PathBuf::from(unquote(quoted)));
            }
        }
        info
    }

    pub fn supports(&self, method: &str) -> bool {
        self.auth_methods.iter().any(|m| m == method)
    }
}

/// An open control connection to one service.
pub struct ControlConnection {
    role: Role,
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
    pending_events: VecDeque<ControlReply>,
}

impl ControlConnection {
    /// Connect to the service's control port.
    pub async fn connect(role: Role, addr: SocketAddr, timeout: Duration) -> Result<Self> {
        let stream = tokio::time::timeout(timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| Error::channel(role, format!("Timed out connecting to {}", addr)))?
            .map_err(|e| Error::channel(role, format!("Failed to connect to {}: {}", addr, e)))?;

        debug!(role = %role, %addr, "Control channel connected");
        let (read_half, write_half) = stream.into_split();
        Ok(Self {
            role,
            reader: BufReader::new(read_half),
            writer: write_half,
            pending_events: VecDeque::new(),
        })
    }

    pub async fn protocol_info(&mut self) -> Result<ProtocolInfo> {
        let reply = self.command("PROTOCOLINFO 1").await?;
        Ok(ProtocolInfo::parse(&reply))
    }

    /// Authenticate with the strongest method both sides support.
    ///
    /// Order of preference: no authentication, cookie, password.
    pub async fn authenticate(&mut self, password: Option<&str>) -> Result<()> {
        let info = self.protocol_info().await?;
        debug!(role = %self.role, methods = ?info.auth_methods, "Control channel auth methods");

        let command = if info.supports("NULL") {
            "AUTHENTICATE".to_string()
        } else if info.supports("COOKIE") {
            let path = info.cookie_file.as_ref().ok_or_else(|| {
                Error::channel(self.role, "Cookie authentication offered without a cookie file")
            })?;
            let cookie = tokio::fs::read(path).await.map_err(|e| {
                Error::channel(
                    self.role,
                    format!("Failed to read auth cookie {}: {}", path.display(), e),
                )
            })?;
            format!("AUTHENTICATE {}", hex_upper(&cookie))
        } else if info.supports("HASHEDPASSWORD") {
            let password = password.ok_or_else(|| {
                Error::channel(self.role, "Service requires a password but none is configured")
            })?;
            format!("AUTHENTICATE {}", quote(password))
        } else {
            return Err(Error::channel(
                self.role,
                format!("No supported authentication method in {:?}", info.auth_methods),
            ));
        };

        self.command(&command).await?;
        info!(role = %self.role, "Control channel authenticated");
        Ok(())
    }

    /// Subscribe to `events`.
    pub async fn set_events(&mut self, events: &[EventCategory]) -> Result<()> {
        self.command(&setevents_command(events)).await?;
        info!(role = %self.role, count = events.len(), "Subscribed to control events");
        Ok(())
    }

    /// Next asynchronous event, or `None` once the service closes the channel.
    pub async fn next_event(&mut self) -> Result<Option<ControlReply>> {
        if let Some(event) = self.pending_events.pop_front() {
            return Ok(Some(event));
        }

        loop {
            match self.read_reply().await? {
                Some(reply) if reply.is_event() => return Ok(Some(reply)),
                Some(reply) => {
                    debug!(role = %self.role, status = reply.status, "Ignoring unsolicited reply");
                }
                None => return Ok(None),
            }
        }
    }

    /// Say goodbye and close the write half.
    pub async fn close(mut self) -> Result<()> {
        // The service may already be gone; QUIT is a courtesy.
        let _ = self.writer.write_all(b"QUIT\r\n").await;
        let _ = self.writer.shutdown().await;
        debug!(role = %self.role, "Control channel closed");
        Ok(())
    }

    /// Send `command` and return its reply; non-250 replies are errors.
    async fn command(&mut self, command: &str) -> Result<ControlReply> {
        let line = format!("{}\r\n", command);
        self.writer
            .write_all(line.as_bytes())
            .await
            .map_err(|e| Error::channel(self.role, format!("Failed to send command: {}", e)))?;

        loop {
            let reply = self.read_reply().await?.ok_or_else(|| {
                Error::channel(self.role, "Control channel closed while awaiting reply")
            })?;

            if reply.is_event() {
                self.pending_events.push_back(reply);
                continue;
            }
            if !reply.is_ok() {
                let verb = command.split(' ').next().unwrap_or(command);
                return Err(Error::channel(
                    self.role,
                    format!("{} rejected: {}", verb, reply.raw_text()),
                ));
            }
            return Ok(reply);
        }
    }

    async fn read_reply(&mut self) -> Result<Option<ControlReply>> {
        let mut reply = ControlReply {
            status: 0,
            lines: Vec::new(),
            raw: Vec::new(),
        };

        loop {
            let Some(line) = self.read_line().await? else {
                return if reply.raw.is_empty() {
                    Ok(None)
                } else {
                    Err(Error::channel(self.role, "Control channel closed mid-reply"))
                };
            };

            if line.len() < 4 || !line.is_char_boundary(3) {
                return Err(Error::channel(
                    self.role,
                    format!("Malformed control reply line: {:?}", line),
                ));
            }
            let status: u16 = line[..3].parse().map_err(|_| {
                Error::channel(self.role, format!("Malformed control reply status: {:?}", line))
            })?;
            let separator = line.as_bytes()[3];
            reply.status = status;
            reply.lines.push(line[4..].to_string());
            reply.raw.push(line);

            match separator {
                b' ' => return Ok(Some(reply)),
                b'-' => {}
                b'+' => self.read_data_block(&mut reply).await?,
                other => {
                    return Err(Error::channel(
                        self.role,
                        format!("Unknown reply separator {:?}", other as char),
                    ))
                }
            }
        }
    }

    async fn read_data_block(&mut self, reply: &mut ControlReply) -> Result<()> {
        loop {
            let line = self.read_line().await?.ok_or_else(|| {
                Error::channel(self.role, "Control channel closed inside data block")
            })?;
            let done = line == ".";
            reply.raw.push(line);
            if done {
                return Ok(());
            }
        }
    }

    async fn read_line(&mut self) -> Result<Option<String>> {
        let mut line = String::new();
        let read = self
            .reader
            .read_line(&mut line)
            .await
            .map_err(|e| Error::channel(self.role, format!("Failed to read reply: {}", e)))?;
        if read == 0 {
            return Ok(None);
        }
        let trimmed = line.trim_end_matches(['\r', '\n']).len();
        line.truncate(trimmed);
        Ok(Some(line))
    }
}

fn hex_upper(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02X}", b)).collect()
}

fn quote(value: &str) -> String {
    format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
}

/// Strip surrounding quotes and backslash escapes from a quoted field.
fn unquote(value: &str) -> String {
    let Some(inner) = value.strip_prefix('"') else {
        return value.split(' ').next().unwrap_or_default().to_string();
    };

    let mut out = String::new();
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                if let Some(escaped) = chars.next() {
                    out.push(escaped);
                }
            }
            '"' => break,
            c => out.push(c),
        }
    }
    out
}
