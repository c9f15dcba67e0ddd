//! Stand-in for both external executables in end-to-end tests.
//!
//! * `fakeservice -f <torrc>` behaves like the anonymity service: prints
//!   bootstrap progress, publishes a hostname file, writes an auth cookie and
//!   answers the control protocol with a stream of `650 BW` events.
//! * `fakeservice <graph.xml>` behaves like the traffic generator: a graph
//!   with a `serverport` key serves until terminated, any other graph
//!   performs one transfer, logs `transfer-complete` and exits.
//!
//! Both modes write `fakeservice.pid` (service: into the data directory,
//! generator: into the working directory) and exit on SIGTERM.

use clap::Parser;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::sleep;
use tracing::{error, info, warn};

/// Torrc comment that suppresses the hostname file.
const NO_HOSTNAME_DIRECTIVE: &str = "# fakeservice: no-hostname";

const COOKIE_FILE: &str = "control_auth_cookie";

/// Fake anonymity service / traffic generator for hsperf E2E testing
#[derive(Parser, Debug)]
#[command(name = "fakeservice")]
struct Args {
    /// Service config file (service mode)
    #[arg(short = 'f', value_name = "TORRC")]
    torrc: Option<PathBuf>,

    /// Traffic-generator graph (generator mode)
    #[arg(value_name = "GRAPH")]
    graph: Option<PathBuf>,

    /// Delay between bootstrap milestones, in milliseconds
    #[arg(long, default_value = "100")]
    bootstrap_step_ms: u64,

    /// Interval between emitted control events, in milliseconds
    #[arg(long, default_value = "100")]
    event_interval_ms: u64,
}

#[derive(Debug, Default)]
struct ServiceConfig {
    control_addr: Option<SocketAddr>,
    data_dir: Option<PathBuf>,
    hs_dir: Option<PathBuf>,
    publish_hostname: bool,
}

impl ServiceConfig {
    fn parse(text: &str) -> Self {
        let mut config = ServiceConfig {
            publish_hostname: true,
            ..Default::default()
        };
        for line in text.lines().map(str::trim) {
            if line == NO_HOSTNAME_DIRECTIVE {
                config.publish_hostname = false;
                continue;
            }
            let Some((key, value)) = line.split_once(' ') else {
                continue;
            };
            match key {
                "ControlPort" => config.control_addr = value.trim().parse().ok(),
                "DataDirectory" => config.data_dir = Some(PathBuf::from(value.trim())),
                "HiddenServiceDir" => config.hs_dir = Some(PathBuf::from(value.trim())),
                _ => {}
            }
        }
        config
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_ansi(false)
        .with_writer(std::io::stdout)
        .init();

    let args = Args::parse();
    let result = match (&args.torrc, &args.graph) {
        (Some(torrc), _) => run_service(torrc, &args).await,
        (None, Some(graph)) => run_generator(graph).await,
        (None, None) => Err("either -f <torrc> or a graph file is required".to_string()),
    };

    if let Err(e) = result {
        error!("fakeservice failed: {}", e);
        std::process::exit(1);
    }
}

async fn run_service(torrc: &Path, args: &Args) -> Result<(), String> {
    let text = std::fs::read_to_string(torrc)
        .map_err(|e| format!("failed to read {}: {}", torrc.display(), e))?;
    let config = ServiceConfig::parse(&text);

    let data_dir = config.data_dir.clone().ok_or("DataDirectory missing")?;
    let control_addr = config.control_addr.ok_or("ControlPort missing")?;
    std::fs::create_dir_all(&data_dir).map_err(|e| e.to_string())?;
    write_pid_file(&data_dir)?;

    let cookie: Vec<u8> = (0..32u8)
        .map(|i| i.wrapping_mul(7) ^ (std::process::id() as u8))
        .collect();
    let cookie_path = data_dir.join(COOKIE_FILE);
    std::fs::write(&cookie_path, &cookie).map_err(|e| e.to_string())?;

    let listener = TcpListener::bind(control_addr)
        .await
        .map_err(|e| format!("failed to bind control port {}: {}", control_addr, e))?;
    info!("Opened Control listener connection (ready) on {}", control_addr);
    info!("Bootstrapped 0% (starting): Starting");

    let event_interval = Duration::from_millis(args.event_interval_ms);
    tokio::spawn(accept_control(listener, cookie_path, cookie, event_interval));

    let step = Duration::from_millis(args.bootstrap_step_ms);
    sleep(step).await;
    info!("Bootstrapped 50% (loading_descriptors): Loading relay descriptors");
    sleep(step).await;

    if let Some(hs_dir) = &config.hs_dir {
        std::fs::create_dir_all(hs_dir).map_err(|e| e.to_string())?;
        std::fs::write(hs_dir.join("hs_ed25519_secret_key"), b"== fake key ==")
            .map_err(|e| e.to_string())?;
        if config.publish_hostname {
            std::fs::write(hs_dir.join("hostname"), "fakeservicexyz.onion\n")
                .map_err(|e| e.to_string())?;
        } else {
            warn!("Not publishing hostname");
        }
    }
    info!("Bootstrapped 100% (done): Done");

    wait_for_terminate().await;
    info!("Interrupt: exiting cleanly.");
    Ok(())
}

async fn accept_control(
    listener: TcpListener,
    cookie_path: PathBuf,
    cookie: Vec<u8>,
    event_interval: Duration,
) {
    loop {
        match listener.accept().await {
            Ok((stream, _)) => {
                let cookie_path = cookie_path.clone();
                let cookie = cookie.clone();
                tokio::spawn(async move {
                    if let Err(e) =
                        serve_control(stream, cookie_path, cookie, event_interval).await
                    {
                        warn!("Control connection ended: {}", e);
                    }
                });
            }
            Err(e) => {
                error!("Control accept failed: {}", e);
                return;
            }
        }
    }
}

async fn serve_control(
    stream: TcpStream,
    cookie_path: PathBuf,
    cookie: Vec<u8>,
    event_interval: Duration,
) -> std::io::Result<()> {
    let (read_half, mut writer) = stream.into_split();
    let mut lines = BufReader::new(read_half).lines();
    let mut authenticated = false;
    let mut subscribed = false;
    let mut ticker = tokio::time::interval(event_interval);
    let mut sequence: u64 = 0;

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else {
                    return Ok(());
                };
                let line = line.trim().to_string();
                let reply = if line.starts_with("PROTOCOLINFO") {
                    format!(
                        "250-PROTOCOLINFO 1\r\n250-AUTH METHODS=COOKIE,SAFECOOKIE COOKIEFILE=\"{}\"\r\n250-VERSION Tor=\"0.4.8.0\"\r\n250 OK\r\n",
                        cookie_path.display()
                    )
                } else if let Some(hex) = line.strip_prefix("AUTHENTICATE ") {
                    if hex.trim().eq_ignore_ascii_case(&to_hex(&cookie)) {
                        authenticated = true;
                        "250 OK\r\n".to_string()
                    } else {
                        "515 Authentication failed: Wrong length on authentication cookie.\r\n".to_string()
                    }
                } else if !authenticated {
                    "514 Authentication required.\r\n".to_string()
                } else if line.starts_with("SETEVENTS") {
                    subscribed = true;
                    "250 OK\r\n".to_string()
                } else if line == "QUIT" {
                    writer.write_all(b"250 closing connection\r\n").await?;
                    return Ok(());
                } else {
                    format!("510 Unrecognized command \"{}\"\r\n", line)
                };
                writer.write_all(reply.as_bytes()).await?;
            }
            _ = ticker.tick(), if subscribed => {
                sequence += 1;
                let event = if sequence % 5 == 0 {
                    "650-STATUS_GENERAL NOTICE CLOCK_JUMPED\r\n650 OK\r\n".to_string()
                } else {
                    format!("650 BW {} {}\r\n", sequence * 512, sequence * 1024)
                };
                writer.write_all(event.as_bytes()).await?;
            }
        }
    }
}

async fn run_generator(graph: &Path) -> Result<(), String> {
    let doc = std::fs::read_to_string(graph)
        .map_err(|e| format!("failed to read {}: {}", graph.display(), e))?;
    let cwd = std::env::current_dir().map_err(|e| e.to_string())?;
    write_pid_file(&cwd)?;

    if let Some(port) = graph_attr(&doc, "serverport") {
        info!("[tgen-server] serving on port {}", port);
        wait_for_terminate().await;
        info!("[tgen-server] shutting down");
        return Ok(());
    }

    let peers = graph_attr(&doc, "peers").ok_or("peers attribute missing")?;
    let size = graph_attr(&doc, "size").ok_or("size attribute missing")?;
    info!("[transfer-start] peer={} size={}", peers, size);
    sleep(Duration::from_millis(50)).await;
    info!("[_tgengenerator_onTransferComplete] transfer-complete peer={} size={}", peers, size);
    Ok(())
}

/// Value of the first `<data>` element whose key is named `name`.
fn graph_attr(doc: &str, name: &str) -> Option<String> {
    let declaration = format!("attr.name=\"{}\"", name);
    let key_line = doc.lines().find(|l| l.contains(&declaration))?;
    let id = key_line.split("id=\"").nth(1)?.split('"').next()?;

    let open = format!("<data key=\"{}\">", id);
    let start = doc.find(&open)? + open.len();
    let end = doc[start..].find("</data>")? + start;
    Some(doc[start..end].to_string())
}

fn to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02X}", b)).collect()
}

fn write_pid_file(dir: &Path) -> Result<(), String> {
    std::fs::write(dir.join("fakeservice.pid"), std::process::id().to_string())
        .map_err(|e| format!("failed to write pid file: {}", e))
}

#[cfg(unix)]
async fn wait_for_terminate() {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut sigterm) => {
            sigterm.recv().await;
        }
        Err(e) => {
            error!("Failed to set up SIGTERM handler: {}", e);
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_terminate() {
    let _ = tokio::signal::ctrl_c().await;
}
