// E2E test helpers for hsperf

use hsperf_measurement::{MeasurementConfig, Role};
use hsperf_process::process_exists;
use std::env;
use std::path::{Path, PathBuf};
use std::sync::Once;
use std::time::Duration;

/// Directory holding the binaries built for this test run.
fn target_bin_dir() -> PathBuf {
    let mut path = env::current_exe()
        .expect("Failed to get current exe path")
        .parent()
        .expect("Failed to get parent dir")
        .to_path_buf();

    // If we're in deps/, go up one level
    if path.ends_with("deps") {
        path.pop();
    }
    path
}

/// Get the path to the FAKESERVICE binary
pub fn get_fakeservice_path() -> PathBuf {
    let path = target_bin_dir().join(format!("fakeservice{}", env::consts::EXE_SUFFIX));
    if !path.exists() {
        panic!("FAKESERVICE binary not found at: {}", path.display());
    }
    path
}

/// Get the path to the hsperf binary, if it has been built
pub fn get_hsperf_path() -> Option<PathBuf> {
    let path = target_bin_dir().join(format!("hsperf{}", env::consts::EXE_SUFFIX));
    path.exists().then_some(path)
}

/// Route library logs to the test harness output
pub fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
            )
            .with_target(false)
            .with_test_writer()
            .init();
    });
}

/// Create a temporary test directory, removed when dropped
pub fn create_test_dir(test_name: &str) -> tempfile::TempDir {
    tempfile::Builder::new()
        .prefix(&format!("hsperf-e2e-{}-", test_name))
        .tempdir()
        .expect("Failed to create test directory")
}

/// Configuration using FAKESERVICE for both executables, with fast timings.
///
/// Each test passes its own `base_port` so tests can run in parallel; the
/// four locally bound ports are `base_port..base_port + 4`.
pub fn test_config(prefix: &Path, base_port: u16) -> MeasurementConfig {
    let fake = get_fakeservice_path();
    let mut config = MeasurementConfig::new(&fake, &fake);
    config.prefix = prefix.to_path_buf();

    config.ports.tgen_server = base_port;
    config.ports.server_control = base_port + 1;
    config.ports.client_control = base_port + 2;
    config.ports.client_socks = base_port + 3;

    config.burst.count = 2;
    config.burst.transfer_delay = Duration::from_millis(100);
    config.burst.interval = Duration::from_millis(300);
    config.burst.sizes = vec!["1 KiB".to_string(), "2 KiB".to_string()];

    config.timing.warmup = Duration::from_millis(200);
    config.timing.heartbeat_interval = Duration::from_millis(500);
    config.timing.restart_poll_interval = Duration::from_millis(50);
    config.timing.terminate_grace = Duration::from_secs(3);
    config.timing.settle_delay = Duration::from_millis(50);
    config.timing.bootstrap_timeout = Duration::from_secs(20);
    config.timing.endpoint_timeout = Duration::from_secs(10);
    config.timing.connect_timeout = Duration::from_secs(5);
    config
}

/// PID written by a FAKESERVICE instance for `role`, if it started.
pub fn fakeservice_pid(prefix: &Path, role: Role) -> Option<u32> {
    let dir = prefix.join(role.subdir());
    let pid_file = if role.has_control_channel() {
        dir.join("data").join("fakeservice.pid")
    } else {
        dir.join("fakeservice.pid")
    };
    std::fs::read_to_string(pid_file)
        .ok()
        .and_then(|s| s.trim().parse().ok())
}

/// Assert that no FAKESERVICE started under `prefix` is still running.
/// Returns the roles that had been started.
pub fn assert_all_stopped(prefix: &Path) -> Vec<Role> {
    let mut started = Vec::new();
    for role in Role::ALL {
        if let Some(pid) = fakeservice_pid(prefix, role) {
            assert!(
                !process_exists(pid).unwrap_or(false),
                "{} (pid {}) is still running",
                role,
                pid
            );
            started.push(role);
        }
    }
    started
}

/// One event from a control-event log, reassembled from its physical lines.
#[derive(Debug, Clone)]
pub struct EventLine {
    pub epoch: (i64, u32),
    pub raw: String,
}

/// Parse `<date> <time> <epoch> <raw line>` lines.
///
/// Lines of a multi-line event share one timestamp; they are joined until
/// the reply's final `NNN ` line.
pub fn read_event_log(path: &Path) -> Vec<EventLine> {
    let content = std::fs::read_to_string(path).unwrap_or_default();
    let mut events = Vec::new();
    let mut pending: Option<EventLine> = None;

    for line in content.lines() {
        let mut parts = line.splitn(4, ' ');
        let (Some(_date), Some(_time), Some(epoch), Some(raw)) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            continue;
        };
        let Some((secs, micros)) = epoch.split_once('.') else {
            continue;
        };
        let (Ok(secs), Ok(micros)) = (secs.parse(), micros.parse()) else {
            continue;
        };

        let event = pending.get_or_insert_with(|| EventLine {
            epoch: (secs, micros),
            raw: String::new(),
        });
        if !event.raw.is_empty() {
            event.raw.push('\n');
        }
        event.raw.push_str(raw);

        if raw.as_bytes().get(3) == Some(&b' ') {
            events.extend(pending.take());
        }
    }
    events.extend(pending);
    events
}
