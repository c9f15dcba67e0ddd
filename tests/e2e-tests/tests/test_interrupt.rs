//! Test Scenario: Terminal interrupt of the hsperf binary
//!
//! SIGINT is sent to the whole foreground process group, as a terminal
//! would. Only hsperf may see it: the children must be stopped by hsperf's
//! own shutdown sequence (SIGTERM), not killed by the interrupt.

#![cfg(unix)]

use e2e_tests::{assert_all_stopped, create_test_dir, get_fakeservice_path, get_hsperf_path};
use hsperf_measurement::Role;
use nix::sys::signal::{killpg, Signal};
use nix::unistd::Pid;
use std::os::unix::process::CommandExt;
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

fn write_config(path: &std::path::Path, base_port: u16) {
    let fake = get_fakeservice_path();
    let yaml = format!(
        r#"tor_path: {fake}
tgen_path: {fake}
burst:
  count: 2
  interval: 300ms
  transfer_delay: 100ms
  sizes: ["1 KiB"]
timing:
  warmup: 200ms
  heartbeat_interval: 500ms
  restart_poll_interval: 50ms
  terminate_grace: 3s
  settle_delay: 50ms
ports:
  tgen_server: {p0}
  server_control: {p1}
  client_control: {p2}
  client_socks: {p3}
"#,
        fake = fake.display(),
        p0 = base_port,
        p1 = base_port + 1,
        p2 = base_port + 2,
        p3 = base_port + 3,
    );
    std::fs::write(path, yaml).expect("Failed to write config");
}

#[test]
fn test_sigint_stops_children_through_orchestrator() {
    println!("\n========================================");
    println!("TEST: Interrupt hsperf Binary");
    println!("========================================\n");

    let Some(hsperf) = get_hsperf_path() else {
        println!("hsperf binary not built, skipping (run cargo test --workspace)");
        return;
    };

    let dir = create_test_dir("interrupt");
    let prefix = dir.path().join("run");
    let config_path = dir.path().join("hsperf.yaml");
    write_config(&config_path, 52500);

    println!("Step 1: Starting hsperf in its own process group...");
    let mut child = Command::new(hsperf)
        .arg("--config")
        .arg(&config_path)
        .arg("--prefix")
        .arg(&prefix)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .process_group(0)
        .spawn()
        .expect("Failed to start hsperf");

    let fetch_log = prefix.join(Role::ClientFetch.subdir()).join("tgen.log");
    let deadline = Instant::now() + Duration::from_secs(30);
    while !fetch_log.exists() && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(100));
    }
    assert!(fetch_log.exists(), "fetcher never started");
    println!("✓ Measurement running\n");

    println!("Step 2: Sending SIGINT to the process group...");
    killpg(Pid::from_raw(child.id() as i32), Signal::SIGINT).expect("Failed to send SIGINT");

    let deadline = Instant::now() + Duration::from_secs(30);
    let status = loop {
        if let Some(status) = child.try_wait().expect("Failed to wait for hsperf") {
            break status;
        }
        if Instant::now() > deadline {
            child.kill().ok();
            panic!("hsperf did not exit after SIGINT");
        }
        thread::sleep(Duration::from_millis(100));
    };
    assert!(status.success(), "hsperf exited with {}", status);
    println!("✓ hsperf exited cleanly\n");

    println!("Step 3: Verifying children were stopped by hsperf...");
    assert_all_stopped(&prefix);
    let server_log =
        std::fs::read_to_string(prefix.join(Role::ServerServe.subdir()).join("tgen.log")).unwrap();
    assert!(
        server_log.contains("[tgen-server] shutting down"),
        "serving generator was not terminated by hsperf"
    );
    println!("✓ Children isolated from the interrupt\n");
}
