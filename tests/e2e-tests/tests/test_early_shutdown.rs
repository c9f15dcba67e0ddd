//! Test Scenario: Shutdown before the measurement is running
//!
//! An interrupt that arrives during startup must still stop every process
//! that was started, must not wait on an endpoint that is never published,
//! and is not reported as a failure.

use e2e_tests::{assert_all_stopped, create_test_dir, init_tracing, test_config};
use hsperf_measurement::{Orchestrator, Role};
use std::time::{Duration, Instant};

#[tokio::test]
async fn test_shutdown_during_warmup() {
    println!("\n========================================");
    println!("TEST: Shutdown During Warm-up");
    println!("========================================\n");
    init_tracing();

    let dir = create_test_dir("warmup");
    let prefix = dir.path().join("run");
    let mut config = test_config(&prefix, 52100);
    config.timing.warmup = Duration::from_secs(60);

    let orchestrator = Orchestrator::new(config).expect("valid config");
    let shutdown = orchestrator.shutdown_handle();

    println!("Step 1: Starting orchestrator, interrupt once both loggers are up...");
    let server_log = orchestrator.layout().control_log(Role::ServerControl);
    let client_log = orchestrator.layout().control_log(Role::ClientControl);
    tokio::spawn(async move {
        let deadline = Instant::now() + Duration::from_secs(20);
        while Instant::now() < deadline && !(server_log.exists() && client_log.exists()) {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        tokio::time::sleep(Duration::from_millis(300)).await;
        shutdown.signal_shutdown();
    });

    let started = Instant::now();
    let result = tokio::time::timeout(Duration::from_secs(40), orchestrator.run())
        .await
        .expect("orchestrator hung during shutdown");
    result.expect("interrupted startup is not an error");
    println!("✓ Orchestrator returned after {:?}\n", started.elapsed());

    println!("Step 2: Verifying every started process has exited...");
    let started_roles = assert_all_stopped(&prefix);
    assert!(started_roles.contains(&Role::ServerServe));
    assert!(started_roles.contains(&Role::ServerControl));
    assert!(started_roles.contains(&Role::ClientControl));
    assert!(
        !started_roles.contains(&Role::ClientFetch),
        "fetcher must not start before warm-up completes"
    );
    println!("✓ All processes stopped, fetcher never started\n");

    println!("Step 3: Verifying key material was removed...");
    assert!(!orchestrator.layout().hs_dir().exists());
    println!("✓ Identity directory removed\n");
}

#[tokio::test]
async fn test_shutdown_while_endpoint_unpublished() {
    println!("\n========================================");
    println!("TEST: Shutdown While Endpoint Unpublished");
    println!("========================================\n");
    init_tracing();

    let dir = create_test_dir("unpublished");
    let prefix = dir.path().join("run");
    let mut config = test_config(&prefix, 52200);
    config.timing.endpoint_timeout = Duration::from_secs(120);
    config
        .server
        .extra_config
        .push("# fakeservice: no-hostname".to_string());

    let orchestrator = Orchestrator::new(config).expect("valid config");
    let shutdown = orchestrator.shutdown_handle();

    println!("Step 1: Interrupting while the endpoint wait is pending...");
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(1500)).await;
        shutdown.signal_shutdown();
    });

    let started = Instant::now();
    tokio::time::timeout(Duration::from_secs(30), orchestrator.run())
        .await
        .expect("orchestrator hung waiting for the endpoint")
        .expect("interrupted startup is not an error");
    assert!(started.elapsed() < Duration::from_secs(20));
    println!("✓ Orchestrator returned after {:?}\n", started.elapsed());

    println!("Step 2: Verifying processes stopped and client side never started...");
    let started_roles = assert_all_stopped(&prefix);
    assert!(started_roles.contains(&Role::ServerControl));
    assert!(!started_roles.contains(&Role::ClientControl));
    assert!(!started_roles.contains(&Role::ClientFetch));
    assert!(!orchestrator.layout().hs_dir().exists());
    println!("✓ Clean shutdown without a published endpoint\n");
}

#[tokio::test]
async fn test_unpublished_endpoint_fails_startup() {
    init_tracing();

    let dir = create_test_dir("endpoint-timeout");
    let prefix = dir.path().join("run");
    let mut config = test_config(&prefix, 52300);
    config.timing.endpoint_timeout = Duration::from_millis(500);
    config
        .server
        .extra_config
        .push("# fakeservice: no-hostname".to_string());

    let orchestrator = Orchestrator::new(config).expect("valid config");
    let err = tokio::time::timeout(Duration::from_secs(30), orchestrator.run())
        .await
        .expect("orchestrator hung")
        .expect_err("missing endpoint must fail startup");

    assert!(matches!(err, hsperf_measurement::Error::Endpoint { .. }));
    assert_all_stopped(&prefix);
}
