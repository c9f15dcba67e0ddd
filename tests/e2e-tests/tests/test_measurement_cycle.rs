//! Test Scenario: Full measurement cycle
//!
//! Runs the orchestrator against FAKESERVICE long enough for several
//! transfers, then interrupts it and checks the artifacts a run leaves
//! behind.

use e2e_tests::{assert_all_stopped, create_test_dir, init_tracing, read_event_log, test_config};
use hsperf_measurement::{count_completed_transfers, Orchestrator, Role};
use std::time::{Duration, Instant};

#[tokio::test]
async fn test_measurement_cycle() {
    println!("\n========================================");
    println!("TEST: Measurement Cycle");
    println!("========================================\n");
    init_tracing();

    let dir = create_test_dir("cycle");
    let prefix = dir.path().join("run");
    let config = test_config(&prefix, 52400);
    let orchestrator = Orchestrator::new(config).expect("valid config");
    let layout = orchestrator.layout().clone();
    let shutdown = orchestrator.shutdown_handle();

    println!("Step 1: Running until at least 4 transfers completed...");
    let fetch_log = layout.tgen_log(Role::ClientFetch);
    let watcher_log = fetch_log.clone();
    tokio::spawn(async move {
        let deadline = Instant::now() + Duration::from_secs(30);
        while Instant::now() < deadline {
            if count_completed_transfers(&watcher_log).unwrap_or(0) >= 4 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        shutdown.signal_shutdown();
    });

    tokio::time::timeout(Duration::from_secs(60), orchestrator.run())
        .await
        .expect("orchestrator hung")
        .expect("measurement run failed");

    let completed = count_completed_transfers(&fetch_log).unwrap();
    assert!(completed >= 4, "only {} transfers completed", completed);
    println!("✓ {} transfers completed\n", completed);

    println!("Step 2: Verifying sizes were cycled...");
    let fetch_output = std::fs::read_to_string(&fetch_log).unwrap();
    assert!(fetch_output.contains("size=1 KiB"));
    assert!(fetch_output.contains("size=2 KiB"));
    assert!(fetch_output.contains("peer=fakeservicexyz.onion:8080"));
    println!("✓ Both sizes fetched from the published endpoint\n");

    println!("Step 3: Verifying control-event logs...");
    for role in [Role::ServerControl, Role::ClientControl] {
        let events = read_event_log(&layout.control_log(role));
        assert!(!events.is_empty(), "no events logged for {}", role);
        assert!(events.iter().any(|e| e.raw.starts_with("650 BW ")));
        assert!(
            events.windows(2).all(|w| w[0].epoch < w[1].epoch),
            "timestamps not strictly increasing for {}",
            role
        );
        println!("✓ {} events logged for {}", events.len(), role);
    }
    println!();

    println!("Step 4: Verifying shutdown cleanup...");
    let started = assert_all_stopped(&prefix);
    assert_eq!(started.len(), 4);
    assert!(!layout.hs_dir().exists());
    println!("✓ All four processes stopped and identity directory removed\n");
}
