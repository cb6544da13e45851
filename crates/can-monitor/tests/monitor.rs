//! End-to-end runs of the monitor loop against the simulated controller

use can_monitor::{init_logging, run, Monitor, MonitorConfig};
use std::thread;
use std::time::{Duration, Instant};

fn quiet_config() -> MonitorConfig {
    MonitorConfig {
        heartbeat: false,
        ..Default::default()
    }
}

fn wait_until(mut done: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !done() {
        assert!(Instant::now() < deadline, "timed out waiting for the ISR thread");
        thread::sleep(Duration::from_millis(1));
    }
}

fn count(output: &str, needle: &str) -> usize {
    output.lines().filter(|line| line.contains(needle)).count()
}

#[test]
fn test_tick_reports_injected_frames() {
    let mut monitor = Monitor::start(quiet_config(), Vec::new()).unwrap();

    assert!(monitor.controller().inject_data(0x123, &[0x01, 0x02]));
    assert!(monitor.controller().inject_data(0x7FF, &[]));
    wait_until(|| monitor.context().stats().rx_queued == 2);

    let report = monitor.tick().unwrap();
    assert_eq!(report.received, 2);
    assert_eq!(report.sent, 0);
    assert_eq!(report.dropped, 0);

    let (stats, out) = monitor.shutdown().unwrap();
    let output = String::from_utf8(out).unwrap();
    assert!(output.contains(":CAN:Received msg num[1] from [123]: 01 02\n"));
    assert!(output.contains(":CAN:Received msg num[2] from [7FF]:\n"));
    assert_eq!(stats.rx_queued, 2);
    assert_eq!(stats.rx_sequence, 2);
}

#[test]
fn test_empty_tick_prints_notice() {
    let mut monitor = Monitor::start(quiet_config(), Vec::new()).unwrap();

    let report = monitor.tick().unwrap();
    assert_eq!(report, Default::default());
    assert_eq!(monitor.ticks(), 1);

    let (_, out) = monitor.shutdown().unwrap();
    let output = String::from_utf8(out).unwrap();
    assert_eq!(count(&output, "RX Buffer is empty"), 1);
}

#[test]
fn test_heartbeat_loops_back() {
    let mut monitor = Monitor::start(MonitorConfig::default(), Vec::new()).unwrap();

    let first = monitor.tick().unwrap();
    assert_eq!(first.sent, 1);
    assert_eq!(first.failed, 0);

    wait_until(|| monitor.context().stats().rx_queued >= 1);
    let second = monitor.tick().unwrap();
    assert!(second.received >= 1);

    let (stats, out) = monitor.shutdown().unwrap();
    let output = String::from_utf8(out).unwrap();
    assert!(output.contains(":CAN:Sent msg num[1] to [FF] Data: 00 00 00 01\n"));
    assert!(output.contains(":CAN:Received msg num[1] from [FF]: 00 00 00 01\n"));
    assert_eq!(stats.tx_sent, 2);
    assert_eq!(stats.rx_queued, 2);
}

#[test]
fn test_transmit_failure_is_reported() {
    let mut monitor = Monitor::start(quiet_config(), Vec::new()).unwrap();
    monitor.controller().set_tx_busy(true);
    monitor.send(0x42, &[0xAA]).unwrap();

    let report = monitor.tick().unwrap();
    assert_eq!(report.sent, 0);
    assert_eq!(report.failed, 1);

    let (stats, out) = monitor.shutdown().unwrap();
    let output = String::from_utf8(out).unwrap();
    assert!(output.contains(":CAN:CAN Message Sending Error [2] on msg num[1] to [42]: TxFull\n"));
    assert_eq!(stats.tx_failed, 1);
}

#[test]
fn test_start_rejects_bad_bitrate() {
    let mut config = quiet_config();
    config.bus.bitrate = 0;

    assert!(Monitor::start(config, Vec::new()).is_err());
}

#[test]
fn test_start_rejects_extended_node_address() {
    let mut config = MonitorConfig::default();
    config.bus.node_address = 0x800;

    let err = Monitor::start(config, Vec::new()).unwrap_err();
    assert!(format!("{:#}", err).contains("identifier 0x800 out of range"));
}

#[test]
fn test_highest_standard_address_heartbeats() {
    let mut config = MonitorConfig::default();
    config.bus.node_address = 0x7FF;
    let mut monitor = Monitor::start(config, Vec::new()).unwrap();

    assert_eq!(monitor.tick().unwrap().sent, 1);

    let (_, out) = monitor.shutdown().unwrap();
    let output = String::from_utf8(out).unwrap();
    assert!(output.contains(":CAN:Sent msg num[1] to [7FF] Data: 00 00 00 01\n"));
}

#[test]
fn test_drop_detaches_interrupt_thread() {
    let monitor = Monitor::start(quiet_config(), Vec::new()).unwrap();
    let controller = monitor.controller().clone();
    assert!(controller.interrupts_attached());

    drop(monitor);
    assert!(!controller.interrupts_attached());
}

#[test]
fn test_init_logging_rejects_bad_level() {
    let config = MonitorConfig {
        log_level: "chatty".to_string(),
        ..Default::default()
    };

    assert!(init_logging(&config).is_err());
}

#[tokio::test(start_paused = true)]
async fn test_run_stops_after_tick_limit() {
    let config = MonitorConfig {
        ticks: Some(3),
        ..Default::default()
    };

    let (stats, out) = run(config, Vec::new()).await.unwrap();
    let output = String::from_utf8(out).unwrap();

    assert_eq!(stats.tx_sent, 3);
    assert_eq!(count(&output, "Sent msg num["), 3);
    // loopback frames still in flight at the last tick are printed on shutdown
    assert_eq!(count(&output, "Received msg num["), 3);
    assert_eq!(stats.rx_queued, 3);
}
