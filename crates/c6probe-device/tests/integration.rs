//! End-to-end tests against the simulated board.
//!
//! Every test goes through the real `StreamTransport` and `LineCodec`, so echo
//! filtering and timeouts are exercised the same way as on a serial port.

use std::time::{Duration, Instant};

use approx::assert_relative_eq;
use c6probe_device::{
    apply, probe, ApplyOutcome, DeviceError, Endpoint, EntryStatus, KeyCalls, OrderingPolicy, Phase,
    ProbeOutcome, RejectReason, RunPlan, Session, SessionConfig, SessionController, SimulatedDevice,
};
use c6probe_model::{ChangeRequest, ConfigValue, KeyCatalog};

fn fast_config() -> SessionConfig {
    SessionConfig {
        command_timeout: Duration::from_millis(40),
        read_retries: 1,
        deadline: None,
    }
}

fn open(device: &SimulatedDevice) -> Session {
    Session::connect(&Endpoint::Simulated(device.clone()), fast_config())
        .expect("simulated connect")
}

#[test]
fn test_probe_reports_every_candidate_in_order() {
    let device = SimulatedDevice::esp32c6().without("mtu");
    let catalog = KeyCatalog::esp32c6();
    let mut session = open(&device);

    let results = probe(&mut session, catalog.keys()).unwrap();

    let names: Vec<&str> = results.iter().map(|r| r.key.as_str()).collect();
    let expected: Vec<&str> = catalog.names().collect();
    assert_eq!(names, expected);
    assert_eq!(
        results.iter().find(|r| r.key == "mtu").map(|r| &r.outcome),
        Some(&ProbeOutcome::Unsupported)
    );
    assert!(results.iter().filter(|r| r.key != "mtu").all(|r| r.outcome.is_supported()));
}

#[test]
fn test_reference_scenario() {
    let device = SimulatedDevice::new().with_value("channel", "3").with_value("pm", "1");
    let catalog = KeyCatalog::esp32c6();
    let keys = catalog.subset(&["channel", "txpower", "pm"]).unwrap();
    let mut session = open(&device);

    let results = probe(&mut session, &keys).unwrap();
    let outcomes: Vec<ProbeOutcome> = results.into_iter().map(|r| r.outcome).collect();
    assert_eq!(
        outcomes,
        vec![
            ProbeOutcome::Supported(ConfigValue::Integer(3)),
            ProbeOutcome::Unsupported,
            ProbeOutcome::Supported(ConfigValue::Integer(1)),
        ]
    );

    let request = ChangeRequest::new().set("txpower", 15.0);
    let applied = apply(&mut session, &catalog, &request, OrderingPolicy::default()).unwrap();
    assert_eq!(applied.len(), 1);
    assert_eq!(
        applied[0].outcome,
        ApplyOutcome::Rejected(RejectReason::ParameterUnsupported)
    );
    assert_eq!(device.calls_for("txpower").sets, 0);
}

#[test]
fn test_reapplying_is_unchanged() {
    let device = SimulatedDevice::esp32c6();
    let catalog = KeyCatalog::esp32c6();
    let request = ChangeRequest::new().set("channel", 6).set("pm", 2);
    let mut session = open(&device);

    let first = apply(&mut session, &catalog, &request, OrderingPolicy::default()).unwrap();
    assert!(first.iter().all(|r| r.outcome == ApplyOutcome::Applied));
    assert_eq!(device.calls_for("channel").sets, 1);

    let second = apply(&mut session, &catalog, &request, OrderingPolicy::default()).unwrap();
    assert!(second.iter().all(|r| r.outcome == ApplyOutcome::Unchanged));
    assert_eq!(device.calls_for("channel").sets, 1);
    assert_eq!(device.calls_for("pm").sets, 1);
}

#[test]
fn test_quantized_write_is_confirmed_within_tolerance() {
    let device = SimulatedDevice::esp32c6();
    let catalog = KeyCatalog::esp32c6();
    let mut session = open(&device);

    let request = ChangeRequest::new().set("txpower", 15.1);
    let results = apply(&mut session, &catalog, &request, OrderingPolicy::default()).unwrap();

    assert_eq!(results[0].outcome, ApplyOutcome::Applied);
    let observed = results[0].observed.as_ref().and_then(ConfigValue::as_f64).unwrap();
    assert_relative_eq!(observed, 15.0);
    assert_eq!(device.value("txpower").as_deref(), Some("15"));
}

#[test]
fn test_local_rejections_send_nothing() {
    let device = SimulatedDevice::esp32c6();
    let catalog = KeyCatalog::esp32c6();
    let mut session = open(&device);

    let request = ChangeRequest::new()
        .set("channel", 99)
        .set("mac", "00:00:00:00:00:00")
        .set("warp_drive", 1)
        .set("cpu_freq", "240");
    let results = apply(&mut session, &catalog, &request, OrderingPolicy::default()).unwrap();

    let codes: Vec<&str> = results
        .iter()
        .map(|r| match &r.outcome {
            ApplyOutcome::Rejected(reason) => reason.code(),
            other => panic!("expected rejection, got {:?}", other),
        })
        .collect();
    assert_eq!(codes, vec!["out_of_domain", "read_only", "unknown_key", "out_of_domain"]);

    for key in ["channel", "mac", "warp_drive", "cpu_freq"] {
        assert_eq!(device.calls_for(key), KeyCalls::default(), "{} reached the board", key);
    }
    assert_eq!(device.total_commands(), 0);
}

#[test]
fn test_silent_key_does_not_disturb_later_keys() {
    let device = SimulatedDevice::esp32c6().silent_on("pm");
    let catalog = KeyCatalog::esp32c6();
    let keys = catalog.subset(&["channel", "pm", "mtu", "hostname"]).unwrap();
    let mut session = open(&device);

    let results = probe(&mut session, &keys).unwrap();

    assert_eq!(results[0].outcome, ProbeOutcome::Supported(ConfigValue::Integer(1)));
    assert!(matches!(&results[1].outcome, ProbeOutcome::Errored(msg) if msg.contains("timeout")));
    assert_eq!(results[2].outcome, ProbeOutcome::Supported(ConfigValue::Integer(23)));
    assert_eq!(
        results[3].outcome,
        ProbeOutcome::Supported(ConfigValue::Text("esp32c6".to_string()))
    );
    // One attempt plus one retry
    assert_eq!(device.calls_for("pm").gets, 2);
}

#[test]
fn test_late_reply_stays_with_its_own_key() {
    let device = SimulatedDevice::esp32c6()
        .with_value("pm", "2")
        .with_value("channel", "7")
        .answering_late_on("pm");
    let catalog = KeyCatalog::esp32c6();
    let keys = catalog.subset(&["pm", "channel", "mtu"]).unwrap();
    let mut session = open(&device);

    let results = probe(&mut session, &keys).unwrap();

    assert!(matches!(&results[0].outcome, ProbeOutcome::Errored(msg) if msg.contains("timeout")));
    assert_eq!(results[1].outcome, ProbeOutcome::Supported(ConfigValue::Integer(7)));
    assert_eq!(results[2].outcome, ProbeOutcome::Supported(ConfigValue::Integer(23)));
}

#[test]
fn test_late_reply_is_not_taken_as_current_value() {
    // The reply held back for `reconnects` must not be read as the current `pm`
    let device = SimulatedDevice::esp32c6()
        .with_value("pm", "2")
        .answering_late_on("reconnects");
    let catalog = KeyCatalog::esp32c6();
    let keys = catalog.subset(&["reconnects"]).unwrap();
    let mut session = open(&device);
    probe(&mut session, &keys).unwrap();

    let request = ChangeRequest::new().set("pm", 0);
    let results = apply(&mut session, &catalog, &request, OrderingPolicy::default()).unwrap();

    assert_eq!(results[0].previous, Some(ConfigValue::Integer(2)));
    assert_eq!(results[0].outcome, ApplyOutcome::Applied);
    assert_eq!(device.value("pm").as_deref(), Some("0"));
}

#[test]
fn test_read_retry_recovers_from_one_timeout() {
    let device = SimulatedDevice::esp32c6().silent_for("channel", 1);
    let catalog = KeyCatalog::esp32c6();
    let keys = catalog.subset(&["channel"]).unwrap();
    let mut session = open(&device);

    let results = probe(&mut session, &keys).unwrap();
    assert_eq!(results[0].outcome, ProbeOutcome::Supported(ConfigValue::Integer(1)));
    assert_eq!(device.calls_for("channel").gets, 2);
}

#[test]
fn test_unconfirmed_write_is_rolled_back() {
    let device = SimulatedDevice::esp32c6().ignoring_writes_to("channel");
    let catalog = KeyCatalog::esp32c6();
    let mut session = open(&device);

    let request = ChangeRequest::new().set("channel", 6);
    let results = apply(&mut session, &catalog, &request, OrderingPolicy::default()).unwrap();

    assert_eq!(
        results[0].outcome,
        ApplyOutcome::Rejected(RejectReason::NotConfirmed {
            observed: Some(ConfigValue::Integer(1))
        })
    );
    assert_eq!(results[0].previous, Some(ConfigValue::Integer(1)));
    assert_eq!(results[0].rolled_back, Some(true));
    // Requested write plus the rollback
    assert_eq!(device.calls_for("channel").sets, 2);
}

#[test]
fn test_prerequisites_are_applied_first() {
    let catalog = KeyCatalog::esp32c6();
    let request = ChangeRequest::new()
        .set("gap_name", "sensor-7")
        .set("pm", 0)
        .set("ble.active", true);

    let device = SimulatedDevice::esp32c6();
    let mut session = open(&device);
    let ordered = apply(&mut session, &catalog, &request, OrderingPolicy::Dependencies).unwrap();
    let names: Vec<&str> = ordered.iter().map(|r| r.key.as_str()).collect();
    assert_eq!(names, vec!["pm", "ble.active", "gap_name"]);
    assert!(ordered.iter().all(|r| r.outcome == ApplyOutcome::Applied));
    assert_eq!(device.value("ble.active").as_deref(), Some("1"));

    let device = SimulatedDevice::esp32c6();
    let mut session = open(&device);
    let as_given = apply(&mut session, &catalog, &request, OrderingPolicy::RequestOrder).unwrap();
    let names: Vec<&str> = as_given.iter().map(|r| r.key.as_str()).collect();
    assert_eq!(names, vec!["gap_name", "pm", "ble.active"]);
}

#[test]
fn test_out_of_band_changes_are_seen() {
    let device = SimulatedDevice::esp32c6();
    let catalog = KeyCatalog::esp32c6();
    let keys = catalog.subset(&["channel"]).unwrap();
    let mut session = open(&device);

    let first = probe(&mut session, &keys).unwrap();
    device.set_value("channel", "11");
    let second = probe(&mut session, &keys).unwrap();

    assert_eq!(first[0].outcome.value(), Some(&ConfigValue::Integer(1)));
    assert_eq!(second[0].outcome.value(), Some(&ConfigValue::Integer(11)));
}

#[test]
fn test_controller_run_with_changes() {
    let device = SimulatedDevice::esp32c6().without("txpower");
    let controller = SessionController::new(KeyCatalog::esp32c6(), fast_config());
    let plan = RunPlan::probe_all()
        .with_keys(["channel", "txpower", "pm"])
        .with_changes(ChangeRequest::new().set("channel", 6).set("txpower", 15.0));

    let outcome = controller.run(&Endpoint::Simulated(device.clone()), &plan).unwrap();

    assert_eq!(outcome.endpoint, "simulated");
    assert_eq!(outcome.device.version.as_deref(), Some("v1.24.1"));
    assert_eq!(outcome.before.get("channel"), Some(&ConfigValue::Integer(1)));
    let after = outcome.after.as_ref().unwrap();
    assert_eq!(after.get("channel"), Some(&ConfigValue::Integer(6)));
    assert_eq!(outcome.changes.len(), 1);
    assert_eq!(outcome.changes[0].key, "channel");

    let report = &outcome.report;
    assert_eq!(report.entries().len(), 5);
    assert_eq!(report.count(EntryStatus::Unsupported), 1);
    assert_eq!(report.count(EntryStatus::Applied), 1);
    assert_eq!(report.count(EntryStatus::Rejected), 1);
    assert!(outcome.has_failures());
}

#[test]
fn test_failed_second_read_is_reported_not_diffed() {
    let device = SimulatedDevice::esp32c6().silent_after("pm", 1);
    let controller = SessionController::new(KeyCatalog::esp32c6(), fast_config());
    let plan = RunPlan::probe_all()
        .with_keys(["channel", "pm"])
        .with_changes(ChangeRequest::new().set("channel", 6));

    let outcome = controller.run(&Endpoint::Simulated(device), &plan).unwrap();

    assert_eq!(outcome.before.get("pm"), Some(&ConfigValue::Integer(1)));
    assert!(outcome.after.as_ref().unwrap().get("pm").is_none());
    let changed: Vec<&str> = outcome.changes.iter().map(|c| c.key.as_str()).collect();
    assert_eq!(changed, vec!["channel"]);

    let rechecked: Vec<_> = outcome.report.phase(Phase::Recheck).collect();
    assert_eq!(rechecked.len(), 1);
    assert_eq!(rechecked[0].key, "pm");
    assert_eq!(rechecked[0].status, EntryStatus::Errored);
    assert!(outcome.has_failures());
}

#[test]
fn test_deadline_expiring_mid_probe_keeps_report_complete() {
    let device = SimulatedDevice::esp32c6().silent_on("pm");
    let config = SessionConfig {
        command_timeout: Duration::from_secs(5),
        read_retries: 1,
        deadline: Some(Instant::now() + Duration::from_millis(300)),
    };
    let controller = SessionController::new(KeyCatalog::esp32c6(), config);
    let plan = RunPlan::probe_all().with_keys(["channel", "pm", "mtu", "cpu_freq"]);

    let started = Instant::now();
    let outcome = controller.run(&Endpoint::Simulated(device.clone()), &plan).unwrap();
    assert!(started.elapsed() < Duration::from_secs(2));

    let statuses: Vec<EntryStatus> = outcome.report.entries().iter().map(|e| e.status).collect();
    assert_eq!(
        statuses,
        vec![
            EntryStatus::Supported,
            EntryStatus::Errored,
            EntryStatus::Errored,
            EntryStatus::Errored,
        ]
    );
    assert_eq!(outcome.before.len(), 1);
    assert!(outcome.has_failures());
    // Keys after the deadline are never sent
    assert_eq!(device.calls_for("pm").gets, 1);
    assert_eq!(device.calls_for("mtu"), KeyCalls::default());
    assert_eq!(device.calls_for("cpu_freq"), KeyCalls::default());
}

#[test]
fn test_controller_probe_only_succeeds() {
    let device = SimulatedDevice::esp32c6();
    let controller = SessionController::new(KeyCatalog::esp32c6(), fast_config());

    let outcome = controller.run(&Endpoint::Simulated(device), &RunPlan::probe_all()).unwrap();

    assert!(outcome.after.is_none());
    assert!(outcome.changes.is_empty());
    assert_eq!(outcome.before.len(), KeyCatalog::esp32c6().len());
    assert!(!outcome.has_failures());
}

#[test]
fn test_unknown_probe_key_fails_before_connecting() {
    let device = SimulatedDevice::esp32c6();
    let controller = SessionController::new(KeyCatalog::esp32c6(), fast_config());
    let plan = RunPlan::probe_all().with_keys(["channel", "warp_drive"]);

    let err = controller.run(&Endpoint::Simulated(device.clone()), &plan).unwrap_err();
    assert!(matches!(err, DeviceError::Model(_)));
    assert_eq!(device.total_commands(), 0);
}

#[test]
fn test_missing_port_is_fatal() {
    let controller = SessionController::new(KeyCatalog::esp32c6(), fast_config());
    let endpoint = Endpoint::serial("/dev/c6probe-does-not-exist");

    let err = controller.run(&endpoint, &RunPlan::probe_all()).unwrap_err();
    assert!(err.is_fatal(), "expected connection error, got {:?}", err);
}
