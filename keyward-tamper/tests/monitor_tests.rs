use keyward_tamper::{Finding, TamperConfig, TamperMonitor};
use keyward_types::{EngineEvent, ResponseAction, Severity, TamperKind};
use serde_json::json;
use std::time::Duration;
use tokio::sync::broadcast;

fn finding(kind: TamperKind, severity: Severity) -> Finding {
    Finding {
        kind,
        severity,
        description: format!("{kind:?} observed"),
        details: json!({}),
    }
}

fn monitor_with(response: ResponseAction) -> (TamperMonitor, broadcast::Receiver<EngineEvent>) {
    let (tx, rx) = broadcast::channel(32);
    let config = TamperConfig {
        response,
        max_detections: 3,
        exit_delay: Duration::from_millis(250),
        ..TamperConfig::default()
    };
    (TamperMonitor::new(config, tx), rx)
}

// ── Event publication ────────────────────────────────────────────

#[tokio::test]
async fn log_only_still_publishes_detection() {
    let (monitor, mut rx) = monitor_with(ResponseAction::LogOnly);

    monitor
        .report(finding(TamperKind::DebugTooling, Severity::Medium))
        .await;

    match rx.recv().await.unwrap() {
        EngineEvent::TamperDetected(d) => {
            assert_eq!(d.kind, TamperKind::DebugTooling);
            assert_eq!(d.severity, Severity::Medium);
            assert_eq!(d.response, ResponseAction::LogOnly);
        }
        other => panic!("unexpected event: {other:?}"),
    }

    // No secondary event for LogOnly.
    assert!(rx.try_recv().is_err());
    assert_eq!(monitor.detection_count(), 1);
}

#[tokio::test]
async fn disable_features_emits_secondary_event() {
    let (monitor, mut rx) = monitor_with(ResponseAction::DisableFeatures);

    monitor
        .report(finding(TamperKind::DebuggerAttached, Severity::High))
        .await;

    assert!(matches!(
        rx.recv().await.unwrap(),
        EngineEvent::TamperDetected(_)
    ));
    assert!(matches!(
        rx.recv().await.unwrap(),
        EngineEvent::FeaturesDisabled { .. }
    ));
}

// ── Exit escalation ──────────────────────────────────────────────

#[tokio::test]
async fn critical_finding_schedules_exit() {
    let (monitor, mut rx) = monitor_with(ResponseAction::ExitApplication);

    monitor
        .report(finding(TamperKind::IntegrityViolation, Severity::Critical))
        .await;

    assert!(matches!(
        rx.recv().await.unwrap(),
        EngineEvent::TamperDetected(_)
    ));
    match rx.recv().await.unwrap() {
        EngineEvent::ExitRequired { delay, .. } => {
            assert_eq!(delay, Duration::from_millis(250));
        }
        other => panic!("unexpected event: {other:?}"),
    }
}

#[tokio::test]
async fn low_severity_exits_only_at_threshold() {
    let (monitor, mut rx) = monitor_with(ResponseAction::ExitApplication);

    // Two low findings: recorded, no exit (threshold is 3).
    for _ in 0..2 {
        monitor
            .report(finding(TamperKind::VirtualMachine, Severity::Low))
            .await;
        assert!(matches!(
            rx.recv().await.unwrap(),
            EngineEvent::TamperDetected(_)
        ));
        assert!(rx.try_recv().is_err());
    }

    // Third crosses the counter threshold.
    monitor
        .report(finding(TamperKind::VirtualMachine, Severity::Low))
        .await;
    assert!(matches!(
        rx.recv().await.unwrap(),
        EngineEvent::TamperDetected(_)
    ));
    assert!(matches!(
        rx.recv().await.unwrap(),
        EngineEvent::ExitRequired { .. }
    ));
    assert_eq!(monitor.detection_count(), 3);
}

// ── Revoke / alert routing ───────────────────────────────────────

#[tokio::test]
async fn revoke_and_alert_emit_their_events() {
    let (monitor, mut rx) = monitor_with(ResponseAction::RevokeLicense);
    monitor
        .report(finding(TamperKind::ProcessHollowing, Severity::Critical))
        .await;
    rx.recv().await.unwrap(); // TamperDetected
    assert!(matches!(
        rx.recv().await.unwrap(),
        EngineEvent::LicenseRevoked { .. }
    ));

    let (monitor, mut rx) = monitor_with(ResponseAction::AlertServer);
    monitor
        .report(finding(TamperKind::DebuggerAttached, Severity::High))
        .await;
    rx.recv().await.unwrap();
    assert!(matches!(
        rx.recv().await.unwrap(),
        EngineEvent::ServerAlert { .. }
    ));
}

// ── Detection log ────────────────────────────────────────────────

#[tokio::test]
async fn detections_are_retained_and_counted_across_kinds() {
    let (monitor, _rx) = monitor_with(ResponseAction::LogOnly);

    monitor
        .report(finding(TamperKind::DebugTooling, Severity::Medium))
        .await;
    monitor
        .report(finding(TamperKind::VirtualMachine, Severity::Low))
        .await;

    let detections = monitor.detections().await;
    assert_eq!(detections.len(), 2);
    assert!(detections.iter().all(|d| d.handled));
    assert_eq!(monitor.detection_count(), 2);
}

#[tokio::test]
async fn detection_log_drops_oldest_past_the_cap() {
    let (tx, _rx) = broadcast::channel(32);
    let config = TamperConfig {
        max_detection_log: 3,
        ..TamperConfig::default()
    };
    let monitor = TamperMonitor::new(config, tx);

    // A persistent condition reports on every probe tick; the log must
    // stay bounded while the counter keeps the true total.
    for i in 0..5 {
        monitor
            .report(Finding {
                kind: TamperKind::DebuggerAttached,
                severity: Severity::High,
                description: format!("tick {i}"),
                details: json!({}),
            })
            .await;
    }

    let detections = monitor.detections().await;
    assert_eq!(detections.len(), 3);
    assert_eq!(detections[0].description, "tick 2");
    assert_eq!(detections[2].description, "tick 4");
    assert_eq!(monitor.detection_count(), 5);
}

#[tokio::test]
async fn shutdown_clears_timers() {
    let (mut monitor, _rx) = monitor_with(ResponseAction::LogOnly);
    monitor.start();
    monitor.shutdown();
    // Safe to call twice.
    monitor.shutdown();
}
