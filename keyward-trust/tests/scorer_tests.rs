use chrono::{Duration, TimeZone, Utc};
use keyward_trust::{
    calculate_trust_score, DeviceSignals, GeoPoint, TrustConfig, TrustStore, FACTOR_WEIGHTS,
};
use keyward_types::DeviceId;

fn device() -> DeviceId {
    DeviceId::new("fp-0011aabb")
}

fn now() -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 6, 1, 9, 0, 0).unwrap()
}

/// Signals for a healthy, month-old, well-used device.
fn healthy_signals() -> DeviceSignals {
    let mut s = DeviceSignals::new(now() - Duration::days(45));
    s.session_count = 80;
    s.hours_used = 120;
    s.security_software_current = true;
    s.compliance_passed = 4;
    s.compliance_total = 4;
    s
}

// ── Determinism and normalization ────────────────────────────────

#[test]
fn weights_sum_to_100() {
    let total: u32 = FACTOR_WEIGHTS.iter().map(|(_, w)| w).sum();
    assert_eq!(total, 100);
}

#[test]
fn score_is_deterministic() {
    let signals = healthy_signals();
    let a = calculate_trust_score(&device(), &signals, now());
    let b = calculate_trust_score(&device(), &signals, now());
    assert_eq!(a.score, b.score);
    assert_eq!(a.factors, b.factors);
}

#[test]
fn factor_snapshot_is_weight_normalized() {
    let snapshot = calculate_trust_score(&device(), &healthy_signals(), now());
    assert_eq!(snapshot.total_weight(), 100);
    assert!(snapshot.score <= 100);
    for factor in &snapshot.factors {
        assert!(factor.score <= 100, "{} out of range", factor.name);
    }
}

#[test]
fn healthy_device_scores_high() {
    let snapshot = calculate_trust_score(&device(), &healthy_signals(), now());
    assert!(snapshot.score >= 90, "got {}", snapshot.score);
}

// ── Individual factors ───────────────────────────────────────────

#[test]
fn age_saturates_at_30_days() {
    let month_old = calculate_trust_score(
        &device(),
        &DeviceSignals::new(now() - Duration::days(30)),
        now(),
    );
    let year_old = calculate_trust_score(
        &device(),
        &DeviceSignals::new(now() - Duration::days(365)),
        now(),
    );
    let age = |s: &keyward_types::DeviceTrustScore| {
        s.factors.iter().find(|f| f.name == "age").unwrap().score
    };
    assert_eq!(age(&month_old), 100);
    assert_eq!(age(&year_old), 100);

    let fresh = calculate_trust_score(&device(), &DeviceSignals::new(now()), now());
    assert_eq!(age(&fresh), 0);
}

#[test]
fn jailbreak_strictly_lowers_posture() {
    let clean = healthy_signals();
    let mut rooted = healthy_signals();
    rooted.jailbroken = true;

    let posture = |signals: &DeviceSignals| {
        calculate_trust_score(&device(), signals, now())
            .factors
            .iter()
            .find(|f| f.name == "security_posture")
            .unwrap()
            .score
    };

    assert!(posture(&rooted) < posture(&clean));
}

#[test]
fn posture_floors_at_zero() {
    let mut s = healthy_signals();
    s.debugger_detected = true;
    s.jailbroken = true;
    s.virtual_machine = true;
    s.active_threats = 10;
    s.security_software_current = false;

    let snapshot = calculate_trust_score(&device(), &s, now());
    let posture = snapshot
        .factors
        .iter()
        .find(|f| f.name == "security_posture")
        .unwrap();
    assert_eq!(posture.score, 0);
}

#[test]
fn compliance_is_a_fraction() {
    let mut s = healthy_signals();
    s.compliance_passed = 1;
    s.compliance_total = 4;
    let snapshot = calculate_trust_score(&device(), &s, now());
    let compliance = snapshot
        .factors
        .iter()
        .find(|f| f.name == "compliance")
        .unwrap();
    assert_eq!(compliance.score, 25);
}

#[test]
fn distant_locations_lower_consistency() {
    let mut local = healthy_signals();
    local.recent_locations = vec![
        GeoPoint { lat: 48.85, lon: 2.35 },
        GeoPoint { lat: 48.86, lon: 2.34 },
    ];
    let mut roaming = healthy_signals();
    roaming.recent_locations = vec![
        GeoPoint { lat: 48.85, lon: 2.35 },
        GeoPoint { lat: 35.68, lon: 139.69 },
    ];

    let consistency = |signals: &DeviceSignals| {
        calculate_trust_score(&device(), signals, now())
            .factors
            .iter()
            .find(|f| f.name == "location_consistency")
            .unwrap()
            .score
    };

    assert_eq!(consistency(&local), 100);
    assert!(consistency(&roaming) < consistency(&local));
}

// ── Store, history, quarantine ───────────────────────────────────

#[test]
fn history_appends_only_on_change() {
    let mut store = TrustStore::new(TrustConfig::default());
    store.register(device(), healthy_signals());

    let first = store.recompute(&device(), now(), "initial").unwrap();
    assert!(first.history.is_empty());

    // Same signals, same score: still no history entry.
    let second = store
        .recompute(&device(), now() + Duration::hours(1), "periodic")
        .unwrap();
    assert_eq!(second.score, first.score);
    assert!(second.history.is_empty());

    // Posture change moves the score: exactly one entry, with the delta.
    store
        .update_signals(&device(), |s| s.jailbroken = true)
        .unwrap();
    let third = store
        .recompute(&device(), now() + Duration::hours(2), "jailbreak detected")
        .unwrap();
    assert!(third.score < first.score);
    assert_eq!(third.history.len(), 1);

    let change = &third.history[0];
    assert_eq!(change.old_score, first.score);
    assert_eq!(change.new_score, third.score);
    assert_eq!(change.delta, third.score as i32 - first.score as i32);
    assert_eq!(change.cause, "jailbreak detected");
}

#[test]
fn history_is_never_rewritten() {
    let mut store = TrustStore::new(TrustConfig::default());
    store.register(device(), healthy_signals());
    store.recompute(&device(), now(), "initial").unwrap();

    store
        .update_signals(&device(), |s| s.jailbroken = true)
        .unwrap();
    let after_jailbreak = store
        .recompute(&device(), now() + Duration::hours(1), "jailbreak")
        .unwrap();

    store
        .update_signals(&device(), |s| s.jailbroken = false)
        .unwrap();
    let recovered = store
        .recompute(&device(), now() + Duration::hours(2), "cleared")
        .unwrap();

    assert_eq!(recovered.history.len(), 2);
    assert_eq!(recovered.history[0], after_jailbreak.history[0]);
}

#[test]
fn quarantine_below_floor() {
    let mut store = TrustStore::new(TrustConfig {
        quarantine_floor: 40,
        ..TrustConfig::default()
    });

    let mut bad = DeviceSignals::new(now());
    bad.debugger_detected = true;
    bad.jailbroken = true;
    bad.active_threats = 5;
    bad.compliance_passed = 0;
    bad.compliance_total = 4;

    store.register(device(), bad);
    let snapshot = store.recompute(&device(), now(), "initial").unwrap();
    assert!(snapshot.score < 40, "got {}", snapshot.score);
    assert!(store.is_quarantined(&device()));
}

#[test]
fn unknown_device_is_an_error() {
    let mut store = TrustStore::new(TrustConfig::default());
    assert!(store.recompute(&device(), now(), "x").is_err());
}
