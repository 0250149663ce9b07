//! Device trust scoring.
//!
//! Five factors, each scored 0–100 independently, combined by weighted
//! average. The weights sum to exactly 100, so the composite is the
//! weight-normalized rounded integer. Scoring is deterministic: identical
//! signals always produce identical scores.
//!
//! The per-device change history is append-only. An entry is written only
//! when a recomputation actually changes the score, recording the delta
//! and the cause; entries are never rewritten.

use crate::error::{TrustError, TrustResult};
use chrono::{DateTime, Utc};
use keyward_types::{DeviceId, DeviceTrustScore, TrustFactor, TrustScoreChange};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, info};

/// Factor weights: (name, weight). Must sum to 100.
pub const FACTOR_WEIGHTS: [(&str, u32); 5] = [
    ("age", 20),
    ("usage", 25),
    ("security_posture", 30),
    ("compliance", 15),
    ("location_consistency", 10),
];

/// Age factor saturates once a device has been registered this long.
const AGE_SATURATION_DAYS: i64 = 30;

/// Security-posture deductions per active flag.
const PENALTY_DEBUGGER: i32 = 40;
const PENALTY_JAILBREAK: i32 = 50;
const PENALTY_VM: i32 = 20;
const PENALTY_PER_THREAT: i32 = 15;
const CREDIT_SECURITY_SOFTWARE: i32 = 10;

/// A recent geolocation sample, decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

/// The raw inputs to a trust-score computation for one device.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceSignals {
    /// When the device was registered.
    pub registered_at: DateTime<Utc>,
    /// Total recorded sessions.
    pub session_count: u64,
    /// Total recorded usage hours.
    pub hours_used: u64,
    /// A debugger was observed attached.
    pub debugger_detected: bool,
    /// The device is rooted/jailbroken.
    pub jailbroken: bool,
    /// The device appears to be a VM or emulator.
    pub virtual_machine: bool,
    /// Count of currently active threat findings.
    pub active_threats: u32,
    /// Up-to-date security software is present.
    pub security_software_current: bool,
    /// Compliance checks passed.
    pub compliance_passed: u32,
    /// Compliance checks evaluated.
    pub compliance_total: u32,
    /// Recent geolocation samples, newest last.
    pub recent_locations: Vec<GeoPoint>,
}

impl DeviceSignals {
    /// Signals for a device registered at `registered_at` with nothing
    /// else known yet.
    #[must_use]
    pub fn new(registered_at: DateTime<Utc>) -> Self {
        Self {
            registered_at,
            session_count: 0,
            hours_used: 0,
            debugger_detected: false,
            jailbroken: false,
            virtual_machine: false,
            active_threats: 0,
            security_software_current: false,
            compliance_passed: 0,
            compliance_total: 0,
            recent_locations: Vec::new(),
        }
    }
}

/// Configuration for the trust store.
#[derive(Debug, Clone)]
pub struct TrustConfig {
    /// Devices scoring below this are quarantined.
    pub quarantine_floor: u32,
    /// Maximum history entries retained per device (oldest evicted; the
    /// retained suffix is still append-only).
    pub max_history: usize,
}

impl Default for TrustConfig {
    fn default() -> Self {
        Self {
            quarantine_floor: 30,
            max_history: 256,
        }
    }
}

/// Computes the trust score for one device from its signals at `now`.
///
/// Pure and deterministic; the store wraps this with history bookkeeping.
#[must_use]
pub fn calculate_trust_score(
    device_id: &DeviceId,
    signals: &DeviceSignals,
    now: DateTime<Utc>,
) -> DeviceTrustScore {
    let factors = vec![
        TrustFactor::new("age", 20, age_score(signals, now)),
        TrustFactor::new("usage", 25, usage_score(signals)),
        TrustFactor::new("security_posture", 30, security_posture_score(signals)),
        TrustFactor::new("compliance", 15, compliance_score(signals)),
        TrustFactor::new(
            "location_consistency",
            10,
            location_consistency_score(signals),
        ),
    ];

    let weighted: u32 = factors.iter().map(|f| f.weight * f.score).sum();
    // Weights sum to 100, so this is the rounded weighted average.
    let score = (weighted + 50) / 100;

    DeviceTrustScore {
        device_id: device_id.clone(),
        score,
        factors,
        history: Vec::new(),
        computed_at: now,
    }
}

/// Saturating age factor: full score at 30 days registered.
fn age_score(signals: &DeviceSignals, now: DateTime<Utc>) -> u32 {
    let days = (now - signals.registered_at).num_days().max(0);
    (days.min(AGE_SATURATION_DAYS) * 100 / AGE_SATURATION_DAYS) as u32
}

/// Usage factor from session count and hours, each capped.
fn usage_score(signals: &DeviceSignals) -> u32 {
    let sessions = signals.session_count.min(50) as u32;
    let hours = signals.hours_used.min(50) as u32;
    sessions + hours
}

/// Security posture: starts at 100, fixed deduction per active flag,
/// floored at 0, small credit for current security software.
fn security_posture_score(signals: &DeviceSignals) -> u32 {
    let mut score: i32 = 100;

    if signals.debugger_detected {
        score -= PENALTY_DEBUGGER;
    }
    if signals.jailbroken {
        score -= PENALTY_JAILBREAK;
    }
    if signals.virtual_machine {
        score -= PENALTY_VM;
    }
    score -= signals.active_threats as i32 * PENALTY_PER_THREAT;

    if signals.security_software_current {
        score += CREDIT_SECURITY_SOFTWARE;
    }

    score.clamp(0, 100) as u32
}

/// Fraction of compliance checks passed. No checks configured counts as
/// compliant.
fn compliance_score(signals: &DeviceSignals) -> u32 {
    if signals.compliance_total == 0 {
        return 100;
    }
    signals.compliance_passed.min(signals.compliance_total) * 100 / signals.compliance_total
}

/// Heuristic over recent geolocation spread. Fewer than two samples is
/// trivially consistent.
fn location_consistency_score(signals: &DeviceSignals) -> u32 {
    if signals.recent_locations.len() < 2 {
        return 100;
    }

    let mut max_km = 0.0f64;
    for (i, a) in signals.recent_locations.iter().enumerate() {
        for b in &signals.recent_locations[i + 1..] {
            max_km = max_km.max(approx_distance_km(*a, *b));
        }
    }

    match max_km {
        d if d < 50.0 => 100,
        d if d < 500.0 => 60,
        d if d < 2000.0 => 30,
        _ => 10,
    }
}

/// Equirectangular approximation; plenty for a consistency bucket.
fn approx_distance_km(a: GeoPoint, b: GeoPoint) -> f64 {
    const EARTH_RADIUS_KM: f64 = 6371.0;
    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();
    let x = (b.lon - a.lon).to_radians() * ((lat1 + lat2) / 2.0).cos();
    let y = lat2 - lat1;
    (x * x + y * y).sqrt() * EARTH_RADIUS_KM
}

/// Per-device trust state: signals, last score, and the audit history.
#[derive(Debug, Clone)]
struct DeviceEntry {
    signals: DeviceSignals,
    last_score: Option<u32>,
    history: Vec<TrustScoreChange>,
}

/// Owns trust state for all registered devices.
pub struct TrustStore {
    config: TrustConfig,
    devices: HashMap<DeviceId, DeviceEntry>,
}

impl TrustStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new(config: TrustConfig) -> Self {
        Self {
            config,
            devices: HashMap::new(),
        }
    }

    /// Registers a device with its initial signals. Re-registering
    /// replaces the signals but keeps the history.
    pub fn register(&mut self, device_id: DeviceId, signals: DeviceSignals) {
        debug!(device = %device_id, "registering device");
        self.devices
            .entry(device_id)
            .and_modify(|e| e.signals = signals.clone())
            .or_insert(DeviceEntry {
                signals,
                last_score: None,
                history: Vec::new(),
            });
    }

    /// Updates signals for a registered device.
    pub fn update_signals<F>(&mut self, device_id: &DeviceId, f: F) -> TrustResult<()>
    where
        F: FnOnce(&mut DeviceSignals),
    {
        let entry = self
            .devices
            .get_mut(device_id)
            .ok_or_else(|| TrustError::UnknownDevice(device_id.to_string()))?;
        f(&mut entry.signals);
        Ok(())
    }

    /// Recomputes the trust score for a device at `now`.
    ///
    /// Appends a history entry only if the score changed from the last
    /// computation; returns the snapshot with the full history attached.
    pub fn recompute(
        &mut self,
        device_id: &DeviceId,
        now: DateTime<Utc>,
        cause: &str,
    ) -> TrustResult<DeviceTrustScore> {
        let entry = self
            .devices
            .get_mut(device_id)
            .ok_or_else(|| TrustError::UnknownDevice(device_id.to_string()))?;

        let mut snapshot = calculate_trust_score(device_id, &entry.signals, now);

        // History grows only on an actual change; the first computation
        // sets a baseline without an entry.
        if let Some(old_score) = entry.last_score
            && old_score != snapshot.score
        {
            info!(
                device = %device_id,
                old_score,
                new_score = snapshot.score,
                cause,
                "trust score changed"
            );
            entry.history.push(TrustScoreChange {
                at: now,
                old_score,
                new_score: snapshot.score,
                delta: snapshot.score as i32 - old_score as i32,
                cause: cause.to_string(),
            });
            if entry.history.len() > self.config.max_history {
                let excess = entry.history.len() - self.config.max_history;
                entry.history.drain(..excess);
            }
        }

        entry.last_score = Some(snapshot.score);
        snapshot.history = entry.history.clone();
        Ok(snapshot)
    }

    /// Returns the last computed score, if any.
    #[must_use]
    pub fn last_score(&self, device_id: &DeviceId) -> Option<u32> {
        self.devices.get(device_id).and_then(|e| e.last_score)
    }

    /// Returns true if the device's last score is below the quarantine
    /// floor.
    #[must_use]
    pub fn is_quarantined(&self, device_id: &DeviceId) -> bool {
        self.last_score(device_id)
            .is_some_and(|s| s < self.config.quarantine_floor)
    }

    /// The configured quarantine floor.
    #[must_use]
    pub fn quarantine_floor(&self) -> u32 {
        self.config.quarantine_floor
    }
}
