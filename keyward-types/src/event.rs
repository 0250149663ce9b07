//! Typed engine events.
//!
//! Components publish `EngineEvent`s on a broadcast channel instead of
//! invoking callbacks on each other. Subscribers (the arbiter, the host
//! application, telemetry) receive every event in publication order;
//! events are never silently dropped by a configured response action —
//! a `LogOnly` tamper response still publishes `TamperDetected`.

use crate::ids::DeviceId;
use crate::tamper::TamperDetection;
use crate::validation::GracePeriodInfo;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Events published by the engine components.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum EngineEvent {
    /// A tamper check produced a finding.
    TamperDetected(TamperDetection),
    /// Non-essential features must be denied until cleared.
    FeaturesDisabled {
        /// Why features were disabled.
        reason: String,
    },
    /// The host process should terminate after `delay`.
    ExitRequired {
        /// Grace delay before exiting, to flush logs.
        #[serde(with = "duration_millis")]
        delay: Duration,
        /// Why the exit was requested.
        reason: String,
    },
    /// The license was marked revoked locally.
    LicenseRevoked {
        /// Why the license was revoked.
        reason: String,
    },
    /// A best-effort alert should be sent to the server.
    ServerAlert {
        /// Alert description.
        message: String,
    },
    /// A grace period began.
    GracePeriodStarted(GracePeriodInfo),
    /// A grace period ended (time-driven or via successful validation).
    GracePeriodExpired {
        /// When the period ended.
        at: DateTime<Utc>,
    },
    /// An online validation succeeded.
    ValidationSucceeded {
        /// The validated license key.
        license_key: String,
    },
    /// A validation attempt failed.
    ValidationFailed {
        /// The license key that failed.
        license_key: String,
        /// First error message.
        reason: String,
    },
    /// A device's trust score changed.
    TrustScoreChanged {
        /// The device whose score changed.
        device_id: DeviceId,
        /// Previous score.
        old_score: u32,
        /// New score.
        new_score: u32,
    },
    /// A device fell below the trust floor and was quarantined.
    DeviceQuarantined {
        /// The quarantined device.
        device_id: DeviceId,
        /// Score that triggered the quarantine.
        score: u32,
    },
}

mod duration_millis {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        (d.as_millis() as u64).serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}
