//! Validation protocol types.
//!
//! `ValidationRequest`/`ValidationResponse` are the shapes exchanged with
//! the licensing server (and returned from cached/offline fallbacks).
//! `EncryptedLicensePayload` is the only on-disk/on-wire representation of
//! a license; its `signature` covers the plaintext serialization taken
//! *before* encryption, so signature validity is independent of the
//! symmetric key.

use crate::license::License;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// The sealed license envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncryptedLicensePayload {
    /// Hex-encoded signature over the plaintext license serialization.
    pub signature: String,
    /// Base64-encoded ciphertext blob (nonce + optional salt + ciphertext).
    pub payload: String,
    /// When the envelope was sealed (epoch milliseconds).
    pub timestamp: i64,
    /// Envelope format version (semver).
    pub version: String,
    /// AEAD algorithm identifier, e.g. "aes-256-gcm".
    pub algorithm: String,
}

/// A validation request sent to the server (or evaluated locally).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationRequest {
    /// The license key being validated.
    pub license_key: String,
    /// Hardware fingerprint of this device.
    pub hardware_fingerprint: String,
    /// Product identifier.
    pub product_id: String,
    /// Product version.
    pub product_version: String,
    /// Features the caller intends to use.
    pub features: Vec<String>,
    /// Request timestamp.
    pub timestamp: DateTime<Utc>,
}

impl ValidationRequest {
    /// Creates a request stamped with the current time.
    #[must_use]
    pub fn new(
        license_key: impl Into<String>,
        hardware_fingerprint: impl Into<String>,
        product_id: impl Into<String>,
        product_version: impl Into<String>,
    ) -> Self {
        Self {
            license_key: license_key.into(),
            hardware_fingerprint: hardware_fingerprint.into(),
            product_id: product_id.into(),
            product_version: product_version.into(),
            features: Vec::new(),
            timestamp: Utc::now(),
        }
    }

    /// Cache key for this request: SHA-256 over the identity fields.
    ///
    /// Two requests for the same (key, fingerprint, product) share a cache
    /// entry and an in-flight slot regardless of timestamp or feature list.
    #[must_use]
    pub fn cache_key(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.license_key.as_bytes());
        hasher.update(b"|");
        hasher.update(self.hardware_fingerprint.as_bytes());
        hasher.update(b"|");
        hasher.update(self.product_id.as_bytes());
        hex::encode(hasher.finalize())
    }
}

/// Typed issue codes carried in validation responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IssueCode {
    LicenseExpired,
    LicenseRevoked,
    LicenseSuspended,
    TrialExpired,
    GracePeriod,
    OfflineMode,
    OfflinePeriodExceeded,
    SignatureInvalid,
    HardwareMismatch,
    SeatLimit,
    Format,
    Network,
}

/// A single error or warning attached to a validation response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationIssue {
    /// Machine-readable code.
    pub code: IssueCode,
    /// Human-readable message.
    pub message: String,
    /// Whether the condition can clear on its own (reconnection, renewal).
    pub recoverable: bool,
}

impl ValidationIssue {
    /// Creates an issue.
    #[must_use]
    pub fn new(code: IssueCode, message: impl Into<String>, recoverable: bool) -> Self {
        Self {
            code,
            message: message.into(),
            recoverable,
        }
    }
}

/// The outcome of a validation attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationResponse {
    /// Whether the license is currently usable.
    pub valid: bool,
    /// The resolved license, when one could be resolved.
    pub license: Option<License>,
    /// Blocking errors.
    pub errors: Vec<ValidationIssue>,
    /// Non-blocking warnings (grace period, offline mode).
    pub warnings: Vec<ValidationIssue>,
    /// Grace-period details, when one is active.
    pub grace_period: Option<GracePeriodInfo>,
    /// When the caller should validate next.
    pub next_validation: DateTime<Utc>,
    /// Server response signature (HMAC, hex). Absent for local fallbacks.
    pub signature: Option<String>,
    /// True if this response was served from the local cache.
    #[serde(default)]
    pub cached: bool,
    /// True if this response was produced without server contact.
    #[serde(default)]
    pub offline: bool,
}

impl ValidationResponse {
    /// Creates a failing response with a single error.
    #[must_use]
    pub fn failure(issue: ValidationIssue, next_validation: DateTime<Utc>) -> Self {
        Self {
            valid: false,
            license: None,
            errors: vec![issue],
            warnings: Vec::new(),
            grace_period: None,
            next_validation,
            signature: None,
            cached: false,
            offline: false,
        }
    }

    /// Returns the first error, if any.
    #[must_use]
    pub fn first_error(&self) -> Option<&ValidationIssue> {
        self.errors.first()
    }
}

/// Derived grace-period state. Never persisted independently; always
/// recomputed from the license's expiry / last validation plus the
/// configured window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GracePeriodInfo {
    /// Whether the grace period is currently active.
    pub active: bool,
    /// Whole days remaining. Never negative.
    pub remaining_days: u32,
    /// Why the grace period was entered.
    pub reason: String,
    /// When the grace period began.
    pub started_at: DateTime<Utc>,
    /// When the grace period ends.
    pub ends_at: DateTime<Utc>,
}

impl GracePeriodInfo {
    /// Computes grace-period state at `now` for a window that opened at
    /// `started_at` and runs for `grace_days` days.
    ///
    /// Once `now` reaches the end of the window, `active` is false and
    /// `remaining_days` is exactly 0 — the value is clamped, never
    /// negative.
    #[must_use]
    pub fn compute(
        now: DateTime<Utc>,
        started_at: DateTime<Utc>,
        grace_days: u32,
        reason: impl Into<String>,
    ) -> Self {
        let ends_at = started_at + Duration::days(i64::from(grace_days));
        let active = now < ends_at;
        let remaining_days = if active {
            // Ceiling of the remaining fraction: 1 second left still
            // counts as the final day.
            let secs_left = (ends_at - now).num_seconds();
            ((secs_left + 86_399) / 86_400) as u32
        } else {
            0
        };

        Self {
            active,
            remaining_days,
            reason: reason.into(),
            started_at,
            ends_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn cache_key_ignores_timestamp_and_features() {
        let mut a = ValidationRequest::new("KEY", "FP", "studio", "3.1.0");
        let mut b = ValidationRequest::new("KEY", "FP", "studio", "3.1.0");
        a.features.push("export_4k".to_string());
        b.timestamp = a.timestamp + Duration::hours(5);
        assert_eq!(a.cache_key(), b.cache_key());

        let c = ValidationRequest::new("KEY", "OTHER-FP", "studio", "3.1.0");
        assert_ne!(a.cache_key(), c.cache_key());
    }

    #[test]
    fn grace_remaining_days_never_negative() {
        let start = t0();
        let info = GracePeriodInfo::compute(start + Duration::days(10), start, 3, "expired");
        assert!(!info.active);
        assert_eq!(info.remaining_days, 0);
    }

    #[test]
    fn grace_monotonic_countdown() {
        let start = t0();
        let mut last = u32::MAX;
        for day in 0..3 {
            let info =
                GracePeriodInfo::compute(start + Duration::days(day), start, 3, "expired");
            assert!(info.active);
            assert!(info.remaining_days <= last);
            assert!(info.remaining_days > 0);
            last = info.remaining_days;
        }
        let end = GracePeriodInfo::compute(start + Duration::days(3), start, 3, "expired");
        assert!(!end.active);
        assert_eq!(end.remaining_days, 0);
    }
}
