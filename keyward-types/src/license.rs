//! License and subscription models.
//!
//! A `License` is issued by the licensing server and consumed read-mostly
//! by the engine. Feature usage counters are the only fields mutated
//! locally; they are reconciled with the server on the next successful
//! online validation.

use crate::ids::{DeviceId, LicenseId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The kind of license that was purchased.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LicenseType {
    /// Time-limited evaluation.
    Trial,
    /// Single-user standard license.
    Standard,
    /// Single-user professional license.
    Professional,
    /// Multi-seat enterprise license.
    Enterprise,
    /// Unlimited-seat site license.
    Site,
}

/// Subscription tiers, ordered from lowest to highest.
///
/// The derived `Ord` follows declaration order, so tier gating can use
/// plain comparison.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionTier {
    Free,
    Basic,
    Pro,
    Enterprise,
    Ultimate,
}

impl SubscriptionTier {
    /// Returns the ordinal position of this tier (Free = 0).
    #[must_use]
    pub const fn index(&self) -> usize {
        *self as usize
    }
}

/// The current status of a license as last evaluated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LicenseStatus {
    /// License is valid and active.
    Valid,
    /// License is past its expiry and past any grace period.
    Expired,
    /// License was revoked by the server or a tamper response.
    Revoked,
    /// License is administratively suspended.
    Suspended,
    /// License is past expiry but inside its grace window.
    GracePeriod,
    /// License is operating without server contact.
    OfflineMode,
    /// License failed structural or cryptographic validation.
    Invalid,
    /// Trial period has ended.
    TrialExpired,
}

impl LicenseStatus {
    /// Returns true if the license currently permits feature access.
    #[must_use]
    pub fn is_usable(&self) -> bool {
        matches!(self, Self::Valid | Self::GracePeriod | Self::OfflineMode)
    }
}

/// How often a feature's usage counter resets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResetInterval {
    Daily,
    Weekly,
    Monthly,
}

impl ResetInterval {
    /// Returns the interval length in seconds.
    #[must_use]
    pub const fn as_secs(&self) -> i64 {
        match self {
            Self::Daily => 24 * 60 * 60,
            Self::Weekly => 7 * 24 * 60 * 60,
            Self::Monthly => 30 * 24 * 60 * 60,
        }
    }
}

/// A single feature entitlement carried by a license.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feature {
    /// Feature name (matches the name passed to the arbiter).
    pub name: String,
    /// Whether the feature is enabled at all.
    pub enabled: bool,
    /// Maximum number of uses, or None for unlimited.
    pub max_usage: Option<u64>,
    /// Uses consumed in the current interval. Mutated locally.
    #[serde(default)]
    pub current_usage: u64,
    /// How often `current_usage` resets, if it does.
    pub reset_interval: Option<ResetInterval>,
}

impl Feature {
    /// Creates an enabled, unlimited feature.
    #[must_use]
    pub fn unlimited(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            enabled: true,
            max_usage: None,
            current_usage: 0,
            reset_interval: None,
        }
    }

    /// Creates an enabled feature with a usage cap.
    #[must_use]
    pub fn metered(name: impl Into<String>, max_usage: u64) -> Self {
        Self {
            name: name.into(),
            enabled: true,
            max_usage: Some(max_usage),
            current_usage: 0,
            reset_interval: Some(ResetInterval::Monthly),
        }
    }

    /// Returns true if the usage cap has been reached.
    #[must_use]
    pub fn usage_exhausted(&self) -> bool {
        self.max_usage
            .is_some_and(|max| self.current_usage >= max)
    }
}

/// A license as issued by the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct License {
    /// License ID.
    pub id: LicenseId,
    /// Human-typed license key string.
    pub key: String,
    /// License kind.
    pub license_type: LicenseType,
    /// Subscription tier this license grants.
    pub tier: SubscriptionTier,
    /// Owning user ID.
    pub user_id: String,
    /// Hardware fingerprint the license is bound to.
    pub hardware_id: DeviceId,
    /// When the license was issued.
    pub issued_at: DateTime<Utc>,
    /// When the license was activated on this device, if it has been.
    pub activated_at: Option<DateTime<Utc>>,
    /// Expiry, or None for perpetual.
    pub expires_at: Option<DateTime<Utc>>,
    /// Feature entitlements.
    pub features: Vec<Feature>,
    /// Maximum concurrent seats.
    pub max_seats: u32,
    /// Seats currently claimed.
    pub current_seats: u32,
    /// Extra validity window after expiry, in days.
    pub grace_period_days: u32,
    /// Maximum days the engine may run without server contact.
    pub allow_offline_days: u32,
    /// Last successful online validation, if any.
    pub last_online_validation: Option<DateTime<Utc>>,
    /// Status as last evaluated.
    pub status: LicenseStatus,
}

impl License {
    /// Looks up a feature by name.
    #[must_use]
    pub fn feature(&self, name: &str) -> Option<&Feature> {
        self.features.iter().find(|f| f.name == name)
    }

    /// Looks up a feature by name, mutably.
    pub fn feature_mut(&mut self, name: &str) -> Option<&mut Feature> {
        self.features.iter_mut().find(|f| f.name == name)
    }

    /// Returns true if the license carries the named feature.
    #[must_use]
    pub fn has_feature(&self, name: &str) -> bool {
        self.feature(name).is_some()
    }

    /// Returns true if the license is past its expiry at `now`.
    /// Perpetual licenses never expire.
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|exp| now >= exp)
    }

    /// Whole days elapsed between the last online validation and `now`,
    /// or None if the license has never validated online.
    #[must_use]
    pub fn days_since_last_validation(&self, now: DateTime<Utc>) -> Option<i64> {
        self.last_online_validation
            .map(|last| (now - last).num_days())
    }

    /// Returns true if all seats are claimed.
    #[must_use]
    pub fn seats_exhausted(&self) -> bool {
        self.current_seats >= self.max_seats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tier_ordering() {
        assert!(SubscriptionTier::Free < SubscriptionTier::Basic);
        assert!(SubscriptionTier::Pro < SubscriptionTier::Enterprise);
        assert!(SubscriptionTier::Enterprise < SubscriptionTier::Ultimate);
        assert_eq!(SubscriptionTier::Free.index(), 0);
        assert_eq!(SubscriptionTier::Ultimate.index(), 4);
    }

    #[test]
    fn usage_exhaustion() {
        let mut f = Feature::metered("export_4k", 3);
        assert!(!f.usage_exhausted());
        f.current_usage = 3;
        assert!(f.usage_exhausted());
        assert!(!Feature::unlimited("annotate").usage_exhausted());
    }

    #[test]
    fn status_usability() {
        assert!(LicenseStatus::Valid.is_usable());
        assert!(LicenseStatus::GracePeriod.is_usable());
        assert!(LicenseStatus::OfflineMode.is_usable());
        assert!(!LicenseStatus::Expired.is_usable());
        assert!(!LicenseStatus::Revoked.is_usable());
        assert!(!LicenseStatus::TrialExpired.is_usable());
    }
}
