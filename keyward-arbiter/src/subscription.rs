//! Subscription state and per-feature access policies.
//!
//! The `Subscription` is the arbiter's local view of what the active
//! license entitles: the tier plus a usage counter per metered feature.
//! Counters are seeded from the license on each refresh (the server's
//! numbers win) and incremented best-effort locally between
//! validations.

use chrono::{DateTime, Utc};
use keyward_types::{License, ResetInterval, SubscriptionTier};
use std::collections::HashMap;
use tracing::debug;

/// Access policy for one feature.
#[derive(Debug, Clone, Copy)]
pub struct FeaturePolicy {
    /// Lowest tier allowed to use the feature.
    pub min_tier: SubscriptionTier,
    /// Whether the feature works without server contact.
    pub offline_available: bool,
    /// Essential features stay available even after a tamper response
    /// disabled the rest (saving work, viewing existing data).
    pub essential: bool,
}

impl Default for FeaturePolicy {
    fn default() -> Self {
        Self {
            min_tier: SubscriptionTier::Free,
            offline_available: true,
            essential: false,
        }
    }
}

/// Named feature policies. Features without an entry get the default.
#[derive(Debug, Default)]
pub struct PolicyTable {
    policies: HashMap<String, FeaturePolicy>,
}

impl PolicyTable {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the policy for a feature.
    pub fn set(&mut self, name: impl Into<String>, policy: FeaturePolicy) {
        self.policies.insert(name.into(), policy);
    }

    /// Returns the policy for a feature, or the default.
    #[must_use]
    pub fn get(&self, name: &str) -> FeaturePolicy {
        self.policies.get(name).copied().unwrap_or_default()
    }
}

/// Usage counter for one metered feature.
#[derive(Debug, Clone)]
struct UsageCounter {
    used: u64,
    max: Option<u64>,
    reset_interval: Option<ResetInterval>,
    window_started: DateTime<Utc>,
}

impl UsageCounter {
    /// Rolls the window forward if the reset interval has elapsed.
    fn roll(&mut self, now: DateTime<Utc>) {
        if let Some(interval) = self.reset_interval
            && (now - self.window_started).num_seconds() >= interval.as_secs()
        {
            debug!(used = self.used, "resetting usage window");
            self.used = 0;
            self.window_started = now;
        }
    }

    fn exhausted(&self) -> bool {
        self.max.is_some_and(|max| self.used >= max)
    }
}

/// The arbiter's local view of the active subscription.
#[derive(Debug)]
pub struct Subscription {
    tier: SubscriptionTier,
    counters: HashMap<String, UsageCounter>,
}

impl Subscription {
    /// Builds subscription state from a license, seeding counters from
    /// the license's usage numbers.
    #[must_use]
    pub fn from_license(license: &License, now: DateTime<Utc>) -> Self {
        let counters = license
            .features
            .iter()
            .map(|f| {
                (
                    f.name.clone(),
                    UsageCounter {
                        used: f.current_usage,
                        max: f.max_usage,
                        reset_interval: f.reset_interval,
                        window_started: now,
                    },
                )
            })
            .collect();

        Self {
            tier: license.tier,
            counters,
        }
    }

    /// The subscription tier.
    #[must_use]
    pub fn tier(&self) -> SubscriptionTier {
        self.tier
    }

    /// Whether the feature's usage cap is reached, rolling the reset
    /// window first. Unknown features are never exhausted — absence is
    /// the arbiter's concern, not the counter's.
    pub fn exhausted(&mut self, name: &str, now: DateTime<Utc>) -> bool {
        match self.counters.get_mut(name) {
            Some(counter) => {
                counter.roll(now);
                counter.exhausted()
            }
            None => false,
        }
    }

    /// Best-effort usage increment. Returns the new count.
    pub fn increment(&mut self, name: &str, now: DateTime<Utc>) -> u64 {
        match self.counters.get_mut(name) {
            Some(counter) => {
                counter.roll(now);
                counter.used += 1;
                counter.used
            }
            None => 0,
        }
    }

    /// Current usage count for a feature.
    #[must_use]
    pub fn usage(&self, name: &str) -> u64 {
        self.counters.get(name).map_or(0, |c| c.used)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use keyward_types::{DeviceId, Feature, LicenseId, LicenseStatus, LicenseType};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 6, 1, 0, 0, 0).unwrap()
    }

    fn license() -> License {
        License {
            id: LicenseId::new(),
            key: "KW-TEST".to_string(),
            license_type: LicenseType::Professional,
            tier: SubscriptionTier::Pro,
            user_id: "u".to_string(),
            hardware_id: DeviceId::new("fp"),
            issued_at: t0(),
            activated_at: None,
            expires_at: None,
            features: vec![
                Feature::unlimited("annotate"),
                Feature::metered("export_4k", 2),
            ],
            max_seats: 1,
            current_seats: 1,
            grace_period_days: 3,
            allow_offline_days: 14,
            last_online_validation: None,
            status: LicenseStatus::Valid,
        }
    }

    #[test]
    fn counters_seed_from_license() {
        let mut lic = license();
        lic.feature_mut("export_4k").unwrap().current_usage = 1;

        let sub = Subscription::from_license(&lic, t0());
        assert_eq!(sub.usage("export_4k"), 1);
        assert_eq!(sub.tier(), SubscriptionTier::Pro);
    }

    #[test]
    fn exhaustion_and_increment() {
        let mut sub = Subscription::from_license(&license(), t0());
        assert!(!sub.exhausted("export_4k", t0()));
        sub.increment("export_4k", t0());
        sub.increment("export_4k", t0());
        assert!(sub.exhausted("export_4k", t0()));
        // Unlimited features never exhaust.
        assert!(!sub.exhausted("annotate", t0()));
    }

    #[test]
    fn window_resets_after_interval() {
        let mut sub = Subscription::from_license(&license(), t0());
        sub.increment("export_4k", t0());
        sub.increment("export_4k", t0());
        assert!(sub.exhausted("export_4k", t0()));

        // Metered fixtures reset monthly.
        let later = t0() + Duration::days(31);
        assert!(!sub.exhausted("export_4k", later));
        assert_eq!(sub.usage("export_4k"), 0);
    }

    #[test]
    fn default_policy_is_permissive() {
        let table = PolicyTable::new();
        let policy = table.get("anything");
        assert_eq!(policy.min_tier, SubscriptionTier::Free);
        assert!(policy.offline_available);
        assert!(!policy.essential);
    }
}
