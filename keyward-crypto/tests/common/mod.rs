//! Shared fixtures for keyward-crypto integration tests.

use chrono::{Duration, Utc};
use keyward_types::{
    DeviceId, Feature, License, LicenseId, LicenseStatus, LicenseType, SubscriptionTier,
};

/// Builds a plausible professional license for codec tests.
pub fn sample_license() -> License {
    License {
        id: LicenseId::new(),
        key: "KW-PRO-7F3A-91CE".to_string(),
        license_type: LicenseType::Professional,
        tier: SubscriptionTier::Pro,
        user_id: "user-4821".to_string(),
        hardware_id: DeviceId::new("fp-test-device"),
        issued_at: Utc::now() - Duration::days(10),
        activated_at: Some(Utc::now() - Duration::days(9)),
        expires_at: Some(Utc::now() + Duration::days(355)),
        features: vec![
            Feature::unlimited("annotate"),
            Feature::metered("export_4k", 50),
        ],
        max_seats: 2,
        current_seats: 1,
        grace_period_days: 3,
        allow_offline_days: 14,
        last_online_validation: Some(Utc::now() - Duration::hours(2)),
        status: LicenseStatus::Valid,
    }
}
