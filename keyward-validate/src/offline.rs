//! Offline licenses.
//!
//! An offline license is a separately sealed, time-boxed derivative of a
//! License that permits operation with no server contact at all. It is
//! independent of the grace period: a grace period stretches a
//! server-validated license past its *expiry*; an offline license bridges
//! a *connectivity* gap, bounded by `allow_offline_days`.

use crate::error::{ValidationError, ValidationResult};
use chrono::{DateTime, Duration, Utc};
use keyward_crypto::{open, seal, DerivedKey, LicenseKeypair, VerifyingKey};
use keyward_types::{EncryptedLicensePayload, License};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Default offline-license file name under the data directory.
pub const OFFLINE_FILE: &str = "offline.json";

/// A sealed, time-boxed license usable without server contact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncryptedOfflineLicense {
    /// The sealed license envelope.
    pub envelope: EncryptedLicensePayload,
    /// When the offline license was issued.
    pub issued_at: DateTime<Utc>,
    /// Hard expiry. Always within `allow_offline_days` of issuance.
    pub expires_at: DateTime<Utc>,
}

/// Seals `license` into an offline license issued at `now`.
///
/// The expiry is clamped so that `expires_at <= issued_at +
/// allow_offline_days` holds regardless of the license's own expiry.
pub fn issue_offline(
    license: &License,
    key: &DerivedKey,
    keypair: &LicenseKeypair,
    now: DateTime<Utc>,
) -> ValidationResult<EncryptedOfflineLicense> {
    let ceiling = now + Duration::days(i64::from(license.allow_offline_days));
    let expires_at = match license.expires_at {
        Some(license_expiry) => license_expiry.min(ceiling),
        None => ceiling,
    };

    let envelope = seal(license, key, keypair)?;
    info!(key = %license.key, %expires_at, "issued offline license");

    Ok(EncryptedOfflineLicense {
        envelope,
        issued_at: now,
        expires_at,
    })
}

/// Opens and checks an offline license at `now`.
///
/// Valid only while both bounds hold: the offline license's own expiry,
/// and at most `max_offline_days` since the last successful online
/// validation. Returns the contained license on success, or `None` when
/// a bound has lapsed (the caller continues down the fallback chain);
/// crypto failures are hard errors.
pub fn redeem_offline(
    offline: &EncryptedOfflineLicense,
    key: &DerivedKey,
    verifying_key: &VerifyingKey,
    now: DateTime<Utc>,
    last_online_validation: Option<DateTime<Utc>>,
    max_offline_days: u32,
) -> ValidationResult<Option<License>> {
    // Inclusive, like the ceiling below: a license issued at the last
    // validation is redeemable through the full offline allowance.
    if now > offline.expires_at {
        debug!("offline license past its own expiry");
        return Ok(None);
    }

    if let Some(last) = last_online_validation {
        let days_offline = (now - last).num_days();
        if days_offline > i64::from(max_offline_days) {
            debug!(days_offline, max_offline_days, "offline ceiling exceeded");
            return Ok(None);
        }
    }

    let license = open(&offline.envelope, key, verifying_key)?;
    Ok(Some(license))
}

/// JSON persistence for the offline license.
pub struct OfflineStore {
    path: PathBuf,
}

impl OfflineStore {
    /// Creates a store writing to `dir/offline.json`.
    #[must_use]
    pub fn new(dir: &Path) -> Self {
        Self {
            path: dir.join(OFFLINE_FILE),
        }
    }

    /// Loads the stored offline license, if one exists.
    pub fn load(&self) -> ValidationResult<Option<EncryptedOfflineLicense>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let contents = fs::read_to_string(&self.path).map_err(|e| {
            ValidationError::Storage(format!("read {}: {e}", self.path.display()))
        })?;
        Ok(Some(serde_json::from_str(&contents)?))
    }

    /// Saves an offline license atomically.
    pub fn save(&self, offline: &EncryptedOfflineLicense) -> ValidationResult<()> {
        let json = serde_json::to_string(offline)?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json)
            .map_err(|e| ValidationError::Storage(format!("write {}: {e}", tmp.display())))?;
        fs::rename(&tmp, &self.path).map_err(|e| {
            ValidationError::Storage(format!("rename {}: {e}", self.path.display()))
        })?;
        Ok(())
    }

    /// Removes the stored offline license.
    pub fn clear(&self) -> ValidationResult<()> {
        if self.path.exists() {
            fs::remove_file(&self.path).map_err(|e| {
                ValidationError::Storage(format!("remove {}: {e}", self.path.display()))
            })?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use keyward_crypto::generate_random_key;
    use keyward_types::{
        DeviceId, LicenseId, LicenseStatus, LicenseType, SubscriptionTier,
    };

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 5, 1, 0, 0, 0).unwrap()
    }

    fn license() -> License {
        License {
            id: LicenseId::new(),
            key: "KW-STD-0000-0000".to_string(),
            license_type: LicenseType::Standard,
            tier: SubscriptionTier::Basic,
            user_id: "user-1".to_string(),
            hardware_id: DeviceId::new("fp-offline"),
            issued_at: t0() - Duration::days(1),
            activated_at: None,
            expires_at: Some(t0() + Duration::days(355)),
            features: Vec::new(),
            max_seats: 1,
            current_seats: 1,
            grace_period_days: 3,
            allow_offline_days: 14,
            last_online_validation: None,
            status: LicenseStatus::Valid,
        }
    }

    #[test]
    fn issue_clamps_to_offline_ceiling() {
        let key = generate_random_key();
        let keypair = LicenseKeypair::generate();

        let offline = issue_offline(&license(), &key, &keypair, t0()).unwrap();
        assert_eq!(offline.expires_at, t0() + Duration::days(14));

        let mut short = license();
        short.expires_at = Some(t0() + Duration::days(5));
        let offline = issue_offline(&short, &key, &keypair, t0()).unwrap();
        assert_eq!(offline.expires_at, t0() + Duration::days(5));
    }

    #[test]
    fn redeem_honors_both_bounds() {
        let key = generate_random_key();
        let keypair = LicenseKeypair::generate();
        let offline = issue_offline(&license(), &key, &keypair, t0()).unwrap();
        let verifying = &keypair.verifying_key;

        // Inside both bounds.
        let redeemed = redeem_offline(
            &offline, &key, verifying, t0() + Duration::days(3), Some(t0()), 10,
        )
        .unwrap();
        assert_eq!(redeemed.unwrap().key, "KW-STD-0000-0000");

        // Exactly at the ceiling: still allowed.
        let redeemed = redeem_offline(
            &offline, &key, verifying, t0() + Duration::days(10), Some(t0()), 10,
        )
        .unwrap();
        assert!(redeemed.is_some());

        // One day past the ceiling: refused, not an error.
        let redeemed = redeem_offline(
            &offline, &key, verifying, t0() + Duration::days(11), Some(t0()), 10,
        )
        .unwrap();
        assert!(redeemed.is_none());

        // Exactly at the offline license's own expiry: both bounds are
        // inclusive, so the full allowance is usable.
        let redeemed = redeem_offline(
            &offline, &key, verifying, t0() + Duration::days(14), Some(t0()), 14,
        )
        .unwrap();
        assert!(redeemed.is_some());

        // Past the offline license's own expiry.
        let redeemed = redeem_offline(
            &offline, &key, verifying, t0() + Duration::days(15), None, 30,
        )
        .unwrap();
        assert!(redeemed.is_none());
    }

    #[test]
    fn redeem_with_wrong_key_is_a_hard_error() {
        let key = generate_random_key();
        let keypair = LicenseKeypair::generate();
        let offline = issue_offline(&license(), &key, &keypair, t0()).unwrap();

        let wrong = generate_random_key();
        let result = redeem_offline(
            &offline,
            &wrong,
            &keypair.verifying_key,
            t0() + Duration::days(1),
            Some(t0()),
            14,
        );
        assert!(matches!(result, Err(ValidationError::Crypto(_))));
    }

    #[test]
    fn store_roundtrip_and_clear() {
        let dir = tempfile::tempdir().unwrap();
        let store = OfflineStore::new(dir.path());
        assert!(store.load().unwrap().is_none());

        let key = generate_random_key();
        let keypair = LicenseKeypair::generate();
        let offline = issue_offline(&license(), &key, &keypair, t0()).unwrap();
        store.save(&offline).unwrap();

        let loaded = store.load().unwrap().unwrap();
        assert_eq!(loaded.expires_at, offline.expires_at);

        store.clear().unwrap();
        assert!(store.load().unwrap().is_none());
    }
}
