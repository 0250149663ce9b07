//! Shared fixtures for keyward-validate integration tests.

use chrono::{DateTime, Duration, TimeZone, Utc};
use keyward_crypto::{generate_random_key, DerivedKey, LicenseKeypair};
use keyward_types::{
    DeviceId, EngineEvent, Feature, License, LicenseId, LicenseStatus, LicenseType,
    SubscriptionTier, ValidationRequest, ValidationResponse,
};
use keyward_validate::{sign_response, ServerClient, ServerConfig, Validator, ValidatorConfig};
use std::sync::Arc;
use tokio::sync::broadcast;

/// Shared API key between the fake server and the client under test.
pub const API_KEY: &[u8] = b"kw-test-api-key";

/// Fingerprint the fixture license is bound to.
pub const FINGERPRINT: &str = "fp-test-device";

pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 5, 1, 12, 0, 0).unwrap()
}

/// A professional license anchored at `now`.
pub fn sample_license(now: DateTime<Utc>) -> License {
    License {
        id: LicenseId::new(),
        key: "KW-PRO-7F3A-91CE".to_string(),
        license_type: LicenseType::Professional,
        tier: SubscriptionTier::Pro,
        user_id: "user-4821".to_string(),
        hardware_id: DeviceId::new(FINGERPRINT),
        issued_at: now - Duration::days(10),
        activated_at: Some(now - Duration::days(9)),
        expires_at: Some(now + Duration::days(355)),
        features: vec![
            Feature::unlimited("annotate"),
            Feature::metered("export_4k", 50),
        ],
        max_seats: 2,
        current_seats: 1,
        grace_period_days: 3,
        allow_offline_days: 14,
        last_online_validation: None,
        status: LicenseStatus::Valid,
    }
}

pub fn request() -> ValidationRequest {
    ValidationRequest::new("KW-PRO-7F3A-91CE", FINGERPRINT, "studio", "3.1.0")
}

/// A server response for `license`, signed the way the real server signs.
pub fn ok_response(license: &License, next_validation: DateTime<Utc>) -> ValidationResponse {
    let mut response = ValidationResponse {
        valid: true,
        license: Some(license.clone()),
        errors: Vec::new(),
        warnings: Vec::new(),
        grace_period: None,
        next_validation,
        signature: None,
        cached: false,
        offline: false,
    };
    response.signature = Some(sign_response(API_KEY, &license.key, &response).unwrap());
    response
}

pub struct Harness {
    pub validator: Arc<Validator>,
    pub key: DerivedKey,
    pub keypair: LicenseKeypair,
    pub events: broadcast::Receiver<EngineEvent>,
    // Held so the data directory outlives the validator.
    pub _dir: tempfile::TempDir,
}

impl Harness {
    /// Drains the event channel into a vec.
    pub fn drain_events(&mut self) -> Vec<EngineEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            events.push(event);
        }
        events
    }
}

pub async fn harness(base_url: &str) -> Harness {
    harness_with(base_url, ValidatorConfig::default()).await
}

pub async fn harness_with(base_url: &str, mut config: ValidatorConfig) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    config.data_dir = dir.path().to_path_buf();

    let client = ServerClient::new(ServerConfig::new(base_url, API_KEY)).unwrap();
    let key = generate_random_key();
    let keypair = LicenseKeypair::generate();
    let (events_tx, events_rx) = broadcast::channel(64);

    let validator = Arc::new(Validator::new(
        config,
        client,
        key.clone(),
        keypair.verifying_key.clone(),
        events_tx,
    ));
    validator.initialize().await.unwrap();

    Harness {
        validator,
        key,
        keypair,
        events: events_rx,
        _dir: dir,
    }
}
