//! Engine orchestrator and feature-access arbiter.
//!
//! The arbiter wires the validator, tamper monitor, and trust store
//! together and exposes the single hot-path API the host calls:
//! `check_feature_access`. Feature checks are synchronous against
//! locally cached state — they never touch the network. Network state
//! is refreshed by `validate_license`, which the host (or the periodic
//! timer) drives.
//!
//! Tamper responses arrive as events on the shared broadcast channel
//! and are folded into arbiter state by a routing task: feature
//! disabling, local revocation, alert queueing. `ExitRequired` is left
//! for the host, which subscribes to the same channel.

use crate::error::{ArbiterError, ArbiterResult};
use crate::subscription::{FeaturePolicy, PolicyTable, Subscription};
use chrono::Utc;
use keyward_crypto::{
    derive_key, deterministic_salt, ActivationKey, DerivedKey, KdfParams, LicenseKeypair,
};
use keyward_tamper::{check_clock_rollback, Finding, TamperConfig, TamperMonitor};
use keyward_trust::{DeviceSignals, HardwareFingerprint, TrustConfig, TrustStore};
use keyward_types::{
    DeviceTrustScore, EngineEvent, GracePeriodInfo, IssueCode, License, LicenseStatus,
    SubscriptionTier, ValidationRequest, ValidationResponse,
};
use keyward_validate::{
    issue_offline, ServerClient, ServerConfig, ValidationState, Validator, ValidatorConfig,
};
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Allowed backwards clock skew before a rollback finding is raised.
const CLOCK_SKEW_SECS: i64 = 5 * 60;

/// Top-level engine configuration.
#[derive(Debug, Clone)]
pub struct ArbiterConfig {
    /// Passphrase the license encryption key is derived from.
    pub passphrase: String,
    /// Product identifier sent with validation requests.
    pub product_id: String,
    /// Product version sent with validation requests.
    pub product_version: String,
    /// Validator configuration (data dir, TTLs, grace defaults).
    pub validator: ValidatorConfig,
    /// Licensing server connection.
    pub server: ServerConfig,
    /// Tamper monitor configuration.
    pub tamper: TamperConfig,
    /// Trust store configuration.
    pub trust: TrustConfig,
}

/// Why a feature check was denied. The first blocking reason in check
/// order, not an exhaustive list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenyReason {
    /// No license is loaded, or the loaded one is not usable.
    NoLicense,
    /// The license does not carry this feature.
    FeatureNotIncluded,
    /// The feature is carried but disabled.
    FeatureDisabled,
    /// The feature's usage cap for this window is spent.
    UsageExhausted,
    /// The subscription tier is below the feature's minimum.
    TierTooLow {
        /// The tier the feature requires.
        required: SubscriptionTier,
    },
    /// The engine is offline and the feature requires server contact.
    OfflineUnavailable,
    /// A tamper response disabled non-essential features.
    TamperDisabled,
}

/// Outcome of a feature access check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeatureAccessDecision {
    /// Whether access is granted.
    pub allowed: bool,
    /// The first blocking reason, when denied.
    pub reason: Option<DenyReason>,
}

impl FeatureAccessDecision {
    fn allow() -> Self {
        Self {
            allowed: true,
            reason: None,
        }
    }

    fn deny(reason: DenyReason) -> Self {
        Self {
            allowed: false,
            reason: Some(reason),
        }
    }
}

/// Locally cached engine state, read synchronously by the hot path.
#[derive(Debug, Default)]
struct EngineState {
    license: Option<License>,
    subscription: Option<Subscription>,
    license_key: Option<String>,
    grace: Option<GracePeriodInfo>,
    offline: bool,
    features_disabled: bool,
    pending_alerts: Vec<String>,
}

/// The engine orchestrator.
pub struct Arbiter {
    config: ArbiterConfig,
    validator: Arc<Validator>,
    monitor: TamperMonitor,
    trust: RwLock<TrustStore>,
    fingerprint: HardwareFingerprint,
    keypair: LicenseKeypair,
    state: Arc<RwLock<EngineState>>,
    policies: PolicyTable,
    events: broadcast::Sender<EngineEvent>,
    router: Option<JoinHandle<()>>,
}

impl Arbiter {
    /// Creates the engine: derives key material, loads or generates the
    /// signing keypair, and constructs the components. Nothing runs
    /// until `initialize`.
    pub fn new(config: ArbiterConfig) -> ArbiterResult<Self> {
        let salt = deterministic_salt(&config.passphrase);
        let key: DerivedKey = derive_key(&config.passphrase, &salt, &KdfParams::default())?;
        let keypair = LicenseKeypair::load_or_generate(&config.validator.data_dir)?;

        let (events, _) = broadcast::channel(256);
        let client = ServerClient::new(config.server.clone())?;
        let validator = Arc::new(Validator::new(
            config.validator.clone(),
            client,
            key,
            keypair.verifying_key.clone(),
            events.clone(),
        ));
        let monitor = TamperMonitor::new(config.tamper.clone(), events.clone());
        let trust = RwLock::new(TrustStore::new(config.trust.clone()));
        let fingerprint = HardwareFingerprint::generate();

        Ok(Self {
            config,
            validator,
            monitor,
            trust,
            fingerprint,
            keypair,
            state: Arc::new(RwLock::new(EngineState::default())),
            policies: PolicyTable::new(),
            events,
            router: None,
        })
    }

    /// Starts the engine: loads persisted validator state, captures the
    /// integrity baseline, starts the tamper timers, registers this
    /// device with the trust store, and begins routing events.
    pub async fn initialize(&mut self) -> ArbiterResult<()> {
        self.validator.initialize().await?;
        self.monitor.initialize()?;
        self.monitor.start();

        let now = Utc::now();
        {
            let mut trust = self.trust.write().await;
            trust.register(self.fingerprint.device_id().clone(), DeviceSignals::new(now));
            trust.recompute(self.fingerprint.device_id(), now, "engine startup")?;
        }

        self.router = Some(spawn_router(self.events.subscribe(), Arc::clone(&self.state)));
        info!(device = %self.fingerprint.device_id(), "engine initialized");
        Ok(())
    }

    /// Sets the access policy for a feature. Call before handing the
    /// arbiter to the host; checks read the table without locking.
    pub fn set_policy(&mut self, feature: impl Into<String>, policy: FeaturePolicy) {
        self.policies.set(feature, policy);
    }

    /// Subscribes to engine events (tamper findings, grace transitions,
    /// exit requests).
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.events.subscribe()
    }

    /// Verifies a typed activation key, runs the first validation for
    /// it, and starts periodic revalidation.
    pub async fn activate(&self, key: &str) -> ArbiterResult<ValidationResponse> {
        let activation = ActivationKey::parse(key, &self.keypair.verifying_key)?;
        info!(
            user = %activation.claims().user_id,
            tier = ?activation.claims().tier,
            "activation key verified"
        );

        let request = self.request_for(activation.raw());
        self.state.write().await.license_key = Some(activation.raw().to_string());

        let response = self.run_validation(&request).await?;
        self.validator.start_periodic(request).await;
        Ok(response)
    }

    /// Revalidates the active license and refreshes the cached state
    /// the hot path reads.
    pub async fn validate_license(
        &self,
        request: Option<ValidationRequest>,
    ) -> ArbiterResult<ValidationResponse> {
        let request = match request {
            Some(request) => request,
            None => {
                let key = self
                    .state
                    .read()
                    .await
                    .license_key
                    .clone()
                    .ok_or(ArbiterError::NoLicenseKey)?;
                self.request_for(&key)
            }
        };
        self.run_validation(&request).await
    }

    async fn run_validation(
        &self,
        request: &ValidationRequest,
    ) -> ArbiterResult<ValidationResponse> {
        let now = Utc::now();

        // A clock running behind the last validation is a tamper
        // signal, not a validation error.
        let prior = self
            .state
            .read()
            .await
            .license
            .as_ref()
            .and_then(|l| l.last_online_validation);
        if let Some(last) = prior
            && let Some(finding) =
                check_clock_rollback(now, last, chrono::Duration::seconds(CLOCK_SKEW_SECS))
        {
            self.monitor.report(finding).await;
        }

        let response = self.validator.validate(request).await?;

        let mut state = self.state.write().await;
        state.offline = response.offline;
        state.grace = response.grace_period.clone();

        if let Some(license) = &response.license {
            let mut license = license.clone();
            if response.grace_period.is_some() {
                license.status = LicenseStatus::GracePeriod;
            }
            state.subscription = Some(Subscription::from_license(&license, now));
            state.license = Some(license);
        }
        if !response.valid
            && let Some(license) = state.license.as_mut()
        {
            license.status = match response.first_error().map(|e| e.code) {
                Some(IssueCode::LicenseExpired) => LicenseStatus::Expired,
                Some(IssueCode::TrialExpired) => LicenseStatus::TrialExpired,
                Some(IssueCode::LicenseRevoked) => LicenseStatus::Revoked,
                Some(IssueCode::LicenseSuspended) => LicenseStatus::Suspended,
                _ => LicenseStatus::Invalid,
            };
        }

        Ok(response)
    }

    /// Decides whether `feature` may be used right now. Synchronous
    /// against cached state; the checks run in a fixed order and the
    /// first failure wins. An allowed call increments the feature's
    /// usage counter best-effort.
    pub async fn check_feature_access(&self, feature: &str) -> FeatureAccessDecision {
        let policy = self.policies.get(feature);
        let now = Utc::now();

        let mut state = self.state.write().await;
        let EngineState {
            license,
            subscription,
            offline,
            features_disabled,
            ..
        } = &mut *state;

        let Some(license) = license.as_ref() else {
            return FeatureAccessDecision::deny(DenyReason::NoLicense);
        };
        if !license.status.is_usable() {
            debug!(status = ?license.status, "license not usable");
            return FeatureAccessDecision::deny(DenyReason::NoLicense);
        }
        let Some(subscription) = subscription.as_mut() else {
            return FeatureAccessDecision::deny(DenyReason::NoLicense);
        };

        let Some(entitlement) = license.feature(feature) else {
            return FeatureAccessDecision::deny(DenyReason::FeatureNotIncluded);
        };
        if !entitlement.enabled {
            return FeatureAccessDecision::deny(DenyReason::FeatureDisabled);
        }

        if subscription.exhausted(feature, now) {
            return FeatureAccessDecision::deny(DenyReason::UsageExhausted);
        }

        if subscription.tier() < policy.min_tier {
            return FeatureAccessDecision::deny(DenyReason::TierTooLow {
                required: policy.min_tier,
            });
        }

        if *offline && !policy.offline_available {
            return FeatureAccessDecision::deny(DenyReason::OfflineUnavailable);
        }

        if *features_disabled && !policy.essential {
            return FeatureAccessDecision::deny(DenyReason::TamperDisabled);
        }

        let used = subscription.increment(feature, now);
        debug!(feature, used, "feature access granted");
        FeatureAccessDecision::allow()
    }

    /// Seals the active license into an offline license and installs it
    /// so the validator can bridge connectivity gaps.
    pub async fn provision_offline(&self) -> ArbiterResult<()> {
        let license = self
            .state
            .read()
            .await
            .license
            .clone()
            .ok_or(ArbiterError::NoLicenseKey)?;

        let salt = deterministic_salt(&self.config.passphrase);
        let key = derive_key(&self.config.passphrase, &salt, &KdfParams::default())?;
        let offline = issue_offline(&license, &key, &self.keypair, Utc::now())?;
        self.validator.set_offline_license(offline).await?;
        Ok(())
    }

    /// Recomputes this device's trust score, publishing change and
    /// quarantine events.
    pub async fn refresh_trust(&self, cause: &str) -> ArbiterResult<DeviceTrustScore> {
        let device_id = self.fingerprint.device_id().clone();
        let mut trust = self.trust.write().await;

        let before = trust.last_score(&device_id);
        let snapshot = trust.recompute(&device_id, Utc::now(), cause)?;

        if let Some(old_score) = before
            && old_score != snapshot.score
        {
            let _ = self.events.send(EngineEvent::TrustScoreChanged {
                device_id: device_id.clone(),
                old_score,
                new_score: snapshot.score,
            });
        }
        if trust.is_quarantined(&device_id) {
            warn!(score = snapshot.score, "device quarantined");
            let _ = self.events.send(EngineEvent::DeviceQuarantined {
                device_id,
                score: snapshot.score,
            });
        }
        Ok(snapshot)
    }

    /// Updates this device's trust signals and recomputes.
    pub async fn report_signals<F>(&self, cause: &str, update: F) -> ArbiterResult<DeviceTrustScore>
    where
        F: FnOnce(&mut DeviceSignals),
    {
        {
            let mut trust = self.trust.write().await;
            trust.update_signals(self.fingerprint.device_id(), update)?;
        }
        self.refresh_trust(cause).await
    }

    /// Records a tamper finding produced by the host (anomalies the
    /// built-in checks cannot see). Goes through the same policy and
    /// event pipeline as the monitor's own findings.
    pub async fn report_tamper(&self, finding: Finding) {
        self.monitor.report(finding).await;
    }

    /// The hardware fingerprint of this device.
    #[must_use]
    pub fn fingerprint(&self) -> &HardwareFingerprint {
        &self.fingerprint
    }

    /// The validator's current state machine position.
    pub async fn validation_state(&self) -> ValidationState {
        self.validator.state().await
    }

    /// Alerts queued by tamper responses, draining the queue. The host
    /// delivers them best-effort; losing one is acceptable.
    pub async fn take_alerts(&self) -> Vec<String> {
        std::mem::take(&mut self.state.write().await.pending_alerts)
    }

    /// Whether non-essential features are currently tamper-disabled.
    pub async fn features_disabled(&self) -> bool {
        self.state.read().await.features_disabled
    }

    /// Grace-period details currently in effect, if any.
    pub async fn grace_period(&self) -> Option<GracePeriodInfo> {
        self.state.read().await.grace.clone()
    }

    /// Stops everything: tamper timers, validation timers, event
    /// routing. Recorded detections and the persisted cache survive.
    pub async fn shutdown(&mut self) {
        self.monitor.shutdown();
        self.validator.shutdown().await;
        if let Some(router) = self.router.take() {
            router.abort();
        }
        info!("engine stopped");
    }

    fn request_for(&self, license_key: &str) -> ValidationRequest {
        ValidationRequest::new(
            license_key,
            self.fingerprint.as_str(),
            &self.config.product_id,
            &self.config.product_version,
        )
    }
}

/// Folds engine events into arbiter state. `ExitRequired` is
/// deliberately not handled here — the host owns process exit.
fn spawn_router(
    mut events: broadcast::Receiver<EngineEvent>,
    state: Arc<RwLock<EngineState>>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let event = match events.recv().await {
                Ok(event) => event,
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    warn!(missed, "event router lagged");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => break,
            };

            match event {
                EngineEvent::FeaturesDisabled { reason } => {
                    warn!(%reason, "disabling non-essential features");
                    state.write().await.features_disabled = true;
                }
                EngineEvent::LicenseRevoked { reason } => {
                    warn!(%reason, "revoking license locally");
                    let mut state = state.write().await;
                    if let Some(license) = state.license.as_mut() {
                        license.status = LicenseStatus::Revoked;
                    }
                }
                EngineEvent::ServerAlert { message } => {
                    state.write().await.pending_alerts.push(message);
                }
                EngineEvent::GracePeriodStarted(info) => {
                    state.write().await.grace = Some(info);
                }
                EngineEvent::GracePeriodExpired { .. } => {
                    state.write().await.grace = None;
                }
                EngineEvent::ExitRequired { delay, ref reason } => {
                    warn!(?delay, %reason, "exit requested; host will terminate");
                }
                _ => {}
            }
        }
    })
}
