//! The validation state machine.
//!
//! `validate()` is the single entry point. It deduplicates concurrent
//! requests per cache key, serves fresh cache hits, attempts server
//! validation, and on connectivity failure walks the fallback chain:
//! usable cache entry → offline license → grace period → hard failure
//! with `OFFLINE_PERIOD_EXCEEDED` (recoverable — reconnecting can
//! restore validity).
//!
//! Three independent timers exist: the periodic revalidation interval,
//! the exponential retry backoff used only while in a failure/grace
//! state, and a one-shot deferred task that force-ends a grace period at
//! its deadline even if `validate()` is never called again.

use crate::cache::{ValidationCache, CACHE_FILE};
use crate::client::ServerClient;
use crate::error::{ValidationError, ValidationResult};
use crate::offline::{redeem_offline, EncryptedOfflineLicense, OfflineStore};
use chrono::{DateTime, Utc};
use keyward_crypto::{DerivedKey, VerifyingKey};
use keyward_types::{
    EngineEvent, GracePeriodInfo, IssueCode, License, LicenseStatus, LicenseType,
    ValidationIssue, ValidationRequest, ValidationResponse,
};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Configuration for the validator.
#[derive(Debug, Clone)]
pub struct ValidatorConfig {
    /// Directory holding `licenses.json` and `offline.json`.
    pub data_dir: PathBuf,
    /// Cache entries younger than this short-circuit validation.
    pub cache_ttl: Duration,
    /// Periodic background revalidation interval.
    pub validation_interval: Duration,
    /// Base retry interval; doubles per attempt while in grace.
    pub retry_interval: Duration,
    /// Retry attempts before the grace period is treated as exhausted.
    pub max_retries: u32,
    /// Grace window used when no license is available to say otherwise.
    pub grace_period_days: u32,
    /// Offline ceiling used when no license is available to say otherwise.
    pub max_offline_days: u32,
    /// Whether cache hits may short-circuit validation.
    pub allow_cached: bool,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("."),
            cache_ttl: Duration::from_secs(60 * 60),
            validation_interval: Duration::from_secs(24 * 60 * 60),
            retry_interval: Duration::from_secs(60),
            max_retries: 5,
            grace_period_days: 3,
            max_offline_days: 14,
            allow_cached: true,
        }
    }
}

/// Where the validator currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationState {
    /// Last validation reached the server.
    Online,
    /// Operating from a fresh or still-usable cache entry.
    CachedValid,
    /// Operating on an offline license.
    OfflineFallback,
    /// Past expiry or connectivity loss, inside the grace window.
    GracePeriod,
    /// No path to validity remains until connectivity returns.
    Failed,
}

/// Local assessment of a resolved license: expiry, grace, revocation,
/// hardware binding, seats.
#[derive(Debug, Clone)]
pub struct Assessment {
    /// Status the license should carry after this assessment.
    pub status: LicenseStatus,
    /// Blocking errors.
    pub errors: Vec<ValidationIssue>,
    /// Non-blocking warnings.
    pub warnings: Vec<ValidationIssue>,
    /// Grace-period details when the license is expired but inside its
    /// grace window.
    pub grace: Option<GracePeriodInfo>,
}

impl Assessment {
    /// True when nothing blocks use of the license.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Assesses a license at `now`, independent of connectivity.
///
/// An expired license inside its `grace_period_days` window stays usable
/// with a `GRACE_PERIOD` warning whose clock starts at the expiry
/// instant; past the window it fails with `LICENSE_EXPIRED`
/// (recoverable — renewal fixes it).
#[must_use]
pub fn assess_license(
    license: &License,
    expected_fingerprint: Option<&str>,
    now: DateTime<Utc>,
) -> Assessment {
    let mut assessment = Assessment {
        status: LicenseStatus::Valid,
        errors: Vec::new(),
        warnings: Vec::new(),
        grace: None,
    };

    match license.status {
        LicenseStatus::Revoked => {
            assessment.status = LicenseStatus::Revoked;
            assessment.errors.push(ValidationIssue::new(
                IssueCode::LicenseRevoked,
                "license has been revoked",
                false,
            ));
            return assessment;
        }
        LicenseStatus::Suspended => {
            assessment.status = LicenseStatus::Suspended;
            assessment.errors.push(ValidationIssue::new(
                IssueCode::LicenseSuspended,
                "license is suspended",
                true,
            ));
            return assessment;
        }
        _ => {}
    }

    if let Some(expected) = expected_fingerprint
        && license.hardware_id.as_str() != expected
    {
        assessment.status = LicenseStatus::Invalid;
        assessment.errors.push(ValidationIssue::new(
            IssueCode::HardwareMismatch,
            "license is bound to different hardware",
            false,
        ));
        return assessment;
    }

    if license.current_seats > license.max_seats {
        assessment.errors.push(ValidationIssue::new(
            IssueCode::SeatLimit,
            format!(
                "seat limit exceeded: {} of {}",
                license.current_seats, license.max_seats
            ),
            true,
        ));
    }

    if let Some(expires_at) = license.expires_at
        && now >= expires_at
    {
        let info = GracePeriodInfo::compute(
            now,
            expires_at,
            license.grace_period_days,
            "license expired",
        );
        if info.active {
            assessment.status = LicenseStatus::GracePeriod;
            assessment.warnings.push(ValidationIssue::new(
                IssueCode::GracePeriod,
                format!("license expired, {} day(s) of grace remain", info.remaining_days),
                true,
            ));
            assessment.grace = Some(info);
        } else {
            let (status, code) = if license.license_type == LicenseType::Trial {
                (LicenseStatus::TrialExpired, IssueCode::TrialExpired)
            } else {
                (LicenseStatus::Expired, IssueCode::LicenseExpired)
            };
            assessment.status = status;
            assessment
                .errors
                .push(ValidationIssue::new(code, "license has expired", true));
        }
    }

    if assessment.errors.is_empty() && assessment.grace.is_none() {
        assessment.status = LicenseStatus::Valid;
    }
    assessment
}

/// Outcome shared with deduplicated concurrent callers.
type SharedOutcome = Result<ValidationResponse, Arc<ValidationError>>;

/// Mutable validator state, guarded by one lock.
struct Inner {
    cache: ValidationCache,
    state: ValidationState,
    last_successful: Option<DateTime<Utc>>,
    grace: Option<GracePeriodInfo>,
    retry_count: u32,
}

/// The validation state machine.
pub struct Validator {
    config: ValidatorConfig,
    client: ServerClient,
    key: DerivedKey,
    verifying_key: VerifyingKey,
    offline_store: OfflineStore,
    offline: RwLock<Option<EncryptedOfflineLicense>>,
    inner: RwLock<Inner>,
    inflight: Mutex<HashMap<String, broadcast::Sender<SharedOutcome>>>,
    events: broadcast::Sender<EngineEvent>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    grace_task: Mutex<Option<JoinHandle<()>>>,
    retry_task: Mutex<Option<JoinHandle<()>>>,
}

impl Validator {
    /// Creates a validator. Call `initialize` before first use to load
    /// persisted cache and offline state.
    #[must_use]
    pub fn new(
        config: ValidatorConfig,
        client: ServerClient,
        key: DerivedKey,
        verifying_key: VerifyingKey,
        events: broadcast::Sender<EngineEvent>,
    ) -> Self {
        let offline_store = OfflineStore::new(&config.data_dir);
        Self {
            config,
            client,
            key,
            verifying_key,
            offline_store,
            offline: RwLock::new(None),
            inner: RwLock::new(Inner {
                cache: ValidationCache::new(),
                state: ValidationState::Failed,
                last_successful: None,
                grace: None,
                retry_count: 0,
            }),
            inflight: Mutex::new(HashMap::new()),
            events,
            tasks: Mutex::new(Vec::new()),
            grace_task: Mutex::new(None),
            retry_task: Mutex::new(None),
        }
    }

    /// Loads the persisted response cache and offline license.
    pub async fn initialize(&self) -> ValidationResult<()> {
        let cache = ValidationCache::load(&self.config.data_dir.join(CACHE_FILE))?;
        let offline = self.offline_store.load()?;
        info!(
            cached = cache.len(),
            offline = offline.is_some(),
            "validator initialized"
        );

        self.inner.write().await.cache = cache;
        *self.offline.write().await = offline;
        Ok(())
    }

    /// Current state machine position.
    pub async fn state(&self) -> ValidationState {
        self.inner.read().await.state
    }

    /// Grace-period details, when one is active.
    pub async fn grace_period(&self) -> Option<GracePeriodInfo> {
        self.inner.read().await.grace.clone()
    }

    /// Timestamp of the last successful online validation.
    pub async fn last_successful(&self) -> Option<DateTime<Utc>> {
        self.inner.read().await.last_successful
    }

    /// Installs an offline license and persists it.
    pub async fn set_offline_license(
        &self,
        offline: EncryptedOfflineLicense,
    ) -> ValidationResult<()> {
        self.offline_store.save(&offline)?;
        *self.offline.write().await = Some(offline);
        Ok(())
    }

    /// Validates at the current wall-clock time.
    pub async fn validate(
        self: &Arc<Self>,
        request: &ValidationRequest,
    ) -> ValidationResult<ValidationResponse> {
        self.validate_at(request, Utc::now()).await
    }

    /// Validates at an explicit `now`. The protocol core; `validate`
    /// merely supplies the clock.
    pub async fn validate_at(
        self: &Arc<Self>,
        request: &ValidationRequest,
        now: DateTime<Utc>,
    ) -> ValidationResult<ValidationResponse> {
        let cache_key = request.cache_key();

        // At most one concurrent validation per key: joiners await the
        // leader's outcome instead of issuing duplicate network calls.
        {
            let mut inflight = self.inflight.lock().await;
            if let Some(tx) = inflight.get(&cache_key) {
                let mut rx = tx.subscribe();
                drop(inflight);
                debug!(key = %cache_key, "joining in-flight validation");
                return match rx.recv().await {
                    Ok(Ok(response)) => Ok(response),
                    Ok(Err(shared)) => Err(ValidationError::InFlight(shared)),
                    Err(_) => Err(ValidationError::Shutdown),
                };
            }
            let (tx, _) = broadcast::channel(1);
            inflight.insert(cache_key.clone(), tx);
        }

        let result = self.validate_uncoordinated(request, &cache_key, now).await;

        // Joiners subscribe under the inflight lock, so the receiver
        // count is exact once the sender is removed. On failure the
        // error moves into the Arc whole, keeping its category for
        // every waiter.
        let tx = self.inflight.lock().await.remove(&cache_key);
        match (result, tx) {
            (Ok(response), Some(tx)) => {
                let _ = tx.send(Ok(response.clone()));
                Ok(response)
            }
            (Err(e), Some(tx)) if tx.receiver_count() > 0 => {
                let shared = Arc::new(e);
                let _ = tx.send(Err(Arc::clone(&shared)));
                Err(ValidationError::InFlight(shared))
            }
            (result, _) => result,
        }
    }

    /// The per-key validation flow, after dedup.
    async fn validate_uncoordinated(
        self: &Arc<Self>,
        request: &ValidationRequest,
        cache_key: &str,
        now: DateTime<Utc>,
    ) -> ValidationResult<ValidationResponse> {
        // Fresh cache hit.
        if self.config.allow_cached {
            let inner = self.inner.read().await;
            if let Some(entry) =
                inner
                    .cache
                    .get_fresh(cache_key, chrono_ttl(self.config.cache_ttl), now)
            {
                debug!(key = %cache_key, "serving fresh cache entry");
                let mut response = entry.response.clone();
                response.cached = true;
                return Ok(response);
            }
        }

        // Server attempt.
        match self.client.validate(request).await {
            Ok(response) => {
                self.accept_server_response(request, cache_key, response, now)
                    .await
            }
            Err(e) if e.recoverable() => self.fallback(request, cache_key, now, &e).await,
            // Crypto/format failures surface immediately — a forged
            // response must never fall back to a lenient path.
            Err(e) => {
                error!(error = %e, "non-recoverable validation failure");
                Err(e)
            }
        }
    }

    /// Handles a signature-verified server response: local assessment,
    /// state update, caching.
    async fn accept_server_response(
        self: &Arc<Self>,
        request: &ValidationRequest,
        cache_key: &str,
        mut response: ValidationResponse,
        now: DateTime<Utc>,
    ) -> ValidationResult<ValidationResponse> {
        // The server's word on revocation/entitlement stands, but expiry
        // and grace are re-derived locally so the clock used for grace
        // countdown is ours.
        if let Some(license) = &mut response.license {
            license.last_online_validation = Some(now);
            let assessment =
                assess_license(license, Some(&request.hardware_fingerprint), now);
            license.status = assessment.status;
            response.valid = response.valid && assessment.is_valid();
            response.errors.extend(assessment.errors);
            response.warnings.extend(assessment.warnings);
            if response.grace_period.is_none() {
                response.grace_period = assessment.grace.clone();
            }
        }

        let entering_grace = response.grace_period.clone();
        {
            let mut inner = self.inner.write().await;
            inner.last_successful = Some(now);
            inner.retry_count = 0;
            inner.grace = entering_grace.clone();
            inner.state = if entering_grace.is_some() {
                ValidationState::GracePeriod
            } else {
                ValidationState::Online
            };

            let mut cached = response.clone();
            cached.cached = false;
            inner.cache.insert(cache_key.to_string(), cached, now);
            if let Err(e) = inner.cache.save(&self.config.data_dir.join(CACHE_FILE)) {
                warn!(error = %e, "failed to persist validation cache");
            }
        }

        // A reachable server resolves any connectivity grace; an expiry
        // grace gets its deadline watcher.
        self.cancel_grace_task().await;
        if let Some(info) = entering_grace {
            let _ = self.events.send(EngineEvent::GracePeriodStarted(info.clone()));
            self.spawn_grace_deadline(&info, now).await;
        }

        if response.valid {
            info!(key = %request.license_key, "online validation succeeded");
            let _ = self.events.send(EngineEvent::ValidationSucceeded {
                license_key: request.license_key.clone(),
            });
        } else {
            let reason = response
                .first_error()
                .map(|e| e.message.clone())
                .unwrap_or_else(|| "invalid".to_string());
            let _ = self.events.send(EngineEvent::ValidationFailed {
                license_key: request.license_key.clone(),
                reason,
            });
        }

        Ok(response)
    }

    /// The offline fallback chain, entered on any connectivity failure.
    async fn fallback(
        self: &Arc<Self>,
        request: &ValidationRequest,
        cache_key: &str,
        now: DateTime<Utc>,
        cause: &ValidationError,
    ) -> ValidationResult<ValidationResponse> {
        warn!(error = %cause, "server unreachable, entering fallback chain");

        // (a) A cached response whose license is still alive.
        {
            let mut inner = self.inner.write().await;
            if let Some(entry) = inner.cache.get_any(cache_key)
                && entry.response.valid
                && entry
                    .response
                    .license
                    .as_ref()
                    .is_some_and(|l| !l.is_expired_at(now))
            {
                info!("falling back to cached validation");
                let mut response = entry.response.clone();
                response.cached = true;
                response.offline = true;
                response.warnings.push(offline_warning());
                // Shortened next check: try the server again soon.
                response.next_validation = now + chrono_ttl(self.config.retry_interval);
                inner.state = ValidationState::CachedValid;
                return Ok(response);
            }
        }

        // (b) A signed offline license within both of its bounds.
        let offline = self.offline.read().await.clone();
        if let Some(offline) = offline {
            let last = self.inner.read().await.last_successful;
            let max_days = self.max_offline_days(cache_key).await;
            match redeem_offline(&offline, &self.key, &self.verifying_key, now, last, max_days)?
            {
                Some(mut license) => {
                    info!("falling back to offline license");
                    license.status = LicenseStatus::OfflineMode;
                    let mut inner = self.inner.write().await;
                    inner.state = ValidationState::OfflineFallback;
                    return Ok(ValidationResponse {
                        valid: true,
                        license: Some(license),
                        errors: Vec::new(),
                        warnings: vec![offline_warning()],
                        grace_period: None,
                        next_validation: now + chrono_ttl(self.config.retry_interval),
                        signature: None,
                        cached: false,
                        offline: true,
                    });
                }
                None => debug!("offline license not usable"),
            }
        }

        // (c) Grace period over the connectivity gap, else the ceiling.
        self.connectivity_grace(request, cache_key, now).await
    }

    /// Enters or continues a connectivity grace period, or fails with
    /// `OFFLINE_PERIOD_EXCEEDED` once the window has lapsed.
    async fn connectivity_grace(
        self: &Arc<Self>,
        request: &ValidationRequest,
        cache_key: &str,
        now: DateTime<Utc>,
    ) -> ValidationResult<ValidationResponse> {
        let grace_days = self.grace_days(cache_key).await;

        let (info, retry_count, license) = {
            let mut inner = self.inner.write().await;

            let Some(last) = inner.last_successful else {
                // Never validated online: there is nothing to extend.
                inner.state = ValidationState::Failed;
                return Ok(ValidationResponse::failure(
                    ValidationIssue::new(
                        IssueCode::Network,
                        "validation server unreachable and no prior validation exists",
                        true,
                    ),
                    now + chrono_ttl(self.config.retry_interval),
                ));
            };

            let info = GracePeriodInfo::compute(now, last, grace_days, "connectivity lost");
            if !info.active || inner.retry_count >= self.config.max_retries {
                if inner.retry_count >= self.config.max_retries {
                    warn!("retry budget exhausted, ending grace period");
                }
                inner.state = ValidationState::Failed;
                inner.grace = None;
                return Ok(ValidationResponse::failure(
                    ValidationIssue::new(
                        IssueCode::OfflinePeriodExceeded,
                        format!("no successful validation in more than {grace_days} day(s)"),
                        true,
                    ),
                    now + chrono_ttl(self.config.retry_interval),
                ));
            }

            let entering = inner.grace.is_none();
            inner.grace = Some(info.clone());
            inner.state = ValidationState::GracePeriod;
            inner.retry_count += 1;

            let license = inner
                .cache
                .get_any(cache_key)
                .and_then(|e| e.response.license.clone());
            (info, inner.retry_count, entering.then_some(license))
        };

        // Exponential backoff: retry_interval * 2^(n-1).
        let backoff = self
            .config
            .retry_interval
            .saturating_mul(1u32 << (retry_count - 1).min(16));
        self.spawn_retry(request.clone(), backoff).await;

        let license = match license {
            Some(license) => {
                // First entry into this grace period.
                let _ = self
                    .events
                    .send(EngineEvent::GracePeriodStarted(info.clone()));
                self.spawn_grace_deadline(&info, now).await;
                license
            }
            None => {
                let inner = self.inner.read().await;
                inner
                    .cache
                    .get_any(cache_key)
                    .and_then(|e| e.response.license.clone())
            }
        };

        info!(
            remaining_days = info.remaining_days,
            retry_count, "operating in grace period"
        );

        Ok(ValidationResponse {
            valid: true,
            license,
            errors: Vec::new(),
            warnings: vec![ValidationIssue::new(
                IssueCode::GracePeriod,
                format!(
                    "server unreachable, {} day(s) of grace remain",
                    info.remaining_days
                ),
                true,
            )],
            grace_period: Some(info),
            next_validation: now + chrono_ttl(backoff),
            signature: None,
            cached: false,
            offline: true,
        })
    }

    /// Starts periodic background revalidation for `request`.
    pub async fn start_periodic(self: &Arc<Self>, request: ValidationRequest) {
        let validator = Arc::clone(self);
        let period = self.config.validation_interval;
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.tick().await; // immediate first tick is the startup validation
            loop {
                ticker.tick().await;
                let mut request = request.clone();
                request.timestamp = Utc::now();
                if let Err(e) = validator.validate(&request).await {
                    warn!(error = %e, "periodic validation failed");
                }
            }
        });
        self.tasks.lock().await.push(task);
    }

    /// Schedules a single backoff retry. Runs independently of the
    /// periodic timer and only while in a failure/grace state. The
    /// handle is tracked so `shutdown` cancels an armed retry.
    fn spawn_retry<'a>(
        self: &'a Arc<Self>,
        mut request: ValidationRequest,
        delay: Duration,
    ) -> std::pin::Pin<Box<dyn Future<Output = ()> + Send + 'a>> {
        Box::pin(async move {
            let validator = Arc::clone(self);
            let task = tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                if validator.inner.read().await.state != ValidationState::GracePeriod {
                    return;
                }
                request.timestamp = Utc::now();
                debug!("grace-period retry firing");
                if let Err(e) = validator.validate(&request).await {
                    warn!(error = %e, "grace-period retry failed");
                }
            });

            let mut slot = self.retry_task.lock().await;
            if let Some(old) = slot.replace(task) {
                old.abort();
            }
        })
    }

    /// Arms the time-driven grace deadline: the period force-ends at
    /// `ends_at` even if `validate()` is never called again.
    async fn spawn_grace_deadline(self: &Arc<Self>, info: &GracePeriodInfo, now: DateTime<Utc>) {
        let remaining = (info.ends_at - now)
            .to_std()
            .unwrap_or(Duration::from_secs(0));
        let ends_at = info.ends_at;
        let validator = Arc::clone(self);

        let task = tokio::spawn(async move {
            tokio::time::sleep(remaining).await;
            let mut inner = validator.inner.write().await;
            let still_this_grace = inner
                .grace
                .as_ref()
                .is_some_and(|g| g.ends_at == ends_at);
            if still_this_grace {
                warn!("grace period deadline reached");
                inner.grace = None;
                inner.state = ValidationState::Failed;
                let _ = validator
                    .events
                    .send(EngineEvent::GracePeriodExpired { at: ends_at });
            }
        });

        let mut slot = self.grace_task.lock().await;
        if let Some(old) = slot.replace(task) {
            old.abort();
        }
    }

    async fn cancel_grace_task(&self) {
        if let Some(task) = self.grace_task.lock().await.take() {
            task.abort();
        }
    }

    /// Grace window in days: the cached license's own setting, or the
    /// configured default when no license is known.
    async fn grace_days(&self, cache_key: &str) -> u32 {
        let inner = self.inner.read().await;
        inner
            .cache
            .get_any(cache_key)
            .and_then(|e| e.response.license.as_ref())
            .map(|l| l.grace_period_days)
            .unwrap_or(self.config.grace_period_days)
    }

    /// Offline ceiling in days, resolved the same way.
    async fn max_offline_days(&self, cache_key: &str) -> u32 {
        let inner = self.inner.read().await;
        inner
            .cache
            .get_any(cache_key)
            .and_then(|e| e.response.license.as_ref())
            .map(|l| l.allow_offline_days)
            .unwrap_or(self.config.max_offline_days)
    }

    /// Stops all timers and persists the cache. In-flight validations
    /// complete or are abandoned; partial cache writes cannot occur
    /// because saves go through a temp-file rename.
    pub async fn shutdown(&self) {
        for task in self.tasks.lock().await.drain(..) {
            task.abort();
        }
        self.cancel_grace_task().await;
        if let Some(task) = self.retry_task.lock().await.take() {
            task.abort();
        }
        let inner = self.inner.read().await;
        if let Err(e) = inner.cache.save(&self.config.data_dir.join(CACHE_FILE)) {
            warn!(error = %e, "failed to persist cache on shutdown");
        }
        info!("validator stopped");
    }
}

fn offline_warning() -> ValidationIssue {
    ValidationIssue::new(
        IssueCode::OfflineMode,
        "operating without server contact",
        true,
    )
}

fn chrono_ttl(d: Duration) -> chrono::Duration {
    chrono::Duration::from_std(d).unwrap_or_else(|_| chrono::Duration::seconds(i64::MAX / 2))
}
