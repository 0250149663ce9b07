//! The tamper monitor.
//!
//! Runs one independent timer per check family so a slow check never
//! stalls the others, keeps a running detection counter, and applies the
//! configured response policy to every finding. The policy itself is a
//! pure function (`respond`) so escalation behavior is testable without
//! timers.
//!
//! The monitor never terminates the process. An `ExitApplication`
//! response publishes `EngineEvent::ExitRequired` with a grace delay and
//! the host performs the exit after flushing logs.

use crate::baseline::{IntegrityBaseline, IntegrityFinding};
use crate::checks::{
    check_debug_tooling, check_debugger, check_process_hollowing, check_virtual_machine,
    Finding,
};
use crate::error::TamperResult;
use keyward_types::{EngineEvent, ResponseAction, Severity, TamperDetection, TamperKind};
use serde_json::json;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Configuration for the tamper monitor.
#[derive(Debug, Clone)]
pub struct TamperConfig {
    /// Configured response to findings.
    pub response: ResponseAction,
    /// Detection count at which `ExitApplication` fires for non-critical
    /// findings.
    pub max_detections: u32,
    /// Grace delay before the host should exit (flush logs).
    pub exit_delay: Duration,
    /// Oldest detections are dropped past this count; a persistent
    /// condition otherwise appends one entry per probe tick forever.
    pub max_detection_log: usize,
    /// Debugger probe interval.
    pub debugger_interval: Duration,
    /// Debug-tooling heuristics interval.
    pub tooling_interval: Duration,
    /// File-integrity comparison interval.
    pub integrity_interval: Duration,
    /// VM heuristics interval.
    pub vm_interval: Duration,
    /// Process-hollowing check interval.
    pub hollowing_interval: Duration,
    /// Files covered by the integrity baseline.
    pub critical_files: Vec<PathBuf>,
    /// Where the baseline is persisted.
    pub baseline_path: PathBuf,
}

impl Default for TamperConfig {
    fn default() -> Self {
        Self {
            response: ResponseAction::LogOnly,
            max_detections: 5,
            exit_delay: Duration::from_secs(3),
            max_detection_log: 256,
            debugger_interval: Duration::from_secs(1),
            tooling_interval: Duration::from_secs(3),
            integrity_interval: Duration::from_secs(30),
            vm_interval: Duration::from_secs(60),
            hollowing_interval: Duration::from_secs(15),
            critical_files: Vec::new(),
            baseline_path: PathBuf::from("integrity_baseline.json"),
        }
    }
}

/// What the policy decided for a single finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyDecision {
    /// Record only.
    Log,
    /// Deny non-essential features until cleared.
    DisableFeatures,
    /// Schedule a delayed graceful exit.
    ScheduleExit,
    /// Mark the license revoked locally.
    RevokeLicense,
    /// Queue a best-effort server alert.
    AlertServer,
}

/// Response policy. Pure function of the configured action, the finding
/// severity, and the running counter.
///
/// `ExitApplication` only escalates to an actual exit when the finding is
/// Critical or the counter has reached the threshold; below that it
/// records only.
#[must_use]
pub fn respond(
    action: ResponseAction,
    severity: Severity,
    detection_count: u32,
    max_detections: u32,
) -> PolicyDecision {
    match action {
        ResponseAction::LogOnly => PolicyDecision::Log,
        ResponseAction::DisableFeatures => PolicyDecision::DisableFeatures,
        ResponseAction::ExitApplication => {
            if severity == Severity::Critical || detection_count >= max_detections {
                PolicyDecision::ScheduleExit
            } else {
                PolicyDecision::Log
            }
        }
        ResponseAction::RevokeLicense => PolicyDecision::RevokeLicense,
        ResponseAction::AlertServer => PolicyDecision::AlertServer,
    }
}

/// State shared between the monitor handle and its timer tasks.
struct Shared {
    response: ResponseAction,
    max_detections: u32,
    exit_delay: Duration,
    max_detection_log: usize,
    detection_count: AtomicU32,
    detections: RwLock<Vec<TamperDetection>>,
    events: broadcast::Sender<EngineEvent>,
}

impl Shared {
    /// Records a finding: counter, log, event, policy response. The
    /// `TamperDetected` event is published unconditionally — `LogOnly`
    /// must not hide findings from telemetry.
    async fn record(&self, finding: Finding) {
        let count = self.detection_count.fetch_add(1, Ordering::SeqCst) + 1;

        warn!(
            kind = ?finding.kind,
            severity = ?finding.severity,
            count,
            "{}",
            finding.description
        );

        let mut detection = TamperDetection::new(
            finding.kind,
            finding.severity,
            finding.description.clone(),
            self.response,
        )
        .with_details(finding.details);

        let _ = self.events.send(EngineEvent::TamperDetected(detection.clone()));

        match respond(self.response, finding.severity, count, self.max_detections) {
            PolicyDecision::Log => {}
            PolicyDecision::DisableFeatures => {
                let _ = self.events.send(EngineEvent::FeaturesDisabled {
                    reason: finding.description.clone(),
                });
            }
            PolicyDecision::ScheduleExit => {
                warn!(delay = ?self.exit_delay, "scheduling application exit");
                let _ = self.events.send(EngineEvent::ExitRequired {
                    delay: self.exit_delay,
                    reason: finding.description.clone(),
                });
            }
            PolicyDecision::RevokeLicense => {
                let _ = self.events.send(EngineEvent::LicenseRevoked {
                    reason: finding.description.clone(),
                });
            }
            PolicyDecision::AlertServer => {
                let _ = self.events.send(EngineEvent::ServerAlert {
                    message: finding.description.clone(),
                });
            }
        }

        detection.handled = true;
        let mut log = self.detections.write().await;
        log.push(detection);
        let overflow = log.len().saturating_sub(self.max_detection_log);
        if overflow > 0 {
            log.drain(..overflow);
        }
    }
}

/// The tamper monitor. Owns its timer tasks; `shutdown` clears them.
pub struct TamperMonitor {
    config: TamperConfig,
    baseline: Option<IntegrityBaseline>,
    shared: Arc<Shared>,
    tasks: Vec<JoinHandle<()>>,
}

impl TamperMonitor {
    /// Creates a monitor publishing on `events`.
    #[must_use]
    pub fn new(config: TamperConfig, events: broadcast::Sender<EngineEvent>) -> Self {
        let shared = Arc::new(Shared {
            response: config.response,
            max_detections: config.max_detections,
            exit_delay: config.exit_delay,
            max_detection_log: config.max_detection_log,
            detection_count: AtomicU32::new(0),
            detections: RwLock::new(Vec::new()),
            events,
        });

        Self {
            config,
            baseline: None,
            shared,
            tasks: Vec::new(),
        }
    }

    /// Loads or captures the integrity baseline for the configured
    /// critical files. Must run before `start` for integrity checks to be
    /// scheduled.
    pub fn initialize(&mut self) -> TamperResult<()> {
        if self.config.critical_files.is_empty() {
            debug!("no critical files configured, skipping integrity baseline");
            return Ok(());
        }

        let baseline = IntegrityBaseline::load_or_capture(
            &self.config.baseline_path,
            &self.config.critical_files,
        )?;
        info!(files = baseline.len(), "integrity baseline ready");
        self.baseline = Some(baseline);
        Ok(())
    }

    /// Spawns the per-family timer tasks.
    pub fn start(&mut self) {
        self.spawn_check(self.config.debugger_interval, check_debugger);
        self.spawn_check(self.config.tooling_interval, check_debug_tooling);
        self.spawn_check(self.config.vm_interval, check_virtual_machine);
        self.spawn_check(self.config.hollowing_interval, check_process_hollowing);

        if let Some(baseline) = self.baseline.clone() {
            let shared = Arc::clone(&self.shared);
            let period = self.config.integrity_interval;
            self.tasks.push(tokio::spawn(async move {
                let mut ticker = delayed_interval(period);
                loop {
                    ticker.tick().await;
                    for finding in baseline.check() {
                        shared.record(integrity_finding(finding)).await;
                    }
                }
            }));
        }

        info!(tasks = self.tasks.len(), "tamper monitor started");
    }

    fn spawn_check(&mut self, period: Duration, check: fn() -> Option<Finding>) {
        let shared = Arc::clone(&self.shared);
        self.tasks.push(tokio::spawn(async move {
            let mut ticker = delayed_interval(period);
            loop {
                ticker.tick().await;
                if let Some(finding) = check() {
                    shared.record(finding).await;
                }
            }
        }));
    }

    /// Records a finding produced outside the timer loops (clock
    /// rollback from the validator, host-reported anomalies).
    pub async fn report(&self, finding: Finding) {
        self.shared.record(finding).await;
    }

    /// Total findings recorded since startup, across all kinds.
    #[must_use]
    pub fn detection_count(&self) -> u32 {
        self.shared.detection_count.load(Ordering::SeqCst)
    }

    /// Snapshot of all recorded detections.
    pub async fn detections(&self) -> Vec<TamperDetection> {
        self.shared.detections.read().await.clone()
    }

    /// Subscribes to engine events published by this monitor.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.shared.events.subscribe()
    }

    /// Stops all timer tasks. Findings already recorded are retained.
    pub fn shutdown(&mut self) {
        for task in self.tasks.drain(..) {
            task.abort();
        }
        info!("tamper monitor stopped");
    }
}

impl Drop for TamperMonitor {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// A ticker whose first tick lands one full period out. Probes run on
/// their interval, not at startup, so engine initialization stays quiet.
fn delayed_interval(period: Duration) -> tokio::time::Interval {
    tokio::time::interval_at(tokio::time::Instant::now() + period, period)
}

/// Maps an integrity finding to a monitor finding. Missing files are
/// High; a content mismatch means a deliberate replacement and is
/// Critical.
fn integrity_finding(finding: IntegrityFinding) -> Finding {
    match finding {
        IntegrityFinding::Missing { path } => Finding {
            kind: TamperKind::FileMissing,
            severity: Severity::High,
            description: format!("critical file missing: {}", path.display()),
            details: json!({ "path": path.to_string_lossy() }),
        },
        IntegrityFinding::Mismatch {
            path,
            expected,
            actual,
        } => Finding {
            kind: TamperKind::IntegrityViolation,
            severity: Severity::Critical,
            description: format!("critical file modified: {}", path.display()),
            details: json!({
                "path": path.to_string_lossy(),
                "expected": expected,
                "actual": actual,
            }),
        },
    }
}
