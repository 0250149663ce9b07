//! Tamper detection types.
//!
//! A `TamperDetection` records a single observed anomaly. Detections are
//! immutable once created; escalation decisions are made by the monitor's
//! response policy from the severity and the running detection counter.

use crate::ids::DetectionId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The family of anomaly that was observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TamperKind {
    /// A debugger appears to be attached to this process.
    DebuggerAttached,
    /// Known debugging/reversing tooling is present in the environment.
    DebugTooling,
    /// A critical file's content hash no longer matches the baseline.
    IntegrityViolation,
    /// A critical file from the baseline is missing entirely.
    FileMissing,
    /// The process appears to run inside a VM or emulator.
    VirtualMachine,
    /// The process image diverges from its on-disk executable.
    ProcessHollowing,
    /// System clock moved backwards past the last validation.
    ClockRollback,
}

/// Severity of a finding, lowest to highest.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

/// What the monitor is configured to do about findings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseAction {
    /// Record the detection and nothing else.
    LogOnly,
    /// Disable all non-essential features until cleared.
    DisableFeatures,
    /// Schedule a graceful process exit (only for critical findings or
    /// once the detection counter crosses its threshold).
    ExitApplication,
    /// Mark the license revoked locally.
    RevokeLicense,
    /// Queue a best-effort alert to the server.
    AlertServer,
}

/// A single observed anomaly. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TamperDetection {
    /// Detection ID.
    pub id: DetectionId,
    /// Anomaly family.
    pub kind: TamperKind,
    /// Severity of this finding.
    pub severity: Severity,
    /// Human-readable description.
    pub description: String,
    /// When the anomaly was observed.
    pub detected_at: DateTime<Utc>,
    /// Check-specific details (file path, vendor string, ...).
    pub details: serde_json::Value,
    /// The response action that was configured when this fired.
    pub response: ResponseAction,
    /// Whether a response has been carried out.
    pub handled: bool,
}

impl TamperDetection {
    /// Creates a detection observed now.
    #[must_use]
    pub fn new(
        kind: TamperKind,
        severity: Severity,
        description: impl Into<String>,
        response: ResponseAction,
    ) -> Self {
        Self {
            id: DetectionId::new(),
            kind,
            severity,
            description: description.into(),
            detected_at: Utc::now(),
            details: serde_json::Value::Null,
            response,
            handled: false,
        }
    }

    /// Attaches check-specific details.
    #[must_use]
    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = details;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_ordering() {
        assert!(Severity::Low < Severity::Medium);
        assert!(Severity::High < Severity::Critical);
    }
}
