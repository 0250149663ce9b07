//! Core type definitions for the Keyward protection engine.
//!
//! This crate defines the fundamental types shared by every engine
//! component:
//! - License, feature, and subscription models
//! - Validation request/response shapes and the issue taxonomy
//! - Grace-period bookkeeping
//! - Tamper detections and response actions
//! - Device trust scores
//! - Typed engine events (broadcast to subscribers)
//!
//! Nothing in here performs I/O or cryptography; those live in the
//! component crates that consume these types.

mod event;
mod ids;
mod license;
mod tamper;
mod trust;
mod validation;

pub use event::EngineEvent;
pub use ids::{DetectionId, DeviceId, LicenseId};
pub use license::{
    Feature, License, LicenseStatus, LicenseType, ResetInterval, SubscriptionTier,
};
pub use tamper::{ResponseAction, Severity, TamperDetection, TamperKind};
pub use trust::{DeviceTrustScore, TrustFactor, TrustScoreChange};
pub use validation::{
    EncryptedLicensePayload, GracePeriodInfo, IssueCode, ValidationIssue, ValidationRequest,
    ValidationResponse,
};

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in type operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid UUID: {0}")]
    InvalidUuid(#[from] uuid::Error),

    #[error("invalid timestamp: {0}")]
    InvalidTimestamp(String),
}
