//! License validation state machine.
//!
//! Drives the online/offline validation protocol:
//! - at most one concurrent validation per cache key (in-flight dedup)
//! - fresh cache hits short-circuit the network entirely
//! - server responses are HMAC-verified before they are trusted
//! - on connectivity failure, fallback runs cache → offline license →
//!   grace period → `OFFLINE_PERIOD_EXCEEDED`
//! - periodic revalidation and retry backoff run on independent timers
//!
//! Connectivity failures are recoverable and retried with exponential
//! backoff; cryptographic failures (forged response signature, bad
//! envelope) surface immediately and are never retried.

mod cache;
mod client;
mod error;
mod machine;
mod offline;

pub use cache::{CacheEntry, ValidationCache};
pub use client::{sign_response, ServerClient, ServerConfig, VALIDATE_PATH};
pub use error::{ErrorCategory, ValidationError, ValidationResult};
pub use machine::{assess_license, Assessment, ValidationState, Validator, ValidatorConfig};
pub use offline::{issue_offline, redeem_offline, EncryptedOfflineLicense, OfflineStore};
