//! Hardware fingerprinting and device trust scoring.
//!
//! The fingerprint binds a license to a machine: it hashes stable
//! hardware identifiers into an opaque `DeviceId`. The trust scorer
//! computes an advisory 0–100 score per registered device from five
//! weighted factors and keeps an append-only history of score changes.
//!
//! Trust is an input to policy (the arbiter, device quarantine), never a
//! pass/fail gate by itself.

mod error;
mod fingerprint;
mod scorer;

pub use error::{TrustError, TrustResult};
pub use fingerprint::{DeviceInfo, HardwareFingerprint};
pub use scorer::{
    calculate_trust_score, DeviceSignals, GeoPoint, TrustConfig, TrustStore, FACTOR_WEIGHTS,
};
