//! Device trust score types.
//!
//! A trust score is a 0–100 weighted composite over five factors. The
//! change history is an append-only audit trail: an entry is added only
//! when the score actually changes, and existing entries are never
//! rewritten.

use crate::ids::DeviceId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One weighted input into a trust score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrustFactor {
    /// Factor name ("age", "usage", "security_posture", ...).
    pub name: String,
    /// Weight out of 100. All factor weights sum to exactly 100.
    pub weight: u32,
    /// The factor's own 0–100 sub-score.
    pub score: u32,
}

impl TrustFactor {
    /// Creates a factor snapshot.
    #[must_use]
    pub fn new(name: impl Into<String>, weight: u32, score: u32) -> Self {
        Self {
            name: name.into(),
            weight,
            score: score.min(100),
        }
    }
}

/// One entry in the trust-score audit trail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrustScoreChange {
    /// When the change was recorded.
    pub at: DateTime<Utc>,
    /// Score before the change.
    pub old_score: u32,
    /// Score after the change.
    pub new_score: u32,
    /// Signed delta (`new_score - old_score`).
    pub delta: i32,
    /// What triggered the recomputation.
    pub cause: String,
}

/// A computed trust score with its factor snapshot and history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceTrustScore {
    /// The device this score belongs to.
    pub device_id: DeviceId,
    /// Weight-normalized composite, 0–100.
    pub score: u32,
    /// Snapshot of the factors that produced `score`.
    pub factors: Vec<TrustFactor>,
    /// Append-only change history.
    pub history: Vec<TrustScoreChange>,
    /// When this snapshot was computed.
    pub computed_at: DateTime<Utc>,
}

impl DeviceTrustScore {
    /// Sum of factor weights. Must be 100 for a well-formed score.
    #[must_use]
    pub fn total_weight(&self) -> u32 {
        self.factors.iter().map(|f| f.weight).sum()
    }
}
