//! Feature-access arbitration and engine orchestration.
//!
//! This crate is the top of the engine: it owns the validator, tamper
//! monitor, and trust store, folds their events into one cached state,
//! and answers the only question the host asks on its hot path — "may
//! this feature be used right now?" — without touching the network.

mod arbiter;
mod error;
mod subscription;

pub use arbiter::{Arbiter, ArbiterConfig, DenyReason, FeatureAccessDecision};
pub use error::{ArbiterError, ArbiterResult};
pub use subscription::{FeaturePolicy, PolicyTable, Subscription};
