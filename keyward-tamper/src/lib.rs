//! Run-time tamper detection.
//!
//! The monitor runs an independent timer per check family (debugger
//! probe, debug-tooling heuristics, file-integrity hashing, VM
//! heuristics, process-hollowing checks), classifies findings by
//! severity, and applies a configured response policy. Every finding is
//! logged and published as an event regardless of the configured
//! response, so telemetry is never silently dropped.
//!
//! All detections here are heuristic, best-effort signals — this is not
//! an anti-cheat or EDR layer.

mod baseline;
mod checks;
mod error;
mod monitor;

pub use baseline::{IntegrityBaseline, IntegrityFinding};
pub use checks::{
    check_clock_rollback, check_debug_tooling, check_debugger, check_process_hollowing,
    check_virtual_machine, Finding,
};
pub use error::{TamperError, TamperResult};
pub use monitor::{respond, PolicyDecision, TamperConfig, TamperMonitor};
