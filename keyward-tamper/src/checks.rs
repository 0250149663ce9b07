//! Individual tamper checks.
//!
//! Each check returns `Option<Finding>`: `None` means nothing suspicious
//! was observed. The debugger probes report a low-confidence boolean from
//! platform APIs only — timing-based sleep-and-measure heuristics are
//! deliberately not used.

use chrono::{DateTime, Duration, Utc};
use keyward_types::{Severity, TamperKind};
use serde_json::json;
use std::env;

/// A positive result from one check, before the monitor wraps it into a
/// `TamperDetection` with the configured response.
#[derive(Debug, Clone, PartialEq)]
pub struct Finding {
    pub kind: TamperKind,
    pub severity: Severity,
    pub description: String,
    pub details: serde_json::Value,
}

/// Environment variables whose presence suggests instrumented execution.
const SUSPECT_ENV_VARS: [&str; 4] = [
    "LD_PRELOAD",
    "DYLD_INSERT_LIBRARIES",
    "FRIDA_OPTIONS",
    "RR_TRACE_DIR",
];

/// Probes for an attached debugger.
///
/// On Linux this reads `TracerPid` from `/proc/self/status`. Other
/// platforms currently report nothing rather than guessing from timing.
#[must_use]
pub fn check_debugger() -> Option<Finding> {
    #[cfg(target_os = "linux")]
    {
        let status = std::fs::read_to_string("/proc/self/status").ok()?;
        let tracer = status
            .lines()
            .find(|line| line.starts_with("TracerPid:"))?
            .split(':')
            .nth(1)?
            .trim();

        if tracer != "0" {
            return Some(Finding {
                kind: TamperKind::DebuggerAttached,
                severity: Severity::High,
                description: "process is being traced".to_string(),
                details: json!({ "tracer_pid": tracer }),
            });
        }
        None
    }

    #[cfg(not(target_os = "linux"))]
    {
        None
    }
}

/// Looks for debugging/reversing tooling in the environment.
#[must_use]
pub fn check_debug_tooling() -> Option<Finding> {
    let present: Vec<&str> = SUSPECT_ENV_VARS
        .iter()
        .copied()
        .filter(|var| env::var_os(var).is_some())
        .collect();

    if present.is_empty() {
        return None;
    }

    Some(Finding {
        kind: TamperKind::DebugTooling,
        severity: Severity::Medium,
        description: format!("instrumentation environment detected: {}", present.join(", ")),
        details: json!({ "env_vars": present }),
    })
}

/// Heuristics for VM/emulator execution: DMI vendor strings and the
/// hypervisor flag in cpuinfo.
#[must_use]
pub fn check_virtual_machine() -> Option<Finding> {
    #[cfg(target_os = "linux")]
    {
        const VM_VENDORS: [&str; 6] = [
            "vmware", "virtualbox", "qemu", "kvm", "xen", "parallels",
        ];

        for path in [
            "/sys/class/dmi/id/sys_vendor",
            "/sys/class/dmi/id/product_name",
        ] {
            if let Ok(contents) = std::fs::read_to_string(path) {
                let lowered = contents.to_lowercase();
                if let Some(vendor) = VM_VENDORS.iter().find(|v| lowered.contains(*v)) {
                    return Some(Finding {
                        kind: TamperKind::VirtualMachine,
                        severity: Severity::Low,
                        description: format!("virtual machine vendor detected: {vendor}"),
                        details: json!({ "source": path, "vendor": vendor }),
                    });
                }
            }
        }

        if let Ok(cpuinfo) = std::fs::read_to_string("/proc/cpuinfo")
            && cpuinfo.contains(" hypervisor")
        {
            return Some(Finding {
                kind: TamperKind::VirtualMachine,
                severity: Severity::Low,
                description: "hypervisor flag present in cpuinfo".to_string(),
                details: json!({ "source": "/proc/cpuinfo" }),
            });
        }
        None
    }

    #[cfg(not(target_os = "linux"))]
    {
        None
    }
}

/// Checks whether the running image still corresponds to an executable on
/// disk. A deleted or replaced backing file is the classic hollowing
/// symptom.
#[must_use]
pub fn check_process_hollowing() -> Option<Finding> {
    let exe = env::current_exe().ok()?;

    #[cfg(target_os = "linux")]
    {
        // /proc/self/exe resolves to "<path> (deleted)" when the backing
        // file is gone; current_exe follows the symlink and the path
        // stops existing.
        if !exe.exists() || exe.to_string_lossy().ends_with(" (deleted)") {
            return Some(Finding {
                kind: TamperKind::ProcessHollowing,
                severity: Severity::Critical,
                description: "executable image has no backing file".to_string(),
                details: json!({ "exe": exe.to_string_lossy() }),
            });
        }
        None
    }

    #[cfg(not(target_os = "linux"))]
    {
        if !exe.exists() {
            return Some(Finding {
                kind: TamperKind::ProcessHollowing,
                severity: Severity::Critical,
                description: "executable image has no backing file".to_string(),
                details: json!({ "exe": exe.to_string_lossy() }),
            });
        }
        None
    }
}

/// Detects a system clock that moved backwards past the last successful
/// validation (plus an allowed skew) — the usual way to stretch an
/// expiring license.
#[must_use]
pub fn check_clock_rollback(
    now: DateTime<Utc>,
    last_validation: DateTime<Utc>,
    allowed_skew: Duration,
) -> Option<Finding> {
    if now + allowed_skew >= last_validation {
        return None;
    }

    Some(Finding {
        kind: TamperKind::ClockRollback,
        severity: Severity::High,
        description: "system clock is earlier than the last validation".to_string(),
        details: json!({
            "now": now.to_rfc3339(),
            "last_validation": last_validation.to_rfc3339(),
        }),
    })
}
