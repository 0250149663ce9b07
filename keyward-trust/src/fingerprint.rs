//! Hardware fingerprinting for license binding.
//!
//! Produces a stable identifier for this machine from hardware and OS
//! characteristics. The fingerprint survives reboots and renames of the
//! application, but changes if the hardware changes significantly —
//! which is the point: a license bound to one fingerprint should not
//! validate on another machine.

use chrono::{DateTime, Utc};
use keyward_types::DeviceId;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::env;

/// Information about the current device, reported alongside validation
/// requests and used by the device-registration layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceInfo {
    /// Operating system name.
    pub os_name: String,
    /// Operating system version.
    pub os_version: String,
    /// Hostname.
    pub hostname: String,
    /// CPU architecture.
    pub arch: String,
}

impl DeviceInfo {
    /// Collects information about the current device.
    #[must_use]
    pub fn collect() -> Self {
        Self {
            os_name: env::consts::OS.to_string(),
            os_version: os_version(),
            hostname: current_hostname(),
            arch: env::consts::ARCH.to_string(),
        }
    }
}

/// A stable fingerprint identifying this machine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HardwareFingerprint {
    /// Hex-encoded SHA-256 over the hardware identifiers (truncated).
    id: DeviceId,
    /// When the fingerprint was generated.
    generated_at: DateTime<Utc>,
}

impl HardwareFingerprint {
    /// Generates a fingerprint for the current machine.
    #[must_use]
    pub fn generate() -> Self {
        let combined = hardware_ids().join("|");

        let mut hasher = Sha256::new();
        hasher.update(combined.as_bytes());
        let hash = hasher.finalize();

        Self {
            id: DeviceId::new(hex::encode(&hash[..16])),
            generated_at: Utc::now(),
        }
    }

    /// Returns the device ID carried by this fingerprint.
    #[must_use]
    pub fn device_id(&self) -> &DeviceId {
        &self.id
    }

    /// Returns the fingerprint hash as a string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.id.as_str()
    }

    /// Returns true if this fingerprint matches the machine we are
    /// running on right now. A mismatch means the license cache was
    /// copied from another machine.
    #[must_use]
    pub fn matches_current(&self) -> bool {
        self.id == HardwareFingerprint::generate().id
    }
}

/// Collects the identifiers that feed the fingerprint, most stable first.
fn hardware_ids() -> Vec<String> {
    let mut ids = vec![
        env::consts::OS.to_string(),
        env::consts::ARCH.to_string(),
        current_hostname(),
    ];

    if let Some(machine_id) = machine_id() {
        ids.push(machine_id);
    }

    // Username keeps two accounts on one machine from sharing a seat.
    if let Ok(user) = env::var("USER").or_else(|_| env::var("USERNAME")) {
        ids.push(user);
    }

    ids
}

fn current_hostname() -> String {
    hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "unknown".to_string())
}

fn os_version() -> String {
    #[cfg(target_os = "linux")]
    {
        std::fs::read_to_string("/etc/os-release")
            .ok()
            .and_then(|content| {
                content
                    .lines()
                    .find(|l| l.starts_with("VERSION_ID="))
                    .map(|l| {
                        l.trim_start_matches("VERSION_ID=")
                            .trim_matches('"')
                            .to_string()
                    })
            })
            .unwrap_or_else(|| "unknown".to_string())
    }

    #[cfg(target_os = "macos")]
    {
        std::process::Command::new("sw_vers")
            .arg("-productVersion")
            .output()
            .ok()
            .and_then(|o| String::from_utf8(o.stdout).ok())
            .map(|s| s.trim().to_string())
            .unwrap_or_else(|| "unknown".to_string())
    }

    #[cfg(not(any(target_os = "linux", target_os = "macos")))]
    {
        "unknown".to_string()
    }
}

/// Platform-specific machine identifier, the most stable component.
fn machine_id() -> Option<String> {
    #[cfg(target_os = "linux")]
    {
        std::fs::read_to_string("/etc/machine-id")
            .or_else(|_| std::fs::read_to_string("/var/lib/dbus/machine-id"))
            .ok()
            .map(|s| s.trim().to_string())
    }

    #[cfg(target_os = "macos")]
    {
        std::process::Command::new("ioreg")
            .args(["-rd1", "-c", "IOPlatformExpertDevice"])
            .output()
            .ok()
            .and_then(|o| String::from_utf8(o.stdout).ok())
            .and_then(|output| {
                output
                    .lines()
                    .find(|l| l.contains("IOPlatformUUID"))
                    .and_then(|l| l.split('"').nth(3))
                    .map(String::from)
            })
    }

    #[cfg(not(any(target_os = "linux", target_os = "macos")))]
    {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fingerprint_is_stable() {
        let a = HardwareFingerprint::generate();
        let b = HardwareFingerprint::generate();
        assert_eq!(a.device_id(), b.device_id());
        assert!(a.matches_current());
    }

    #[test]
    fn fingerprint_is_hex() {
        let fp = HardwareFingerprint::generate();
        assert_eq!(fp.as_str().len(), 32);
        assert!(fp.as_str().chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn device_info_collects() {
        let info = DeviceInfo::collect();
        assert!(!info.os_name.is_empty());
        assert!(!info.arch.is_empty());
    }
}
