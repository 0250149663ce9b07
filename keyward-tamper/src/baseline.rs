//! File-integrity baseline.
//!
//! At first run the monitor captures a SHA-256 hash of each designated
//! critical file. Subsequent checks compare against that baseline: a
//! missing file is a High-severity finding, a content mismatch is
//! Critical (someone replaced the file rather than deleting it).

use crate::error::{TamperError, TamperResult};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// What a baseline comparison found for one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IntegrityFinding {
    /// The file no longer exists.
    Missing { path: PathBuf },
    /// The file exists but its content hash changed.
    Mismatch {
        path: PathBuf,
        expected: String,
        actual: String,
    },
}

/// Content hashes of the critical files, captured at first run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IntegrityBaseline {
    /// Path → hex SHA-256. BTreeMap keeps the serialized form stable.
    entries: BTreeMap<PathBuf, String>,
}

impl IntegrityBaseline {
    /// Captures a baseline over `paths`. Every file must be readable;
    /// capturing a baseline with unreadable critical files would bake in
    /// blind spots.
    pub fn capture<P: AsRef<Path>>(paths: &[P]) -> TamperResult<Self> {
        let mut entries = BTreeMap::new();
        for path in paths {
            let path = path.as_ref();
            let hash = hash_file(path).map_err(|e| TamperError::Unhashable {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?;
            entries.insert(path.to_path_buf(), hash);
        }
        info!(files = entries.len(), "integrity baseline captured");
        Ok(Self { entries })
    }

    /// Compares the current state of every baselined file.
    #[must_use]
    pub fn check(&self) -> Vec<IntegrityFinding> {
        let mut findings = Vec::new();
        for (path, expected) in &self.entries {
            match hash_file(path) {
                Err(_) => {
                    warn!(path = %path.display(), "baselined file missing");
                    findings.push(IntegrityFinding::Missing { path: path.clone() });
                }
                Ok(actual) if &actual != expected => {
                    warn!(path = %path.display(), "baselined file content changed");
                    findings.push(IntegrityFinding::Mismatch {
                        path: path.clone(),
                        expected: expected.clone(),
                        actual,
                    });
                }
                Ok(_) => {}
            }
        }
        findings
    }

    /// Number of files under baseline.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if no files are baselined.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Loads a previously saved baseline.
    pub fn load(path: &Path) -> TamperResult<Self> {
        let contents = fs::read_to_string(path)
            .map_err(|e| TamperError::BaselineStorage(format!("read {}: {e}", path.display())))?;
        Ok(serde_json::from_str(&contents)?)
    }

    /// Saves the baseline as JSON, atomically (write temp, then rename).
    pub fn save(&self, path: &Path) -> TamperResult<()> {
        let json = serde_json::to_string_pretty(self)?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, json)
            .map_err(|e| TamperError::BaselineStorage(format!("write {}: {e}", tmp.display())))?;
        fs::rename(&tmp, path)
            .map_err(|e| TamperError::BaselineStorage(format!("rename to {}: {e}", path.display())))?;
        Ok(())
    }

    /// Loads the baseline from `path`, or captures and saves one over
    /// `critical_files` on first run.
    pub fn load_or_capture<P: AsRef<Path>>(
        path: &Path,
        critical_files: &[P],
    ) -> TamperResult<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            let baseline = Self::capture(critical_files)?;
            baseline.save(path)?;
            Ok(baseline)
        }
    }
}

fn hash_file(path: &Path) -> std::io::Result<String> {
    let contents = fs::read(path)?;
    let mut hasher = Sha256::new();
    hasher.update(&contents);
    Ok(hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clean_check_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("core.dat");
        fs::write(&file, b"original").unwrap();

        let baseline = IntegrityBaseline::capture(&[&file]).unwrap();
        assert!(baseline.check().is_empty());
    }

    #[test]
    fn mismatch_and_missing_are_distinct() {
        let dir = tempfile::tempdir().unwrap();
        let changed = dir.path().join("a.dat");
        let removed = dir.path().join("b.dat");
        fs::write(&changed, b"one").unwrap();
        fs::write(&removed, b"two").unwrap();

        let baseline = IntegrityBaseline::capture(&[&changed, &removed]).unwrap();

        fs::write(&changed, b"patched").unwrap();
        fs::remove_file(&removed).unwrap();

        let findings = baseline.check();
        assert_eq!(findings.len(), 2);
        assert!(findings
            .iter()
            .any(|f| matches!(f, IntegrityFinding::Mismatch { path, .. } if path == &changed)));
        assert!(findings
            .iter()
            .any(|f| matches!(f, IntegrityFinding::Missing { path } if path == &removed)));
    }

    #[test]
    fn save_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("core.dat");
        fs::write(&file, b"data").unwrap();

        let baseline = IntegrityBaseline::capture(&[&file]).unwrap();
        let store = dir.path().join("baseline.json");
        baseline.save(&store).unwrap();

        let loaded = IntegrityBaseline::load(&store).unwrap();
        assert_eq!(loaded.len(), 1);
        assert!(loaded.check().is_empty());
    }

    #[test]
    fn unreadable_file_fails_capture() {
        let dir = tempfile::tempdir().unwrap();
        let ghost = dir.path().join("missing.dat");
        assert!(IntegrityBaseline::capture(&[&ghost]).is_err());
    }
}
