//! Config snapshot persisted alongside session output.
//!
//! The resolved runtime profile is written into the session directory so a
//! run can be reproduced later: which key matched, where the store came
//! from, and a content hash of the profile actually used.

use crate::{ConfigSource, ResolvedProfile, TargetProfile};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

/// Reproducibility snapshot of the profile a session ran with.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigSnapshot {
    pub app_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub matched_key: Option<String>,
    pub source: ConfigSource,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub store_path: Option<PathBuf>,
    /// SHA-256 over the canonical JSON of the resolved profile.
    pub profile_hash: String,
    pub profile: TargetProfile,
}

impl ConfigSnapshot {
    /// Capture a snapshot from a resolved profile.
    pub fn capture(resolved: &ResolvedProfile) -> Self {
        ConfigSnapshot {
            app_name: resolved.app_name.clone(),
            matched_key: resolved.matched_key.clone(),
            source: resolved.source.clone(),
            store_path: resolved.store_path.clone(),
            profile_hash: hash_profile(&resolved.profile),
            profile: resolved.profile.clone(),
        }
    }

    /// Write the snapshot as pretty JSON into `dir/resolved_config.json`.
    pub fn write_to(&self, dir: &Path) -> std::io::Result<PathBuf> {
        let path = dir.join("resolved_config.json");
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(&path, json)?;
        Ok(path)
    }
}

fn hash_profile(profile: &TargetProfile) -> String {
    // BTreeMap fields keep the serialization canonical
    let json = serde_json::to_vec(profile).unwrap_or_default();
    let mut hasher = Sha256::new();
    hasher.update(&json);
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolved() -> ResolvedProfile {
        ResolvedProfile {
            app_name: "Mousepad".to_string(),
            matched_key: Some("mousepad".to_string()),
            profile: TargetProfile::from_command("mousepad"),
            source: ConfigSource::XdgConfig,
            store_path: None,
        }
    }

    #[test]
    fn test_hash_is_stable_for_identical_profiles() {
        let a = ConfigSnapshot::capture(&resolved());
        let b = ConfigSnapshot::capture(&resolved());
        assert_eq!(a.profile_hash, b.profile_hash);
        assert_eq!(a.profile_hash.len(), 64);
    }

    #[test]
    fn test_hash_differs_when_profile_differs() {
        let a = ConfigSnapshot::capture(&resolved());
        let mut other = resolved();
        other.profile.binary_cmd.push("--headless".to_string());
        let b = ConfigSnapshot::capture(&other);
        assert_ne!(a.profile_hash, b.profile_hash);
    }

    #[test]
    fn test_write_to_creates_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let snapshot = ConfigSnapshot::capture(&resolved());
        let path = snapshot.write_to(dir.path()).expect("write");
        assert!(path.exists());
        let raw = std::fs::read_to_string(path).expect("read");
        let back: ConfigSnapshot = serde_json::from_str(&raw).expect("parse");
        assert_eq!(back.app_name, "Mousepad");
    }
}
