//! Target profiles and configuration resolution for footprint.
//!
//! A profile tells the session how to run one target application: the
//! binary command, the kernel comm name to filter on, optional window
//! manager flags, named hotkey actions, and the flag used to point the
//! target at a scratch profile directory.
//!
//! Profiles live in a single JSON file keyed by a normalized app-name
//! substring:
//!
//! ```json
//! {
//!   "chrome": {
//!     "binary_cmd": ["google-chrome-stable", "--no-sandbox"],
//!     "process_name": "chrome",
//!     "user_dir_flag": "--user-data-dir",
//!     "actions": {
//!       "hotkey_save": [["ctrl", "s"], "Save page"],
//!       "hotkey_history": [["ctrl", "h"], "Open history"]
//!     }
//!   }
//! }
//! ```
//!
//! When no profile matches, a profile is auto-synthesized from binary
//! discovery (`which`) and package lookup.

pub mod discover;
pub mod snapshot;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

pub use discover::discover_profile;
pub use snapshot::ConfigSnapshot;

/// Environment variable pointing at an explicit profile store file.
pub const ENV_CONFIG_PATH: &str = "FOOTPRINT_CONFIG";

/// Profile store filename inside the XDG config dir.
const STORE_FILENAME: &str = "target_config.json";

/// Application name for the XDG config directory.
const APP_DIR_NAME: &str = "footprint";

/// Errors from profile loading and resolution.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found: {path}")]
    NotFound { path: PathBuf },

    #[error("invalid JSON in config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("profile validation failed for '{key}': {message}")]
    Invalid { key: String, message: String },

    #[error("I/O error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// A named hotkey action: key combo plus a human description.
///
/// Stored as `[["ctrl", "s"], "Save page"]` in JSON.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HotkeyAction(pub Vec<String>, pub String);

impl HotkeyAction {
    pub fn keys(&self) -> &[String] {
        &self.0
    }

    pub fn description(&self) -> &str {
        &self.1
    }

    /// xdotool-style combo string, e.g. `ctrl+s`.
    pub fn combo(&self) -> String {
        self.0.join("+")
    }
}

/// Per-target session profile. Immutable after session start.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetProfile {
    /// Binary command and fixed arguments.
    pub binary_cmd: Vec<String>,

    /// Kernel comm name to filter tracer events on. Truncated to the
    /// kernel comm length at use sites.
    pub process_name: String,

    /// Debian package name for knowledge-base harvesting (defaults to
    /// the lower-cased app name when absent).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub package_name: Option<String>,

    /// Extra flags passed to the window manager, if the target needs any.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub wm_flags: Vec<String>,

    /// Flag that points the target at a scratch profile directory
    /// (e.g. `--user-data-dir` for Chromium-family browsers).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_dir_flag: Option<String>,

    /// Named hotkey actions, merged into the agent's action catalog.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub actions: BTreeMap<String, HotkeyAction>,
}

impl TargetProfile {
    /// Minimal profile from a bare command, used by auto-discovery.
    pub fn from_command(cmd: &str) -> Self {
        TargetProfile {
            binary_cmd: vec![cmd.to_string()],
            process_name: cmd.to_lowercase(),
            package_name: None,
            wm_flags: Vec::new(),
            user_dir_flag: None,
            actions: BTreeMap::new(),
        }
    }

    /// Semantic validation beyond serde shape checking.
    pub fn validate(&self, key: &str) -> Result<(), ConfigError> {
        if self.binary_cmd.is_empty() || self.binary_cmd[0].trim().is_empty() {
            return Err(ConfigError::Invalid {
                key: key.to_string(),
                message: "binary_cmd must have a non-empty command".to_string(),
            });
        }
        if self.process_name.trim().is_empty() {
            return Err(ConfigError::Invalid {
                key: key.to_string(),
                message: "process_name must be non-empty".to_string(),
            });
        }
        for (name, action) in &self.actions {
            if action.keys().is_empty() {
                return Err(ConfigError::Invalid {
                    key: key.to_string(),
                    message: format!("action '{}' has an empty key combo", name),
                });
            }
        }
        Ok(())
    }
}

/// The on-disk profile store: normalized key substring → profile.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProfileStore {
    pub profiles: BTreeMap<String, TargetProfile>,
}

impl ProfileStore {
    /// Load a profile store from an explicit path.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| {
            if source.kind() == std::io::ErrorKind::NotFound {
                ConfigError::NotFound {
                    path: path.to_path_buf(),
                }
            } else {
                ConfigError::Io {
                    path: path.to_path_buf(),
                    source,
                }
            }
        })?;
        let store: ProfileStore =
            serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        for (key, profile) in &store.profiles {
            profile.validate(key)?;
        }
        debug!(path = %path.display(), profiles = store.profiles.len(), "profile store loaded");
        Ok(store)
    }

    /// Look up a profile for an application name.
    ///
    /// The app name is normalized (lowercase, spaces to hyphens) and a
    /// store key matches when it is a substring of the normalized name,
    /// so `"Google Chrome"` matches a profile keyed `"chrome"`.
    pub fn lookup(&self, app_name: &str) -> Option<(&str, &TargetProfile)> {
        let normalized = normalize_app_name(app_name);
        self.profiles
            .iter()
            .find(|(key, _)| normalized.contains(key.as_str()))
            .map(|(key, profile)| (key.as_str(), profile))
    }
}

/// Normalize an app name for profile lookup: lowercase, spaces → hyphens.
pub fn normalize_app_name(name: &str) -> String {
    name.trim().to_lowercase().replace(' ', "-")
}

/// Where the profile store was found (for diagnostics and snapshots).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfigSource {
    CliArgument,
    Environment,
    XdgConfig,
    /// No store found or no key matched; profile was synthesized.
    #[default]
    Discovered,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigSource::CliArgument => write!(f, "CLI argument"),
            ConfigSource::Environment => write!(f, "environment variable"),
            ConfigSource::XdgConfig => write!(f, "XDG config"),
            ConfigSource::Discovered => write!(f, "auto-discovery"),
        }
    }
}

/// A resolved profile with provenance, ready for the session.
#[derive(Debug, Clone)]
pub struct ResolvedProfile {
    pub app_name: String,
    /// Store key that matched, if any.
    pub matched_key: Option<String>,
    pub profile: TargetProfile,
    pub source: ConfigSource,
    /// Path of the store file that was read, if any.
    pub store_path: Option<PathBuf>,
}

impl ResolvedProfile {
    /// Snapshot for the session output directory.
    pub fn snapshot(&self) -> ConfigSnapshot {
        ConfigSnapshot::capture(self)
    }
}

/// Resolve the profile for `app_name`.
///
/// Resolution order for the store file:
/// 1. Explicit CLI path
/// 2. `FOOTPRINT_CONFIG` environment variable
/// 3. XDG config dir (`~/.config/footprint/target_config.json`)
///
/// A malformed or missing store degrades to auto-discovery rather than
/// failing the session; only a target with no discoverable binary is a
/// hard error at launch time.
pub fn resolve_profile(app_name: &str, cli_path: Option<&Path>) -> ResolvedProfile {
    let (store, source, store_path) = load_store(cli_path);

    if let Some(store) = store {
        if let Some((key, profile)) = store.lookup(app_name) {
            info!(app = app_name, key, %source, "profile matched");
            return ResolvedProfile {
                app_name: app_name.to_string(),
                matched_key: Some(key.to_string()),
                profile: profile.clone(),
                source,
                store_path,
            };
        }
        debug!(app = app_name, "no profile key matched, discovering");
    }

    let profile = discover::discover_profile(app_name);
    ResolvedProfile {
        app_name: app_name.to_string(),
        matched_key: None,
        profile,
        source: ConfigSource::Discovered,
        store_path,
    }
}

fn load_store(cli_path: Option<&Path>) -> (Option<ProfileStore>, ConfigSource, Option<PathBuf>) {
    let candidates: Vec<(PathBuf, ConfigSource)> = cli_path
        .map(|p| (p.to_path_buf(), ConfigSource::CliArgument))
        .into_iter()
        .chain(
            std::env::var_os(ENV_CONFIG_PATH)
                .map(|v| (PathBuf::from(v), ConfigSource::Environment)),
        )
        .chain(
            dirs::config_dir()
                .map(|d| (d.join(APP_DIR_NAME).join(STORE_FILENAME), ConfigSource::XdgConfig)),
        )
        .collect();

    for (path, source) in candidates {
        match ProfileStore::load(&path) {
            Ok(store) => return (Some(store), source, Some(path)),
            Err(ConfigError::NotFound { .. }) => continue,
            Err(err) => {
                // Degraded, not fatal: fall back to discovery
                warn!(path = %path.display(), error = %err, "profile store unusable, ignoring");
                continue;
            }
        }
    }
    (None, ConfigSource::Discovered, None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_store(json: &str) -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("target_config.json");
        let mut f = std::fs::File::create(&path).expect("create");
        f.write_all(json.as_bytes()).expect("write");
        (dir, path)
    }

    const STORE: &str = r#"{
        "chrome": {
            "binary_cmd": ["google-chrome-stable", "--no-sandbox"],
            "process_name": "chrome",
            "user_dir_flag": "--user-data-dir",
            "actions": {
                "hotkey_save": [["ctrl", "s"], "Save page"]
            }
        },
        "mousepad": {
            "binary_cmd": ["mousepad"],
            "process_name": "mousepad"
        }
    }"#;

    #[test]
    fn test_lookup_normalized_substring() {
        let (_dir, path) = write_store(STORE);
        let store = ProfileStore::load(&path).expect("load");

        let (key, profile) = store.lookup("Google Chrome").expect("match");
        assert_eq!(key, "chrome");
        assert_eq!(profile.binary_cmd[0], "google-chrome-stable");
    }

    #[test]
    fn test_lookup_no_match() {
        let (_dir, path) = write_store(STORE);
        let store = ProfileStore::load(&path).expect("load");
        assert!(store.lookup("gedit").is_none());
    }

    #[test]
    fn test_hotkey_combo() {
        let (_dir, path) = write_store(STORE);
        let store = ProfileStore::load(&path).expect("load");
        let (_, profile) = store.lookup("chrome").expect("match");
        let action = profile.actions.get("hotkey_save").expect("action");
        assert_eq!(action.combo(), "ctrl+s");
        assert_eq!(action.description(), "Save page");
    }

    #[test]
    fn test_invalid_store_rejected() {
        let (_dir, path) = write_store(r#"{"bad": {"binary_cmd": [], "process_name": "x"}}"#);
        let err = ProfileStore::load(&path).expect_err("should fail validation");
        assert!(matches!(err, ConfigError::Invalid { .. }));
    }

    #[test]
    fn test_malformed_json_is_parse_error() {
        let (_dir, path) = write_store("{ not json");
        let err = ProfileStore::load(&path).expect_err("should fail");
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn test_normalize_app_name() {
        assert_eq!(normalize_app_name("Google Chrome"), "google-chrome");
        assert_eq!(normalize_app_name("  Mousepad "), "mousepad");
    }

    #[test]
    fn test_resolve_with_cli_path() {
        let (_dir, path) = write_store(STORE);
        let resolved = resolve_profile("Google Chrome", Some(&path));
        assert_eq!(resolved.matched_key.as_deref(), Some("chrome"));
        assert_eq!(resolved.source, ConfigSource::CliArgument);
    }

    #[test]
    fn test_resolve_unknown_falls_back_to_discovery() {
        let (_dir, path) = write_store(STORE);
        let resolved = resolve_profile("definitely-not-installed-앱", Some(&path));
        assert_eq!(resolved.source, ConfigSource::Discovered);
        assert!(resolved.matched_key.is_none());
        // Discovery still yields a runnable-shaped profile
        assert!(!resolved.profile.binary_cmd.is_empty());
    }
}
