//! Profile auto-synthesis from binary discovery.
//!
//! When no profile key matches, the session still needs a runnable
//! command and a comm name to filter on. `which` locates a binary whose
//! name is derived from the app name; `dpkg -S` maps it back to a package
//! for knowledge-base harvesting. Both probes are best-effort with short
//! timeouts; failure just yields a thinner profile.

use crate::{normalize_app_name, TargetProfile};
use std::process::Command;
use tracing::{debug, trace};

/// Synthesize a profile for an app with no stored configuration.
pub fn discover_profile(app_name: &str) -> TargetProfile {
    let candidate = normalize_app_name(app_name);

    let command = which(&candidate)
        .map(|_| candidate.clone())
        // Many desktop apps install a lower-cased, hyphen-free binary
        .or_else(|| {
            let squashed = candidate.replace('-', "");
            which(&squashed).map(|_| squashed)
        })
        .unwrap_or_else(|| candidate.clone());

    let mut profile = TargetProfile::from_command(&command);
    profile.package_name = package_for_binary(&command);
    debug!(
        app = app_name,
        command,
        package = profile.package_name.as_deref().unwrap_or("-"),
        "profile synthesized"
    );
    profile
}

/// Locate a binary on PATH via `which`. Returns the resolved path.
pub fn which(name: &str) -> Option<String> {
    let output = Command::new("which").arg(name).output().ok()?;
    if !output.status.success() {
        return None;
    }
    let path = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if path.is_empty() {
        None
    } else {
        Some(path)
    }
}

/// Map a binary back to its owning Debian package via `dpkg -S`.
fn package_for_binary(binary: &str) -> Option<String> {
    let path = which(binary)?;
    let output = Command::new("dpkg").args(["-S", &path]).output().ok()?;
    if !output.status.success() {
        trace!(binary, "dpkg -S found no owning package");
        return None;
    }
    // Output shape: "package-name: /usr/bin/binary"
    let stdout = String::from_utf8_lossy(&output.stdout);
    stdout
        .lines()
        .next()
        .and_then(|line| line.split(':').next())
        .map(|pkg| pkg.trim().to_string())
        .filter(|pkg| !pkg.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_which_finds_sh() {
        // /bin/sh exists on any Linux host the tool targets
        assert!(which("sh").is_some());
    }

    #[test]
    fn test_which_missing_binary() {
        assert!(which("definitely-not-a-real-binary-xyzq").is_none());
    }

    #[test]
    fn test_discover_profile_always_runnable_shape() {
        let profile = discover_profile("Some Unknown App");
        assert!(!profile.binary_cmd.is_empty());
        assert_eq!(profile.binary_cmd[0], "some-unknown-app");
        assert!(profile.actions.is_empty());
    }

    #[test]
    fn test_discover_profile_finds_real_binary() {
        let profile = discover_profile("sh");
        assert_eq!(profile.binary_cmd, vec!["sh".to_string()]);
        assert_eq!(profile.process_name, "sh");
    }
}
