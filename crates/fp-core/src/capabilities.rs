//! Host capability preflight.
//!
//! Probes the external tools a session depends on before anything is
//! launched. Tracing and the virtual display are hard requirements; the
//! window manager and input tools degrade with a warning (the agent
//! reports its own failures as action penalties).

use fp_common::Error;
use regex::Regex;
use std::process::Command;
use tracing::{debug, warn};

/// Availability of one external tool.
#[derive(Debug, Clone)]
pub struct ToolCapability {
    pub name: &'static str,
    pub available: bool,
    pub path: Option<String>,
    pub version: Option<String>,
}

/// Everything the preflight learned about the host.
#[derive(Debug, Clone)]
pub struct CapabilityReport {
    pub bpftrace: ToolCapability,
    pub xvfb: ToolCapability,
    pub fluxbox: ToolCapability,
    pub xdotool: ToolCapability,
    pub gdbus: ToolCapability,
    pub is_root: bool,
}

impl CapabilityReport {
    /// Probe all tools. Never fails; judgement happens in [`preflight`].
    pub fn detect() -> Self {
        CapabilityReport {
            bpftrace: probe_tool("bpftrace", &["--version"]),
            xvfb: probe_tool("Xvfb", &["-help"]),
            fluxbox: probe_tool("fluxbox", &["-version"]),
            xdotool: probe_tool("xdotool", &["version"]),
            gdbus: probe_tool("gdbus", &["help"]),
            is_root: unsafe { libc::geteuid() } == 0,
        }
    }
}

/// Verify hard requirements, warn about degraded ones.
///
/// Kernel probes need privilege; the tracer's attach step is the
/// authoritative check, but failing fast on a missing binary gives a
/// clearer diagnostic than a dead bpftrace child.
pub fn preflight(report: &CapabilityReport) -> Result<(), Error> {
    if !report.bpftrace.available {
        return Err(Error::TracerCapability(
            "bpftrace not found on PATH".to_string(),
        ));
    }
    if !report.xvfb.available {
        return Err(Error::DisplayStart("Xvfb not found on PATH".to_string()));
    }
    if !report.is_root {
        warn!("not running as root; kernel probe attach will likely fail");
    }
    if !report.fluxbox.available {
        warn!("fluxbox not installed; window focus may be unreliable");
    }
    if !report.xdotool.available {
        warn!("xdotool not installed; the agent cannot inject raw input");
    }
    if !report.gdbus.available {
        warn!("gdbus not installed; the agent cannot crawl the accessibility tree");
    }
    Ok(())
}

/// Probe a single tool: locate it on PATH, then ask for its version.
fn probe_tool(name: &'static str, version_args: &[&str]) -> ToolCapability {
    let path = match which(name) {
        Some(path) => path,
        None => {
            debug!(tool = name, "not found");
            return ToolCapability {
                name,
                available: false,
                path: None,
                version: None,
            };
        }
    };

    let version = Command::new(name)
        .args(version_args)
        .output()
        .ok()
        .and_then(|out| {
            let text = if out.stdout.is_empty() {
                String::from_utf8_lossy(&out.stderr).to_string()
            } else {
                String::from_utf8_lossy(&out.stdout).to_string()
            };
            parse_version(&text)
        });

    debug!(tool = name, path = %path, version = version.as_deref().unwrap_or("?"), "tool available");
    ToolCapability {
        name,
        available: true,
        path: Some(path),
        version,
    }
}

/// Locate a binary on PATH without spawning a shell.
pub fn which(name: &str) -> Option<String> {
    let paths = std::env::var_os("PATH")?;
    std::env::split_paths(&paths)
        .map(|dir| dir.join(name))
        .find(|candidate| candidate.is_file())
        .map(|p| p.to_string_lossy().to_string())
}

/// Extract a dotted version number from tool output.
fn parse_version(output: &str) -> Option<String> {
    let re = Regex::new(r"v?(\d+\.\d+(?:\.\d+)?)").ok()?;
    re.captures(output)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_which_finds_sh() {
        assert!(which("sh").is_some());
    }

    #[test]
    fn test_which_missing() {
        assert!(which("no-such-binary-qqq").is_none());
    }

    #[test]
    fn test_parse_version() {
        assert_eq!(
            parse_version("bpftrace v0.19.1").as_deref(),
            Some("0.19.1")
        );
        assert_eq!(parse_version("xdotool version 3.20").as_deref(), Some("3.20"));
        assert_eq!(parse_version("no digits here"), None);
    }

    #[test]
    fn test_preflight_fails_without_bpftrace() {
        let mut report = CapabilityReport::detect();
        report.bpftrace.available = false;
        let err = preflight(&report).expect_err("must fail");
        assert!(matches!(err, Error::TracerCapability(_)));
    }
}
