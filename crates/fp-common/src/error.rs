//! Error types for footprint.
//!
//! Structured error handling with stable error codes for machine parsing,
//! category classification, recoverability hints, and remediation text for
//! humans. Fatal errors surface as a one-line cause plus a fix suggestion;
//! recoverable errors are expected to be handled (and logged) in place.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias for footprint operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error categories for grouping related errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Target profile / configuration errors.
    Config,
    /// Kernel event tracer errors (probe attach, parse).
    Tracer,
    /// Virtual display / window manager errors.
    Display,
    /// Subprocess launch and supervision errors.
    Supervise,
    /// Session lifecycle and report errors.
    Session,
    /// File I/O and serialization errors.
    Io,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorCategory::Config => write!(f, "config"),
            ErrorCategory::Tracer => write!(f, "tracer"),
            ErrorCategory::Display => write!(f, "display"),
            ErrorCategory::Supervise => write!(f, "supervise"),
            ErrorCategory::Session => write!(f, "session"),
            ErrorCategory::Io => write!(f, "io"),
        }
    }
}

/// Unified error type for footprint.
#[derive(Error, Debug)]
pub enum Error {
    // Configuration errors (10-19)
    #[error("configuration error: {0}")]
    Config(String),

    #[error("no profile or binary found for target '{name}'")]
    TargetUnknown { name: String },

    // Tracer errors (20-29)
    #[error("failed to attach kernel probes: {0}")]
    ProbeAttach(String),

    #[error("tracer capability missing: {0}")]
    TracerCapability(String),

    // Display errors (30-39)
    #[error("virtual display failed to start: {0}")]
    DisplayStart(String),

    // Supervision errors (40-49)
    #[error("failed to launch target '{cmd}': {reason}")]
    TargetLaunch { cmd: String, reason: String },

    #[error("failed to relaunch target after crash: {0}")]
    TargetRelaunch(String),

    #[error("failed to launch exploration agent: {0}")]
    AgentLaunch(String),

    // Session errors (50-59)
    #[error("session aborted: {0}")]
    SessionAborted(String),

    #[error("report write failed: {0}")]
    ReportWrite(String),

    // I/O errors (60-69)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Returns the stable error code for this error.
    ///
    /// Codes are grouped by category:
    /// - 10-19: Configuration
    /// - 20-29: Tracer
    /// - 30-39: Display
    /// - 40-49: Supervision
    /// - 50-59: Session
    /// - 60-69: I/O
    pub fn code(&self) -> u32 {
        match self {
            Error::Config(_) => 10,
            Error::TargetUnknown { .. } => 11,
            Error::ProbeAttach(_) => 20,
            Error::TracerCapability(_) => 21,
            Error::DisplayStart(_) => 30,
            Error::TargetLaunch { .. } => 40,
            Error::TargetRelaunch(_) => 41,
            Error::AgentLaunch(_) => 42,
            Error::SessionAborted(_) => 50,
            Error::ReportWrite(_) => 51,
            Error::Io(_) => 60,
            Error::Json(_) => 61,
        }
    }

    /// Returns the error category for grouping and filtering.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::Config(_) | Error::TargetUnknown { .. } => ErrorCategory::Config,
            Error::ProbeAttach(_) | Error::TracerCapability(_) => ErrorCategory::Tracer,
            Error::DisplayStart(_) => ErrorCategory::Display,
            Error::TargetLaunch { .. } | Error::TargetRelaunch(_) | Error::AgentLaunch(_) => {
                ErrorCategory::Supervise
            }
            Error::SessionAborted(_) | Error::ReportWrite(_) => ErrorCategory::Session,
            Error::Io(_) | Error::Json(_) => ErrorCategory::Io,
        }
    }

    /// Returns whether this error is potentially recoverable within a
    /// session (by retrying, falling back to auto-discovery, etc.).
    pub fn is_recoverable(&self) -> bool {
        match self {
            // Malformed profile falls back to auto-discovery
            Error::Config(_) => true,
            Error::TargetUnknown { .. } => false,

            // Probe attach failure is fatal to the session
            Error::ProbeAttach(_) => false,
            Error::TracerCapability(_) => false,

            Error::DisplayStart(_) => false,

            Error::TargetLaunch { .. } => false,
            // Relaunch failure after self-healing is final
            Error::TargetRelaunch(_) => false,
            // Agent deaths are self-healed
            Error::AgentLaunch(_) => true,

            Error::SessionAborted(_) => false,
            Error::ReportWrite(_) => true,

            Error::Io(_) => true,
            Error::Json(_) => true,
        }
    }

    /// Returns a short headline for human-readable output.
    pub fn headline(&self) -> &'static str {
        match self {
            Error::Config(_) => "Configuration Error",
            Error::TargetUnknown { .. } => "Target Not Found",
            Error::ProbeAttach(_) => "Kernel Probe Attach Failed",
            Error::TracerCapability(_) => "Tracer Capability Missing",
            Error::DisplayStart(_) => "Virtual Display Failed",
            Error::TargetLaunch { .. } => "Target Launch Failed",
            Error::TargetRelaunch(_) => "Target Relaunch Failed",
            Error::AgentLaunch(_) => "Agent Launch Failed",
            Error::SessionAborted(_) => "Session Aborted",
            Error::ReportWrite(_) => "Report Write Failed",
            Error::Io(_) => "I/O Error",
            Error::Json(_) => "JSON Error",
        }
    }

    /// Returns a human-readable remediation hint.
    pub fn remediation(&self) -> &'static str {
        match self {
            Error::Config(_) => {
                "Check the target profile JSON syntax, or remove the profile to use auto-discovery."
            }
            Error::TargetUnknown { .. } => {
                "Install the target application or add a profile with an explicit binary_cmd."
            }
            Error::ProbeAttach(_) => {
                "Run as root (kernel tracepoints require privilege) and verify bpftrace works: 'bpftrace -l'."
            }
            Error::TracerCapability(_) => {
                "Install bpftrace and ensure the kernel exposes tracepoints (CONFIG_FTRACE_SYSCALLS)."
            }
            Error::DisplayStart(_) => {
                "Install Xvfb and fluxbox, and check no stale X server holds the display number."
            }
            Error::TargetLaunch { .. } => {
                "Verify the binary path in the profile, or that the command is on PATH."
            }
            Error::TargetRelaunch(_) => {
                "The target crashed and could not be restarted. Inspect the target's stderr in the session log."
            }
            Error::AgentLaunch(_) => {
                "Verify footprint-agent is installed next to footprint, or set FOOTPRINT_AGENT_BIN."
            }
            Error::SessionAborted(_) => "See the preceding log lines for the failing phase.",
            Error::ReportWrite(_) => {
                "Check free disk space and permissions on the output directory."
            }
            Error::Io(_) => "Check disk space and permissions, then retry.",
            Error::Json(_) => "Validate the JSON file with 'jq .' and fix the syntax.",
        }
    }
}

/// Format an error for human-readable stderr output.
pub fn format_error_human(err: &Error, use_color: bool) -> String {
    let (red, cyan, reset) = if use_color {
        ("\x1b[31m", "\x1b[36m", "\x1b[0m")
    } else {
        ("", "", "")
    };

    format!(
        "{red}x{reset} {headline}\n  Reason: {message}\n  {cyan}Fix:{reset} {remediation}",
        red = red,
        cyan = cyan,
        reset = reset,
        headline = err.headline(),
        message = err,
        remediation = err.remediation()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_stability() {
        assert_eq!(Error::Config("x".into()).code(), 10);
        assert_eq!(Error::ProbeAttach("x".into()).code(), 20);
        assert_eq!(
            Error::TargetLaunch {
                cmd: "gedit".into(),
                reason: "ENOENT".into()
            }
            .code(),
            40
        );
    }

    #[test]
    fn test_error_category() {
        assert_eq!(
            Error::ProbeAttach("x".into()).category(),
            ErrorCategory::Tracer
        );
        assert_eq!(
            Error::AgentLaunch("x".into()).category(),
            ErrorCategory::Supervise
        );
    }

    #[test]
    fn test_fatal_errors_not_recoverable() {
        assert!(!Error::ProbeAttach("permission".into()).is_recoverable());
        assert!(!Error::TargetRelaunch("gone".into()).is_recoverable());
        assert!(!Error::TargetUnknown { name: "xyz".into() }.is_recoverable());
    }

    #[test]
    fn test_format_error_human() {
        let err = Error::TargetUnknown {
            name: "mousepad".into(),
        };
        let formatted = format_error_human(&err, false);
        assert!(formatted.contains("Target Not Found"));
        assert!(formatted.contains("mousepad"));
    }
}
