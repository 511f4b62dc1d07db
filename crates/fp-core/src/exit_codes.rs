//! Exit codes for the footprint CLI.
//!
//! Exit codes communicate session outcome without output parsing.
//!
//! Ranges:
//! - 0: Success (including target-crash-triggered early stop)
//! - 10-19: User/environment errors (recoverable by user action)
//! - 20-29: Internal errors (bugs, should be reported)

use fp_common::Error;

/// Exit codes for footprint operations.
///
/// These codes are a stable contract for automation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    /// Session completed and the report was written.
    Clean = 0,

    /// Invalid arguments.
    ArgsError = 10,

    /// Required capability missing (bpftrace, Xvfb).
    CapabilityError = 11,

    /// Target binary not found or failed to launch.
    LaunchError = 12,

    /// Kernel probe attach failed (privilege or kernel support).
    TracerError = 13,

    /// Virtual display bring-up failed.
    DisplayError = 14,

    /// Target profile configuration unusable.
    ConfigError = 15,

    /// Internal error (bug - please report).
    InternalError = 20,

    /// I/O error.
    IoError = 21,
}

impl ExitCode {
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    pub fn is_error(self) -> bool {
        (self as i32) >= 10
    }

    /// Stable code name for machine-readable output.
    pub fn code_name(&self) -> &'static str {
        match self {
            ExitCode::Clean => "OK",
            ExitCode::ArgsError => "ERR_ARGS",
            ExitCode::CapabilityError => "ERR_CAPABILITY",
            ExitCode::LaunchError => "ERR_LAUNCH",
            ExitCode::TracerError => "ERR_TRACER",
            ExitCode::DisplayError => "ERR_DISPLAY",
            ExitCode::ConfigError => "ERR_CONFIG",
            ExitCode::InternalError => "ERR_INTERNAL",
            ExitCode::IoError => "ERR_IO",
        }
    }
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> Self {
        code as i32
    }
}

impl From<&Error> for ExitCode {
    fn from(err: &Error) -> Self {
        match err {
            Error::TargetUnknown { .. } | Error::TargetLaunch { .. } | Error::TargetRelaunch(_) => {
                ExitCode::LaunchError
            }
            Error::AgentLaunch(_) => ExitCode::LaunchError,
            Error::ProbeAttach(_) => ExitCode::TracerError,
            Error::TracerCapability(_) => ExitCode::CapabilityError,
            Error::DisplayStart(_) => ExitCode::DisplayError,
            Error::Config(_) => ExitCode::ConfigError,
            Error::SessionAborted(_) => ExitCode::InternalError,
            Error::ReportWrite(_) | Error::Io(_) | Error::Json(_) => ExitCode::IoError,
        }
    }
}

impl std::fmt::Display for ExitCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.code_name(), self.as_i32())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fp_common::ErrorCategory;

    #[test]
    fn test_exit_code_values_stable() {
        assert_eq!(ExitCode::Clean.as_i32(), 0);
        assert_eq!(ExitCode::TracerError.as_i32(), 13);
        assert_eq!(ExitCode::InternalError.as_i32(), 20);
    }

    #[test]
    fn test_probe_attach_maps_to_tracer_error() {
        let err = Error::ProbeAttach("permission denied".into());
        assert_eq!(ExitCode::from(&err), ExitCode::TracerError);
        assert_eq!(err.category(), ErrorCategory::Tracer);
    }

    #[test]
    fn test_missing_target_maps_to_launch_error() {
        let err = Error::TargetUnknown { name: "x".into() };
        assert_eq!(ExitCode::from(&err), ExitCode::LaunchError);
        assert!(ExitCode::from(&err).is_error());
    }
}
