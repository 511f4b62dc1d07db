//! Structured logging for the controller.
//!
//! Dual-mode output on stderr: human-readable for interactive use,
//! JSON lines for harness consumption. stdout stays reserved for the
//! session report path printed at the end of a run.
//!
//! Environment:
//! - `FOOTPRINT_LOG` / `RUST_LOG`: level filter (default `info`)
//! - `FOOTPRINT_LOG_FORMAT`: `human` (default) or `json`

use std::io::IsTerminal;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

const ENV_LEVEL: &str = "FOOTPRINT_LOG";
const ENV_FORMAT: &str = "FOOTPRINT_LOG_FORMAT";

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Human,
    Json,
}

/// Logging configuration resolved from the environment.
#[derive(Debug, Clone, Default)]
pub struct LogConfig {
    pub format: LogFormat,
    /// Level string used when no env filter is set.
    pub default_level: Option<String>,
}

impl LogConfig {
    pub fn from_env() -> Self {
        let format = match std::env::var(ENV_FORMAT).ok().as_deref() {
            Some("json") | Some("jsonl") => LogFormat::Json,
            _ => LogFormat::Human,
        };
        LogConfig {
            format,
            default_level: std::env::var(ENV_LEVEL).ok(),
        }
    }
}

/// Initialize the logging subsystem. Call once at startup.
pub fn init_logging(config: &LogConfig) {
    let default = config.default_level.as_deref().unwrap_or("info");
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("fp_core={d},fp_config={d}", d = default)));

    match config.format {
        LogFormat::Human => {
            let use_ansi = std::io::stderr().is_terminal();
            let fmt_layer = fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .with_ansi(use_ansi);
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt_layer)
                .init();
        }
        LogFormat::Json => {
            let json_layer = fmt::layer()
                .with_writer(std::io::stderr)
                .json()
                .with_current_span(false);
            tracing_subscriber::registry()
                .with(filter)
                .with(json_layer)
                .init();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_format_is_human() {
        let config = LogConfig::default();
        assert_eq!(config.format, LogFormat::Human);
    }
}
