//! footprint - closed-loop GUI artifact discovery.
//!
//! Exercises a desktop application on a disposable virtual display,
//! traces its filesystem side effects at the kernel syscall level, and
//! writes a deduplicated artifact report. The exploration agent runs as
//! a separate binary (`footprint-agent`) launched by this controller.

use clap::Parser;
use fp_common::{feedback::FEEDBACK_PORT, format_error_human, Error};
use fp_core::exit_codes::ExitCode;
use fp_core::logging::{init_logging, LogConfig};
use fp_core::session::{self, SessionSettings};
use std::io::IsTerminal;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{error, info};

#[derive(Debug, Parser)]
#[command(
    name = "footprint",
    about = "Discover the filesystem footprint of a GUI application",
    version
)]
struct Cli {
    /// Application to exercise (profile store key or binary name).
    app_name: String,

    /// Session duration in seconds.
    duration_seconds: u64,

    /// Optional JSON file of expected target states to verify.
    target_state: Option<PathBuf>,

    /// Target profile store (JSON). Falls back to
    /// $FOOTPRINT_CONFIG, then the XDG config dir, then discovery.
    #[arg(long, env = "FOOTPRINT_CONFIG")]
    config: Option<PathBuf>,

    /// Directory session output is written under.
    #[arg(long, default_value = "./experiment_data")]
    output_dir: PathBuf,

    /// X display number for the virtual display.
    #[arg(long, default_value_t = 99)]
    display: u32,

    /// Feedback channel port.
    #[arg(long, env = "FOOTPRINT_FEEDBACK_PORT", default_value_t = FEEDBACK_PORT)]
    port: u16,
}

fn main() {
    let cli = Cli::parse();
    init_logging(&LogConfig::from_env());

    match run(&cli) {
        Ok(()) => std::process::exit(ExitCode::Clean.as_i32()),
        Err(err) => {
            let use_color = std::io::stderr().is_terminal();
            eprintln!("{}", format_error_human(&err, use_color));
            let code = ExitCode::from(&err);
            error!(code = %code, "session failed");
            std::process::exit(code.as_i32());
        }
    }
}

fn run(cli: &Cli) -> Result<(), Error> {
    if cli.duration_seconds == 0 {
        return Err(Error::Config("duration must be at least 1 second".to_string()));
    }

    let resolved = fp_config::resolve_profile(&cli.app_name, cli.config.as_deref());
    resolved
        .profile
        .validate(&cli.app_name)
        .map_err(|e| Error::TargetUnknown {
            name: format!("{}: {}", cli.app_name, e),
        })?;

    let settings = SessionSettings {
        app_name: cli.app_name.clone(),
        duration: Duration::from_secs(cli.duration_seconds),
        display_num: cli.display,
        feedback_port: cli.port,
        output_dir: cli.output_dir.clone(),
        target_state_file: cli.target_state.clone(),
        config_path: cli.config.clone(),
    };

    let summary = session::run(&settings, &resolved)?;
    if summary.stopped_early {
        info!("session stopped early after repeated target crashes");
    }

    // stdout carries exactly the report directory, for scripting
    println!("{}", summary.session_dir.display());
    Ok(())
}
