//! footprint-agent - exploration agent for one fuzzing session.
//!
//! Launched by the controller with the display and feedback environment
//! already set up. Runs the policy loop: hash the UI state, pick an
//! action, execute it, wait for the UI to react, then fold the score
//! delta and novelty into the value table.

use clap::Parser;
use fp_agent::actions::{self, ActionContext};
use fp_agent::feedback::FeedbackClient;
use fp_agent::knowledge::KnowledgeBase;
use fp_agent::policy::{ExplorationState, PolicyTuning};
use fp_agent::state::{hash_state, wait_for_state_change, STATE_CHANGE_TIMEOUT};
use fp_agent::ui::atspi::{self, AtspiElement};
use fp_agent::ui::{input, CrawlLimits, UiElement};
use std::fs::OpenOptions;
use std::io::Write as _;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Resolution the controller's virtual display runs at.
const DISPLAY_RESOLUTION: (i32, i32) = (1280, 1024);

#[derive(Debug, Parser)]
#[command(
    name = "footprint-agent",
    about = "Exploration agent driven by the footprint controller",
    version
)]
struct Cli {
    /// Application under exploration (profile store key or binary name).
    app_name: String,

    /// Exploration duration in seconds.
    duration_seconds: u64,

    /// Session directory shared with the controller.
    #[arg(long)]
    session_dir: PathBuf,

    /// Target profile store (JSON).
    #[arg(long, env = "FOOTPRINT_CONFIG")]
    config: Option<PathBuf>,

    /// Policy tuning overrides (JSON), defaults baked in.
    #[arg(long)]
    tuning: Option<PathBuf>,
}

fn main() {
    let cli = Cli::parse();
    init_logging(&cli.session_dir);

    if let Err(message) = run(&cli) {
        error!("{}", message);
        std::process::exit(1);
    }
}

/// Log to a file; the agent's stderr is not attached to a terminal.
/// `FOOTPRINT_AGENT_LOG` overrides the path, defaulting to `agent.log`
/// in the session directory. Falls back to stderr when the file cannot
/// be created.
fn init_logging(session_dir: &std::path::Path) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("fp_agent=info"));
    let log_path = std::env::var("FOOTPRINT_AGENT_LOG")
        .map(std::path::PathBuf::from)
        .unwrap_or_else(|_| session_dir.join("agent.log"));
    let registry = tracing_subscriber::registry().with(filter);
    match std::fs::File::create(&log_path) {
        Ok(file) => {
            let fmt_layer = tracing_subscriber::fmt::layer()
                .with_writer(std::sync::Arc::new(file))
                .with_target(false)
                .with_ansi(false);
            registry.with(fmt_layer).init();
        }
        Err(_) => {
            let fmt_layer = tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .with_ansi(false);
            registry.with(fmt_layer).init();
        }
    }
}

fn run(cli: &Cli) -> Result<(), String> {
    let duration = Duration::from_secs(cli.duration_seconds);
    let resolved = fp_config::resolve_profile(&cli.app_name, cli.config.as_deref());
    let profile = &resolved.profile;

    let tuning = load_tuning(cli.tuning.as_deref())?;
    let kb = match &profile.package_name {
        Some(package) => KnowledgeBase::harvest(package),
        None => KnowledgeBase::harvest(&profile.process_name),
    };
    info!(terms = kb.len(), "knowledge base ready");

    let needles = root_needles(&cli.app_name, profile);
    let app_root = atspi::find_app_root(&needles)
        .map_err(|e| format!("target never appeared on the accessibility bus: {}", e))?;

    let catalog = actions::catalog(&profile.actions);
    let mut policy = ExplorationState::new(&catalog, tuning);
    let client = FeedbackClient::from_env();
    let ctx = ActionContext {
        app_root: &app_root,
        kb: &kb,
        display: DISPLAY_RESOLUTION,
        limits: CrawlLimits::default(),
        hotkeys: &profile.actions,
    };

    let action_log = cli.session_dir.join("actions.log");
    let mut rng = rand::rng();
    let started = Instant::now();
    let mut ticks = 0u64;

    info!(
        app = %cli.app_name,
        duration_s = cli.duration_seconds,
        actions = catalog.len(),
        "exploration loop starting"
    );

    while started.elapsed() < duration {
        ticks += 1;
        let baseline = observe(&app_root);

        let action = policy.choose_action(&mut rng, started.elapsed(), duration);
        log_action(&action_log, &action);
        policy.record_execution(&action);
        let success = actions::execute(&action, &ctx, &mut policy, &mut rng);

        // Give the UI a bounded chance to react before re-hashing
        wait_for_state_change(|| observe(&app_root), &baseline, STATE_CHANGE_TIMEOUT);

        let (score, channel_ok) = client.poll();
        if !channel_ok {
            warn!("feedback channel unreachable, scoring tick as zero");
        }
        let mut reward = policy.score_reward(score) + policy.observe_state(&observe(&app_root));
        if !success {
            reward += policy.failure_penalty();
        }
        policy.update(reward);
    }

    info!(ticks, "exploration loop finished");
    Ok(())
}

/// The current UI-state hash: active window title plus the labels of
/// any transient windows.
fn observe(app_root: &AtspiElement) -> String {
    let title = input::active_window_title();
    let transients = match atspi::find_transient(app_root) {
        Some(transient) => {
            let role = transient.role().unwrap_or_default();
            let name = transient.name().unwrap_or_default();
            vec![format!("{}:{}", role, name)]
        }
        None => Vec::new(),
    };
    hash_state(&title, &transients)
}

/// Substrings used to find the application root on the bus.
fn root_needles(app_name: &str, profile: &fp_config::TargetProfile) -> Vec<String> {
    let mut needles = vec![app_name.to_string(), profile.process_name.clone()];
    if let Some(package) = &profile.package_name {
        needles.push(package.clone());
    }
    if let Some(binary) = profile.binary_cmd.first() {
        if let Some(stem) = std::path::Path::new(binary).file_stem() {
            needles.push(stem.to_string_lossy().to_string());
        }
    }
    needles.dedup();
    needles
}

/// Append one timestamped entry to the shared action log; the
/// controller replays it for artifact attribution.
fn log_action(path: &std::path::Path, action: &str) {
    let line = format!("{}\t{}\n", chrono::Utc::now().to_rfc3339(), action);
    let result = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .and_then(|mut file| file.write_all(line.as_bytes()));
    if let Err(e) = result {
        warn!(error = %e, "could not append to action log");
    }
}

fn load_tuning(path: Option<&std::path::Path>) -> Result<PolicyTuning, String> {
    match path {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .map_err(|e| format!("tuning file {}: {}", path.display(), e))?;
            serde_json::from_str(&text)
                .map_err(|e| format!("tuning file {}: {}", path.display(), e))
        }
        None => Ok(PolicyTuning::default()),
    }
}
