//! Session orchestration.
//!
//! One session = one target application exercised for a fixed duration
//! on a disposable display while the tracer watches. The controller
//! owns every resource: tracer, feedback channel, display, target, and
//! agent, and runs the tick loop that turns drained events into the
//! score the agent polls.
//!
//! Crash handling is asymmetric: agent death is always recoverable
//! (relaunch), target death is healed once (kill agent, recreate the
//! scratch profile, relaunch both); a second target death ends the
//! session early but cleanly, with whatever was captured so far.

use crate::artifact::{self, ActionTimeline, ArtifactRecord, FsMetadataSource, MetadataSource};
use crate::capabilities::{self, CapabilityReport};
use crate::display::DisplayGuard;
use crate::feedback::{FeedbackServer, ScoreBoard};
use crate::supervise::{self, ProcessHandle};
use crate::target_state;
use crate::tracer::SyscallTracer;
use fp_common::{generate_run_id, session_dir_name, Error, FileEvent, InterestFilter};
use fp_config::{ConfigSnapshot, ResolvedProfile};
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Pause between control-loop ticks.
const TICK: Duration = Duration::from_secs(1);

/// Settle time after (re)launching the target before the agent starts.
const TARGET_SETTLE: Duration = Duration::from_secs(5);

/// How many times a dead target is brought back before giving up.
const HEAL_BUDGET: u32 = 1;

/// Where a session currently is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Preflight,
    Launching,
    Exploring,
    Healing,
    Analysis,
    Teardown,
}

impl std::fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SessionPhase::Preflight => "preflight",
            SessionPhase::Launching => "launching",
            SessionPhase::Exploring => "exploring",
            SessionPhase::Healing => "healing",
            SessionPhase::Analysis => "analysis",
            SessionPhase::Teardown => "teardown",
        };
        f.write_str(name)
    }
}

/// Everything a session needs to start, resolved by the CLI layer.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub app_name: String,
    pub duration: Duration,
    pub display_num: u32,
    pub feedback_port: u16,
    pub output_dir: PathBuf,
    pub target_state_file: Option<PathBuf>,
    pub config_path: Option<PathBuf>,
}

/// What a completed session produced.
#[derive(Debug)]
pub struct SessionSummary {
    pub session_dir: PathBuf,
    pub artifacts: Vec<ArtifactRecord>,
    pub events_captured: u64,
    pub final_score: i64,
    pub heals: u32,
    /// Session ended before its deadline because the target kept dying.
    pub stopped_early: bool,
}

/// Run one complete session. Blocks until the duration elapses or the
/// target exhausts its heal budget.
pub fn run(settings: &SessionSettings, resolved: &ResolvedProfile) -> Result<SessionSummary, Error> {
    run_with_metadata(settings, resolved, &FsMetadataSource)
}

/// [`run`] with an injected metadata collaborator.
pub fn run_with_metadata(
    settings: &SessionSettings,
    resolved: &ResolvedProfile,
    metadata: &dyn MetadataSource,
) -> Result<SessionSummary, Error> {
    // Every log line of this run carries the same correlation ID
    let run_id = generate_run_id();
    let span = tracing::info_span!("session", run = %run_id);
    let _span = span.enter();

    info!(phase = %SessionPhase::Preflight, app = %settings.app_name, "session starting");
    let report = CapabilityReport::detect();
    capabilities::preflight(&report)?;

    let session_dir = settings.output_dir.join(session_dir_name(
        &settings.app_name,
        chrono::Utc::now().timestamp(),
    ));
    std::fs::create_dir_all(&session_dir)?;
    info!(dir = %session_dir.display(), "session directory created");

    ConfigSnapshot::capture(resolved)
        .write_to(&session_dir)
        .map_err(|e| Error::ReportWrite(format!("resolved_config.json: {}", e)))?;

    // Rules are loaded before anything launches so a malformed file
    // fails fast instead of after a full run
    let rules = match &settings.target_state_file {
        Some(path) => Some(target_state::load_rules(path)?),
        None => None,
    };

    let home = std::env::var("HOME").unwrap_or_else(|_| "/root".to_string());
    let filter = InterestFilter::session_default(
        &home,
        &session_dir.to_string_lossy(),
        Some(resolved.profile.process_name.as_str()),
    );

    // Tracer attaches before the target exists; launching a target
    // without live probes would silently lose its startup artifacts
    let mut tracer = SyscallTracer::new(filter);
    tracer.start()?;

    let board = Arc::new(ScoreBoard::default());
    let mut feedback = FeedbackServer::start(settings.feedback_port, Arc::clone(&board))?;

    let display = DisplayGuard::start(settings.display_num)?;
    let display_env = display.env();

    info!(phase = %SessionPhase::Launching, "bringing up target and agent");
    let mut target = supervise::launch_target(&resolved.profile, &display_env, &session_dir)?;
    std::thread::sleep(TARGET_SETTLE);
    let mut agent = launch_agent(settings, &display_env, &session_dir)?;

    // Control loop
    info!(phase = %SessionPhase::Exploring, duration_s = settings.duration.as_secs(), "exploring");
    let deadline = Instant::now() + settings.duration;
    let mut events: Vec<FileEvent> = Vec::new();
    let mut distinct_paths: HashSet<String> = HashSet::new();
    let mut heals = 0u32;
    let mut stopped_early = false;

    while Instant::now() < deadline {
        std::thread::sleep(TICK);

        let batch = tracer.drain();
        for event in &batch {
            distinct_paths.insert(event.path.clone());
        }
        events.extend(batch);
        board.publish(distinct_paths.len() as i64);

        if !target.is_alive() {
            if !heal_allowed(heals) {
                warn!("target died again, ending session early");
                stopped_early = true;
                break;
            }
            info!(phase = %SessionPhase::Healing, "target died, healing");
            heals += 1;
            agent.terminate();
            recreate_scratch_profile(&session_dir);
            target = supervise::launch_target(&resolved.profile, &display_env, &session_dir)
                .map_err(|e| Error::TargetRelaunch(e.to_string()))?;
            std::thread::sleep(TARGET_SETTLE);
            agent = launch_agent(settings, &display_env, &session_dir)?;
            continue;
        }

        if !agent.is_alive() {
            warn!("agent died, relaunching");
            agent = launch_agent(settings, &display_env, &session_dir)?;
        }
    }

    // Analysis: drain what is left, then stop capturing
    info!(phase = %SessionPhase::Analysis, "aggregating artifacts");
    agent.terminate();
    target.terminate();
    events.extend(tracer.drain());
    for event in &events {
        distinct_paths.insert(event.path.clone());
    }
    let events_captured = events.len() as u64;
    tracer.stop();

    let timeline = ActionTimeline::load(&session_dir);
    let artifacts = artifact::aggregate(&events, &timeline, metadata);
    artifact::write_report(&session_dir, &artifacts)?;

    if let Some(rules) = rules {
        let outcomes = target_state::verify(&rules, &artifacts);
        target_state::write_report(&session_dir, &outcomes)?;
    }

    info!(phase = %SessionPhase::Teardown, "releasing resources");
    feedback.stop();
    drop(display);

    let final_score = board.current();
    info!(
        artifacts = artifacts.len(),
        events = events_captured,
        score = final_score,
        heals,
        "session complete"
    );

    Ok(SessionSummary {
        session_dir,
        artifacts,
        events_captured,
        final_score,
        heals,
        stopped_early,
    })
}

fn launch_agent(
    settings: &SessionSettings,
    display_env: &[(String, String)],
    session_dir: &std::path::Path,
) -> Result<ProcessHandle, Error> {
    supervise::launch_agent(
        &settings.app_name,
        settings.duration.as_secs(),
        settings.feedback_port,
        display_env,
        session_dir,
        settings.config_path.as_deref(),
    )
}

/// One heal per session; a target that dies twice is not coming back.
fn heal_allowed(heals: u32) -> bool {
    heals < HEAL_BUDGET
}

/// A crashed target can leave its scratch profile corrupted (lock
/// files, half-written databases); give the relaunch a clean one.
fn recreate_scratch_profile(session_dir: &std::path::Path) {
    let scratch = session_dir.join("target_profile");
    if scratch.exists() {
        if let Err(e) = std::fs::remove_dir_all(&scratch) {
            warn!(error = %e, "could not clear scratch profile");
            return;
        }
    }
    if let Err(e) = std::fs::create_dir_all(&scratch) {
        warn!(error = %e, "could not recreate scratch profile");
    }
    debug!("scratch profile recreated");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_display_names() {
        assert_eq!(SessionPhase::Preflight.to_string(), "preflight");
        assert_eq!(SessionPhase::Healing.to_string(), "healing");
    }

    #[test]
    fn test_heal_is_single_shot() {
        assert!(heal_allowed(0));
        assert!(!heal_allowed(1));
        assert!(!heal_allowed(5));
    }

    #[test]
    fn test_recreate_scratch_profile() {
        let dir = tempfile::tempdir().expect("tempdir");
        let scratch = dir.path().join("target_profile");
        std::fs::create_dir_all(scratch.join("leftover")).expect("setup");
        std::fs::write(scratch.join("leftover/lock"), "x").expect("setup");

        recreate_scratch_profile(dir.path());
        assert!(scratch.is_dir());
        assert!(!scratch.join("leftover").exists());
    }
}
