//! Target and agent process supervision.
//!
//! Both the target application and the exploration agent run as
//! separate OS processes in their own process groups, so teardown can
//! signal the whole tree (GUI apps fork helpers freely). Liveness is
//! polled with `try_wait`; the session loop decides what a death means.

use fp_common::Error;
use fp_config::TargetProfile;
use std::os::unix::process::CommandExt;
use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Grace period between SIGTERM and SIGKILL at teardown.
const TERM_GRACE: Duration = Duration::from_secs(3);

/// A supervised child in its own process group.
#[derive(Debug)]
pub struct ProcessHandle {
    label: &'static str,
    child: Child,
}

impl ProcessHandle {
    pub fn pid(&self) -> u32 {
        self.child.id()
    }

    /// Whether the process is still running. Reaps on exit.
    pub fn is_alive(&mut self) -> bool {
        match self.child.try_wait() {
            Ok(None) => true,
            Ok(Some(status)) => {
                debug!(label = self.label, %status, "process exited");
                false
            }
            Err(e) => {
                warn!(label = self.label, error = %e, "try_wait failed");
                false
            }
        }
    }

    /// Exit status if the process already finished.
    pub fn exit_status(&mut self) -> Option<std::process::ExitStatus> {
        self.child.try_wait().ok().flatten()
    }

    /// Terminate the whole process group: SIGTERM, a grace period, then
    /// SIGKILL for whatever is left.
    pub fn terminate(&mut self) {
        let pgid = self.child.id() as i32;
        debug!(label = self.label, pgid, "terminating process group");
        unsafe {
            libc::killpg(pgid, libc::SIGTERM);
        }
        let deadline = Instant::now() + TERM_GRACE;
        loop {
            match self.child.try_wait() {
                Ok(Some(_)) => break,
                Ok(None) if Instant::now() < deadline => {
                    std::thread::sleep(Duration::from_millis(100));
                }
                _ => {
                    warn!(label = self.label, pgid, "escalating to SIGKILL");
                    unsafe {
                        libc::killpg(pgid, libc::SIGKILL);
                    }
                    let _ = self.child.wait();
                    break;
                }
            }
        }
    }
}

impl Drop for ProcessHandle {
    fn drop(&mut self) {
        if matches!(self.child.try_wait(), Ok(None)) {
            self.terminate();
        }
    }
}

/// Launch the target application on the virtual display.
///
/// The target's stderr goes to `target_stderr.log` in the session
/// directory; GUI toolkits are chatty and crash diagnostics land there.
/// If the profile names a user-dir flag, the target gets a private
/// profile directory under the session dir so runs never share state.
pub fn launch_target(
    profile: &TargetProfile,
    display_env: &[(String, String)],
    session_dir: &Path,
) -> Result<ProcessHandle, Error> {
    let (program, fixed_args) = profile
        .binary_cmd
        .split_first()
        .ok_or_else(|| Error::TargetLaunch {
            cmd: String::new(),
            reason: "empty binary command".to_string(),
        })?;
    let cmd_display = profile.binary_cmd.join(" ");

    let mut args: Vec<String> = fixed_args.to_vec();
    args.extend(profile.wm_flags.iter().cloned());
    if let Some(flag) = &profile.user_dir_flag {
        let user_dir = session_dir.join("target_profile");
        std::fs::create_dir_all(&user_dir).map_err(|e| Error::TargetLaunch {
            cmd: cmd_display.clone(),
            reason: format!("creating target profile dir: {}", e),
        })?;
        args.push(format!("{}={}", flag, user_dir.display()));
    }

    let stderr_log =
        std::fs::File::create(session_dir.join("target_stderr.log")).map_err(|e| {
            Error::TargetLaunch {
                cmd: cmd_display.clone(),
                reason: format!("creating target_stderr.log: {}", e),
            }
        })?;

    let mut cmd = Command::new(program);
    cmd.args(&args)
        .envs(display_env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::from(stderr_log))
        .process_group(0);

    let child = cmd.spawn().map_err(|e| Error::TargetLaunch {
        cmd: cmd_display.clone(),
        reason: e.to_string(),
    })?;

    info!(cmd = %cmd_display, pid = child.id(), "target launched");
    Ok(ProcessHandle {
        label: "target",
        child,
    })
}

/// Launch the exploration agent as its own process.
///
/// The agent binary normally sits next to the controller binary;
/// `FOOTPRINT_AGENT_BIN` overrides the path for development. The agent
/// learns everything else (target, display, feedback port, session dir)
/// through its command line and environment.
pub fn launch_agent(
    app_name: &str,
    duration_seconds: u64,
    feedback_port: u16,
    display_env: &[(String, String)],
    session_dir: &Path,
    config_path: Option<&Path>,
) -> Result<ProcessHandle, Error> {
    let agent_bin = match std::env::var("FOOTPRINT_AGENT_BIN") {
        Ok(path) => std::path::PathBuf::from(path),
        Err(_) => sibling_binary("footprint-agent")?,
    };

    let mut cmd = Command::new(&agent_bin);
    cmd.arg(app_name)
        .arg(duration_seconds.to_string())
        .arg("--session-dir")
        .arg(session_dir)
        .envs(display_env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
        .env(fp_common::feedback::FEEDBACK_PORT_ENV, feedback_port.to_string())
        .stdin(Stdio::null())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit())
        .process_group(0);
    if let Some(config) = config_path {
        cmd.arg("--config").arg(config);
    }

    let child = cmd
        .spawn()
        .map_err(|e| Error::AgentLaunch(format!("{}: {}", agent_bin.display(), e)))?;

    info!(pid = child.id(), bin = %agent_bin.display(), "agent launched");
    Ok(ProcessHandle {
        label: "agent",
        child,
    })
}

/// Resolve a binary expected to live next to the current executable.
fn sibling_binary(name: &str) -> Result<std::path::PathBuf, Error> {
    let me = std::env::current_exe()
        .map_err(|e| Error::AgentLaunch(format!("current_exe: {}", e)))?;
    let candidate = me
        .parent()
        .map(|dir| dir.join(name))
        .filter(|p| p.is_file());
    candidate.ok_or_else(|| {
        Error::AgentLaunch(format!(
            "{} not found next to {} (set FOOTPRINT_AGENT_BIN)",
            name,
            me.display()
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spawn_sleeper() -> ProcessHandle {
        let child = Command::new("sleep")
            .arg("30")
            .process_group(0)
            .spawn()
            .expect("spawn sleep");
        ProcessHandle {
            label: "test",
            child,
        }
    }

    #[test]
    fn test_liveness_and_terminate() {
        let mut handle = spawn_sleeper();
        assert!(handle.is_alive());
        handle.terminate();
        assert!(!handle.is_alive());
    }

    #[test]
    fn test_exited_child_reports_dead() {
        let child = Command::new("true").spawn().expect("spawn true");
        let mut handle = ProcessHandle {
            label: "test",
            child,
        };
        // Give it a moment to exit
        std::thread::sleep(Duration::from_millis(200));
        assert!(!handle.is_alive());
        assert!(handle.exit_status().is_some());
    }

    #[test]
    fn test_launch_target_missing_binary() {
        let dir = tempfile::tempdir().expect("tempdir");
        let profile = TargetProfile::from_command("/no/such/binary-qqq");
        let err = launch_target(&profile, &[], dir.path()).expect_err("must fail");
        assert!(matches!(err, Error::TargetLaunch { .. }));
    }

    #[test]
    fn test_launch_target_user_dir_flag() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut profile = TargetProfile::from_command("true");
        profile.user_dir_flag = Some("--user-data-dir".to_string());
        let mut handle = launch_target(&profile, &[], dir.path()).expect("launch");
        assert!(dir.path().join("target_profile").is_dir());
        assert!(dir.path().join("target_stderr.log").is_file());
        handle.terminate();
    }
}
