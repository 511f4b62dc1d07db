//! Virtual display lifetime.
//!
//! Owns an Xvfb server (and a fluxbox window manager on top of it) as a
//! scoped resource: construction brings the display up, drop tears it
//! down in reverse order. The guard only manages lifetime; everything a
//! child process needs to use the display is exposed as env var pairs.

use fp_common::Error;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Screen geometry handed to Xvfb.
const SCREEN_SPEC: &str = "1280x1024x24";

/// How long to wait for the X socket to appear.
const READY_TIMEOUT: Duration = Duration::from_secs(10);

/// Settle time after starting the window manager.
const WM_SETTLE: Duration = Duration::from_millis(500);

/// A running virtual display, torn down on drop.
pub struct DisplayGuard {
    display_num: u32,
    auth_file: PathBuf,
    server: Option<Child>,
    wm: Option<Child>,
}

impl DisplayGuard {
    /// Bring up Xvfb on `:display_num` and start fluxbox on it.
    ///
    /// A stale lock file from a crashed previous run is removed first;
    /// a lock belonging to a live server is a hard error, the caller
    /// should pick another display number.
    pub fn start(display_num: u32) -> Result<Self, Error> {
        clear_stale_lock(display_num)?;

        // Some toolkits refuse to start without an Xauthority file even
        // when the server runs with access control disabled
        let auth_file = PathBuf::from(format!("/tmp/.footprint-xauth-{}", display_num));
        std::fs::write(&auth_file, b"")
            .map_err(|e| Error::DisplayStart(format!("creating Xauthority file: {}", e)))?;

        // Named `display_name` rather than `display` because tracing's `%`
        // sigil cannot reference a local called `display` (tokio-rs/tracing#2115)
        let display_name = format!(":{}", display_num);
        debug!(display = %display_name, screen = SCREEN_SPEC, "starting Xvfb");
        let server = Command::new("Xvfb")
            .args([display_name.as_str(), "-screen", "0", SCREEN_SPEC, "-ac", "-nolisten", "tcp"])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| Error::DisplayStart(format!("Xvfb spawn failed: {}", e)))?;

        let mut guard = DisplayGuard {
            display_num,
            auth_file,
            server: Some(server),
            wm: None,
        };

        guard.wait_ready()?;

        // fluxbox is best-effort: without it windows still map, focus is
        // just less predictable
        match Command::new("fluxbox")
            .envs(guard.env())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
        {
            Ok(wm) => {
                guard.wm = Some(wm);
                std::thread::sleep(WM_SETTLE);
            }
            Err(e) => warn!(error = %e, "fluxbox unavailable, continuing without a window manager"),
        }

        info!(display = %display_name, "virtual display ready");
        Ok(guard)
    }

    /// `DISPLAY` value for children of this guard.
    pub fn display(&self) -> String {
        format!(":{}", self.display_num)
    }

    /// Environment pairs a child needs to render on this display.
    pub fn env(&self) -> Vec<(String, String)> {
        vec![
            ("DISPLAY".to_string(), self.display()),
            (
                "XAUTHORITY".to_string(),
                self.auth_file.to_string_lossy().to_string(),
            ),
        ]
    }

    fn socket_path(&self) -> PathBuf {
        x_socket_path(self.display_num)
    }

    /// Poll for the X socket, reaping the server if it died early.
    fn wait_ready(&mut self) -> Result<(), Error> {
        let deadline = Instant::now() + READY_TIMEOUT;
        let socket = self.socket_path();
        loop {
            if socket.exists() {
                return Ok(());
            }
            if let Some(server) = self.server.as_mut() {
                if let Ok(Some(status)) = server.try_wait() {
                    self.server = None;
                    return Err(Error::DisplayStart(format!(
                        "Xvfb exited during startup ({})",
                        status
                    )));
                }
            }
            if Instant::now() >= deadline {
                return Err(Error::DisplayStart(format!(
                    "X socket {} never appeared",
                    socket.display()
                )));
            }
            std::thread::sleep(Duration::from_millis(100));
        }
    }

    /// Teardown steps in execution order: reverse of bring-up.
    pub fn teardown_plan() -> [&'static str; 3] {
        ["window-manager", "x-server", "auth-file"]
    }

    /// Tear down per [`teardown_plan`](Self::teardown_plan), every step
    /// best-effort. Idempotent.
    pub fn shutdown(&mut self) {
        if let Some(mut wm) = self.wm.take() {
            let _ = wm.kill();
            let _ = wm.wait();
        }
        if let Some(mut server) = self.server.take() {
            let _ = server.kill();
            let _ = server.wait();
            debug!(display = self.display_num, "virtual display stopped");
        }
        if self.auth_file.exists() {
            let _ = std::fs::remove_file(&self.auth_file);
        }
    }
}

impl Drop for DisplayGuard {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn x_lock_path(display_num: u32) -> PathBuf {
    PathBuf::from(format!("/tmp/.X{}-lock", display_num))
}

fn x_socket_path(display_num: u32) -> PathBuf {
    PathBuf::from(format!("/tmp/.X11-unix/X{}", display_num))
}

/// Remove leftovers from a crashed server; refuse to evict a live one.
fn clear_stale_lock(display_num: u32) -> Result<(), Error> {
    let lock = x_lock_path(display_num);
    if !lock.exists() {
        return Ok(());
    }
    if let Some(pid) = read_lock_pid(&lock) {
        if process_alive(pid) {
            return Err(Error::DisplayStart(format!(
                "display :{} is held by live pid {}",
                display_num, pid
            )));
        }
    }
    warn!(display = display_num, "removing stale X lock");
    std::fs::remove_file(&lock)
        .map_err(|e| Error::DisplayStart(format!("removing stale lock: {}", e)))?;
    let socket = x_socket_path(display_num);
    if socket.exists() {
        let _ = std::fs::remove_file(&socket);
    }
    Ok(())
}

/// X lock files hold the server pid as space-padded decimal.
fn read_lock_pid(lock: &Path) -> Option<i32> {
    let text = std::fs::read_to_string(lock).ok()?;
    text.trim().parse().ok()
}

fn process_alive(pid: i32) -> bool {
    // Signal 0 probes existence without delivering anything
    unsafe { libc::kill(pid, 0) == 0 }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_teardown_reverses_bringup() {
        let plan = DisplayGuard::teardown_plan();
        let wm = plan.iter().position(|s| *s == "window-manager").expect("wm step");
        let server = plan.iter().position(|s| *s == "x-server").expect("server step");
        let auth = plan.iter().position(|s| *s == "auth-file").expect("auth step");
        assert!(wm < server);
        assert!(server < auth);
    }

    #[test]
    fn test_lock_and_socket_paths() {
        assert_eq!(x_lock_path(99), PathBuf::from("/tmp/.X99-lock"));
        assert_eq!(x_socket_path(99), PathBuf::from("/tmp/.X11-unix/X99"));
    }

    #[test]
    fn test_read_lock_pid_padded() {
        let dir = tempfile::tempdir().expect("tempdir");
        let lock = dir.path().join("X99-lock");
        let mut f = std::fs::File::create(&lock).expect("create");
        // Real servers write the pid right-aligned in a 10-char field
        writeln!(f, "     12345").expect("write");
        assert_eq!(read_lock_pid(&lock), Some(12345));
    }

    #[test]
    fn test_read_lock_pid_garbage() {
        let dir = tempfile::tempdir().expect("tempdir");
        let lock = dir.path().join("X99-lock");
        std::fs::write(&lock, "not a pid").expect("write");
        assert_eq!(read_lock_pid(&lock), None);
    }

    #[test]
    fn test_own_pid_is_alive() {
        assert!(process_alive(std::process::id() as i32));
        // pids wrap well below this on default kernels
        assert!(!process_alive(i32::MAX - 1));
    }
}
