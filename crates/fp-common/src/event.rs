//! Filesystem syscall events and the userspace interest filter.
//!
//! Events are produced system-wide by the kernel tracer. Narrowing happens
//! here, in userspace, because kernel comm names are truncated (15 bytes)
//! and unreliable for in-kernel matching. The filter is two-stage:
//! exclude patterns always win, then include patterns are required
//! (default-deny), then an optional comm substring narrows by process.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Maximum length of a kernel comm name (excluding NUL).
pub const COMM_NAME_MAX: usize = 15;

/// Kind of filesystem syscall observed by the tracer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SyscallKind {
    Open,
    Delete,
    Rename,
}

impl std::fmt::Display for SyscallKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyscallKind::Open => write!(f, "OPEN"),
            SyscallKind::Delete => write!(f, "DELETE"),
            SyscallKind::Rename => write!(f, "RENAME"),
        }
    }
}

/// One observed filesystem syscall.
///
/// Never deduplicated at this layer; the same path recurs with different
/// kinds throughout a run and aggregation is a teardown-time concern.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEvent {
    pub timestamp: DateTime<Utc>,
    pub pid: u32,
    pub process_name: String,
    pub kind: SyscallKind,
    pub path: String,
}

/// Truncate and lower-case a process name the way the kernel records comm.
///
/// The kernel field is 15 *bytes*, so truncation happens on the last char
/// boundary that fits; a multi-byte name must never normalize longer than
/// what the trace record can carry.
pub fn normalize_comm(name: &str) -> String {
    let lower = name.to_lowercase();
    if lower.len() <= COMM_NAME_MAX {
        return lower;
    }
    let end = lower
        .char_indices()
        .map(|(idx, c)| idx + c.len_utf8())
        .take_while(|&end| end <= COMM_NAME_MAX)
        .last()
        .unwrap_or(0);
    lower[..end].to_string()
}

/// Include/exclude pattern pair evaluated against event paths.
///
/// Patterns are plain substrings. Exclude takes precedence over include;
/// a path matching no include pattern is dropped. Loaded once per session
/// and immutable afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterestFilter {
    pub include: Vec<String>,
    pub exclude: Vec<String>,
    /// Optional comm-name substring; empty means all processes pass.
    #[serde(default)]
    pub target_comm: Option<String>,
}

impl InterestFilter {
    /// Build the session default: user-visible locations in, noise out.
    ///
    /// `scratch_dir` is the session's scratch profile directory, which is
    /// always of interest even when outside home/tmp.
    pub fn session_default(home_dir: &str, scratch_dir: &str, target_name: Option<&str>) -> Self {
        InterestFilter {
            include: vec![
                home_dir.to_string(),
                "/tmp".to_string(),
                scratch_dir.to_string(),
            ],
            exclude: vec![
                "/proc".to_string(),
                "/dev".to_string(),
                "/sys".to_string(),
                // Lock-file shapes, not the bare word: a saved
                // "Sherlock.pdf" is exactly what we are here to catch
                ".lock".to_string(),
                "SingletonLock".to_string(),
                "lockfile".to_string(),
                "__pycache__".to_string(),
                "GPUCache".to_string(),
                "ShaderCache".to_string(),
                ".X11-unix".to_string(),
            ],
            target_comm: target_name
                .filter(|n| !n.is_empty())
                .map(normalize_comm),
        }
    }

    /// Whether the path survives the two-stage filter.
    pub fn accepts_path(&self, path: &str) -> bool {
        if self.exclude.iter().any(|pat| path.contains(pat.as_str())) {
            return false;
        }
        self.include.iter().any(|pat| path.contains(pat.as_str()))
    }

    /// Whether the observed comm passes the optional process narrowing.
    pub fn accepts_comm(&self, comm: &str) -> bool {
        match &self.target_comm {
            Some(target) => normalize_comm(comm).contains(target.as_str()),
            None => true,
        }
    }

    /// Full event check: path filter first, then comm narrowing.
    pub fn accepts(&self, event: &FileEvent) -> bool {
        self.accepts_path(&event.path) && self.accepts_comm(&event.process_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filter() -> InterestFilter {
        InterestFilter::session_default("/home/user", "/tmp/fp-scratch", Some("Mousepad"))
    }

    fn event(comm: &str, path: &str) -> FileEvent {
        FileEvent {
            timestamp: Utc::now(),
            pid: 4242,
            process_name: comm.to_string(),
            kind: SyscallKind::Open,
            path: path.to_string(),
        }
    }

    #[test]
    fn test_exclude_wins_over_include() {
        let f = filter();
        // Inside /tmp (include) but matches an exclude pattern
        assert!(!f.accepts_path("/tmp/.X11-unix/X99"));
        assert!(!f.accepts_path("/home/user/.cache/app/GPUCache/data_0"));
    }

    #[test]
    fn test_default_deny_without_include_match() {
        let f = filter();
        assert!(!f.accepts_path("/var/log/syslog"));
        assert!(!f.accepts_path("/etc/passwd"));
    }

    #[test]
    fn test_include_paths_pass() {
        let f = filter();
        assert!(f.accepts_path("/home/user/Documents/notes.txt"));
        assert!(f.accepts_path("/tmp/fp-scratch/profile/Cookies"));
    }

    #[test]
    fn test_lock_excludes_spare_paths_merely_containing_lock() {
        let f = filter();
        // Artifacts whose names happen to contain "lock" must survive
        assert!(f.accepts_path("/home/user/Downloads/Sherlock.pdf"));
        assert!(f.accepts_path("/home/user/Documents/blocklist.txt"));
        // Actual lock files stay out
        assert!(!f.accepts_path("/home/user/.config/app/SingletonLock"));
        assert!(!f.accepts_path("/tmp/fp-scratch/profile/lockfile"));
        assert!(!f.accepts_path("/home/user/.local/share/app/places.lock"));
    }

    #[test]
    fn test_comm_narrowing_is_normalized_substring() {
        let f = filter();
        // Kernel comm is lower-cased and truncated before comparison
        assert!(f.accepts(&event("mousepad", "/tmp/out.txt")));
        assert!(!f.accepts(&event("gedit", "/tmp/out.txt")));
    }

    #[test]
    fn test_no_target_comm_passes_all() {
        let f = InterestFilter::session_default("/home/user", "/tmp/s", None);
        assert!(f.accepts(&event("anything", "/tmp/whatever")));
    }

    #[test]
    fn test_normalize_comm_truncates_to_kernel_length() {
        let long = "Google-Chrome-Stable-Binary";
        let normalized = normalize_comm(long);
        assert_eq!(normalized.len(), COMM_NAME_MAX);
        assert_eq!(normalized, "google-chrome-s");
    }

    #[test]
    fn test_normalize_comm_truncates_on_byte_boundary() {
        // Cyrillic chars are two bytes each; 15 bytes fits seven of them
        let normalized = normalize_comm("приложение-тест");
        assert_eq!(normalized, "приложе");
        assert!(normalized.len() <= COMM_NAME_MAX);
    }
}
