//! UI-state hashing.
//!
//! A state is an opaque digest of what the user would see: the active
//! window title plus the roles/names of any transient elements (dialogs,
//! popups). Good enough for within-session novelty tracking; never
//! compared across runs.

use sha2::{Digest, Sha256};
use std::time::{Duration, Instant};

/// Poll interval for [`wait_for_state_change`].
const POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Maximum time to wait for the UI to react to an action.
pub const STATE_CHANGE_TIMEOUT: Duration = Duration::from_secs(2);

/// Digest the observable UI state. Transient labels are sorted first so
/// enumeration order does not create phantom novelty.
pub fn hash_state(window_title: &str, transient_labels: &[String]) -> String {
    let mut labels: Vec<&str> = transient_labels.iter().map(String::as_str).collect();
    labels.sort_unstable();

    let mut hasher = Sha256::new();
    hasher.update(window_title.as_bytes());
    for label in labels {
        hasher.update([0u8]);
        hasher.update(label.as_bytes());
    }
    // 16 hex chars is plenty for a within-session visited set
    hex::encode(&hasher.finalize()[..8])
}

/// Poll `probe` until the state differs from `baseline` or the timeout
/// expires. Returns whether a change was observed; returning early
/// keeps the action loop fast on responsive UIs.
pub fn wait_for_state_change(
    probe: impl Fn() -> String,
    baseline: &str,
    timeout: Duration,
) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if probe() != baseline {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        std::thread::sleep(POLL_INTERVAL);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_hash_is_stable() {
        let labels = vec!["dialog:Save".to_string()];
        assert_eq!(hash_state("Editor", &labels), hash_state("Editor", &labels));
        assert_eq!(hash_state("Editor", &labels).len(), 16);
    }

    #[test]
    fn test_hash_ignores_label_order() {
        let a = vec!["x".to_string(), "y".to_string()];
        let b = vec!["y".to_string(), "x".to_string()];
        assert_eq!(hash_state("t", &a), hash_state("t", &b));
    }

    #[test]
    fn test_hash_differs_on_content() {
        assert_ne!(hash_state("Editor", &[]), hash_state("Editor - saved", &[]));
        assert_ne!(
            hash_state("Editor", &["dialog".to_string()]),
            hash_state("Editor", &[])
        );
    }

    #[test]
    fn test_wait_detects_change() {
        let calls = AtomicU32::new(0);
        let probe = || {
            // Changes on the third poll
            if calls.fetch_add(1, Ordering::SeqCst) >= 2 {
                "after".to_string()
            } else {
                "before".to_string()
            }
        };
        assert!(wait_for_state_change(probe, "before", Duration::from_secs(2)));
    }

    #[test]
    fn test_wait_times_out() {
        let start = Instant::now();
        let changed = wait_for_state_change(
            || "same".to_string(),
            "same",
            Duration::from_millis(300),
        );
        assert!(!changed);
        assert!(start.elapsed() >= Duration::from_millis(300));
    }
}
