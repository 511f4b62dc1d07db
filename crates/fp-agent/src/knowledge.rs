//! Keyword knowledge base.
//!
//! A set of lowercase terms the crawler uses to score widgets: a button
//! whose name mentions "history" or "save" is worth visiting before an
//! anonymous one. Harvested once at startup from the target package's
//! installed file list and seeded with forensic-relevant vocabulary.

use std::collections::HashSet;
use std::process::Command;
use tracing::{debug, warn};

/// Terms that matter regardless of the target.
const SEED_TERMS: &[&str] = &[
    "save", "download", "print", "log", "cache", "history", "settings", "clear",
];

/// Minimum length of a harvested term; shorter stems match everything.
const MIN_TERM_LEN: usize = 5;

#[derive(Debug, Clone)]
pub struct KnowledgeBase {
    terms: HashSet<String>,
}

impl KnowledgeBase {
    /// Seeds only.
    pub fn seeded() -> Self {
        KnowledgeBase {
            terms: SEED_TERMS.iter().map(|t| t.to_string()).collect(),
        }
    }

    /// Seeds plus terms harvested from `dpkg -L <package>`. A missing
    /// package or missing dpkg degrades to the seeds with a warning.
    pub fn harvest(package: &str) -> Self {
        let mut kb = Self::seeded();
        let output = match Command::new("dpkg").args(["-L", package]).output() {
            Ok(out) if out.status.success() => out,
            Ok(out) => {
                warn!(
                    package,
                    status = %out.status,
                    "dpkg -L failed, knowledge base is seeds only"
                );
                return kb;
            }
            Err(e) => {
                warn!(package, error = %e, "dpkg unavailable, knowledge base is seeds only");
                return kb;
            }
        };

        let listing = String::from_utf8_lossy(&output.stdout);
        let before = kb.terms.len();
        for line in listing.lines() {
            if let Some(term) = harvest_term(line) {
                kb.terms.insert(term);
            }
        }
        debug!(
            package,
            harvested = kb.terms.len() - before,
            total = kb.terms.len(),
            "knowledge base built"
        );
        kb
    }

    /// Whether any known term occurs in `name` (case-insensitive).
    pub fn matches(&self, name: &str) -> bool {
        let lowered = name.to_lowercase();
        self.terms.iter().any(|term| lowered.contains(term.as_str()))
    }

    pub fn len(&self) -> usize {
        self.terms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }
}

/// Turn one `dpkg -L` path line into a candidate term: the file stem,
/// lowercased, kept only if purely alphabetic and long enough to be a
/// meaningful word.
fn harvest_term(path_line: &str) -> Option<String> {
    let stem = std::path::Path::new(path_line.trim())
        .file_stem()?
        .to_str()?
        .to_lowercase();
    if stem.len() >= MIN_TERM_LEN && stem.chars().all(|c| c.is_ascii_alphabetic()) {
        Some(stem)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seeds_present() {
        let kb = KnowledgeBase::seeded();
        assert!(kb.matches("Save As..."));
        assert!(kb.matches("Clear Browsing History"));
        assert!(!kb.matches("OK"));
    }

    #[test]
    fn test_matches_is_case_insensitive() {
        let kb = KnowledgeBase::seeded();
        assert!(kb.matches("DOWNLOADS"));
        assert!(kb.matches("Print preview"));
    }

    #[test]
    fn test_harvest_term_filters() {
        assert_eq!(harvest_term("/usr/share/app/bookmarks.html"), Some("bookmarks".to_string()));
        assert_eq!(harvest_term("/usr/bin/app2"), None); // digit
        assert_eq!(harvest_term("/etc/app/rc"), None); // too short
        assert_eq!(harvest_term("/usr/lib/libfoo-2.0.so"), None);
        assert_eq!(harvest_term(""), None);
    }

    #[test]
    fn test_harvest_missing_package_degrades_to_seeds() {
        let kb = KnowledgeBase::harvest("no-such-package-qqq");
        assert_eq!(kb.len(), SEED_TERMS.len());
    }
}
