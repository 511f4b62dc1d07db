//! Target-state verification.
//!
//! An optional JSON rule file names filesystem states the session is
//! expected to reach (a saved document, a history database, a cleared
//! cache). At teardown each rule is checked against the accumulated
//! artifact paths and the live filesystem, and a per-rule report is
//! written next to the footprint report.

use crate::artifact::ArtifactRecord;
use fp_common::Error;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info};

/// Filename of the verification report.
pub const TARGET_STATE_REPORT: &str = "target_state_report.json";

/// One expected-state rule.
///
/// Either a bare string (substring match over artifact paths) or an
/// object with a pattern and optional file checks.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum TargetRule {
    /// Bare string: matched if any artifact path contains it.
    Literal(String),
    Criteria {
        /// Exact-substring path match.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        path: Option<String>,
        /// Glob-lite pattern (`*` matches any run, `?` one char).
        #[serde(default, skip_serializing_if = "Option::is_none")]
        path_pattern: Option<String>,
        /// Matched file must be at least this many bytes on disk.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        min_size: Option<u64>,
        /// Matched file's content must contain this substring.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        content_key: Option<String>,
    },
}

/// Outcome of checking one rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleOutcome {
    pub rule: TargetRule,
    pub matched: bool,
    /// First artifact path that satisfied the rule, when matched.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matched_path: Option<String>,
}

/// Load rules from a JSON file: an array of rules.
pub fn load_rules(path: &Path) -> Result<Vec<TargetRule>, Error> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("target state file {}: {}", path.display(), e)))?;
    let rules: Vec<TargetRule> = serde_json::from_str(&text)
        .map_err(|e| Error::Config(format!("target state file {}: {}", path.display(), e)))?;
    debug!(rules = rules.len(), file = %path.display(), "target state rules loaded");
    Ok(rules)
}

/// Check every rule against the final artifact set.
pub fn verify(rules: &[TargetRule], artifacts: &[ArtifactRecord]) -> Vec<RuleOutcome> {
    rules
        .iter()
        .map(|rule| {
            let matched_path = artifacts
                .iter()
                .map(|a| a.path.as_str())
                .find(|path| rule_matches(rule, path));
            RuleOutcome {
                rule: rule.clone(),
                matched: matched_path.is_some(),
                matched_path: matched_path.map(str::to_string),
            }
        })
        .collect()
}

fn rule_matches(rule: &TargetRule, artifact_path: &str) -> bool {
    match rule {
        TargetRule::Literal(needle) => artifact_path.contains(needle.as_str()),
        TargetRule::Criteria {
            path,
            path_pattern,
            min_size,
            content_key,
        } => {
            if let Some(needle) = path {
                if !artifact_path.contains(needle.as_str()) {
                    return false;
                }
            }
            if let Some(pattern) = path_pattern {
                if !wildcard_match(pattern, artifact_path) {
                    return false;
                }
            }
            if path.is_none() && path_pattern.is_none() {
                return false;
            }
            if let Some(min) = min_size {
                match std::fs::metadata(artifact_path) {
                    Ok(meta) if meta.len() >= *min => {}
                    _ => return false,
                }
            }
            if let Some(key) = content_key {
                match std::fs::read_to_string(artifact_path) {
                    Ok(content) if content.contains(key.as_str()) => {}
                    _ => return false,
                }
            }
            true
        }
    }
}

/// Glob-lite matcher: `*` any run (including empty), `?` exactly one
/// character, everything else literal. Iterative with backtracking so
/// pathological patterns cannot recurse deeply.
pub fn wildcard_match(pattern: &str, text: &str) -> bool {
    let pat: Vec<char> = pattern.chars().collect();
    let txt: Vec<char> = text.chars().collect();
    let (mut p, mut t) = (0usize, 0usize);
    let mut star: Option<(usize, usize)> = None;

    while t < txt.len() {
        if p < pat.len() && (pat[p] == '?' || pat[p] == txt[t]) {
            p += 1;
            t += 1;
        } else if p < pat.len() && pat[p] == '*' {
            star = Some((p, t));
            p += 1;
        } else if let Some((sp, st)) = star {
            p = sp + 1;
            t = st + 1;
            star = Some((sp, st + 1));
        } else {
            return false;
        }
    }
    while p < pat.len() && pat[p] == '*' {
        p += 1;
    }
    p == pat.len()
}

/// Write `target_state_report.json` into the session directory.
pub fn write_report(session_dir: &Path, outcomes: &[RuleOutcome]) -> Result<(), Error> {
    let path = session_dir.join(TARGET_STATE_REPORT);
    let json = serde_json::to_string_pretty(outcomes)?;
    std::fs::write(&path, json)
        .map_err(|e| Error::ReportWrite(format!("{}: {}", path.display(), e)))?;
    let matched = outcomes.iter().filter(|o| o.matched).count();
    info!(
        matched,
        total = outcomes.len(),
        report = %path.display(),
        "target state report written"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use fp_common::SyscallKind;

    fn artifact(path: &str) -> ArtifactRecord {
        ArtifactRecord {
            path: path.to_string(),
            cause_action: "unattributed".to_string(),
            syscall_kinds: vec![SyscallKind::Open],
            accessing_processes: vec!["test".to_string()],
            exists_on_disk: false,
            metadata: serde_json::json!("inaccessible"),
        }
    }

    #[test]
    fn test_wildcard_match() {
        assert!(wildcard_match("*", "anything"));
        assert!(wildcard_match("*.sqlite", "/home/u/.config/app/History.sqlite"));
        assert!(wildcard_match("/tmp/*/cache", "/tmp/run-1/cache"));
        assert!(wildcard_match("file?.txt", "file1.txt"));
        assert!(!wildcard_match("file?.txt", "file12.txt"));
        assert!(!wildcard_match("*.db", "/tmp/x.sqlite"));
        assert!(wildcard_match("", ""));
        assert!(!wildcard_match("", "x"));
    }

    #[test]
    fn test_literal_rule() {
        let rules = vec![TargetRule::Literal("History".to_string())];
        let outcomes = verify(&rules, &[artifact("/home/u/.mozilla/History.db")]);
        assert!(outcomes[0].matched);
        assert_eq!(
            outcomes[0].matched_path.as_deref(),
            Some("/home/u/.mozilla/History.db")
        );

        let outcomes = verify(&rules, &[artifact("/tmp/other")]);
        assert!(!outcomes[0].matched);
    }

    #[test]
    fn test_criteria_rule_pattern_and_size() {
        let dir = tempfile::tempdir().expect("tempdir");
        let file = dir.path().join("saved.txt");
        std::fs::write(&file, "the secret payload").expect("write");
        let path = file.to_str().expect("utf8").to_string();

        let rule = TargetRule::Criteria {
            path: None,
            path_pattern: Some("*saved*".to_string()),
            min_size: Some(5),
            content_key: Some("secret".to_string()),
        };
        let outcomes = verify(&[rule.clone()], &[artifact(&path)]);
        assert!(outcomes[0].matched);

        // Too-small minimum file fails the size gate
        let rule = TargetRule::Criteria {
            path: None,
            path_pattern: Some("*saved*".to_string()),
            min_size: Some(10_000),
            content_key: None,
        };
        let outcomes = verify(&[rule], &[artifact(&path)]);
        assert!(!outcomes[0].matched);
    }

    #[test]
    fn test_criteria_rule_needs_a_path_clause() {
        let rule = TargetRule::Criteria {
            path: None,
            path_pattern: None,
            min_size: Some(1),
            content_key: None,
        };
        let outcomes = verify(&[rule], &[artifact("/tmp/x")]);
        assert!(!outcomes[0].matched);
    }

    #[test]
    fn test_rules_deserialize_mixed() {
        let json = r#"[
            "History",
            {"path_pattern": "*.sqlite", "min_size": 1024},
            {"path": "/tmp/out", "content_key": "done"}
        ]"#;
        let rules: Vec<TargetRule> = serde_json::from_str(json).expect("parse");
        assert_eq!(rules.len(), 3);
        assert!(matches!(&rules[0], TargetRule::Literal(s) if s == "History"));
        assert!(matches!(&rules[1], TargetRule::Criteria { min_size: Some(1024), .. }));
    }

    #[test]
    fn test_write_report() {
        let dir = tempfile::tempdir().expect("tempdir");
        let outcomes = verify(
            &[TargetRule::Literal("x".to_string())],
            &[artifact("/tmp/x")],
        );
        write_report(dir.path(), &outcomes).expect("write");
        assert!(dir.path().join(TARGET_STATE_REPORT).is_file());
    }
}
