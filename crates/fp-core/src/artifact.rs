//! Artifact aggregation and the session report.
//!
//! Built once at teardown from the full accumulated event log. The same
//! path recurs throughout a run with different syscall kinds and from
//! different processes, so records are unioned per path rather than
//! emitted incrementally.
//!
//! Per-file metadata comes from an external collaborator behind the
//! narrow [`MetadataSource`] trait; paths it cannot read are reported as
//! `"inaccessible"` rather than omitted.

use chrono::{DateTime, Utc};
use fp_common::{Error, FileEvent, SyscallKind};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, info, warn};

/// Filename of the main session report.
pub const FOOTPRINT_REPORT: &str = "artifact_footprint.json";

/// Filename of the agent's timestamped action log.
pub const ACTION_LOG: &str = "actions.log";

/// Cause recorded when no action can be matched to an event.
const UNATTRIBUTED: &str = "unattributed";

/// Per-file metadata provider.
///
/// `None` means the path could not be inspected; the record still ships
/// with metadata `"inaccessible"`.
pub trait MetadataSource {
    fn extract(&self, path: &str) -> Option<serde_json::Value>;
}

/// Filesystem-backed metadata: size, mtime, readonly bit.
pub struct FsMetadataSource;

impl MetadataSource for FsMetadataSource {
    fn extract(&self, path: &str) -> Option<serde_json::Value> {
        let meta = std::fs::metadata(path).ok()?;
        let modified = meta
            .modified()
            .ok()
            .map(|t| DateTime::<Utc>::from(t).to_rfc3339());
        Some(serde_json::json!({
            "size_bytes": meta.len(),
            "modified": modified,
            "readonly": meta.permissions().readonly(),
        }))
    }
}

/// One deduplicated artifact in the final report.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ArtifactRecord {
    pub path: String,
    pub cause_action: String,
    pub syscall_kinds: Vec<SyscallKind>,
    pub accessing_processes: Vec<String>,
    pub exists_on_disk: bool,
    pub metadata: serde_json::Value,
}

/// The agent's action stream, replayed for cause attribution.
///
/// Parsed from `actions.log` lines of the form
/// `<rfc3339-timestamp>\t<action-name>`. Malformed lines are skipped.
#[derive(Debug, Default)]
pub struct ActionTimeline {
    // Sorted by timestamp
    entries: Vec<(DateTime<Utc>, String)>,
}

impl ActionTimeline {
    pub fn parse(text: &str) -> Self {
        let mut entries: Vec<(DateTime<Utc>, String)> = text
            .lines()
            .filter_map(|line| {
                let (ts, action) = line.split_once('\t')?;
                let ts = DateTime::parse_from_rfc3339(ts.trim()).ok()?;
                let action = action.trim();
                if action.is_empty() {
                    return None;
                }
                Some((ts.with_timezone(&Utc), action.to_string()))
            })
            .collect();
        entries.sort_by_key(|(ts, _)| *ts);
        ActionTimeline { entries }
    }

    /// Load from the session directory; missing log is an empty timeline.
    pub fn load(session_dir: &Path) -> Self {
        match std::fs::read_to_string(session_dir.join(ACTION_LOG)) {
            Ok(text) => {
                let timeline = Self::parse(&text);
                debug!(actions = timeline.entries.len(), "action timeline loaded");
                timeline
            }
            Err(_) => {
                debug!("no action log, artifacts will be unattributed");
                ActionTimeline::default()
            }
        }
    }

    /// The action in flight at `ts`: the most recent entry at or before
    /// it.
    pub fn action_at(&self, ts: DateTime<Utc>) -> Option<&str> {
        match self.entries.partition_point(|(t, _)| *t <= ts) {
            0 => None,
            idx => Some(self.entries[idx - 1].1.as_str()),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Fold the event log into deduplicated, attributed artifact records.
///
/// Pure over its inputs apart from `exists_on_disk` and metadata, which
/// consult the filesystem through `source`.
pub fn aggregate(
    events: &[FileEvent],
    timeline: &ActionTimeline,
    source: &dyn MetadataSource,
) -> Vec<ArtifactRecord> {
    // BTreeMap keeps report order stable across runs
    let mut by_path: BTreeMap<&str, (Vec<SyscallKind>, Vec<String>, String)> = BTreeMap::new();

    for event in events {
        let cause = timeline
            .action_at(event.timestamp)
            .unwrap_or(UNATTRIBUTED)
            .to_string();
        let entry = by_path
            .entry(event.path.as_str())
            .or_insert_with(|| (Vec::new(), Vec::new(), cause));
        if !entry.0.contains(&event.kind) {
            entry.0.push(event.kind);
        }
        if !entry.1.contains(&event.process_name) {
            entry.1.push(event.process_name.clone());
        }
    }

    by_path
        .into_iter()
        .map(|(path, (mut kinds, mut procs, cause_action))| {
            kinds.sort();
            procs.sort();
            let metadata = source
                .extract(path)
                .unwrap_or_else(|| serde_json::Value::String("inaccessible".to_string()));
            ArtifactRecord {
                path: path.to_string(),
                cause_action,
                syscall_kinds: kinds,
                accessing_processes: procs,
                exists_on_disk: Path::new(path).exists(),
                metadata,
            }
        })
        .collect()
}

/// Write `artifact_footprint.json` into the session directory.
pub fn write_report(session_dir: &Path, records: &[ArtifactRecord]) -> Result<(), Error> {
    let path = session_dir.join(FOOTPRINT_REPORT);
    let json = serde_json::to_string_pretty(records)?;
    std::fs::write(&path, json)
        .map_err(|e| Error::ReportWrite(format!("{}: {}", path.display(), e)))?;
    let unattributed = records
        .iter()
        .filter(|r| r.cause_action == UNATTRIBUTED)
        .count();
    if unattributed > 0 && unattributed == records.len() {
        warn!("no artifact could be attributed to an action");
    }
    info!(
        artifacts = records.len(),
        report = %path.display(),
        "footprint report written"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    struct NullMetadata;
    impl MetadataSource for NullMetadata {
        fn extract(&self, _path: &str) -> Option<serde_json::Value> {
            None
        }
    }

    fn ts(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).single().expect("ts")
    }

    fn event(path: &str, kind: SyscallKind, comm: &str, at: i64) -> FileEvent {
        FileEvent {
            timestamp: ts(at),
            pid: 100,
            process_name: comm.to_string(),
            kind,
            path: path.to_string(),
        }
    }

    #[test]
    fn test_timeline_attribution() {
        let log = format!(
            "{}\tui_crawl\n{}\tdialog_handler\n",
            ts(10).to_rfc3339(),
            ts(20).to_rfc3339()
        );
        let timeline = ActionTimeline::parse(&log);
        assert_eq!(timeline.action_at(ts(5)), None);
        assert_eq!(timeline.action_at(ts(10)), Some("ui_crawl"));
        assert_eq!(timeline.action_at(ts(15)), Some("ui_crawl"));
        assert_eq!(timeline.action_at(ts(25)), Some("dialog_handler"));
    }

    #[test]
    fn test_timeline_skips_malformed_lines() {
        let timeline = ActionTimeline::parse("garbage\nnot-a-ts\tclick\n\n");
        assert!(timeline.is_empty());
    }

    #[test]
    fn test_aggregate_unions_per_path() {
        let events = vec![
            event("/tmp/a", SyscallKind::Open, "mousepad", 1),
            event("/tmp/a", SyscallKind::Delete, "mousepad", 2),
            event("/tmp/a", SyscallKind::Open, "gvfsd", 3),
            event("/tmp/b", SyscallKind::Rename, "mousepad", 4),
        ];
        let records = aggregate(&events, &ActionTimeline::default(), &NullMetadata);
        assert_eq!(records.len(), 2);

        let a = &records[0];
        assert_eq!(a.path, "/tmp/a");
        assert_eq!(a.syscall_kinds, vec![SyscallKind::Open, SyscallKind::Delete]);
        assert_eq!(a.accessing_processes, vec!["gvfsd", "mousepad"]);
        assert_eq!(a.cause_action, "unattributed");
        assert_eq!(a.metadata, serde_json::json!("inaccessible"));
        assert!(!a.exists_on_disk);
    }

    #[test]
    fn test_aggregate_attributes_first_touch() {
        let log = format!("{}\tui_input\n", ts(0).to_rfc3339());
        let timeline = ActionTimeline::parse(&log);
        let events = vec![
            event("/tmp/a", SyscallKind::Open, "mousepad", 5),
            event("/tmp/a", SyscallKind::Open, "mousepad", 50),
        ];
        let records = aggregate(&events, &timeline, &NullMetadata);
        assert_eq!(records[0].cause_action, "ui_input");
    }

    #[test]
    fn test_fs_metadata_real_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let file = dir.path().join("x.txt");
        std::fs::write(&file, "hello").expect("write");
        let meta = FsMetadataSource
            .extract(file.to_str().expect("utf8"))
            .expect("metadata");
        assert_eq!(meta["size_bytes"], 5);
        assert_eq!(meta["readonly"], false);
    }

    #[test]
    fn test_fs_metadata_missing_file() {
        assert!(FsMetadataSource.extract("/no/such/file-qqq").is_none());
    }

    #[test]
    fn test_write_report() {
        let dir = tempfile::tempdir().expect("tempdir");
        let records = vec![ArtifactRecord {
            path: "/tmp/a".to_string(),
            cause_action: "ui_crawl".to_string(),
            syscall_kinds: vec![SyscallKind::Open],
            accessing_processes: vec!["mousepad".to_string()],
            exists_on_disk: false,
            metadata: serde_json::json!("inaccessible"),
        }];
        write_report(dir.path(), &records).expect("write");
        let text =
            std::fs::read_to_string(dir.path().join(FOOTPRINT_REPORT)).expect("read back");
        let parsed: Vec<ArtifactRecord> = serde_json::from_str(&text).expect("parse");
        assert_eq!(parsed, records);
    }
}
