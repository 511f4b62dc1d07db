//! Kernel syscall event tracer.
//!
//! Attaches probes on the file-open, unlink, and rename syscall
//! tracepoints by generating a bpftrace program and supervising a
//! `bpftrace` child process. Capture is system-wide: narrowing by
//! process inside the kernel is avoided because comm names are truncated
//! and unreliable, so every record crosses into userspace and the
//! [`InterestFilter`] decides there.
//!
//! A dedicated reader thread consumes the child's stdout, parses
//! tab-separated records, filters them, and appends to a bounded queue.
//! [`SyscallTracer::drain`] is the only cross-thread boundary: it holds
//! the queue lock just long enough to swap the buffer.
//!
//! Failure to attach probes (no privilege, unsupported kernel) is fatal
//! to the session; the controller must not launch the target without a
//! live tracer.

use chrono::Utc;
use fp_common::{Error, FileEvent, InterestFilter, SyscallKind};
use std::collections::VecDeque;
use std::io::{BufRead, BufReader, Read};
use std::process::{Child, Command, Stdio};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, info, trace, warn};

/// Hard cap on buffered events; oldest are dropped beyond this.
const QUEUE_CAP: usize = 65_536;

/// How long to wait for bpftrace's attach confirmation banner.
const ATTACH_TIMEOUT: Duration = Duration::from_secs(10);

/// Record prefix emitted by the generated program.
const RECORD_TAG: &str = "EV";

/// The bpftrace program attached for a session.
///
/// Each probe prints one tab-separated record: tag, kind, pid, comm,
/// path. Empty paths are suppressed in the kernel to cut volume.
fn probe_program() -> String {
    let mut src = String::new();
    for (tracepoint, kind, field) in [
        ("sys_enter_openat", "OPEN", "args->filename"),
        ("sys_enter_unlinkat", "DELETE", "args->pathname"),
        ("sys_enter_renameat", "RENAME", "args->newname"),
        ("sys_enter_renameat2", "RENAME", "args->newname"),
    ] {
        src.push_str(&format!(
            "tracepoint:syscalls:{tp} {{ $p = str({field}); if ($p != \"\") {{ printf(\"{tag}\\t{kind}\\t%d\\t%s\\t%s\\n\", pid, comm, $p); }} }}\n",
            tp = tracepoint,
            field = field,
            tag = RECORD_TAG,
            kind = kind,
        ));
    }
    src
}

/// Counters for dropped/unparseable records, readable at teardown.
#[derive(Debug, Default)]
pub struct TracerStats {
    pub captured: AtomicU64,
    pub filtered_out: AtomicU64,
    pub parse_errors: AtomicU64,
    pub dropped_overflow: AtomicU64,
}

/// System-wide syscall tracer backed by a supervised bpftrace child.
pub struct SyscallTracer {
    filter: Arc<InterestFilter>,
    queue: Arc<Mutex<VecDeque<FileEvent>>>,
    stats: Arc<TracerStats>,
    running: Arc<AtomicBool>,
    child: Option<Child>,
    reader: Option<JoinHandle<()>>,
}

impl SyscallTracer {
    /// Create a tracer with the session's interest filter. No kernel
    /// state is touched until [`start`](Self::start).
    pub fn new(filter: InterestFilter) -> Self {
        SyscallTracer {
            filter: Arc::new(filter),
            queue: Arc::new(Mutex::new(VecDeque::new())),
            stats: Arc::new(TracerStats::default()),
            running: Arc::new(AtomicBool::new(false)),
            child: None,
            reader: None,
        }
    }

    /// Attach the kernel probes and start the reader thread.
    ///
    /// Blocks until bpftrace confirms attachment or fails. A child that
    /// exits (or stays silent) before the confirmation banner is an
    /// attach failure carrying whatever stderr produced.
    pub fn start(&mut self) -> Result<(), Error> {
        let program = probe_program();
        debug!(probes = 4, "spawning bpftrace");

        let mut child = Command::new("bpftrace")
            .args(["-e", &program])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| Error::ProbeAttach(format!("failed to spawn bpftrace: {}", e)))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::ProbeAttach("bpftrace stdout unavailable".to_string()))?;

        let attached = Arc::new(AtomicBool::new(false));
        self.running.store(true, Ordering::SeqCst);

        let handle = {
            let queue = Arc::clone(&self.queue);
            let filter = Arc::clone(&self.filter);
            let stats = Arc::clone(&self.stats);
            let running = Arc::clone(&self.running);
            let attached = Arc::clone(&attached);
            std::thread::Builder::new()
                .name("fp-tracer-reader".to_string())
                .spawn(move || {
                    reader_loop(stdout, &queue, &filter, &stats, &running, &attached)
                })
                .map_err(|e| Error::ProbeAttach(format!("reader thread spawn failed: {}", e)))?
        };

        // Wait for the attach banner, the child dying, or the deadline.
        let deadline = Instant::now() + ATTACH_TIMEOUT;
        loop {
            if attached.load(Ordering::SeqCst) {
                break;
            }
            match child.try_wait() {
                Ok(Some(status)) => {
                    self.running.store(false, Ordering::SeqCst);
                    let _ = handle.join();
                    let stderr = read_stderr(&mut child);
                    return Err(Error::ProbeAttach(format!(
                        "bpftrace exited ({}) before attaching: {}",
                        status,
                        stderr.trim()
                    )));
                }
                Ok(None) => {}
                Err(e) => {
                    warn!(error = %e, "try_wait on bpftrace failed");
                }
            }
            if Instant::now() >= deadline {
                self.running.store(false, Ordering::SeqCst);
                let _ = child.kill();
                let _ = child.wait();
                let _ = handle.join();
                return Err(Error::ProbeAttach(
                    "timed out waiting for probe attach confirmation".to_string(),
                ));
            }
            std::thread::sleep(Duration::from_millis(50));
        }

        info!("kernel probes attached, system-wide capture running");
        self.child = Some(child);
        self.reader = Some(handle);
        Ok(())
    }

    /// Take everything buffered since the last call. Non-blocking and
    /// safe to call concurrently with ongoing capture.
    pub fn drain(&self) -> Vec<FileEvent> {
        let mut queue = match self.queue.lock() {
            Ok(q) => q,
            Err(poisoned) => poisoned.into_inner(),
        };
        queue.drain(..).collect()
    }

    /// Snapshot of the tracer counters.
    pub fn stats(&self) -> &TracerStats {
        &self.stats
    }

    /// Detach probes and join the reader thread. Idempotent.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(mut child) = self.child.take() {
            let _ = child.kill();
            let _ = child.wait();
        }
        if let Some(handle) = self.reader.take() {
            let _ = handle.join();
        }
        debug!(
            captured = self.stats.captured.load(Ordering::Relaxed),
            filtered_out = self.stats.filtered_out.load(Ordering::Relaxed),
            parse_errors = self.stats.parse_errors.load(Ordering::Relaxed),
            dropped = self.stats.dropped_overflow.load(Ordering::Relaxed),
            "tracer stopped"
        );
    }
}

impl Drop for SyscallTracer {
    fn drop(&mut self) {
        self.stop();
    }
}

fn reader_loop(
    stdout: impl Read,
    queue: &Mutex<VecDeque<FileEvent>>,
    filter: &InterestFilter,
    stats: &TracerStats,
    running: &AtomicBool,
    attached: &AtomicBool,
) {
    let reader = BufReader::new(stdout);
    for line in reader.lines() {
        if !running.load(Ordering::SeqCst) {
            break;
        }
        let line = match line {
            Ok(line) => line,
            // Pipe closed: the child is gone
            Err(_) => break,
        };

        if !attached.load(Ordering::SeqCst) && line.starts_with("Attaching") {
            attached.store(true, Ordering::SeqCst);
            continue;
        }

        match parse_record(&line) {
            Some(event) => {
                if !filter.accepts(&event) {
                    stats.filtered_out.fetch_add(1, Ordering::Relaxed);
                    continue;
                }
                trace!(comm = %event.process_name, pid = event.pid, path = %event.path, kind = %event.kind, "event");
                stats.captured.fetch_add(1, Ordering::Relaxed);
                let mut q = match queue.lock() {
                    Ok(q) => q,
                    Err(poisoned) => poisoned.into_inner(),
                };
                if q.len() >= QUEUE_CAP {
                    q.pop_front();
                    stats.dropped_overflow.fetch_add(1, Ordering::Relaxed);
                }
                q.push_back(event);
            }
            None => {
                // Banner lines and partial writes land here
                if line.starts_with(RECORD_TAG) {
                    stats.parse_errors.fetch_add(1, Ordering::Relaxed);
                }
            }
        }
    }
}

/// Parse one record line: `EV\t<KIND>\t<pid>\t<comm>\t<path>`.
///
/// Paths can themselves contain tabs in pathological cases, so the path
/// field takes the remainder of the line.
fn parse_record(line: &str) -> Option<FileEvent> {
    let mut parts = line.splitn(5, '\t');
    if parts.next()? != RECORD_TAG {
        return None;
    }
    let kind = match parts.next()? {
        "OPEN" => SyscallKind::Open,
        "DELETE" => SyscallKind::Delete,
        "RENAME" => SyscallKind::Rename,
        _ => return None,
    };
    let pid: u32 = parts.next()?.parse().ok()?;
    let comm = parts.next()?;
    let path = parts.next()?;
    if path.is_empty() {
        return None;
    }
    Some(FileEvent {
        timestamp: Utc::now(),
        pid,
        process_name: comm.to_lowercase(),
        kind,
        path: path.to_string(),
    })
}

fn read_stderr(child: &mut Child) -> String {
    let mut buf = String::new();
    if let Some(stderr) = child.stderr.as_mut() {
        let _ = stderr.read_to_string(&mut buf);
    }
    buf
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_probe_program_covers_all_kinds() {
        let src = probe_program();
        assert!(src.contains("sys_enter_openat"));
        assert!(src.contains("sys_enter_unlinkat"));
        assert!(src.contains("sys_enter_renameat"));
        assert!(src.contains("sys_enter_renameat2"));
        assert!(src.contains("OPEN"));
        assert!(src.contains("DELETE"));
        assert!(src.contains("RENAME"));
    }

    #[test]
    fn test_parse_record_valid() {
        let event = parse_record("EV\tOPEN\t1234\tmousepad\t/tmp/out.txt").expect("parse");
        assert_eq!(event.kind, SyscallKind::Open);
        assert_eq!(event.pid, 1234);
        assert_eq!(event.process_name, "mousepad");
        assert_eq!(event.path, "/tmp/out.txt");
    }

    #[test]
    fn test_parse_record_comm_lowercased() {
        let event = parse_record("EV\tDELETE\t1\tMousePad\t/tmp/x").expect("parse");
        assert_eq!(event.process_name, "mousepad");
    }

    #[test]
    fn test_parse_record_rejects_malformed() {
        assert!(parse_record("Attaching 4 probes...").is_none());
        assert!(parse_record("EV\tOPEN\tnot-a-pid\tcomm\t/x").is_none());
        assert!(parse_record("EV\tWRITE\t1\tcomm\t/x").is_none());
        assert!(parse_record("EV\tOPEN\t1\tcomm\t").is_none());
        assert!(parse_record("").is_none());
    }

    #[test]
    fn test_parse_record_path_keeps_embedded_tabs() {
        let event = parse_record("EV\tOPEN\t1\tcomm\t/tmp/weird\tname").expect("parse");
        assert_eq!(event.path, "/tmp/weird\tname");
    }

    #[test]
    fn test_drain_empties_queue() {
        let tracer = SyscallTracer::new(InterestFilter::session_default("/home", "/tmp/s", None));
        {
            let mut q = tracer.queue.lock().expect("lock");
            q.push_back(parse_record("EV\tOPEN\t1\tsh\t/tmp/a").expect("parse"));
            q.push_back(parse_record("EV\tOPEN\t2\tsh\t/tmp/b").expect("parse"));
        }
        assert_eq!(tracer.drain().len(), 2);
        assert!(tracer.drain().is_empty());
    }

    #[test]
    fn test_excluded_events_never_reach_queue() {
        // Filter applied in the reader path: simulate it directly
        let filter = InterestFilter::session_default("/home/user", "/tmp/s", None);
        let event = parse_record("EV\tOPEN\t1\tsh\t/tmp/.X11-unix/X99").expect("parse");
        assert!(!filter.accepts(&event));
        let event = parse_record("EV\tOPEN\t1\tsh\t/proc/self/maps").expect("parse");
        assert!(!filter.accepts(&event));
    }
}
