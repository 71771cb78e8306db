//! Cycle event log
//!
//! Every cycle writes a `cycle_start` and a `cycle_end` event. Events are
//! appended to `cycle_events.ndjson` and the latest one replaces
//! `last_cycle.json` through a tmp file and rename, so readers never see a
//! partial snapshot.

use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const EVENTS_FILE: &str = "cycle_events.ndjson";
pub const LAST_CYCLE_FILE: &str = "last_cycle.json";
pub const SHUTDOWN_TRACE_FILE: &str = "shutdown_trace.log";

#[derive(Debug, Error)]
pub enum EventLogError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Event writer lock poisoned")]
    LockPoisoned,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CycleEventKind {
    CycleStart,
    CycleEnd,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CycleResult {
    Success,
    Fail,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CycleEvent {
    pub evt: CycleEventKind,
    pub ts: String,
    pub run_id: String,
    pub cycle_id: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<CycleResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tokens: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hot: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CycleEvent {
    pub fn start(run_id: &str, cycle_id: u64, at: DateTime<Utc>) -> Self {
        Self {
            evt: CycleEventKind::CycleStart,
            ts: format_ts(at),
            run_id: run_id.to_string(),
            cycle_id,
            result: None,
            tokens: None,
            hot: None,
            error: None,
        }
    }

    pub fn success(run_id: &str, cycle_id: u64, at: DateTime<Utc>, tokens: usize, hot: usize) -> Self {
        Self {
            evt: CycleEventKind::CycleEnd,
            result: Some(CycleResult::Success),
            tokens: Some(tokens),
            hot: Some(hot),
            ..Self::start(run_id, cycle_id, at)
        }
    }

    pub fn failure(run_id: &str, cycle_id: u64, at: DateTime<Utc>, error: impl Into<String>) -> Self {
        Self {
            evt: CycleEventKind::CycleEnd,
            result: Some(CycleResult::Fail),
            error: Some(error.into()),
            ..Self::start(run_id, cycle_id, at)
        }
    }
}

fn format_ts(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// `run_YYYYmmdd_HHMMSS_<8 hex>`
pub fn generate_run_id(now: DateTime<Utc>) -> String {
    format!("run_{}_{:08x}", now.format("%Y%m%d_%H%M%S"), rand::random::<u32>())
}

/// Writes cycle events under a runtime directory
#[derive(Debug)]
pub struct CycleEventWriter {
    dir: PathBuf,
    log: Mutex<Option<BufWriter<File>>>,
}

impl CycleEventWriter {
    /// Create the runtime directory if needed; the log file opens lazily
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, EventLogError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            log: Mutex::new(None),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn events_path(&self) -> PathBuf {
        self.dir.join(EVENTS_FILE)
    }

    pub fn last_cycle_path(&self) -> PathBuf {
        self.dir.join(LAST_CYCLE_FILE)
    }

    /// Append to the event log and replace the last-cycle snapshot
    pub fn write(&self, event: &CycleEvent) -> Result<(), EventLogError> {
        let line = serde_json::to_string(event)?;
        {
            let mut guard = self.log.lock().map_err(|_| EventLogError::LockPoisoned)?;
            if guard.is_none() {
                let file = OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(self.events_path())?;
                *guard = Some(BufWriter::new(file));
            }
            if let Some(log) = guard.as_mut() {
                writeln!(log, "{}", line)?;
                if event.evt == CycleEventKind::CycleEnd {
                    log.flush()?;
                }
            }
        }
        write_atomic(&self.last_cycle_path(), line.as_bytes())
    }

    pub fn flush(&self) -> Result<(), EventLogError> {
        let mut guard = self.log.lock().map_err(|_| EventLogError::LockPoisoned)?;
        if let Some(log) = guard.as_mut() {
            log.flush()?;
        }
        Ok(())
    }

    /// Latest snapshot, if one was written
    pub fn read_last(&self) -> Result<Option<CycleEvent>, EventLogError> {
        read_last_cycle(&self.last_cycle_path())
    }
}

pub fn read_last_cycle(path: &Path) -> Result<Option<CycleEvent>, EventLogError> {
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(path)?;
    Ok(Some(serde_json::from_str(&content)?))
}

/// Write through a sibling tmp file and rename over `path`
pub fn write_atomic(path: &Path, contents: &[u8]) -> Result<(), EventLogError> {
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, contents)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

/// Append one timestamped line to the shutdown trace
pub fn append_trace(path: &Path, step: &str) -> Result<(), EventLogError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    writeln!(file, "{} {}", format_ts(Utc::now()), step)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn at() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2025-06-01T08:30:05Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn test_run_id_format() {
        let id = generate_run_id(at());
        assert!(id.starts_with("run_20250601_083005_"));
        let suffix = id.rsplit('_').next().unwrap();
        assert_eq!(suffix.len(), 8);
        assert!(suffix.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_event_json_shape() {
        let start = serde_json::to_value(CycleEvent::start("run_x", 1, at())).unwrap();
        assert_eq!(start["evt"], "cycle_start");
        assert_eq!(start["ts"], "2025-06-01T08:30:05Z");
        assert!(start.get("result").is_none());

        let end = serde_json::to_value(CycleEvent::success("run_x", 1, at(), 12, 3)).unwrap();
        assert_eq!(end["evt"], "cycle_end");
        assert_eq!(end["result"], "success");
        assert_eq!(end["tokens"], 12);
        assert_eq!(end["hot"], 3);

        let fail = serde_json::to_value(CycleEvent::failure("run_x", 2, at(), "boom")).unwrap();
        assert_eq!(fail["result"], "fail");
        assert_eq!(fail["error"], "boom");
    }

    #[test]
    fn test_writer_appends_and_snapshots() {
        let dir = TempDir::new().unwrap();
        let writer = CycleEventWriter::new(dir.path().join(".runtime")).unwrap();

        writer.write(&CycleEvent::start("run_x", 1, at())).unwrap();
        writer.write(&CycleEvent::success("run_x", 1, at(), 5, 1)).unwrap();
        writer.flush().unwrap();

        let log = fs::read_to_string(writer.events_path()).unwrap();
        let lines: Vec<&str> = log.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("cycle_start"));

        let last = writer.read_last().unwrap().unwrap();
        assert_eq!(last.evt, CycleEventKind::CycleEnd);
        assert_eq!(last.tokens, Some(5));
        assert!(!writer.last_cycle_path().with_extension("tmp").exists());
    }

    #[test]
    fn test_append_trace() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join(SHUTDOWN_TRACE_FILE);
        append_trace(&path, "stop_requested").unwrap();
        append_trace(&path, "done").unwrap();
        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), 2);
        assert!(content.lines().last().unwrap().ends_with("done"));
    }
}
