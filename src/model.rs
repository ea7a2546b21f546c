//! Core data model.
//!
//! A work unit is one mounted filesystem tree to relabel. A job is the
//! runtime instance of processing one work unit; it ends in exactly one
//! terminal status.

use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Work Unit
// ---------------------------------------------------------------------------

/// An independently processable filesystem tree root.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkUnit {
    /// Mount point. Unique within a discovered work set.
    pub path: PathBuf,

    /// Log sink name derived from `path`. Distinct paths always map to
    /// distinct ids.
    pub log_sink_id: String,
}

impl WorkUnit {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let log_sink_id = log_sink_id(&path);
        Self { path, log_sink_id }
    }

    /// Path of this unit's log file inside `log_dir`.
    pub fn log_path(&self, log_dir: &Path) -> PathBuf {
        log_dir.join(format!("{}.log", self.log_sink_id))
    }
}

/// Encode a path as a file name.
///
/// `/` becomes `-`, ASCII alphanumerics and `.` pass through, and every other
/// byte becomes `_XX` (uppercase hex). The encoding is injective: `-` only
/// ever comes from `/`, and `_` always opens a three-byte escape, so
/// `/a/b` (`-a-b`) and `/a_b` (`-a_5Fb`) never collide.
pub fn log_sink_id(path: &Path) -> String {
    let bytes = path.as_os_str().as_bytes();
    let mut id = String::with_capacity(bytes.len());
    for &b in bytes {
        match b {
            b'/' => id.push('-'),
            b'.' => id.push('.'),
            b if b.is_ascii_alphanumeric() => id.push(b as char),
            b => id.push_str(&format!("_{b:02X}")),
        }
    }
    id
}

// ---------------------------------------------------------------------------
// Job
// ---------------------------------------------------------------------------

/// Newtype for job IDs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobId(pub Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Short display: first 8 chars of UUID
        write!(f, "{}", &self.0.to_string()[..8])
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

/// Lifecycle state of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Discovered, waiting for a pool slot.
    Pending,
    /// Process started and holding a pool slot.
    Running,
    /// Process exited 0. Terminal.
    Succeeded,
    /// Launch error, non-zero exit, or signal. Terminal.
    Failed,
}

impl JobStatus {
    /// Can transition from self to `to`?
    pub fn can_transition_to(self, to: JobStatus) -> bool {
        use JobStatus::*;
        matches!(
            (self, to),
            (Pending, Running)
                | (Pending, Failed) // launch error
                | (Running, Succeeded)
                | (Running, Failed)
        )
    }

    /// Is this a terminal state?
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Succeeded | JobStatus::Failed)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Succeeded => "succeeded",
            JobStatus::Failed => "failed",
        };
        f.pad(s)
    }
}

/// A job that reached a terminal state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRecord {
    pub id: JobId,
    pub unit: WorkUnit,
    pub status: JobStatus,
    /// Process exit code. None if the job never started or was killed by a signal.
    pub exit_code: Option<i32>,
    /// Failure description, if any.
    pub error: Option<String>,
    /// None when the launch itself failed.
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub log_path: PathBuf,
}

impl JobRecord {
    pub fn succeeded(&self) -> bool {
        self.status == JobStatus::Succeeded
    }
}

// ---------------------------------------------------------------------------
// Run Report
// ---------------------------------------------------------------------------

/// Aggregate of every terminal job in a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    /// Terminal jobs in completion order.
    pub jobs: Vec<JobRecord>,
    pub max_jobs: usize,
    /// First launch. None for an empty run.
    pub started_at: Option<DateTime<Utc>>,
    /// Wall time from first launch to last completion.
    pub elapsed_ms: u64,
}

impl RunReport {
    pub fn succeeded(&self) -> usize {
        self.jobs.iter().filter(|j| j.succeeded()).count()
    }

    pub fn failed(&self) -> usize {
        self.jobs.len() - self.succeeded()
    }

    /// True when every job succeeded. An empty run is a success.
    pub fn success(&self) -> bool {
        self.failed() == 0
    }

    pub fn elapsed(&self) -> Duration {
        Duration::from_millis(self.elapsed_ms)
    }

    pub fn failures(&self) -> impl Iterator<Item = &JobRecord> {
        self.jobs.iter().filter(|j| !j.succeeded())
    }
}
