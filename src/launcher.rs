//! Job launch: one boundary-confined relabel process per work unit.

use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use tokio::process::{Child, Command};
use tracing::debug;

use crate::error::{Error, Result};
use crate::model::{JobId, JobRecord, JobStatus, WorkUnit};

/// The external relabel command.
///
/// Invoked as `<program> <args…> <one_filesystem_flag> <path>`. The
/// one-filesystem flag is always passed: it keeps a parent mount's job out
/// of every nested mount, which is what makes work units independent.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RelabelCommand {
    pub program: PathBuf,
    #[serde(default = "default_args")]
    pub args: Vec<String>,
    #[serde(default = "default_one_filesystem_flag")]
    pub one_filesystem_flag: String,
}

fn default_args() -> Vec<String> {
    vec!["-R".to_string(), "-v".to_string()]
}

fn default_one_filesystem_flag() -> String {
    "-x".to_string()
}

impl Default for RelabelCommand {
    fn default() -> Self {
        Self {
            program: PathBuf::from("restorecon"),
            args: default_args(),
            one_filesystem_flag: default_one_filesystem_flag(),
        }
    }
}

/// Starts relabel processes with output captured per work unit.
#[derive(Debug, Clone)]
pub struct JobLauncher {
    command: RelabelCommand,
    log_dir: PathBuf,
}

impl JobLauncher {
    pub fn new(command: RelabelCommand, log_dir: impl Into<PathBuf>) -> Self {
        Self {
            command,
            log_dir: log_dir.into(),
        }
    }

    pub fn log_dir(&self) -> &Path {
        &self.log_dir
    }

    /// Start the relabel process for `unit`. Does not wait for it.
    ///
    /// The unit's log file is created fresh (truncated if it exists) and
    /// receives both stdout and stderr. Dropping the returned job kills the
    /// process.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Launch`] if the log file cannot be created or the
    /// process cannot be spawned.
    pub fn launch(&self, id: JobId, unit: &WorkUnit) -> Result<RunningJob> {
        let log_path = unit.log_path(&self.log_dir);
        let launch_err = |reason: String| Error::Launch {
            path: unit.path.clone(),
            reason,
        };

        let stdout = std::fs::File::create(&log_path)
            .map_err(|e| launch_err(format!("create log {}: {e}", log_path.display())))?;
        let stderr = stdout
            .try_clone()
            .map_err(|e| launch_err(format!("clone log handle: {e}")))?;

        let child = Command::new(&self.command.program)
            .args(&self.command.args)
            .arg(&self.command.one_filesystem_flag)
            .arg(&unit.path)
            .stdin(Stdio::null())
            .stdout(Stdio::from(stdout))
            .stderr(Stdio::from(stderr))
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                launch_err(format!(
                    "spawn {}: {e}",
                    self.command.program.display()
                ))
            })?;

        debug!(
            job_id = %id,
            path = %unit.path.display(),
            pid = child.id(),
            log = %log_path.display(),
            "relabel process started"
        );

        Ok(RunningJob {
            id,
            unit: unit.clone(),
            child,
            started_at: Utc::now(),
            started: Instant::now(),
            log_path,
        })
    }
}

/// A job whose process is running.
#[derive(Debug)]
pub struct RunningJob {
    pub id: JobId,
    pub unit: WorkUnit,
    child: Child,
    pub started_at: DateTime<Utc>,
    started: Instant,
    pub log_path: PathBuf,
}

impl RunningJob {
    /// OS process id, until the process has been reaped.
    pub fn pid(&self) -> Option<u32> {
        self.child.id()
    }

    /// Wait for the process to exit and produce the terminal record.
    pub async fn wait(mut self) -> JobRecord {
        let result = self.child.wait().await;
        let duration_ms = u64::try_from(self.started.elapsed().as_millis()).unwrap_or(u64::MAX);
        let (status, exit_code, error) = match result {
            Ok(exit) => classify_exit(&self.unit, exit),
            Err(e) => (
                JobStatus::Failed,
                None,
                Some(format!("wait for relabel process: {e}")),
            ),
        };
        JobRecord {
            id: self.id,
            unit: self.unit,
            status,
            exit_code,
            error,
            started_at: Some(self.started_at),
            ended_at: Utc::now(),
            duration_ms,
            log_path: self.log_path,
        }
    }
}

fn classify_exit(unit: &WorkUnit, exit: ExitStatus) -> (JobStatus, Option<i32>, Option<String>) {
    use std::os::unix::process::ExitStatusExt;

    match exit.code() {
        Some(0) => (JobStatus::Succeeded, Some(0), None),
        Some(code) => (
            JobStatus::Failed,
            Some(code),
            Some(
                Error::JobFailed {
                    path: unit.path.clone(),
                    code,
                }
                .to_string(),
            ),
        ),
        None => (
            JobStatus::Failed,
            None,
            Some(format!(
                "relabel of {} terminated by signal {}",
                unit.path.display(),
                exit.signal().unwrap_or(-1)
            )),
        ),
    }
}

/// Record for a job that never started.
pub fn launch_failure(id: JobId, unit: &WorkUnit, log_dir: &Path, error: &Error) -> JobRecord {
    JobRecord {
        id,
        unit: unit.clone(),
        status: JobStatus::Failed,
        exit_code: None,
        error: Some(error.to_string()),
        started_at: None,
        ended_at: Utc::now(),
        duration_ms: 0,
        log_path: unit.log_path(log_dir),
    }
}
