//! Job pool: admission control over work unit launches.
//!
//! Units are submitted in discovery order. At most `max_jobs` relabel
//! processes run at once; each runs in its own task that waits on the child
//! process, and the control loop blocks on "any task finished" whenever the
//! pool is full. Completion order is whatever the processes give us.
//!
//! A path submitted more than once is run once: two relabels of the same
//! tree would race each other and share a log file.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use opentelemetry::KeyValue;
use tokio::task::{JoinError, JoinSet};
use tracing::{Instrument, error, info, warn};

use crate::aggregator::CompletionAggregator;
use crate::error::Error;
use crate::event::{EventKind, EventSink};
use crate::launcher::{JobLauncher, launch_failure};
use crate::model::{JobId, JobRecord, JobStatus, RunReport, WorkUnit};
use crate::telemetry::metrics;
use crate::telemetry::work::{record_state_transition, start_job_span};

/// Scheduling state shared between the control loop and job tasks.
#[derive(Debug, Clone, Default)]
pub struct PoolState {
    /// Jobs whose process is running, with their unit path.
    running: HashMap<JobId, PathBuf>,
    statuses: HashMap<JobId, JobStatus>,
    launched: usize,
    completed: usize,
    peak_running: usize,
    /// Unit paths in the order their jobs reached a terminal state.
    completed_log: Vec<PathBuf>,
}

impl PoolState {
    pub fn running(&self) -> usize {
        self.running.len()
    }

    pub fn is_running(&self, path: &Path) -> bool {
        self.running.values().any(|p| p == path)
    }

    /// Processes started.
    pub fn launched(&self) -> usize {
        self.launched
    }

    /// Jobs in a terminal state, launch failures included.
    pub fn completed(&self) -> usize {
        self.completed
    }

    /// Highest number of simultaneously running jobs seen.
    pub fn peak_running(&self) -> usize {
        self.peak_running
    }

    pub fn completed_log(&self) -> &[PathBuf] {
        &self.completed_log
    }

    pub fn status(&self, id: JobId) -> Option<JobStatus> {
        self.statuses.get(&id).copied()
    }

    fn transition(&mut self, id: JobId, to: JobStatus) -> bool {
        let from = self.statuses.get(&id).copied().unwrap_or(JobStatus::Pending);
        if !from.can_transition_to(to) {
            warn!(job_id = %id, %from, %to, "rejected job state transition");
            return false;
        }
        self.statuses.insert(id, to);
        true
    }

    fn admit(&mut self, id: JobId, path: PathBuf) -> usize {
        if self.transition(id, JobStatus::Running) {
            self.running.insert(id, path);
            self.launched += 1;
            self.peak_running = self.peak_running.max(self.running.len());
        }
        self.running.len()
    }

    fn finish(&mut self, id: JobId, path: PathBuf, status: JobStatus) {
        if self.transition(id, status) {
            self.running.remove(&id);
            self.completed += 1;
            self.completed_log.push(path);
        }
    }
}

/// Runs one job per work unit with at most `max_jobs` running at once.
pub struct JobPool {
    launcher: JobLauncher,
    max_jobs: usize,
    state: Arc<Mutex<PoolState>>,
    events: Arc<EventSink>,
}

impl JobPool {
    /// `max_jobs` is floored at 1.
    pub fn new(launcher: JobLauncher, max_jobs: usize) -> Self {
        Self {
            launcher,
            max_jobs: max_jobs.max(1),
            state: Arc::new(Mutex::new(PoolState::default())),
            events: Arc::new(EventSink::disabled()),
        }
    }

    /// Emit pool events to `events`.
    pub fn with_events(mut self, events: EventSink) -> Self {
        self.events = Arc::new(events);
        self
    }

    pub fn max_jobs(&self) -> usize {
        self.max_jobs
    }

    /// A copy of the current scheduling state.
    pub fn snapshot(&self) -> PoolState {
        lock(&self.state).clone()
    }

    /// Run every unit to a terminal state and report.
    ///
    /// Never aborts early: launch errors, non-zero exits, and crashed job
    /// tasks are recorded against their unit and admission continues.
    /// Repeated paths are dropped after their first occurrence.
    pub async fn run(&self, units: Vec<WorkUnit>) -> RunReport {
        let units = distinct_units(units);
        let total = units.len();
        info!(units = total, max_jobs = self.max_jobs, "job pool starting");

        let mut tasks: JoinSet<JobRecord> = JoinSet::new();
        let mut in_flight: HashMap<tokio::task::Id, (JobId, WorkUnit)> = HashMap::new();
        let mut aggregator = CompletionAggregator::new(self.max_jobs);

        for (submitted, unit) in units.into_iter().enumerate() {
            if tasks.len() >= self.max_jobs {
                self.events.emit(EventKind::PoolSaturated {
                    running: tasks.len(),
                    waiting: total - submitted,
                });
                metrics::pool_saturated().add(1, &[]);
            }
            // Wait for any job to finish before taking another slot.
            while tasks.len() >= self.max_jobs {
                if let Some(result) = tasks.join_next_with_id().await {
                    self.reap(result, &mut in_flight, &mut aggregator);
                }
            }

            let id = JobId::new();
            aggregator.mark_launched();
            if let Some(task_id) = self.start(id, &unit, &mut tasks, &mut aggregator) {
                in_flight.insert(task_id, (id, unit));
            }

            while let Some(result) = tasks.try_join_next_with_id() {
                self.reap(result, &mut in_flight, &mut aggregator);
            }
        }

        while let Some(result) = tasks.join_next_with_id().await {
            self.reap(result, &mut in_flight, &mut aggregator);
        }

        let report = aggregator.finish();
        info!(
            jobs = report.jobs.len(),
            succeeded = report.succeeded(),
            failed = report.failed(),
            elapsed_ms = report.elapsed_ms,
            "job pool drained"
        );
        report
    }

    /// Launch one job. Returns its task id, or None if the launch failed
    /// (the failure is already recorded).
    fn start(
        &self,
        id: JobId,
        unit: &WorkUnit,
        tasks: &mut JoinSet<JobRecord>,
        aggregator: &mut CompletionAggregator,
    ) -> Option<tokio::task::Id> {
        let span = start_job_span(&unit.path, &id.0);

        let job = match span.in_scope(|| self.launcher.launch(id, unit)) {
            Ok(job) => job,
            Err(e) => {
                record_state_transition(&span, "pending", "failed");
                span.in_scope(|| error!(error = %e, "job failed to launch"));
                lock(&self.state).finish(id, unit.path.clone(), JobStatus::Failed);
                self.events.emit(EventKind::LaunchFailed {
                    id,
                    path: unit.path.clone(),
                    error: e.to_string(),
                });
                let record = launch_failure(id, unit, self.launcher.log_dir(), &e);
                self.complete(record, aggregator);
                return None;
            }
        };

        record_state_transition(&span, "pending", "running");
        let running = lock(&self.state).admit(id, unit.path.clone());
        metrics::jobs_launched().add(1, &[]);
        self.events.emit(EventKind::JobLaunched {
            id,
            path: unit.path.clone(),
            log_path: job.log_path.clone(),
            running,
        });

        let state = Arc::clone(&self.state);
        let events = Arc::clone(&self.events);
        let task_span = span.clone();
        let handle = tasks.spawn(
            async move {
                let record = job.wait().await;
                record_state_transition(&task_span, "running", &record.status.to_string());
                lock(&state).finish(record.id, record.unit.path.clone(), record.status);
                events.emit(EventKind::JobFinished {
                    id: record.id,
                    path: record.unit.path.clone(),
                    status: record.status,
                    exit_code: record.exit_code,
                    duration_ms: record.duration_ms,
                });
                record
            }
            .instrument(span),
        );
        Some(handle.id())
    }

    fn reap(
        &self,
        result: Result<(tokio::task::Id, JobRecord), JoinError>,
        in_flight: &mut HashMap<tokio::task::Id, (JobId, WorkUnit)>,
        aggregator: &mut CompletionAggregator,
    ) {
        let record = match result {
            Ok((task_id, record)) => {
                in_flight.remove(&task_id);
                record
            }
            Err(join_err) => {
                let Some((id, unit)) = in_flight.remove(&join_err.id()) else {
                    error!(error = %join_err, "unknown job task ended abnormally");
                    return;
                };
                error!(job_id = %id, path = %unit.path.display(), error = %join_err, "job task crashed");
                lock(&self.state).finish(id, unit.path.clone(), JobStatus::Failed);
                let e = Error::Other(format!("job task crashed: {join_err}"));
                let record = launch_failure(id, &unit, self.launcher.log_dir(), &e);
                self.events.emit(EventKind::JobFinished {
                    id,
                    path: unit.path,
                    status: JobStatus::Failed,
                    exit_code: None,
                    duration_ms: 0,
                });
                record
            }
        };
        self.complete(record, aggregator);
    }

    fn complete(&self, record: JobRecord, aggregator: &mut CompletionAggregator) {
        let status = record.status.to_string();
        let labels = [KeyValue::new("status", status)];
        metrics::jobs_completed().add(1, &labels);
        metrics::job_duration_ms().record(record.duration_ms as f64, &labels);

        if let Err(e) = aggregator.record(record) {
            error!(error = %e, "dropping duplicate job completion");
        }
    }
}

/// Keep the first unit for each path, in submission order.
fn distinct_units(units: Vec<WorkUnit>) -> Vec<WorkUnit> {
    let mut seen = HashSet::new();
    units
        .into_iter()
        .filter(|unit| {
            let first = seen.insert(unit.path.clone());
            if !first {
                warn!(path = %unit.path.display(), "skipping repeated work unit");
            }
            first
        })
        .collect()
}

fn lock(state: &Mutex<PoolState>) -> MutexGuard<'_, PoolState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
