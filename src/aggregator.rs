//! Completion aggregation: terminal job records in, run report out.

use std::collections::HashSet;
use std::time::Instant;

use chrono::{DateTime, Utc};

use crate::error::{Error, Result};
use crate::model::{JobId, JobRecord, RunReport};

/// Collects every terminal job of a run exactly once.
#[derive(Debug)]
pub struct CompletionAggregator {
    max_jobs: usize,
    jobs: Vec<JobRecord>,
    seen: HashSet<JobId>,
    first_launch: Option<(Instant, DateTime<Utc>)>,
    last_completion: Option<Instant>,
}

impl CompletionAggregator {
    pub fn new(max_jobs: usize) -> Self {
        Self {
            max_jobs,
            jobs: Vec::new(),
            seen: HashSet::new(),
            first_launch: None,
            last_completion: None,
        }
    }

    /// Note a launch attempt. Only the first one starts the clock.
    pub fn mark_launched(&mut self) {
        if self.first_launch.is_none() {
            self.first_launch = Some((Instant::now(), Utc::now()));
        }
    }

    /// Record a terminal job.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DuplicateCompletion`] if this job already has a
    /// record. The duplicate is dropped, not counted.
    pub fn record(&mut self, record: JobRecord) -> Result<()> {
        debug_assert!(record.status.is_terminal());
        if !self.seen.insert(record.id) {
            return Err(Error::DuplicateCompletion {
                id: record.id,
                path: record.unit.path,
            });
        }
        self.last_completion = Some(Instant::now());
        self.jobs.push(record);
        Ok(())
    }

    /// Number of terminal jobs recorded so far.
    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    pub fn finish(self) -> RunReport {
        let elapsed_ms = match (self.first_launch, self.last_completion) {
            (Some((start, _)), Some(end)) => {
                u64::try_from(end.saturating_duration_since(start).as_millis()).unwrap_or(u64::MAX)
            }
            _ => 0,
        };
        RunReport {
            jobs: self.jobs,
            max_jobs: self.max_jobs,
            started_at: self.first_launch.map(|(_, at)| at),
            elapsed_ms,
        }
    }
}
