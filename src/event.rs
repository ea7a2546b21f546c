//! Structured events emitted by the job pool as jobs move through it.
//!
//! Consumers subscribe to print progress or build audit trails. Events are
//! the pool's voice; each job's log file is the relabel tool's voice.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::model::{JobId, JobStatus};

/// A structured event emitted by the pool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Monotonic sequence number. Consumers can detect gaps.
    pub seq: u64,
    /// When this event occurred.
    pub timestamp: DateTime<Utc>,
    /// What happened.
    pub kind: EventKind,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKind {
    JobLaunched {
        id: JobId,
        path: PathBuf,
        log_path: PathBuf,
        running: usize,
    },
    LaunchFailed {
        id: JobId,
        path: PathBuf,
        error: String,
    },
    JobFinished {
        id: JobId,
        path: PathBuf,
        status: JobStatus,
        exit_code: Option<i32>,
        duration_ms: u64,
    },
    /// Admission is blocked until a running job finishes.
    PoolSaturated { running: usize, waiting: usize },
}

/// Sequenced sender half of the event stream.
///
/// Sending never blocks and never fails the pool: a dropped receiver just
/// silences events.
#[derive(Debug, Default)]
pub struct EventSink {
    tx: Option<mpsc::UnboundedSender<Event>>,
    seq: AtomicU64,
}

impl EventSink {
    /// A sink that discards everything.
    pub fn disabled() -> Self {
        Self::default()
    }

    /// A sink and the receiver that observes it.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Event>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                tx: Some(tx),
                seq: AtomicU64::new(0),
            },
            rx,
        )
    }

    pub fn emit(&self, kind: EventKind) {
        let Some(tx) = &self.tx else {
            return;
        };
        let seq = self.seq.fetch_add(1, Ordering::Relaxed) + 1;
        let _ = tx.send(Event {
            seq,
            timestamp: Utc::now(),
            kind,
        });
    }
}
