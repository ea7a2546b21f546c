//! Error types for relabel-rs.

use std::path::PathBuf;

use thiserror::Error;

use crate::model::JobId;

#[derive(Debug, Error)]
pub enum Error {
    /// The mount table could not be read. Fatal: no partition exists.
    #[error("cannot read mount table {path}: {source}")]
    Discovery {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A job could not be started. Recorded against that job only.
    #[error("failed to launch relabel for {path}: {reason}")]
    Launch { path: PathBuf, reason: String },

    #[error("relabel of {path} exited with status {code}")]
    JobFailed { path: PathBuf, code: i32 },

    #[error("cpu count unavailable: {0}")]
    ResourceQuery(String),

    #[error("job {id} for {path} already reached a terminal state")]
    DuplicateCompletion { id: JobId, path: PathBuf },

    #[error("preflight check failed: {0}")]
    Preflight(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;
