//! # relabel-rs
//!
//! Parallel SELinux relabeling for hosts with several mounted filesystems.
//!
//! Discovers one work unit per mount point of a recognized filesystem type,
//! sizes a job pool from the host CPU count, and runs one boundary-confined
//! relabel process per mount with bounded concurrency. Each job writes to its
//! own log file; the run report aggregates every job's terminal status.

pub mod aggregator;
pub mod budget;
pub mod config;
pub mod error;
pub mod event;
pub mod launcher;
pub mod model;
pub mod mounts;
pub mod preflight;
pub mod scheduler;
pub mod telemetry;
