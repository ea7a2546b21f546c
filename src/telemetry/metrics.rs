//! Metric instrument factories for relabel-rs.
//!
//! Uses the OTel Meter API with the globally-registered `MeterProvider`.
//! All instruments are created lazily from the `"relabel-rs"` meter; without
//! an OTLP endpoint they are no-ops.

use opentelemetry::metrics::{Counter, Histogram, Meter};

fn meter() -> Meter {
    opentelemetry::global::meter("relabel-rs")
}

/// Counter: relabel processes started.
pub fn jobs_launched() -> Counter<u64> {
    meter()
        .u64_counter("relabel.jobs.launched")
        .with_description("Number of relabel processes started")
        .build()
}

/// Counter: jobs reaching a terminal state.
/// Labels: `status` ("succeeded" | "failed").
pub fn jobs_completed() -> Counter<u64> {
    meter()
        .u64_counter("relabel.jobs.completed")
        .with_description("Number of jobs that reached a terminal state")
        .build()
}

/// Histogram: job duration in milliseconds.
/// Labels: `status`.
pub fn job_duration_ms() -> Histogram<f64> {
    meter()
        .f64_histogram("relabel.job.duration_ms")
        .with_description("Relabel job duration in milliseconds")
        .with_unit("ms")
        .build()
}

/// Counter: admissions that had to wait for a free slot.
pub fn pool_saturated() -> Counter<u64> {
    meter()
        .u64_counter("relabel.pool.saturated")
        .with_description("Number of times admission blocked on a full pool")
        .build()
}
