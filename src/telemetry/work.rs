//! Job execution span helpers.
//!
//! Provides span creation and state-transition recording for jobs flowing
//! through the pool.

use std::path::Path;

use tracing::Span;
use uuid::Uuid;

/// Start a span for one relabel job.
///
/// The `job.state` field is declared empty and can be updated via
/// [`record_state_transition`].
pub fn start_job_span(path: &Path, job_id: &Uuid) -> Span {
    tracing::info_span!(
        "relabel.job",
        "job.path" = %path.display(),
        "job.id" = %job_id,
        "job.state" = tracing::field::Empty,
    )
}

/// Record a state transition event on the given span.
///
/// Emits a tracing `info` event scoped to the span and updates `job.state`.
pub fn record_state_transition(span: &Span, from: &str, to: &str) {
    span.record("job.state", to);
    span.in_scope(|| {
        tracing::info!(from = from, to = to, "state_transition");
    });
}
