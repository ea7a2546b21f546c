//! Pool sizing from host CPU capacity.

use tracing::{debug, warn};

use crate::error::{Error, Result};

/// Cores left free for the rest of the system by default.
pub const DEFAULT_RESERVED_CORES: usize = 2;

/// Maximum concurrent jobs for `total_cores` with `reserved_cores` held back.
///
/// Never less than 1.
pub fn max_jobs(total_cores: usize, reserved_cores: usize) -> usize {
    total_cores.saturating_sub(reserved_cores).max(1)
}

/// The concurrency budget for one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceBudget {
    pub total_cores: usize,
    pub reserved_cores: usize,
    pub max_jobs: usize,
}

impl ResourceBudget {
    /// Compute the budget from a core-count query.
    ///
    /// A failed query, or one reporting zero cores, falls back to a single
    /// core. It never aborts the run.
    pub fn from_query<F>(query: F, reserved_cores: usize) -> Self
    where
        F: FnOnce() -> Result<usize>,
    {
        let total_cores = match query() {
            Ok(0) => {
                warn!("host reported zero cpus, assuming 1");
                1
            }
            Ok(n) => n,
            Err(e) => {
                warn!(error = %e, "cpu count query failed, assuming 1");
                1
            }
        };
        let budget = Self {
            total_cores,
            reserved_cores,
            max_jobs: max_jobs(total_cores, reserved_cores),
        };
        debug!(
            total_cores,
            reserved_cores,
            max_jobs = budget.max_jobs,
            "resource budget computed"
        );
        budget
    }

    /// Budget for this host.
    pub fn detect(reserved_cores: usize) -> Self {
        Self::from_query(host_cpu_count, reserved_cores)
    }

    /// Replace the computed limit. Still floored at 1.
    pub fn with_override(mut self, max_jobs: Option<usize>) -> Self {
        if let Some(n) = max_jobs {
            self.max_jobs = n.max(1);
        }
        self
    }
}

/// Logical CPUs available to this process.
pub fn host_cpu_count() -> Result<usize> {
    match num_cpus::get() {
        0 => Err(Error::ResourceQuery("no cpus reported".to_string())),
        n => Ok(n),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reserves_cores_with_floor_of_one() {
        assert_eq!(max_jobs(8, 2), 6);
        assert_eq!(max_jobs(1, 2), 1);
        assert_eq!(max_jobs(2, 2), 1);
        assert_eq!(max_jobs(3, 2), 1);
        assert_eq!(max_jobs(4, 0), 4);
    }

    #[test]
    fn failed_query_falls_back_to_one() {
        let budget = ResourceBudget::from_query(
            || Err(Error::ResourceQuery("unavailable".to_string())),
            DEFAULT_RESERVED_CORES,
        );
        assert_eq!(budget.total_cores, 1);
        assert_eq!(budget.max_jobs, 1);
    }

    #[test]
    fn zero_cores_falls_back_to_one() {
        let budget = ResourceBudget::from_query(|| Ok(0), 0);
        assert_eq!(budget.max_jobs, 1);
    }

    #[test]
    fn override_replaces_computed_limit() {
        let budget = ResourceBudget::from_query(|| Ok(16), 2).with_override(Some(3));
        assert_eq!(budget.max_jobs, 3);
        let budget = ResourceBudget::from_query(|| Ok(16), 2).with_override(Some(0));
        assert_eq!(budget.max_jobs, 1);
    }

    #[test]
    fn detect_never_returns_zero() {
        assert!(ResourceBudget::detect(DEFAULT_RESERVED_CORES).max_jobs >= 1);
    }
}
