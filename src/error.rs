//! Error types for task distribution.
//!
//! Every error here is a per-task outcome, never process-fatal: a failed
//! fetch marks the task failed and may schedule a retry, an assignment
//! conflict aborts one scheduling attempt, and infrastructure errors
//! bubble to the caller of the operation that hit them.

use thiserror::Error;
use uuid::Uuid;

use crate::coord::CoordError;
use crate::distribution::fetch::FetchError;
use crate::storage::StoreError;

/// Errors produced by the distribution core.
#[derive(Debug, Error)]
pub enum DistributionError {
    /// The target URL was missing or blank.
    #[error("Target URL must not be empty")]
    InvalidTargetUrl,

    /// The proxy address was missing or blank.
    #[error("Proxy address must not be empty")]
    InvalidProxyAddress,

    /// No task record exists for the given id.
    #[error("Task not found: {0}")]
    TaskNotFound(Uuid),

    /// The task owner has no active proxy endpoint.
    #[error("No active proxy for user {0}")]
    NoActiveProxyForUser(Uuid),

    /// No healthy, active proxy is available for execution.
    #[error("No available proxy")]
    NoProxyAvailable,

    /// The proxy's request budget for the current window is exhausted.
    #[error("Rate limit exceeded for proxy {0}")]
    RateLimited(Uuid),

    /// Another scheduler instance holds the assignment lock for the task.
    #[error("Task {0} is already being assigned")]
    AssignmentConflict(Uuid),

    /// The outbound fetch failed: network error, timeout, or non-2xx.
    #[error("Upstream fetch failed: {0}")]
    UpstreamFetch(#[from] FetchError),

    /// Coordination store (Redis) failure.
    #[error("Coordination store error: {0}")]
    Coord(#[from] CoordError),

    /// Durable record store failure.
    #[error("Record store error: {0}")]
    Store(#[from] StoreError),
}

impl DistributionError {
    /// Returns whether this error is an expected "nothing to do right now"
    /// outcome of a scheduling pass rather than a failure.
    pub fn is_idle_outcome(&self) -> bool {
        matches!(
            self,
            DistributionError::NoProxyAvailable | DistributionError::RateLimited(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let id = Uuid::nil();

        assert!(DistributionError::InvalidTargetUrl
            .to_string()
            .contains("must not be empty"));
        assert!(DistributionError::TaskNotFound(id)
            .to_string()
            .contains("not found"));
        assert!(DistributionError::NoActiveProxyForUser(id)
            .to_string()
            .contains("No active proxy"));
        assert!(DistributionError::RateLimited(id)
            .to_string()
            .contains("Rate limit"));
        assert!(DistributionError::AssignmentConflict(id)
            .to_string()
            .contains("already being assigned"));
    }

    #[test]
    fn test_idle_outcomes() {
        assert!(DistributionError::NoProxyAvailable.is_idle_outcome());
        assert!(DistributionError::RateLimited(Uuid::nil()).is_idle_outcome());
        assert!(!DistributionError::InvalidTargetUrl.is_idle_outcome());
        assert!(!DistributionError::AssignmentConflict(Uuid::nil()).is_idle_outcome());
    }
}
