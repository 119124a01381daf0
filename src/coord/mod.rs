//! Shared coordination store primitives backed by Redis.
//!
//! Any number of scheduler/service instances may run against one Redis
//! instance; it is the only synchronization authority between them. This
//! module provides the four primitives the distribution core coordinates
//! through:
//!
//! - `TaskQueue`: score-ordered set of pending task ids
//! - `ProxyHealthRegistry`: ephemeral per-proxy liveness map
//! - `RateLimiter`: fixed-window per-proxy request counter
//! - `AssignmentLock`: short-TTL mutual exclusion keyed by task id
//!
//! All four share one `ConnectionManager` created at startup and injected
//! into each constructor; connections are never built per call.

pub mod health;
pub mod lock;
pub mod queue;
pub mod rate;

pub use health::ProxyHealthRegistry;
pub use lock::AssignmentLock;
pub use queue::TaskQueue;
pub use rate::RateLimiter;

use redis::aio::ConnectionManager;
use thiserror::Error;

/// Errors that can occur during coordination store operations.
#[derive(Debug, Error)]
pub enum CoordError {
    /// Failed to connect to Redis.
    #[error("Redis connection failed: {0}")]
    ConnectionFailed(String),

    /// Redis operation failed.
    #[error("Redis operation failed: {0}")]
    Redis(#[from] redis::RedisError),

    /// A queue member could not be parsed as a task id.
    #[error("Malformed queue member: {0}")]
    MalformedMember(String),
}

/// Connects to Redis and returns a shared connection manager.
///
/// The manager handles reconnection automatically and is cheap to clone;
/// create it once at startup and hand clones to each primitive.
///
/// # Errors
///
/// Returns `CoordError::ConnectionFailed` if the connection fails.
pub async fn connect(redis_url: &str) -> Result<ConnectionManager, CoordError> {
    let client = redis::Client::open(redis_url)
        .map_err(|e| CoordError::ConnectionFailed(e.to_string()))?;

    ConnectionManager::new(client)
        .await
        .map_err(|e| CoordError::ConnectionFailed(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coord_error_display() {
        let err = CoordError::ConnectionFailed("refused".to_string());
        assert!(err.to_string().contains("refused"));

        let err = CoordError::MalformedMember("not-a-uuid".to_string());
        assert!(err.to_string().contains("not-a-uuid"));
    }
}
