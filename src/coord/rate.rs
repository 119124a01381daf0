//! Fixed-window per-proxy rate limiter.
//!
//! Each proxy gets a counter keyed `rate:{proxy_id}`. A request increments
//! the counter and refreshes its expiry; the request is allowed iff the
//! post-increment count is within the ceiling. A count exactly at the
//! ceiling is still allowed.
//!
//! This is a fixed-window counter, not a sliding window: bursts straddling
//! a window boundary can momentarily exceed the intended rate. Documented
//! limitation, left as-is.

use std::time::Duration;

use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use uuid::Uuid;

use super::CoordError;

/// Default key prefix for per-proxy counters.
pub const DEFAULT_RATE_PREFIX: &str = "rate";

/// Redis-backed fixed-window request counter with a per-proxy ceiling.
pub struct RateLimiter {
    redis: ConnectionManager,
    prefix: String,
    ceiling: u32,
    window: Duration,
}

impl RateLimiter {
    /// Creates a limiter with the given ceiling and window over the
    /// default key prefix.
    pub fn new(redis: ConnectionManager, ceiling: u32, window: Duration) -> Self {
        Self::with_prefix(redis, DEFAULT_RATE_PREFIX, ceiling, window)
    }

    /// Creates a limiter over a custom key prefix.
    pub fn with_prefix(
        redis: ConnectionManager,
        prefix: impl Into<String>,
        ceiling: u32,
        window: Duration,
    ) -> Self {
        Self {
            redis,
            prefix: prefix.into(),
            ceiling,
            window,
        }
    }

    /// Counts a request against the proxy and returns whether it is
    /// within budget.
    ///
    /// The counter is incremented before the check, so a rejected request
    /// still consumes nothing further; the window expiry is refreshed on
    /// every increment.
    pub async fn can_make_request(&self, proxy_id: Uuid) -> Result<bool, CoordError> {
        let mut conn = self.redis.clone();
        let key = self.counter_key(proxy_id);

        let count: u32 = conn.incr(&key, 1).await?;
        conn.expire::<_, ()>(&key, self.window.as_secs() as i64)
            .await?;

        Ok(count <= self.ceiling)
    }

    /// Returns the current window's request count for a proxy.
    pub async fn request_count(&self, proxy_id: Uuid) -> Result<u32, CoordError> {
        let mut conn = self.redis.clone();
        let count: Option<u32> = conn.get(self.counter_key(proxy_id)).await?;
        Ok(count.unwrap_or(0))
    }

    /// Drops the counter for a proxy. Used by tests for key isolation.
    pub async fn reset(&self, proxy_id: Uuid) -> Result<(), CoordError> {
        let mut conn = self.redis.clone();
        conn.del::<_, ()>(self.counter_key(proxy_id)).await?;
        Ok(())
    }

    /// Returns the configured ceiling.
    pub fn ceiling(&self) -> u32 {
        self.ceiling
    }

    /// Returns the configured window.
    pub fn window(&self) -> Duration {
        self.window
    }

    fn counter_key(&self, proxy_id: Uuid) -> String {
        format!("{}:{}", self.prefix, proxy_id)
    }
}
