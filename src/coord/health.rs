//! Ephemeral proxy liveness registry.
//!
//! A Redis hash mapping proxy id to a health flag. The durable `active`
//! flag on the proxy record is the secondary source of truth and may
//! briefly disagree with this registry after a partial health update.
//! An absent entry means unknown, and unknown proxies are not eligible.

use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use uuid::Uuid;

use super::CoordError;

/// Default Redis key for the proxy health hash.
pub const DEFAULT_HEALTH_KEY: &str = "proxy_health";

/// Redis-backed map of proxy id to liveness flag.
pub struct ProxyHealthRegistry {
    redis: ConnectionManager,
    key: String,
}

impl ProxyHealthRegistry {
    /// Creates a registry over the default key.
    pub fn new(redis: ConnectionManager) -> Self {
        Self::with_key(redis, DEFAULT_HEALTH_KEY)
    }

    /// Creates a registry over a custom key.
    pub fn with_key(redis: ConnectionManager, key: impl Into<String>) -> Self {
        Self {
            redis,
            key: key.into(),
        }
    }

    /// Records the liveness flag for a proxy.
    pub async fn set_healthy(&self, proxy_id: Uuid, healthy: bool) -> Result<(), CoordError> {
        let mut conn = self.redis.clone();
        let flag = if healthy { "1" } else { "0" };
        conn.hset::<_, _, _, ()>(&self.key, proxy_id.to_string(), flag)
            .await?;
        Ok(())
    }

    /// Returns whether a proxy is known healthy.
    ///
    /// Absent entries default to `false`: a proxy of unknown health is not
    /// eligible for selection.
    pub async fn is_healthy(&self, proxy_id: Uuid) -> Result<bool, CoordError> {
        let mut conn = self.redis.clone();
        let flag: Option<String> = conn.hget(&self.key, proxy_id.to_string()).await?;
        Ok(flag.as_deref() == Some("1"))
    }

    /// Deletes the whole registry. Used by tests for key isolation.
    pub async fn clear(&self) -> Result<(), CoordError> {
        let mut conn = self.redis.clone();
        conn.del::<_, ()>(&self.key).await?;
        Ok(())
    }

    /// Returns the Redis key backing this registry.
    pub fn key(&self) -> &str {
        &self.key
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_health_key() {
        assert_eq!(DEFAULT_HEALTH_KEY, "proxy_health");
    }
}
