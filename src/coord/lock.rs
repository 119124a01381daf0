//! Short-TTL distributed mutual exclusion.
//!
//! Acquisition is an atomic set-if-absent with expiry (SET NX EX), so a
//! holder that crashes without releasing self-heals once the TTL elapses.
//! Used by the scheduler with key `task:{id}:lock` and a TTL equal to the
//! configured proxy timeout.

use std::time::Duration;

use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use uuid::Uuid;

use super::CoordError;

/// Redis-backed set-if-absent lock with automatic expiry.
pub struct AssignmentLock {
    redis: ConnectionManager,
}

impl AssignmentLock {
    /// Creates a lock handle over the shared connection.
    pub fn new(redis: ConnectionManager) -> Self {
        Self { redis }
    }

    /// Returns the lock key for a task id.
    pub fn task_key(task_id: Uuid) -> String {
        format!("task:{}:lock", task_id)
    }

    /// Attempts to acquire the key for `ttl`.
    ///
    /// Returns `true` iff this caller now exclusively holds the key;
    /// `false` if another holder already does. TTLs under one second are
    /// rounded up so the lock cannot be created pre-expired.
    pub async fn acquire(&self, key: &str, ttl: Duration) -> Result<bool, CoordError> {
        let mut conn = self.redis.clone();
        let ttl_secs = ttl.as_secs().max(1);

        // SET key 1 NX EX ttl: nil reply means the key was already held.
        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg("1")
            .arg("NX")
            .arg("EX")
            .arg(ttl_secs)
            .query_async(&mut conn)
            .await?;

        Ok(reply.is_some())
    }

    /// Releases the key.
    ///
    /// Releasing an expired or never-acquired key is a no-op.
    pub async fn release(&self, key: &str) -> Result<(), CoordError> {
        let mut conn = self.redis.clone();
        conn.del::<_, ()>(key).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_key_shape() {
        let id = Uuid::nil();
        assert_eq!(
            AssignmentLock::task_key(id),
            "task:00000000-0000-0000-0000-000000000000:lock"
        );
    }
}
