//! Score-ordered pending task queue.
//!
//! The queue is a Redis sorted set mapping task ids to priority scores.
//! Lower scores are served first: ZRANGE yields the minimum without
//! removing it, and removal happens separately once a task is assigned.
//! Ties within one score follow the sorted set's member ordering and are
//! not contractually ordered further.

use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use uuid::Uuid;

use super::CoordError;

/// Default Redis key for the pending task set.
pub const DEFAULT_QUEUE_KEY: &str = "task_queue";

/// Redis-backed priority queue of pending task ids.
pub struct TaskQueue {
    redis: ConnectionManager,
    key: String,
}

impl TaskQueue {
    /// Creates a queue over the default key.
    pub fn new(redis: ConnectionManager) -> Self {
        Self::with_key(redis, DEFAULT_QUEUE_KEY)
    }

    /// Creates a queue over a custom key.
    ///
    /// Useful for namespacing queues in tests or multi-tenant deployments.
    pub fn with_key(redis: ConnectionManager, key: impl Into<String>) -> Self {
        Self {
            redis,
            key: key.into(),
        }
    }

    /// Inserts a task id with the given score, or re-scores it if already
    /// present. One score per id; duplicates are not possible.
    pub async fn push(&self, task_id: Uuid, score: i64) -> Result<(), CoordError> {
        let mut conn = self.redis.clone();
        conn.zadd::<_, _, _, ()>(&self.key, task_id.to_string(), score)
            .await?;
        Ok(())
    }

    /// Returns the task id with the lowest score without removing it, or
    /// `None` if the queue is empty.
    pub async fn peek_min(&self) -> Result<Option<Uuid>, CoordError> {
        let mut conn = self.redis.clone();
        let members: Vec<String> = conn.zrange(&self.key, 0, 0).await?;

        match members.into_iter().next() {
            Some(member) => {
                let id = Uuid::parse_str(&member)
                    .map_err(|_| CoordError::MalformedMember(member))?;
                Ok(Some(id))
            }
            None => Ok(None),
        }
    }

    /// Removes a task id from the queue.
    ///
    /// Idempotent: removing an absent member is a no-op, not an error.
    pub async fn remove(&self, task_id: Uuid) -> Result<(), CoordError> {
        let mut conn = self.redis.clone();
        conn.zrem::<_, _, ()>(&self.key, task_id.to_string()).await?;
        Ok(())
    }

    /// Returns the score currently attached to a task id, or `None` if it
    /// is not queued.
    pub async fn score(&self, task_id: Uuid) -> Result<Option<i64>, CoordError> {
        let mut conn = self.redis.clone();
        let score: Option<f64> = conn.zscore(&self.key, task_id.to_string()).await?;
        Ok(score.map(|s| s as i64))
    }

    /// Returns whether a task id is currently queued.
    pub async fn contains(&self, task_id: Uuid) -> Result<bool, CoordError> {
        Ok(self.score(task_id).await?.is_some())
    }

    /// Returns the number of queued tasks.
    pub async fn len(&self) -> Result<usize, CoordError> {
        let mut conn = self.redis.clone();
        let len: usize = conn.zcard(&self.key).await?;
        Ok(len)
    }

    /// Returns whether the queue is empty.
    pub async fn is_empty(&self) -> Result<bool, CoordError> {
        Ok(self.len().await? == 0)
    }

    /// Deletes the whole queue. Used by tests for key isolation.
    pub async fn clear(&self) -> Result<(), CoordError> {
        let mut conn = self.redis.clone();
        conn.del::<_, ()>(&self.key).await?;
        Ok(())
    }

    /// Returns the Redis key backing this queue.
    pub fn key(&self) -> &str {
        &self.key
    }
}
