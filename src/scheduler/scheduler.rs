//! Lock-guarded task assignment.
//!
//! Concurrent scheduler instances share the queue, the rate counters and
//! the lock through Redis. The assignment lock guarantees two concurrent
//! `assign` calls for the same task cannot both complete the status
//! transition; it does not make peek → proxy pick → rate check → assign
//! atomic as a whole, so two instances can still race up to the assign
//! step. The loser observes `AssignmentConflict` and retries on its next
//! scheduling pass.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};
use uuid::Uuid;

use crate::coord::{AssignmentLock, RateLimiter, TaskQueue};
use crate::error::DistributionError;
use crate::storage::{RecordStore, StoreError};
use crate::task::Task;

/// Pops and safely assigns pending tasks to proxies.
pub struct TaskScheduler {
    queue: Arc<TaskQueue>,
    rate: RateLimiter,
    lock: AssignmentLock,
    store: Arc<dyn RecordStore>,
    lock_ttl: Duration,
}

impl TaskScheduler {
    /// Creates a scheduler over the shared coordination primitives and
    /// record store.
    pub fn new(
        queue: Arc<TaskQueue>,
        rate: RateLimiter,
        lock: AssignmentLock,
        store: Arc<dyn RecordStore>,
        lock_ttl: Duration,
    ) -> Self {
        Self {
            queue,
            rate,
            lock,
            store,
            lock_ttl,
        }
    }

    /// Returns the lowest-score pending task with its full record, or
    /// `None` if the queue is empty.
    ///
    /// The id alone is not actionable, so the record is loaded eagerly; a
    /// queue entry whose record has vanished surfaces as `TaskNotFound`.
    pub async fn next_task(&self) -> Result<Option<Task>, DistributionError> {
        let Some(task_id) = self.queue.peek_min().await? else {
            return Ok(None);
        };

        let task = self
            .store
            .task(task_id)
            .await?
            .ok_or(DistributionError::TaskNotFound(task_id))?;

        Ok(Some(task))
    }

    /// Counts a request against the proxy's rate budget and returns
    /// whether it is still within bounds.
    pub async fn proxy_within_budget(&self, proxy_id: Uuid) -> Result<bool, DistributionError> {
        Ok(self.rate.can_make_request(proxy_id).await?)
    }

    /// Assigns a task to a proxy under the per-task lock.
    ///
    /// Fails with `AssignmentConflict` and mutates nothing if another
    /// scheduler holds the lock. On success the task is marked in-progress
    /// on the proxy and removed from the queue. The lock is released on
    /// every exit path; a failed release is logged and left to expire on
    /// its own rather than masking the primary outcome.
    pub async fn assign(&self, task_id: Uuid, proxy_id: Uuid) -> Result<Task, DistributionError> {
        let key = AssignmentLock::task_key(task_id);

        if !self.lock.acquire(&key, self.lock_ttl).await? {
            return Err(DistributionError::AssignmentConflict(task_id));
        }

        let outcome = self.assign_locked(task_id, proxy_id).await;

        if let Err(e) = self.lock.release(&key).await {
            warn!(
                task_id = %task_id,
                error = %e,
                "Failed to release assignment lock; it will expire after its TTL"
            );
        }

        outcome
    }

    async fn assign_locked(
        &self,
        task_id: Uuid,
        proxy_id: Uuid,
    ) -> Result<Task, DistributionError> {
        let task = match self.store.mark_in_progress(task_id, proxy_id).await {
            Ok(task) => task,
            Err(StoreError::NotFound(id)) => return Err(DistributionError::TaskNotFound(id)),
            Err(e) => return Err(e.into()),
        };

        self.queue.remove(task_id).await?;

        info!(task_id = %task_id, proxy_id = %proxy_id, "Task assigned");
        Ok(task)
    }

    /// Returns the shared task queue.
    pub fn queue(&self) -> &Arc<TaskQueue> {
        &self.queue
    }
}
