//! Task distribution orchestration.
//!
//! Ties the queue, the rate limiter, the assignment lock, the proxy
//! manager and the record store into the task lifecycle:
//!
//! - `create_task`: validate, persist, enqueue
//! - `distribute`: pick the next task/proxy pair and assign it
//! - `execute`: run the outbound fetch and settle the attempt
//! - `handle_completion`: settle an attempt executed out of process
//!
//! Any number of service instances may run concurrently against one
//! coordination store; see `TaskScheduler` for what the assignment lock
//! does and does not serialize.

use std::sync::Arc;

use redis::aio::ConnectionManager;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::DistributionConfig;
use crate::coord::{self, AssignmentLock, ProxyHealthRegistry, RateLimiter, TaskQueue};
use crate::distribution::fetch::{bandwidth_mbps, FetchClient, HttpFetchClient};
use crate::error::DistributionError;
use crate::proxy::ProxyManager;
use crate::scheduler::TaskScheduler;
use crate::storage::{PgRecordStore, ProxyEndpoint, RecordStore};
use crate::task::{FetchReport, Task, TaskPayload, TaskPriority};

/// A task/proxy pair produced by one scheduling pass.
#[derive(Debug, Clone)]
pub struct Assignment {
    /// The assigned task.
    pub task_id: Uuid,
    /// The proxy it will execute through.
    pub proxy_id: Uuid,
    /// Target URL of the task, for callers that execute out of process.
    pub target_url: String,
}

/// A failed execution attempt, carrying whichever proxy had been selected
/// by the time the failure happened so the cleanup path can mark it
/// unhealthy.
struct AttemptFailure {
    proxy_id: Option<Uuid>,
    error: DistributionError,
}

impl AttemptFailure {
    fn before_proxy(error: DistributionError) -> Self {
        Self {
            proxy_id: None,
            error,
        }
    }

    fn with_proxy(proxy_id: Uuid, error: DistributionError) -> Self {
        Self {
            proxy_id: Some(proxy_id),
            error,
        }
    }
}

/// Top-level orchestrator for the create → schedule → execute →
/// complete/retry lifecycle.
pub struct TaskDistributionService {
    scheduler: TaskScheduler,
    proxies: ProxyManager,
    queue: Arc<TaskQueue>,
    store: Arc<dyn RecordStore>,
    fetcher: Arc<dyn FetchClient>,
    config: DistributionConfig,
}

impl TaskDistributionService {
    /// Builds a service over an existing Redis connection, record store
    /// and fetch client, using the default coordination keys.
    ///
    /// The connection manager is shared across all coordination
    /// primitives; no further connections are created.
    pub fn with_components(
        redis: ConnectionManager,
        store: Arc<dyn RecordStore>,
        fetcher: Arc<dyn FetchClient>,
        config: DistributionConfig,
    ) -> Self {
        let queue = Arc::new(TaskQueue::new(redis.clone()));
        let registry = ProxyHealthRegistry::new(redis.clone());
        let rate = RateLimiter::new(
            redis.clone(),
            config.requests_per_minute,
            config.rate_window,
        );
        let lock = AssignmentLock::new(redis);

        Self::with_parts(queue, registry, rate, lock, store, fetcher, config)
    }

    /// Builds a service from individually constructed coordination
    /// primitives.
    ///
    /// Lets deployments namespace the underlying Redis keys, e.g. to run
    /// several independent grids against one Redis instance.
    pub fn with_parts(
        queue: Arc<TaskQueue>,
        registry: ProxyHealthRegistry,
        rate: RateLimiter,
        lock: AssignmentLock,
        store: Arc<dyn RecordStore>,
        fetcher: Arc<dyn FetchClient>,
        config: DistributionConfig,
    ) -> Self {
        let scheduler = TaskScheduler::new(
            Arc::clone(&queue),
            rate,
            lock,
            Arc::clone(&store),
            config.lock_ttl,
        );
        let proxies = ProxyManager::new(registry, Arc::clone(&store));

        Self {
            scheduler,
            proxies,
            queue,
            store,
            fetcher,
            config,
        }
    }

    /// Connects to Redis and PostgreSQL per the configuration, bootstraps
    /// the schema, and builds a fully wired service.
    ///
    /// # Errors
    ///
    /// Returns the first connection or bootstrap failure.
    pub async fn connect(config: DistributionConfig) -> Result<Self, DistributionError> {
        let redis = coord::connect(&config.redis_url).await?;

        let pg = PgRecordStore::connect(&config.database_url).await?;
        pg.bootstrap().await?;
        let store: Arc<dyn RecordStore> = Arc::new(pg);

        let fetcher: Arc<dyn FetchClient> = Arc::new(HttpFetchClient::new(
            config.fetch_timeout,
            config.max_redirects,
        ));

        Ok(Self::with_components(redis, store, fetcher, config))
    }

    /// Creates a pending task and enqueues it.
    ///
    /// The owner must currently contribute at least one active proxy
    /// endpoint; the queue score is the numeric priority value.
    ///
    /// # Errors
    ///
    /// - `InvalidTargetUrl` for a blank URL
    /// - `NoActiveProxyForUser` if the owner has no active endpoint
    pub async fn create_task(
        &self,
        target_url: &str,
        owner_user_id: Uuid,
        priority: TaskPriority,
    ) -> Result<Task, DistributionError> {
        if target_url.trim().is_empty() {
            return Err(DistributionError::InvalidTargetUrl);
        }

        if self
            .store
            .first_active_proxy_for_owner(owner_user_id)
            .await?
            .is_none()
        {
            return Err(DistributionError::NoActiveProxyForUser(owner_user_id));
        }

        let task = Task::new(target_url, owner_user_id, priority);
        self.store.insert_task(&task).await?;
        self.queue.push(task.id, task.priority_score).await?;

        info!(
            task_id = %task.id,
            owner = %owner_user_id,
            priority = %priority,
            "Task created"
        );

        Ok(task)
    }

    /// Loads the current record of a task, or `None` if unknown.
    pub async fn task_status(&self, task_id: Uuid) -> Result<Option<Task>, DistributionError> {
        Ok(self.store.task(task_id).await?)
    }

    /// Runs one scheduling pass: next task → available proxy → rate check
    /// → assignment.
    ///
    /// Returns `None` at the first unmet precondition (empty queue, no
    /// healthy proxy, rate-limited proxy); these are expected idle
    /// outcomes, not failures. An `AssignmentConflict` from a concurrent
    /// scheduler propagates and should simply be retried on the next pass.
    pub async fn distribute(&self) -> Result<Option<Assignment>, DistributionError> {
        let Some(task) = self.scheduler.next_task().await? else {
            return Ok(None);
        };

        let Some(proxy) = self.proxies.available_proxy().await? else {
            return Ok(None);
        };

        if !self.scheduler.proxy_within_budget(proxy.id).await? {
            return Ok(None);
        }

        let assigned = self.scheduler.assign(task.id, proxy.id).await?;

        Ok(Some(Assignment {
            task_id: assigned.id,
            proxy_id: proxy.id,
            target_url: assigned.target_url,
        }))
    }

    /// Executes a task end to end: select a proxy, fetch the target
    /// through it, and settle the attempt.
    ///
    /// On success the proxy is marked healthy, the task completed with
    /// its payload and measured bandwidth, and a `FetchReport` returned
    /// so the caller can credit the proxy owner. On failure the selected
    /// proxy (if one was chosen) is marked unhealthy, the task marked
    /// failed, a retry conditionally enqueued, and the originating error
    /// re-raised.
    pub async fn execute(&self, task_id: Uuid) -> Result<FetchReport, DistributionError> {
        let task = self
            .store
            .task(task_id)
            .await?
            .ok_or(DistributionError::TaskNotFound(task_id))?;

        match self.attempt_fetch(&task).await {
            Ok(report) => Ok(report),
            Err(failure) => self.settle_failed_attempt(&task, failure).await,
        }
    }

    /// One fetch attempt. The selected proxy is threaded through the
    /// failure type explicitly so the cleanup path can tell "no proxy was
    /// ever chosen" from "this proxy failed us".
    async fn attempt_fetch(&self, task: &Task) -> Result<FetchReport, AttemptFailure> {
        let proxy = match self.proxies.available_proxy().await {
            Ok(Some(proxy)) => proxy,
            Ok(None) => {
                return Err(AttemptFailure::before_proxy(
                    DistributionError::NoProxyAvailable,
                ))
            }
            Err(e) => return Err(AttemptFailure::before_proxy(e)),
        };

        match self.scheduler.proxy_within_budget(proxy.id).await {
            Ok(true) => {}
            Ok(false) => {
                return Err(AttemptFailure::with_proxy(
                    proxy.id,
                    DistributionError::RateLimited(proxy.id),
                ))
            }
            Err(e) => return Err(AttemptFailure::with_proxy(proxy.id, e)),
        }

        if let Err(e) = self.store.mark_in_progress(task.id, proxy.id).await {
            return Err(AttemptFailure::with_proxy(proxy.id, e.into()));
        }

        let response = match self.fetcher.fetch(&task.target_url, &proxy.address).await {
            Ok(response) => response,
            Err(e) => return Err(AttemptFailure::with_proxy(proxy.id, e.into())),
        };

        let mbps = bandwidth_mbps(response.transferred_bytes(), response.elapsed);

        if let Err(e) = self.proxies.update_proxy_health(proxy.id, true).await {
            return Err(AttemptFailure::with_proxy(proxy.id, e));
        }

        let payload = TaskPayload::new(response.body);
        let completed = match self
            .store
            .complete_task(task.id, payload.clone(), mbps)
            .await
        {
            Ok(completed) => completed,
            Err(e) => return Err(AttemptFailure::with_proxy(proxy.id, e.into())),
        };

        info!(
            task_id = %completed.id,
            proxy_id = %proxy.id,
            bandwidth_mbps = mbps,
            "Task completed"
        );

        Ok(FetchReport {
            task_id: completed.id,
            payload,
            bandwidth_mbps: mbps,
            proxy_owner_id: proxy.owner_user_id,
        })
    }

    /// Settles a failed attempt: proxy unhealthy, task failed, retry
    /// conditionally enqueued, original error re-raised.
    async fn settle_failed_attempt(
        &self,
        task: &Task,
        failure: AttemptFailure,
    ) -> Result<FetchReport, DistributionError> {
        if let Some(proxy_id) = failure.proxy_id {
            if let Err(health_err) = self.proxies.update_proxy_health(proxy_id, false).await {
                warn!(
                    proxy_id = %proxy_id,
                    error = %health_err,
                    "Failed to record unhealthy proxy after fetch failure"
                );
            }
        }

        self.fail_and_maybe_requeue(task).await?;

        Err(failure.error)
    }

    /// Reports an externally executed attempt's outcome.
    ///
    /// Applies the same health update and conditional retry as `execute`
    /// without performing a fetch. The health update targets the task's
    /// assigned proxy; a never-assigned task gets no health update.
    pub async fn handle_completion(
        &self,
        task_id: Uuid,
        success: bool,
        payload: Option<TaskPayload>,
    ) -> Result<Task, DistributionError> {
        let task = self
            .store
            .task(task_id)
            .await?
            .ok_or(DistributionError::TaskNotFound(task_id))?;

        if let Some(proxy_id) = task.assigned_proxy_id {
            self.proxies.update_proxy_health(proxy_id, success).await?;
        }

        if success {
            let completed = self
                .store
                .complete_task(task.id, payload.unwrap_or_default(), task.bandwidth_used)
                .await?;
            info!(task_id = %task.id, "Task completion reported");
            return Ok(completed);
        }

        self.fail_and_maybe_requeue(&task).await
    }

    /// Marks the task failed with its incremented retry count and pushes
    /// it back onto the queue while the pre-failure count is below the
    /// retry bound. The re-enqueue score carries the retry count, so
    /// retries dequeue ahead of fresh low-priority work.
    async fn fail_and_maybe_requeue(&self, task: &Task) -> Result<Task, DistributionError> {
        let failed = self.store.fail_task(task.id, task.retry_count + 1).await?;

        if task.retry_count < self.config.max_retries {
            self.queue
                .push(failed.id, i64::from(failed.retry_count))
                .await?;
            info!(
                task_id = %failed.id,
                retry_count = failed.retry_count,
                "Task re-enqueued for retry"
            );
        } else {
            warn!(
                task_id = %failed.id,
                retry_count = failed.retry_count,
                "Retry budget exhausted; task stays failed"
            );
        }

        Ok(failed)
    }

    /// Appends a bandwidth attribution entry for the report's proxy
    /// owner.
    pub async fn credit_owner(&self, report: &FetchReport) -> Result<(), DistributionError> {
        self.store
            .record_bandwidth(report.proxy_owner_id, report.bandwidth_mbps)
            .await?;

        info!(
            owner = %report.proxy_owner_id,
            bandwidth_mbps = report.bandwidth_mbps,
            "Bandwidth credited"
        );

        Ok(())
    }

    /// Registers (or reactivates) a proxy endpoint and marks it healthy
    /// in the registry so it becomes immediately eligible.
    pub async fn register_proxy(
        &self,
        address: &str,
        owner_user_id: Uuid,
    ) -> Result<ProxyEndpoint, DistributionError> {
        if address.trim().is_empty() {
            return Err(DistributionError::InvalidProxyAddress);
        }

        let endpoint = ProxyEndpoint::new(address, owner_user_id);
        let stored = self.store.upsert_proxy(&endpoint).await?;
        self.proxies.registry().set_healthy(stored.id, true).await?;

        info!(proxy_id = %stored.id, address = %address, "Proxy registered");
        Ok(stored)
    }

    /// Returns the shared record store.
    pub fn store(&self) -> &Arc<dyn RecordStore> {
        &self.store
    }

    /// Returns the shared task queue.
    pub fn queue(&self) -> &Arc<TaskQueue> {
        &self.queue
    }

    /// Returns the proxy manager.
    pub fn proxies(&self) -> &ProxyManager {
        &self.proxies
    }

    /// Returns the configuration in effect.
    pub fn config(&self) -> &DistributionConfig {
        &self.config
    }
}
