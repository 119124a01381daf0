//! Polling execution loop for the distribution service.
//!
//! Spawns a configurable number of worker tasks that each repeatedly run
//! a scheduling pass and execute whatever it assigns, crediting the proxy
//! owner on success. Workers share the service and coordinate purely
//! through the external stores, so several runner processes can operate
//! against one queue.
//!
//! # Features
//!
//! - Configurable number of workers
//! - Graceful shutdown with broadcast channel
//! - Idle polls back off by the configured interval
//! - Shared completion/failure counters

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::service::TaskDistributionService;

/// Errors that can occur in the distribution runner.
#[derive(Debug, Error)]
pub enum RunnerError {
    /// Runner is already running.
    #[error("Runner is already running")]
    AlreadyRunning,

    /// Runner is not running.
    #[error("Runner is not running")]
    NotRunning,

    /// Shutdown timed out.
    #[error("Shutdown timed out after {0:?}")]
    ShutdownTimeout(Duration),
}

/// Configuration for the distribution runner.
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Number of worker tasks to spawn.
    pub num_workers: usize,
    /// How long to sleep after an idle or failed pass.
    pub poll_interval: Duration,
    /// Timeout for graceful shutdown.
    pub shutdown_timeout: Duration,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            num_workers: 2,
            poll_interval: Duration::from_secs(1),
            shutdown_timeout: Duration::from_secs(30),
        }
    }
}

impl RunnerConfig {
    /// Creates a configuration with the specified number of workers.
    pub fn new(num_workers: usize) -> Self {
        Self {
            num_workers,
            ..Default::default()
        }
    }

    /// Sets the poll interval.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Sets the shutdown timeout.
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }
}

/// Statistics about runner progress.
#[derive(Debug, Clone, Default)]
pub struct RunnerStats {
    /// Number of workers in the runner.
    pub num_workers: usize,
    /// Tasks completed successfully.
    pub tasks_completed: u64,
    /// Tasks whose execution failed.
    pub tasks_failed: u64,
}

impl RunnerStats {
    /// Returns the total number of executed attempts.
    pub fn total_processed(&self) -> u64 {
        self.tasks_completed + self.tasks_failed
    }

    /// Returns the success rate as a percentage.
    pub fn success_rate(&self) -> f64 {
        let total = self.total_processed();
        if total == 0 {
            return 0.0;
        }
        (self.tasks_completed as f64 / total as f64) * 100.0
    }
}

/// Shared counters behind the public stats.
struct SharedStats {
    tasks_completed: AtomicU64,
    tasks_failed: AtomicU64,
}

impl SharedStats {
    fn new() -> Self {
        Self {
            tasks_completed: AtomicU64::new(0),
            tasks_failed: AtomicU64::new(0),
        }
    }

    fn record_completion(&self) {
        self.tasks_completed.fetch_add(1, Ordering::SeqCst);
    }

    fn record_failure(&self) {
        self.tasks_failed.fetch_add(1, Ordering::SeqCst);
    }

    fn to_stats(&self, num_workers: usize) -> RunnerStats {
        RunnerStats {
            num_workers,
            tasks_completed: self.tasks_completed.load(Ordering::SeqCst),
            tasks_failed: self.tasks_failed.load(Ordering::SeqCst),
        }
    }
}

/// Pool of worker loops driving the distribution service.
pub struct DistributionRunner {
    config: RunnerConfig,
    service: Arc<TaskDistributionService>,
    shutdown_tx: broadcast::Sender<()>,
    worker_handles: Vec<JoinHandle<()>>,
    stats: Arc<SharedStats>,
    is_running: AtomicBool,
}

impl DistributionRunner {
    /// Creates a runner over a shared service.
    pub fn new(config: RunnerConfig, service: Arc<TaskDistributionService>) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            config,
            service,
            shutdown_tx,
            worker_handles: Vec::new(),
            stats: Arc::new(SharedStats::new()),
            is_running: AtomicBool::new(false),
        }
    }

    /// Starts all workers.
    ///
    /// # Errors
    ///
    /// Returns `RunnerError::AlreadyRunning` if the runner is running.
    pub fn start(&mut self) -> Result<(), RunnerError> {
        if self.is_running.load(Ordering::SeqCst) {
            return Err(RunnerError::AlreadyRunning);
        }

        for i in 0..self.config.num_workers {
            let worker = Worker {
                id: format!("worker-{}", i),
                service: Arc::clone(&self.service),
                shutdown_rx: self.shutdown_tx.subscribe(),
                poll_interval: self.config.poll_interval,
                stats: Arc::clone(&self.stats),
            };

            let handle = tokio::spawn(async move {
                worker.run().await;
            });

            self.worker_handles.push(handle);
        }

        self.is_running.store(true, Ordering::SeqCst);
        info!(num_workers = self.config.num_workers, "Distribution runner started");

        Ok(())
    }

    /// Gracefully shuts down all workers.
    ///
    /// # Errors
    ///
    /// Returns `RunnerError::ShutdownTimeout` if workers don't stop
    /// within the configured timeout.
    pub async fn shutdown(&mut self) -> Result<(), RunnerError> {
        if !self.is_running.load(Ordering::SeqCst) {
            return Err(RunnerError::NotRunning);
        }

        info!("Initiating distribution runner shutdown");

        // Ignore send error: workers may have already stopped.
        let _ = self.shutdown_tx.send(());

        let shutdown_future = async {
            for handle in self.worker_handles.drain(..) {
                if let Err(e) = handle.await {
                    error!(error = %e, "Worker task panicked during shutdown");
                }
            }
        };

        match tokio::time::timeout(self.config.shutdown_timeout, shutdown_future).await {
            Ok(()) => {
                self.is_running.store(false, Ordering::SeqCst);
                info!("Distribution runner shutdown complete");
                Ok(())
            }
            Err(_) => {
                self.is_running.store(false, Ordering::SeqCst);
                Err(RunnerError::ShutdownTimeout(self.config.shutdown_timeout))
            }
        }
    }

    /// Returns current runner statistics.
    pub fn stats(&self) -> RunnerStats {
        self.stats.to_stats(self.config.num_workers)
    }

    /// Returns whether the runner is currently running.
    pub fn is_running(&self) -> bool {
        self.is_running.load(Ordering::SeqCst)
    }
}

/// One worker loop.
struct Worker {
    id: String,
    service: Arc<TaskDistributionService>,
    shutdown_rx: broadcast::Receiver<()>,
    poll_interval: Duration,
    stats: Arc<SharedStats>,
}

impl Worker {
    /// Runs scheduling passes until a shutdown signal arrives.
    async fn run(mut self) {
        info!(worker_id = %self.id, "Worker started");

        loop {
            match self.shutdown_rx.try_recv() {
                Ok(()) | Err(broadcast::error::TryRecvError::Closed) => {
                    info!(worker_id = %self.id, "Worker received shutdown signal");
                    break;
                }
                Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
                Err(broadcast::error::TryRecvError::Empty) => {}
            }

            if !self.run_pass().await {
                tokio::time::sleep(self.poll_interval).await;
            }
        }

        info!(worker_id = %self.id, "Worker stopped");
    }

    /// One distribute + execute pass. Returns whether work was done.
    async fn run_pass(&self) -> bool {
        let assignment = match self.service.distribute().await {
            Ok(Some(assignment)) => assignment,
            Ok(None) => {
                debug!(worker_id = %self.id, "Nothing to distribute");
                return false;
            }
            Err(e) if e.is_idle_outcome() => {
                debug!(worker_id = %self.id, outcome = %e, "Idle scheduling pass");
                return false;
            }
            Err(e) => {
                warn!(worker_id = %self.id, error = %e, "Scheduling pass failed");
                return false;
            }
        };

        match self.service.execute(assignment.task_id).await {
            Ok(report) => {
                self.stats.record_completion();

                if let Err(e) = self.service.credit_owner(&report).await {
                    warn!(
                        worker_id = %self.id,
                        task_id = %report.task_id,
                        error = %e,
                        "Failed to credit proxy owner"
                    );
                }
            }
            Err(e) => {
                self.stats.record_failure();
                warn!(
                    worker_id = %self.id,
                    task_id = %assignment.task_id,
                    error = %e,
                    "Task execution failed"
                );
            }
        }

        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_runner_config_default() {
        let config = RunnerConfig::default();

        assert_eq!(config.num_workers, 2);
        assert_eq!(config.poll_interval, Duration::from_secs(1));
        assert_eq!(config.shutdown_timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_runner_config_builder() {
        let config = RunnerConfig::new(8)
            .with_poll_interval(Duration::from_millis(250))
            .with_shutdown_timeout(Duration::from_secs(5));

        assert_eq!(config.num_workers, 8);
        assert_eq!(config.poll_interval, Duration::from_millis(250));
        assert_eq!(config.shutdown_timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_runner_stats_calculations() {
        let stats = RunnerStats {
            num_workers: 4,
            tasks_completed: 30,
            tasks_failed: 10,
        };

        assert_eq!(stats.total_processed(), 40);
        assert!((stats.success_rate() - 75.0).abs() < f64::EPSILON);

        let empty = RunnerStats::default();
        assert!((empty.success_rate() - 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_shared_stats() {
        let stats = SharedStats::new();

        stats.record_completion();
        stats.record_completion();
        stats.record_failure();

        let snapshot = stats.to_stats(2);
        assert_eq!(snapshot.num_workers, 2);
        assert_eq!(snapshot.tasks_completed, 2);
        assert_eq!(snapshot.tasks_failed, 1);
    }

    #[test]
    fn test_runner_error_display() {
        assert!(RunnerError::AlreadyRunning
            .to_string()
            .contains("already running"));
        assert!(RunnerError::NotRunning.to_string().contains("not running"));
        assert!(RunnerError::ShutdownTimeout(Duration::from_secs(30))
            .to_string()
            .contains("30"));
    }
}
