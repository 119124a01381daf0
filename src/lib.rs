//! fetchgrid: distributed fetch-task scheduling.
//!
//! This library distributes outbound fetch tasks across a pool of
//! user-contributed proxy endpoints, enforcing per-proxy request budgets,
//! serializing task assignment across concurrent scheduler instances,
//! tracking proxy liveness, retrying failed tasks up to a bound, and
//! attributing measured bandwidth to proxy owners.

// Core modules
pub mod cli;
pub mod config;
pub mod coord;
pub mod distribution;
pub mod error;
pub mod proxy;
pub mod scheduler;
pub mod storage;
pub mod task;

// Re-export commonly used types
pub use config::{ConfigError, DistributionConfig};
pub use distribution::{
    Assignment, DistributionRunner, FetchClient, HttpFetchClient, RunnerConfig,
    TaskDistributionService,
};
pub use error::DistributionError;
pub use task::{FetchReport, Task, TaskPayload, TaskPriority, TaskStatus};
