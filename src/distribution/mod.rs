//! Task distribution: fetch execution, lifecycle orchestration and the
//! polling runner.

pub mod fetch;
pub mod runner;
pub mod service;

pub use fetch::{bandwidth_mbps, FetchClient, FetchError, FetchResponse, HttpFetchClient};
pub use runner::{DistributionRunner, RunnerConfig, RunnerError, RunnerStats};
pub use service::{Assignment, TaskDistributionService};
