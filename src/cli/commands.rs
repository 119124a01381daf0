//! CLI command definitions for fetchgrid.

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::info;
use uuid::Uuid;

use crate::config::DistributionConfig;
use crate::distribution::{DistributionRunner, RunnerConfig, TaskDistributionService};
use crate::task::{TaskPayload, TaskPriority};

/// Distributed fetch-task scheduler.
#[derive(Parser)]
#[command(name = "fetchgrid")]
#[command(about = "Distribute outbound fetch tasks across contributed proxy endpoints")]
#[command(version)]
pub struct Cli {
    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info", global = true)]
    pub log_level: String,

    /// Redis connection URL for the coordination store.
    #[arg(long, env = "REDIS_URL", default_value = "redis://localhost:6379", global = true)]
    pub redis_url: String,

    /// PostgreSQL connection URL for the durable record store.
    #[arg(long, env = "DATABASE_URL", default_value = "postgres://localhost/fetchgrid", global = true)]
    pub database_url: String,
}

/// Available CLI subcommands.
#[derive(clap::Subcommand)]
pub enum Commands {
    /// Register (or reactivate) a proxy endpoint for a user.
    RegisterProxy {
        /// Network address of the endpoint (host or IP).
        address: String,

        /// Owner user id.
        #[arg(long)]
        owner: Uuid,
    },

    /// Create a fetch task and enqueue it.
    Create {
        /// URL to fetch.
        target_url: String,

        /// Owner user id; must contribute at least one active proxy.
        #[arg(long)]
        owner: Uuid,

        /// Task priority (high, normal, low).
        #[arg(long, default_value = "normal")]
        priority: TaskPriority,
    },

    /// Show the current record of a task.
    Status {
        /// Task id.
        task_id: Uuid,
    },

    /// Run one scheduling pass: assign the next task to a proxy.
    Distribute,

    /// Execute a task end to end through an available proxy.
    Execute {
        /// Task id.
        task_id: Uuid,
    },

    /// Report the outcome of an externally executed task.
    Complete {
        /// Task id.
        task_id: Uuid,

        /// Mark the attempt successful (omitted means failed).
        #[arg(long)]
        success: bool,

        /// Result payload for a successful attempt.
        #[arg(long)]
        payload: Option<String>,
    },

    /// Run the polling distribution loop until interrupted.
    Run {
        /// Number of worker loops.
        #[arg(long, default_value = "2")]
        workers: usize,

        /// Seconds to sleep after an idle pass.
        #[arg(long, default_value = "1")]
        poll_interval_secs: u64,
    },
}

/// Parses CLI arguments.
pub fn parse_cli() -> Cli {
    Cli::parse()
}

/// Runs the parsed CLI command.
pub async fn run_with_cli(cli: Cli) -> anyhow::Result<()> {
    let config = DistributionConfig::default()
        .with_redis_url(cli.redis_url.as_str())
        .with_database_url(cli.database_url.as_str());
    config.validate()?;

    let service = TaskDistributionService::connect(config).await?;

    match cli.command {
        Commands::RegisterProxy { address, owner } => {
            let endpoint = service.register_proxy(&address, owner).await?;
            println!("{}", serde_json::to_string_pretty(&endpoint)?);
        }

        Commands::Create {
            target_url,
            owner,
            priority,
        } => {
            let task = service.create_task(&target_url, owner, priority).await?;
            println!("{}", serde_json::to_string_pretty(&task)?);
        }

        Commands::Status { task_id } => match service.task_status(task_id).await? {
            Some(task) => println!("{}", serde_json::to_string_pretty(&task)?),
            None => println!("Task {} not found", task_id),
        },

        Commands::Distribute => match service.distribute().await? {
            Some(assignment) => {
                println!(
                    "Assigned task {} to proxy {} ({})",
                    assignment.task_id, assignment.proxy_id, assignment.target_url
                );
            }
            None => println!("Nothing to distribute"),
        },

        Commands::Execute { task_id } => {
            let report = service.execute(task_id).await?;
            service.credit_owner(&report).await?;
            println!(
                "Task {} completed: {} bytes, {:.4} Mbps credited to {}",
                report.task_id,
                report.payload.len(),
                report.bandwidth_mbps,
                report.proxy_owner_id
            );
        }

        Commands::Complete {
            task_id,
            success,
            payload,
        } => {
            let payload = payload.map(|p| TaskPayload::new(p.into_bytes()));
            let task = service.handle_completion(task_id, success, payload).await?;
            println!("{}", serde_json::to_string_pretty(&task)?);
        }

        Commands::Run {
            workers,
            poll_interval_secs,
        } => {
            let runner_config = RunnerConfig::new(workers)
                .with_poll_interval(Duration::from_secs(poll_interval_secs));
            let mut runner = DistributionRunner::new(runner_config, Arc::new(service));

            runner.start()?;
            info!("Runner started; press Ctrl-C to stop");

            tokio::signal::ctrl_c().await?;
            runner.shutdown().await?;

            let stats = runner.stats();
            println!(
                "Processed {} tasks ({} completed, {} failed, {:.1}% success)",
                stats.total_processed(),
                stats.tasks_completed,
                stats.tasks_failed,
                stats.success_rate()
            );
        }
    }

    Ok(())
}
