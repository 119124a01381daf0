//! Task definitions for the distribution system.
//!
//! This module defines the core task types tracked through the scheduling
//! lifecycle:
//!
//! - `Task`: a unit of scheduled work (a target URL to fetch)
//! - `TaskStatus`: lifecycle state of a task
//! - `TaskPriority`: creation-time priority mapped to a queue score
//! - `TaskPayload`: opaque result blob captured on completion
//! - `FetchReport`: outcome of a successful execution, including the
//!   bandwidth figure used to credit the proxy owner

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle state of a task.
///
/// Tasks move `Pending` → `InProgress` → `Completed` or `Failed`. A failed
/// task may be re-enqueued (restarting the cycle) while its retry count is
/// below the configured maximum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskStatus {
    /// Waiting in the priority queue.
    Pending,
    /// Assigned to a proxy and executing.
    InProgress,
    /// Finished successfully with a payload and bandwidth figure.
    Completed,
    /// The last attempt failed.
    Failed,
}

impl TaskStatus {
    /// Returns whether this status ends an attempt.
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskStatus::Pending => write!(f, "pending"),
            TaskStatus::InProgress => write!(f, "in_progress"),
            TaskStatus::Completed => write!(f, "completed"),
            TaskStatus::Failed => write!(f, "failed"),
        }
    }
}

impl FromStr for TaskStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(TaskStatus::Pending),
            "in_progress" => Ok(TaskStatus::InProgress),
            "completed" => Ok(TaskStatus::Completed),
            "failed" => Ok(TaskStatus::Failed),
            other => Err(format!("unknown task status '{}'", other)),
        }
    }
}

/// Creation-time priority of a task.
///
/// Lower scores dequeue first, so `High` maps to the smallest score. After
/// a failure the queue score is reused to carry the retry count instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskPriority {
    High,
    Normal,
    Low,
}

impl TaskPriority {
    /// Returns the queue score for this priority.
    pub fn score(&self) -> i64 {
        match self {
            TaskPriority::High => 1,
            TaskPriority::Normal => 2,
            TaskPriority::Low => 3,
        }
    }
}

impl Default for TaskPriority {
    fn default() -> Self {
        TaskPriority::Normal
    }
}

impl std::fmt::Display for TaskPriority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskPriority::High => write!(f, "high"),
            TaskPriority::Normal => write!(f, "normal"),
            TaskPriority::Low => write!(f, "low"),
        }
    }
}

impl FromStr for TaskPriority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "high" => Ok(TaskPriority::High),
            "normal" => Ok(TaskPriority::Normal),
            "low" => Ok(TaskPriority::Low),
            other => Err(format!(
                "unknown priority '{}', expected high, normal or low",
                other
            )),
        }
    }
}

/// Opaque result blob attached to a completed task.
///
/// The distribution core never inspects the content; it only carries and
/// sizes it. Stored as raw bytes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskPayload(Vec<u8>);

impl TaskPayload {
    /// Wraps raw response bytes.
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    /// Returns the payload bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Consumes the payload, returning the underlying bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }

    /// Returns the payload size in bytes.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns whether the payload is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<u8>> for TaskPayload {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

/// A unit of scheduled work: one outbound fetch of a target URL routed
/// through an assigned proxy endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    /// Unique identifier for this task.
    pub id: Uuid,
    /// URL to fetch. Non-empty, validated at creation.
    pub target_url: String,
    /// Current lifecycle state.
    pub status: TaskStatus,
    /// Queue ordering key; lower is served first.
    pub priority_score: i64,
    /// Number of failed attempts so far.
    pub retry_count: u32,
    /// Proxy chosen at assignment time, if any.
    pub assigned_proxy_id: Option<Uuid>,
    /// User whose account is credited/debited for the fetch.
    pub owner_user_id: Uuid,
    /// Measured bandwidth in Mbps, set on completion.
    pub bandwidth_used: f64,
    /// Response blob, set on completion.
    pub payload: Option<TaskPayload>,
    /// When this task was created.
    pub created_at: DateTime<Utc>,
}

impl Task {
    /// Creates a new pending task.
    ///
    /// The task starts unassigned with a zero retry count and a queue score
    /// derived from `priority`.
    pub fn new(target_url: impl Into<String>, owner_user_id: Uuid, priority: TaskPriority) -> Self {
        Self {
            id: Uuid::new_v4(),
            target_url: target_url.into(),
            status: TaskStatus::Pending,
            priority_score: priority.score(),
            retry_count: 0,
            assigned_proxy_id: None,
            owner_user_id,
            bandwidth_used: 0.0,
            payload: None,
            created_at: Utc::now(),
        }
    }

    /// Marks the task in progress on the given proxy.
    pub fn assign_to(&mut self, proxy_id: Uuid) {
        self.status = TaskStatus::InProgress;
        self.assigned_proxy_id = Some(proxy_id);
    }

    /// Marks the task completed with its payload and bandwidth figure.
    pub fn complete_with(&mut self, payload: TaskPayload, bandwidth_mbps: f64) {
        self.status = TaskStatus::Completed;
        self.payload = Some(payload);
        self.bandwidth_used = bandwidth_mbps;
    }

    /// Marks the attempt failed and records the incremented retry count.
    ///
    /// The payload is cleared: a failed attempt never carries a result.
    pub fn fail_attempt(&mut self, retry_count: u32) {
        self.status = TaskStatus::Failed;
        self.payload = None;
        self.retry_count = retry_count;
    }

    /// Returns whether another attempt is allowed under `max_retries`.
    pub fn should_retry(&self, max_retries: u32) -> bool {
        self.retry_count < max_retries
    }

    /// Returns the number of attempts left under `max_retries`.
    pub fn remaining_retries(&self, max_retries: u32) -> u32 {
        max_retries.saturating_sub(self.retry_count)
    }
}

/// Outcome of a successful fetch, returned to the caller so the proxy
/// owner can be credited with the measured bandwidth.
#[derive(Debug, Clone)]
pub struct FetchReport {
    /// The completed task.
    pub task_id: Uuid,
    /// Response body captured from the target.
    pub payload: TaskPayload,
    /// Measured bandwidth in Mbps.
    pub bandwidth_mbps: f64,
    /// Owner of the proxy the fetch was routed through.
    pub proxy_owner_id: Uuid,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_scores() {
        assert_eq!(TaskPriority::High.score(), 1);
        assert_eq!(TaskPriority::Normal.score(), 2);
        assert_eq!(TaskPriority::Low.score(), 3);
    }

    #[test]
    fn test_priority_from_str() {
        assert_eq!("high".parse::<TaskPriority>(), Ok(TaskPriority::High));
        assert_eq!("NORMAL".parse::<TaskPriority>(), Ok(TaskPriority::Normal));
        assert_eq!("Low".parse::<TaskPriority>(), Ok(TaskPriority::Low));
        assert!("urgent".parse::<TaskPriority>().is_err());
    }

    #[test]
    fn test_status_display() {
        assert_eq!(format!("{}", TaskStatus::Pending), "pending");
        assert_eq!(format!("{}", TaskStatus::InProgress), "in_progress");
        assert_eq!(format!("{}", TaskStatus::Completed), "completed");
        assert_eq!(format!("{}", TaskStatus::Failed), "failed");
    }

    #[test]
    fn test_status_terminal() {
        assert!(!TaskStatus::Pending.is_terminal());
        assert!(!TaskStatus::InProgress.is_terminal());
        assert!(TaskStatus::Completed.is_terminal());
        assert!(TaskStatus::Failed.is_terminal());
    }

    #[test]
    fn test_task_new() {
        let owner = Uuid::new_v4();
        let task = Task::new("https://example.com", owner, TaskPriority::High);

        assert!(!task.id.is_nil());
        assert_eq!(task.target_url, "https://example.com");
        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(task.priority_score, 1);
        assert_eq!(task.retry_count, 0);
        assert!(task.assigned_proxy_id.is_none());
        assert_eq!(task.owner_user_id, owner);
        assert!(task.payload.is_none());
    }

    #[test]
    fn test_task_assign_to() {
        let mut task = Task::new("https://example.com", Uuid::new_v4(), TaskPriority::Normal);
        let proxy_id = Uuid::new_v4();

        task.assign_to(proxy_id);

        assert_eq!(task.status, TaskStatus::InProgress);
        assert_eq!(task.assigned_proxy_id, Some(proxy_id));
    }

    #[test]
    fn test_task_complete_with() {
        let mut task = Task::new("https://example.com", Uuid::new_v4(), TaskPriority::Normal);
        task.assign_to(Uuid::new_v4());
        task.complete_with(TaskPayload::new(b"<html></html>".to_vec()), 1.25);

        assert_eq!(task.status, TaskStatus::Completed);
        assert!((task.bandwidth_used - 1.25).abs() < f64::EPSILON);
        assert_eq!(task.payload.as_ref().map(TaskPayload::len), Some(13));
    }

    #[test]
    fn test_task_fail_attempt_clears_payload() {
        let mut task = Task::new("https://example.com", Uuid::new_v4(), TaskPriority::Normal);
        task.complete_with(TaskPayload::new(b"partial".to_vec()), 0.5);

        task.fail_attempt(1);

        assert_eq!(task.status, TaskStatus::Failed);
        assert_eq!(task.retry_count, 1);
        assert!(task.payload.is_none());
    }

    #[test]
    fn test_task_retry_bound() {
        let mut task = Task::new("https://example.com", Uuid::new_v4(), TaskPriority::Normal);

        assert!(task.should_retry(3));
        assert_eq!(task.remaining_retries(3), 3);

        task.fail_attempt(1);
        assert!(task.should_retry(3));

        task.fail_attempt(2);
        task.fail_attempt(3);
        assert!(!task.should_retry(3));
        assert_eq!(task.remaining_retries(3), 0);
    }

    #[test]
    fn test_payload_accessors() {
        let payload = TaskPayload::new(b"response body".to_vec());

        assert_eq!(payload.len(), 13);
        assert!(!payload.is_empty());
        assert_eq!(payload.as_bytes(), b"response body");
        assert_eq!(payload.into_bytes(), b"response body".to_vec());
        assert!(TaskPayload::default().is_empty());
    }

    #[test]
    fn test_task_serialization() {
        let task = Task::new("https://example.com", Uuid::new_v4(), TaskPriority::Low);

        let json = serde_json::to_string(&task).expect("serialization should work");
        let parsed: Task = serde_json::from_str(&json).expect("deserialization should work");

        assert_eq!(parsed.id, task.id);
        assert_eq!(parsed.target_url, task.target_url);
        assert_eq!(parsed.priority_score, 3);
        assert_eq!(parsed.status, TaskStatus::Pending);
    }
}
