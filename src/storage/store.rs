//! The record store capability trait.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::task::{Task, TaskPayload};

use super::records::ProxyEndpoint;

/// Errors that can occur during record store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Connection to the backing store failed.
    #[error("Store connection failed: {0}")]
    ConnectionFailed(String),

    /// Query execution failed.
    #[error("Query failed: {0}")]
    Query(#[from] sqlx::Error),

    /// A record expected to exist was not found.
    #[error("Record not found: {0}")]
    NotFound(Uuid),

    /// A stored value could not be mapped back to a domain type.
    #[error("Malformed record {id}: {message}")]
    MalformedRecord { id: Uuid, message: String },
}

/// Durable persistence for tasks, proxy endpoints and the bandwidth
/// ledger.
///
/// Implementations must provide read-your-writes consistency per record;
/// no cross-record transactions are required. Task mutations are scoped to
/// single lifecycle transitions so concurrent writers touching different
/// fields cannot clobber each other.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Persists a freshly created task.
    async fn insert_task(&self, task: &Task) -> Result<(), StoreError>;

    /// Loads a task by id.
    async fn task(&self, id: Uuid) -> Result<Option<Task>, StoreError>;

    /// Transitions a task to in-progress on the given proxy and returns
    /// the updated record.
    async fn mark_in_progress(&self, id: Uuid, proxy_id: Uuid) -> Result<Task, StoreError>;

    /// Transitions a task to completed with its payload and bandwidth
    /// figure, returning the updated record.
    async fn complete_task(
        &self,
        id: Uuid,
        payload: TaskPayload,
        bandwidth_mbps: f64,
    ) -> Result<Task, StoreError>;

    /// Transitions a task to failed, clearing any payload and persisting
    /// the incremented retry count, returning the updated record.
    async fn fail_task(&self, id: Uuid, retry_count: u32) -> Result<Task, StoreError>;

    /// Loads a proxy endpoint by id.
    async fn proxy(&self, id: Uuid) -> Result<Option<ProxyEndpoint>, StoreError>;

    /// Lists all currently active proxy endpoints in stable listing order.
    async fn active_proxies(&self) -> Result<Vec<ProxyEndpoint>, StoreError>;

    /// Returns one active endpoint owned by the user, if any.
    async fn first_active_proxy_for_owner(
        &self,
        owner_user_id: Uuid,
    ) -> Result<Option<ProxyEndpoint>, StoreError>;

    /// Registers an endpoint, reactivating it if the owner already
    /// contributed the same address, and returns the stored record (the
    /// original id is kept on re-registration).
    async fn upsert_proxy(&self, endpoint: &ProxyEndpoint) -> Result<ProxyEndpoint, StoreError>;

    /// Updates the durable liveness fields of an endpoint.
    async fn set_proxy_active(
        &self,
        id: Uuid,
        active: bool,
        verified_at: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    /// Appends a bandwidth attribution entry for a proxy owner.
    async fn record_bandwidth(&self, owner_user_id: Uuid, mbps: f64) -> Result<(), StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_error_display() {
        let err = StoreError::ConnectionFailed("timeout".to_string());
        assert!(err.to_string().contains("timeout"));

        let id = Uuid::nil();
        let err = StoreError::NotFound(id);
        assert!(err.to_string().contains("not found"));

        let err = StoreError::MalformedRecord {
            id,
            message: "bad status".to_string(),
        };
        assert!(err.to_string().contains("bad status"));
    }
}
