//! In-memory record store.
//!
//! Mirrors the PostgreSQL store semantics over process-local maps. Drives
//! the unit and scenario tests and single-node demo deployments; provides
//! no durability across restarts.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::task::{Task, TaskPayload};

use super::records::ProxyEndpoint;
use super::store::{RecordStore, StoreError};

/// One bandwidth attribution entry.
#[derive(Debug, Clone)]
pub struct BandwidthEntry {
    /// Credited proxy owner.
    pub owner_user_id: Uuid,
    /// Measured bandwidth in Mbps.
    pub mbps: f64,
    /// When the entry was recorded.
    pub recorded_at: DateTime<Utc>,
}

#[derive(Default)]
struct Inner {
    tasks: HashMap<Uuid, Task>,
    proxies: HashMap<Uuid, ProxyEndpoint>,
    // Insertion order, so first-match proxy selection is deterministic.
    proxy_order: Vec<Uuid>,
    bandwidth: Vec<BandwidthEntry>,
}

/// Map-backed record store.
#[derive(Default)]
pub struct MemoryRecordStore {
    inner: Mutex<Inner>,
}

impl MemoryRecordStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of the bandwidth ledger.
    pub async fn bandwidth_entries(&self) -> Vec<BandwidthEntry> {
        self.inner.lock().await.bandwidth.clone()
    }

    /// Returns the number of stored tasks.
    pub async fn task_count(&self) -> usize {
        self.inner.lock().await.tasks.len()
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn insert_task(&self, task: &Task) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        inner.tasks.insert(task.id, task.clone());
        Ok(())
    }

    async fn task(&self, id: Uuid) -> Result<Option<Task>, StoreError> {
        let inner = self.inner.lock().await;
        Ok(inner.tasks.get(&id).cloned())
    }

    async fn mark_in_progress(&self, id: Uuid, proxy_id: Uuid) -> Result<Task, StoreError> {
        let mut inner = self.inner.lock().await;
        let task = inner.tasks.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        task.assign_to(proxy_id);
        Ok(task.clone())
    }

    async fn complete_task(
        &self,
        id: Uuid,
        payload: TaskPayload,
        bandwidth_mbps: f64,
    ) -> Result<Task, StoreError> {
        let mut inner = self.inner.lock().await;
        let task = inner.tasks.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        task.complete_with(payload, bandwidth_mbps);
        Ok(task.clone())
    }

    async fn fail_task(&self, id: Uuid, retry_count: u32) -> Result<Task, StoreError> {
        let mut inner = self.inner.lock().await;
        let task = inner.tasks.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        task.fail_attempt(retry_count);
        Ok(task.clone())
    }

    async fn proxy(&self, id: Uuid) -> Result<Option<ProxyEndpoint>, StoreError> {
        let inner = self.inner.lock().await;
        Ok(inner.proxies.get(&id).cloned())
    }

    async fn active_proxies(&self) -> Result<Vec<ProxyEndpoint>, StoreError> {
        let inner = self.inner.lock().await;
        Ok(inner
            .proxy_order
            .iter()
            .filter_map(|id| inner.proxies.get(id))
            .filter(|proxy| proxy.active)
            .cloned()
            .collect())
    }

    async fn first_active_proxy_for_owner(
        &self,
        owner_user_id: Uuid,
    ) -> Result<Option<ProxyEndpoint>, StoreError> {
        let inner = self.inner.lock().await;
        Ok(inner
            .proxy_order
            .iter()
            .filter_map(|id| inner.proxies.get(id))
            .find(|proxy| proxy.active && proxy.owner_user_id == owner_user_id)
            .cloned())
    }

    async fn upsert_proxy(&self, endpoint: &ProxyEndpoint) -> Result<ProxyEndpoint, StoreError> {
        let mut inner = self.inner.lock().await;

        let existing_id = inner
            .proxy_order
            .iter()
            .filter_map(|id| inner.proxies.get(id))
            .find(|proxy| {
                proxy.address == endpoint.address && proxy.owner_user_id == endpoint.owner_user_id
            })
            .map(|proxy| proxy.id);

        if let Some(proxy) = existing_id.and_then(|id| inner.proxies.get_mut(&id)) {
            proxy.active = true;
            proxy.last_verified_at = endpoint.last_verified_at;
            return Ok(proxy.clone());
        }

        inner.proxy_order.push(endpoint.id);
        inner.proxies.insert(endpoint.id, endpoint.clone());
        Ok(endpoint.clone())
    }

    async fn set_proxy_active(
        &self,
        id: Uuid,
        active: bool,
        verified_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        let proxy = inner.proxies.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        proxy.active = active;
        proxy.last_verified_at = verified_at;
        Ok(())
    }

    async fn record_bandwidth(&self, owner_user_id: Uuid, mbps: f64) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        inner.bandwidth.push(BandwidthEntry {
            owner_user_id,
            mbps,
            recorded_at: Utc::now(),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::{TaskPriority, TaskStatus};

    #[tokio::test]
    async fn test_task_roundtrip() {
        let store = MemoryRecordStore::new();
        let task = Task::new("https://example.com", Uuid::new_v4(), TaskPriority::Normal);

        store.insert_task(&task).await.expect("insert should work");
        let loaded = store
            .task(task.id)
            .await
            .expect("load should work")
            .expect("task should exist");

        assert_eq!(loaded.id, task.id);
        assert_eq!(loaded.status, TaskStatus::Pending);
        assert!(store.task(Uuid::new_v4()).await.expect("load").is_none());
    }

    #[tokio::test]
    async fn test_lifecycle_transitions() {
        let store = MemoryRecordStore::new();
        let task = Task::new("https://example.com", Uuid::new_v4(), TaskPriority::High);
        store.insert_task(&task).await.expect("insert");

        let proxy_id = Uuid::new_v4();
        let updated = store
            .mark_in_progress(task.id, proxy_id)
            .await
            .expect("transition should work");
        assert_eq!(updated.status, TaskStatus::InProgress);
        assert_eq!(updated.assigned_proxy_id, Some(proxy_id));

        let completed = store
            .complete_task(task.id, TaskPayload::new(b"body".to_vec()), 2.0)
            .await
            .expect("completion should work");
        assert_eq!(completed.status, TaskStatus::Completed);
        assert!((completed.bandwidth_used - 2.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_fail_task_persists_retry_count() {
        let store = MemoryRecordStore::new();
        let task = Task::new("https://example.com", Uuid::new_v4(), TaskPriority::Normal);
        store.insert_task(&task).await.expect("insert");

        let failed = store.fail_task(task.id, 2).await.expect("fail should work");

        assert_eq!(failed.status, TaskStatus::Failed);
        assert_eq!(failed.retry_count, 2);
        assert!(failed.payload.is_none());

        let reloaded = store
            .task(task.id)
            .await
            .expect("load")
            .expect("task should exist");
        assert_eq!(reloaded.retry_count, 2);
    }

    #[tokio::test]
    async fn test_transitions_on_missing_task_fail() {
        let store = MemoryRecordStore::new();
        let missing = Uuid::new_v4();

        assert!(store.mark_in_progress(missing, Uuid::new_v4()).await.is_err());
        assert!(store.fail_task(missing, 1).await.is_err());
    }

    #[tokio::test]
    async fn test_active_proxies_keep_insertion_order() {
        let store = MemoryRecordStore::new();
        let owner = Uuid::new_v4();
        let first = ProxyEndpoint::new("203.0.113.1", owner);
        let second = ProxyEndpoint::new("203.0.113.2", owner);

        store.upsert_proxy(&first).await.expect("upsert");
        store.upsert_proxy(&second).await.expect("upsert");

        let active = store.active_proxies().await.expect("list");
        assert_eq!(active.len(), 2);
        assert_eq!(active[0].id, first.id);
        assert_eq!(active[1].id, second.id);
    }

    #[tokio::test]
    async fn test_upsert_reactivates_same_address() {
        let store = MemoryRecordStore::new();
        let owner = Uuid::new_v4();
        let proxy = ProxyEndpoint::new("203.0.113.1", owner);
        store.upsert_proxy(&proxy).await.expect("upsert");

        store
            .set_proxy_active(proxy.id, false, Utc::now())
            .await
            .expect("deactivate");
        assert!(store.active_proxies().await.expect("list").is_empty());

        // Re-registering the same address flips it back to active.
        let again = ProxyEndpoint::new("203.0.113.1", owner);
        store.upsert_proxy(&again).await.expect("upsert");

        let active = store.active_proxies().await.expect("list");
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, proxy.id, "existing record is reused");
    }

    #[tokio::test]
    async fn test_first_active_proxy_for_owner() {
        let store = MemoryRecordStore::new();
        let owner = Uuid::new_v4();
        let other = Uuid::new_v4();

        store
            .upsert_proxy(&ProxyEndpoint::new("203.0.113.1", other))
            .await
            .expect("upsert");
        assert!(store
            .first_active_proxy_for_owner(owner)
            .await
            .expect("lookup")
            .is_none());

        let owned = ProxyEndpoint::new("203.0.113.2", owner);
        store.upsert_proxy(&owned).await.expect("upsert");

        let found = store
            .first_active_proxy_for_owner(owner)
            .await
            .expect("lookup")
            .expect("proxy should exist");
        assert_eq!(found.id, owned.id);
    }

    #[tokio::test]
    async fn test_bandwidth_ledger() {
        let store = MemoryRecordStore::new();
        let owner = Uuid::new_v4();

        store.record_bandwidth(owner, 1.5).await.expect("record");
        store.record_bandwidth(owner, 0.5).await.expect("record");

        let entries = store.bandwidth_entries().await;
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].owner_user_id, owner);
        assert!((entries[0].mbps - 1.5).abs() < f64::EPSILON);
    }
}
