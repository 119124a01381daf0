//! Proxy selection and liveness updates.
//!
//! Selection is first-match over the active endpoints in listing order,
//! filtered by the ephemeral health registry. No load balancing or
//! fairness is promised; a livelier strategy could be substituted without
//! changing any caller.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info};
use uuid::Uuid;

use crate::coord::ProxyHealthRegistry;
use crate::error::DistributionError;
use crate::storage::{ProxyEndpoint, RecordStore};

/// Selects live proxies and keeps both liveness states in step.
pub struct ProxyManager {
    registry: ProxyHealthRegistry,
    store: Arc<dyn RecordStore>,
}

impl ProxyManager {
    /// Creates a manager over the shared registry and record store.
    pub fn new(registry: ProxyHealthRegistry, store: Arc<dyn RecordStore>) -> Self {
        Self { registry, store }
    }

    /// Returns the first active endpoint the registry reports healthy, or
    /// `None` if no candidate qualifies.
    pub async fn available_proxy(&self) -> Result<Option<ProxyEndpoint>, DistributionError> {
        for proxy in self.store.active_proxies().await? {
            if self.registry.is_healthy(proxy.id).await? {
                debug!(proxy_id = %proxy.id, address = %proxy.address, "Selected proxy");
                return Ok(Some(proxy));
            }
        }

        Ok(None)
    }

    /// Records a liveness observation in the registry and the durable
    /// record.
    ///
    /// The registry is written first; if the durable write then fails it
    /// may briefly lead the record. Both writes eventually land under
    /// normal operation, and there is no two-phase commit between them.
    pub async fn update_proxy_health(
        &self,
        proxy_id: Uuid,
        healthy: bool,
    ) -> Result<(), DistributionError> {
        self.registry.set_healthy(proxy_id, healthy).await?;
        self.store
            .set_proxy_active(proxy_id, healthy, Utc::now())
            .await?;

        info!(proxy_id = %proxy_id, healthy = healthy, "Proxy health updated");
        Ok(())
    }

    /// Returns the underlying health registry.
    pub fn registry(&self) -> &ProxyHealthRegistry {
        &self.registry
    }
}
