//! Proxy endpoint records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A user-contributed network egress point.
///
/// Registration creates the record; the distribution core owns the
/// liveness fields (`active`, `last_verified_at`) and flips them as fetch
/// outcomes come in.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyEndpoint {
    /// Unique identifier for this endpoint.
    pub id: Uuid,
    /// Network address fetches are routed through (host or IP).
    pub address: String,
    /// User credited for bandwidth consumed through this endpoint.
    pub owner_user_id: Uuid,
    /// Durable liveness flag; may briefly trail the ephemeral registry.
    pub active: bool,
    /// When the endpoint was last verified by a health update.
    pub last_verified_at: DateTime<Utc>,
}

impl ProxyEndpoint {
    /// Creates a new active endpoint verified now.
    pub fn new(address: impl Into<String>, owner_user_id: Uuid) -> Self {
        Self {
            id: Uuid::new_v4(),
            address: address.into(),
            owner_user_id,
            active: true,
            last_verified_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_proxy_endpoint_new() {
        let owner = Uuid::new_v4();
        let proxy = ProxyEndpoint::new("203.0.113.7", owner);

        assert!(!proxy.id.is_nil());
        assert_eq!(proxy.address, "203.0.113.7");
        assert_eq!(proxy.owner_user_id, owner);
        assert!(proxy.active);
    }

    #[test]
    fn test_proxy_endpoint_serialization() {
        let proxy = ProxyEndpoint::new("198.51.100.2", Uuid::new_v4());

        let json = serde_json::to_string(&proxy).expect("serialization should work");
        let parsed: ProxyEndpoint =
            serde_json::from_str(&json).expect("deserialization should work");

        assert_eq!(parsed.id, proxy.id);
        assert_eq!(parsed.address, proxy.address);
        assert!(parsed.active);
    }
}
