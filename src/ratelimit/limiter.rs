//! Decision façade.

use std::sync::Arc;

use tracing::{debug, trace};

use super::PolicyRegistry;
use crate::error::Result;
use crate::store::StoreClient;

/// The rate limiter consulted by the transport layer.
///
/// Holds the immutable policy registry and the shared store client; safe to
/// share across all concurrent callers.
pub struct RateLimiter {
    registry: PolicyRegistry,
    store: Arc<dyn StoreClient>,
}

impl RateLimiter {
    pub fn new(registry: PolicyRegistry, store: Arc<dyn StoreClient>) -> Self {
        Self { registry, store }
    }

    /// Decide whether one more request from `client_id` may proceed under
    /// the named policy.
    ///
    /// An unknown policy name is a deny, not an error, and performs no store
    /// access. A store failure propagates: the engine does not retry and
    /// does not pick a fallback decision (that choice belongs to the
    /// transport).
    pub async fn check(&self, client_id: &str, policy_name: &str) -> Result<bool> {
        let Some(policy) = self.registry.get(policy_name) else {
            debug!(policy = %policy_name, client_id = %client_id, "Unknown policy, denying");
            return Ok(false);
        };

        trace!(policy = %policy_name, client_id = %client_id, "Evaluating policy");
        policy.decide(client_id, self.store.as_ref()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PoliciesConfig;
    use crate::store::testing::{FailingStore, UnreachableStore};
    use crate::store::MemoryStore;

    fn limiter_with(store: Arc<dyn StoreClient>) -> RateLimiter {
        let registry = PolicyRegistry::from_config(&PoliciesConfig::default()).unwrap();
        RateLimiter::new(registry, store)
    }

    #[tokio::test]
    async fn test_unknown_policy_denies_without_store_access() {
        let limiter = limiter_with(Arc::new(UnreachableStore));
        assert!(!limiter.check("client", "nosuchpolicy").await.unwrap());
    }

    #[tokio::test]
    async fn test_stateless_policies_never_touch_the_store() {
        let limiter = limiter_with(Arc::new(UnreachableStore));
        assert!(limiter.check("client", "alwaysallow").await.unwrap());
        assert!(!limiter.check("client", "denyall").await.unwrap());
    }

    #[tokio::test]
    async fn test_store_failure_propagates() {
        let limiter = limiter_with(Arc::new(FailingStore));
        assert!(limiter.check("client", "tokenbucket").await.is_err());
    }

    #[tokio::test]
    async fn test_every_stateful_policy_decides_through_the_store() {
        let limiter = limiter_with(Arc::new(MemoryStore::new()));
        for name in [
            "tokenbucket",
            "leakybucket",
            "fixedwindowcounter",
            "slidingwindowlog",
            "slidingwindowcounter",
        ] {
            assert!(limiter.check("client", name).await.unwrap(), "policy {}", name);
        }
    }
}
