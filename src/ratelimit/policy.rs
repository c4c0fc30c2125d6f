//! The closed set of rate limiting policies.

use tracing::trace;

use super::{
    FixedWindowPolicy, LeakyBucketPolicy, SlidingWindowCounterPolicy, SlidingWindowLogPolicy,
    TokenBucketPolicy,
};
use crate::error::{GatekeeperError, Result};
use crate::store::StoreClient;

/// A rate limiting policy: one algorithm variant bound to concrete,
/// immutable parameters.
///
/// Policies are constructed once at startup, validated, and shared read-only
/// across all concurrent decisions. Each stateful variant owns its key layout
/// and runs its entire state transition as one atomic store transaction;
/// nothing else reads or writes those keys.
pub enum Policy {
    /// Admit unconditionally, no store access
    AllowAll,
    /// Deny unconditionally, no store access
    DenyAll,
    TokenBucket(TokenBucketPolicy),
    LeakyBucket(LeakyBucketPolicy),
    FixedWindow(FixedWindowPolicy),
    SlidingWindowLog(SlidingWindowLogPolicy),
    SlidingWindowCounter(SlidingWindowCounterPolicy),
}

impl Policy {
    /// Decide whether one more unit of work may proceed for `client_id`.
    ///
    /// A store or transaction failure propagates to the caller; the engine
    /// never retries and never substitutes a decision of its own.
    pub async fn decide(&self, client_id: &str, store: &dyn StoreClient) -> Result<bool> {
        match self {
            Policy::AllowAll => {
                trace!(client_id = %client_id, "Allow-all policy");
                Ok(true)
            }
            Policy::DenyAll => {
                trace!(client_id = %client_id, "Deny-all policy");
                Ok(false)
            }
            Policy::TokenBucket(policy) => policy.decide(client_id, store).await,
            Policy::LeakyBucket(policy) => policy.decide(client_id, store).await,
            Policy::FixedWindow(policy) => policy.decide(client_id, store).await,
            Policy::SlidingWindowLog(policy) => policy.decide(client_id, store).await,
            Policy::SlidingWindowCounter(policy) => policy.decide(client_id, store).await,
        }
    }
}

/// Reject a non-positive numeric parameter at construction time.
pub(super) fn require_positive(value: i64, name: &str) -> Result<()> {
    if value <= 0 {
        return Err(GatekeeperError::Config(format!(
            "{} must be greater than zero, got {}",
            name, value
        )));
    }
    Ok(())
}

/// Reject an empty key-layout string at construction time.
pub(super) fn require_text(value: &str, name: &str) -> Result<()> {
    if value.is_empty() {
        return Err(GatekeeperError::Config(format!("{} must not be empty", name)));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    #[tokio::test]
    async fn test_allow_all_always_allows() {
        let store = MemoryStore::new();
        for client in ["a", "b", ""] {
            assert!(Policy::AllowAll.decide(client, &store).await.unwrap());
        }
    }

    #[tokio::test]
    async fn test_deny_all_always_denies() {
        let store = MemoryStore::new();
        for client in ["a", "b", ""] {
            assert!(!Policy::DenyAll.decide(client, &store).await.unwrap());
        }
    }

    #[test]
    fn test_require_positive() {
        assert!(require_positive(1, "capacity").is_ok());
        assert!(require_positive(0, "capacity").is_err());
        assert!(require_positive(-5, "capacity").is_err());
    }

    #[test]
    fn test_require_text() {
        assert!(require_text("prefix:", "key prefix").is_ok());
        assert!(require_text("", "key prefix").is_err());
    }
}
