//! Sliding window log policy.
//!
//! Records one sorted-set member per admitted request, scored by the store
//! clock in seconds. Every decision first prunes members older than the
//! window, then admits while the log holds fewer than `capacity` entries.
//! The log carries a TTL of one window so abandoned keys clean themselves
//! up. Memory cost scales with request volume inside the window; that is the
//! price of an exact count.

use tracing::trace;

use super::policy::{require_positive, require_text};
use crate::error::Result;
use crate::store::StoreClient;

pub struct SlidingWindowLogPolicy {
    /// Maximum number of requests allowed in the window
    capacity: i64,
    /// Window duration in seconds
    window_seconds: i64,
    key_prefix: String,
    log_suffix: String,
}

impl SlidingWindowLogPolicy {
    pub fn new(
        capacity: i64,
        window_seconds: i64,
        key_prefix: &str,
        log_suffix: &str,
    ) -> Result<Self> {
        require_positive(capacity, "sliding window log capacity")?;
        require_positive(window_seconds, "sliding window log duration")?;
        require_text(key_prefix, "sliding window log key prefix")?;
        require_text(log_suffix, "sliding window log suffix")?;

        Ok(Self {
            capacity,
            window_seconds,
            key_prefix: key_prefix.to_string(),
            log_suffix: log_suffix.to_string(),
        })
    }

    pub async fn decide(&self, client_id: &str, store: &dyn StoreClient) -> Result<bool> {
        let log_key = format!("{}{}{}", self.key_prefix, client_id, self.log_suffix);

        trace!(client_id = %client_id, key = %log_key, "Sliding window log decision");

        store
            .sliding_log_acquire(&log_key, self.capacity, self.window_seconds)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use std::time::Duration;

    fn policy(capacity: i64, window_seconds: i64) -> SlidingWindowLogPolicy {
        SlidingWindowLogPolicy::new(
            capacity,
            window_seconds,
            "sliding_window_log_strategy:",
            ":log",
        )
        .unwrap()
    }

    const LOG_KEY: &str = "sliding_window_log_strategy:client:log";

    #[tokio::test]
    async fn test_log_fills_to_capacity() {
        let store = MemoryStore::new();
        let policy = policy(20, 60);

        for i in 0..20 {
            assert!(policy.decide("client", &store).await.unwrap(), "call {}", i);
        }
        assert!(!policy.decide("client", &store).await.unwrap());
        assert_eq!(store.zcard(LOG_KEY).await.unwrap(), 20);
    }

    #[tokio::test]
    async fn test_entries_age_out_of_the_window() {
        let store = MemoryStore::new();
        let policy = policy(20, 60);

        for _ in 0..20 {
            assert!(policy.decide("client", &store).await.unwrap());
        }
        assert!(!policy.decide("client", &store).await.unwrap());

        // Past the window every recorded timestamp is prunable again
        store.advance(Duration::from_secs(61));
        assert!(policy.decide("client", &store).await.unwrap());
    }

    #[tokio::test]
    async fn test_requests_spread_within_window_still_count() {
        let store = MemoryStore::new();
        let policy = policy(10, 60);

        for _ in 0..5 {
            assert!(policy.decide("client", &store).await.unwrap());
        }
        // Half a window later the earlier entries still count
        store.advance(Duration::from_secs(30));
        for _ in 0..5 {
            assert!(policy.decide("client", &store).await.unwrap());
        }
        assert!(!policy.decide("client", &store).await.unwrap());

        // Another half window ages out the first batch only
        store.advance(Duration::from_secs(31));
        for i in 0..5 {
            assert!(policy.decide("client", &store).await.unwrap(), "call {}", i);
        }
        assert!(!policy.decide("client", &store).await.unwrap());
    }

    #[tokio::test]
    async fn test_members_are_unique_per_insertion() {
        let store = MemoryStore::new();
        let policy = policy(20, 60);

        // Back-to-back requests in the same time unit must not collapse
        // into one member
        for _ in 0..10 {
            assert!(policy.decide("client", &store).await.unwrap());
        }
        assert_eq!(store.zcard(LOG_KEY).await.unwrap(), 10);
    }

    #[tokio::test]
    async fn test_clients_do_not_share_state() {
        let store = MemoryStore::new();
        let policy = policy(2, 60);

        assert!(policy.decide("client_a", &store).await.unwrap());
        assert!(policy.decide("client_a", &store).await.unwrap());
        assert!(!policy.decide("client_a", &store).await.unwrap());

        assert!(policy.decide("client_b", &store).await.unwrap());
    }

    #[test]
    fn test_rejects_invalid_parameters() {
        assert!(SlidingWindowLogPolicy::new(0, 60, "p:", ":log").is_err());
        assert!(SlidingWindowLogPolicy::new(20, -1, "p:", ":log").is_err());
        assert!(SlidingWindowLogPolicy::new(20, 60, "", ":log").is_err());
        assert!(SlidingWindowLogPolicy::new(20, 60, "p:", "").is_err());
    }
}
