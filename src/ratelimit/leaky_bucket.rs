//! Leaky bucket policy.
//!
//! The bucket level rises by the request cost on every admission and drains
//! at a constant rate. A request is admitted while the post-leak level has
//! not yet gone over capacity; the level check happens before this request's
//! cost is added, so the level itself may briefly sit above capacity.

use tracing::trace;

use super::policy::{require_positive, require_text};
use crate::error::Result;
use crate::store::{unix_millis, StoreClient};

pub struct LeakyBucketPolicy {
    /// Maximum level of the bucket
    capacity: i64,
    /// Units drained per second
    leak_rate: i64,
    /// Units added per admitted request
    cost: i64,
    key_prefix: String,
    level_suffix: String,
    timestamp_suffix: String,
}

impl LeakyBucketPolicy {
    pub fn new(
        capacity: i64,
        leak_rate: i64,
        cost: i64,
        key_prefix: &str,
        level_suffix: &str,
        timestamp_suffix: &str,
    ) -> Result<Self> {
        require_positive(capacity, "leaky bucket capacity")?;
        require_positive(leak_rate, "leaky bucket leak rate")?;
        require_positive(cost, "leaky bucket cost")?;
        require_text(key_prefix, "leaky bucket key prefix")?;
        require_text(level_suffix, "leaky bucket level suffix")?;
        require_text(timestamp_suffix, "leaky bucket timestamp suffix")?;

        Ok(Self {
            capacity,
            leak_rate,
            cost,
            key_prefix: key_prefix.to_string(),
            level_suffix: level_suffix.to_string(),
            timestamp_suffix: timestamp_suffix.to_string(),
        })
    }

    pub async fn decide(&self, client_id: &str, store: &dyn StoreClient) -> Result<bool> {
        let base = format!("{}{}", self.key_prefix, client_id);

        trace!(client_id = %client_id, key = %base, "Leaky bucket decision");

        store
            .leaky_bucket_acquire(
                &format!("{}{}", base, self.level_suffix),
                &format!("{}{}", base, self.timestamp_suffix),
                self.capacity,
                self.leak_rate,
                unix_millis(),
                self.cost,
            )
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn policy(capacity: i64, leak_rate: i64) -> LeakyBucketPolicy {
        LeakyBucketPolicy::new(
            capacity,
            leak_rate,
            1,
            "leaky_bucket_strategy:",
            ":tokens",
            ":timestamp",
        )
        .unwrap()
    }

    async fn rewind_timestamp(store: &MemoryStore, client: &str, millis: i64) {
        let key = format!("leaky_bucket_strategy:{}:timestamp", client);
        let stamp: i64 = store.get(&key).await.unwrap().unwrap().parse().unwrap();
        store.set(&key, &(stamp - millis).to_string()).await.unwrap();
    }

    #[tokio::test]
    async fn test_bucket_fills_to_boundary() {
        let store = MemoryStore::new();
        let policy = policy(20, 2);

        // The level check precedes adding the request's unit, so pre-add
        // levels 0 through 20 are all admitted: 21 requests fill the bucket
        for i in 0..21 {
            assert!(policy.decide("client", &store).await.unwrap(), "call {}", i);
        }
        assert!(!policy.decide("client", &store).await.unwrap());
    }

    #[tokio::test]
    async fn test_leak_frees_room_after_one_second() {
        let store = MemoryStore::new();
        let policy = policy(20, 2);

        for _ in 0..21 {
            assert!(policy.decide("client", &store).await.unwrap());
        }
        assert!(!policy.decide("client", &store).await.unwrap());

        rewind_timestamp(&store, "client", 1000).await;

        // One second drains 2 units (level 21 -> 19); levels 19 and 20 pass
        // the over-capacity check, then the bucket is full again
        assert!(policy.decide("client", &store).await.unwrap());
        assert!(policy.decide("client", &store).await.unwrap());
        assert!(!policy.decide("client", &store).await.unwrap());
    }

    #[tokio::test]
    async fn test_level_never_drains_below_zero() {
        let store = MemoryStore::new();
        let policy = policy(20, 2);

        assert!(policy.decide("client", &store).await.unwrap());

        // A long idle period drains far more than the level holds
        rewind_timestamp(&store, "client", 3_600_000).await;

        assert!(policy.decide("client", &store).await.unwrap());
        let level: i64 = store
            .get("leaky_bucket_strategy:client:tokens")
            .await
            .unwrap()
            .unwrap()
            .parse()
            .unwrap();
        assert_eq!(level, 1);
    }

    #[tokio::test]
    async fn test_clock_regression_does_not_leak() {
        let store = MemoryStore::new();
        let policy = policy(5, 2);

        let future = unix_millis() + 60_000;
        store
            .set("leaky_bucket_strategy:client:timestamp", &future.to_string())
            .await
            .unwrap();
        store
            .set("leaky_bucket_strategy:client:tokens", "6")
            .await
            .unwrap();

        // Elapsed clamps to zero: level 6 stays over capacity 5, denied
        assert!(!policy.decide("client", &store).await.unwrap());
    }

    #[tokio::test]
    async fn test_clients_do_not_share_state() {
        let store = MemoryStore::new();
        let policy = policy(2, 1);

        for _ in 0..3 {
            assert!(policy.decide("client_a", &store).await.unwrap());
        }
        assert!(!policy.decide("client_a", &store).await.unwrap());

        assert!(policy.decide("client_b", &store).await.unwrap());
    }

    #[test]
    fn test_rejects_invalid_parameters() {
        assert!(LeakyBucketPolicy::new(0, 2, 1, "p:", ":l", ":ts").is_err());
        assert!(LeakyBucketPolicy::new(20, -2, 1, "p:", ":l", ":ts").is_err());
        assert!(LeakyBucketPolicy::new(20, 2, 0, "p:", ":l", ":ts").is_err());
        assert!(LeakyBucketPolicy::new(20, 2, 1, "", ":l", ":ts").is_err());
    }
}
