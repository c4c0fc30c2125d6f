//! Shared key-value store access.
//!
//! Policies never touch the store through ad-hoc commands: every state
//! transition goes through one of the `*_acquire` transactions below, which
//! are guaranteed indivisible relative to any other transaction on the same
//! keys. The plain read/write operations exist for the boundary contract
//! (diagnostics and tests that inspect persisted state).

mod memory;
mod redis;

pub use memory::MemoryStore;
pub use redis::RedisStore;

use async_trait::async_trait;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::Result;

/// A store-side clock reading: seconds since the epoch plus the sub-second
/// microsecond fraction (the shape of Redis `TIME`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreTime {
    pub seconds: i64,
    pub micros: i64,
}

/// Typed access to the shared key-value store.
///
/// The store client is shared read-only across all policies and all
/// concurrent callers. Each `*_acquire` method executes the full
/// read-compute-decide-write protocol of one algorithm as a single atomic
/// transaction; transactions on the same key are linearized by the store,
/// transactions on different keys may interleave freely.
#[async_trait]
pub trait StoreClient: Send + Sync {
    /// Read a string value, `None` if the key is absent.
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Write a string value.
    async fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Write a string value with a time-to-live in seconds.
    async fn set_with_expiry(&self, key: &str, value: &str, ttl_seconds: u64) -> Result<()>;

    /// Add a member to a sorted set with the given score.
    async fn zadd(&self, key: &str, score: f64, member: &str) -> Result<()>;

    /// Remove all sorted-set members with scores in `[min, max]`.
    async fn zremrangebyscore(&self, key: &str, min: f64, max: f64) -> Result<()>;

    /// Cardinality of a sorted set (0 if the key is absent).
    async fn zcard(&self, key: &str) -> Result<u64>;

    /// Current store-side time.
    async fn server_time(&self) -> Result<StoreTime>;

    /// Token bucket transition. Refills from the elapsed wall-clock time,
    /// then takes `cost` tokens if available. A denied request persists
    /// nothing, not even the refill.
    async fn token_bucket_acquire(
        &self,
        tokens_key: &str,
        timestamp_key: &str,
        capacity: i64,
        refill_rate: i64,
        now_ms: i64,
        cost: i64,
    ) -> Result<bool>;

    /// Leaky bucket transition. Drains from the elapsed wall-clock time, then
    /// admits if the post-leak level has not exceeded capacity and adds
    /// `cost` units.
    async fn leaky_bucket_acquire(
        &self,
        level_key: &str,
        timestamp_key: &str,
        capacity: i64,
        leak_rate: i64,
        now_ms: i64,
        cost: i64,
    ) -> Result<bool>;

    /// Fixed window transition. Resets the counter when the window has
    /// elapsed, increments it, and admits while `capacity > count`.
    async fn fixed_window_acquire(
        &self,
        count_key: &str,
        timestamp_key: &str,
        capacity: i64,
        window_seconds: i64,
        now_ms: i64,
    ) -> Result<bool>;

    /// Sliding window log transition. Prunes members older than the window
    /// (using the store clock), then admits while the log holds fewer than
    /// `capacity` entries, recording the request with a unique member and
    /// refreshing the log's expiry.
    async fn sliding_log_acquire(
        &self,
        log_key: &str,
        capacity: i64,
        window_seconds: i64,
    ) -> Result<bool>;

    /// Sliding window counter transition. Shifts the sub-windows when the
    /// current one has elapsed (store clock), then admits while the weighted
    /// trailing count does not exceed `capacity`.
    async fn sliding_counter_acquire(
        &self,
        window_start_key: &str,
        current_count_key: &str,
        previous_count_key: &str,
        capacity: i64,
        window_seconds: i64,
    ) -> Result<bool>;
}

/// Caller-process wall clock in milliseconds since the epoch.
///
/// The bucket and fixed-window policies stamp state with this clock; the
/// sliding policies read the store clock inside their transactions instead.
pub fn unix_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unix_millis_is_plausible() {
        let ms = unix_millis();
        // Sometime after 2020-01-01
        assert!(ms > 1_577_836_800_000);
    }
}
