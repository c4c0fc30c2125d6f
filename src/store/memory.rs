//! In-process store client.
//!
//! Holds all state behind a single mutex; each transaction keeps the lock for
//! its whole read-compute-write span, which gives the same per-key
//! linearization the Redis scripts give. Suitable for single-instance
//! deployments, and doubles as the test fixture: the store clock can be
//! advanced manually to exercise window expiry without waiting.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use tracing::trace;

use super::{StoreClient, StoreTime};
use crate::error::Result;

#[derive(Debug, Clone)]
struct StringEntry {
    value: String,
    /// Expiry deadline in store-clock microseconds, if any
    expires_at: Option<i64>,
}

#[derive(Debug, Default)]
struct SortedSet {
    /// (member, score) pairs; members are unique
    entries: Vec<(String, f64)>,
    expires_at: Option<i64>,
}

#[derive(Debug, Default)]
struct MemoryState {
    strings: HashMap<String, StringEntry>,
    zsets: HashMap<String, SortedSet>,
    /// Manual offset added to the wall clock, for tests
    offset: Duration,
    /// Monotonic insertion counter, keeps log members unique within one microsecond
    seq: u64,
}

impl MemoryState {
    fn now_micros(&self) -> i64 {
        let wall = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        (wall + self.offset).as_micros() as i64
    }

    fn now(&self) -> StoreTime {
        let micros = self.now_micros();
        StoreTime {
            seconds: micros / 1_000_000,
            micros: micros % 1_000_000,
        }
    }

    fn get_string(&mut self, key: &str) -> Option<String> {
        let now = self.now_micros();
        let expired = self
            .strings
            .get(key)
            .is_some_and(|entry| entry.expires_at.is_some_and(|deadline| deadline <= now));
        if expired {
            self.strings.remove(key);
            return None;
        }
        self.strings.get(key).map(|entry| entry.value.clone())
    }

    /// Read a counter the way the Lua scripts do: absent or non-numeric
    /// values fall back to the default.
    fn get_i64(&mut self, key: &str, default: i64) -> i64 {
        self.get_string(key)
            .and_then(|v| v.parse().ok())
            .unwrap_or(default)
    }

    fn set_string(&mut self, key: &str, value: String, ttl: Option<Duration>) {
        let expires_at = ttl.map(|t| self.now_micros() + t.as_micros() as i64);
        self.strings
            .insert(key.to_string(), StringEntry { value, expires_at });
    }

    fn set_i64(&mut self, key: &str, value: i64) {
        self.set_string(key, value.to_string(), None);
    }

    fn zset(&mut self, key: &str) -> &mut SortedSet {
        let now = self.now_micros();
        if self
            .zsets
            .get(key)
            .is_some_and(|set| set.expires_at.is_some_and(|deadline| deadline <= now))
        {
            self.zsets.remove(key);
        }
        self.zsets.entry(key.to_string()).or_default()
    }

    fn zset_add(&mut self, key: &str, score: f64, member: &str) {
        let set = self.zset(key);
        if let Some(entry) = set.entries.iter_mut().find(|(m, _)| m == member) {
            entry.1 = score;
        } else {
            set.entries.push((member.to_string(), score));
        }
    }

    fn zset_remove_range(&mut self, key: &str, min: f64, max: f64) {
        self.zset(key)
            .entries
            .retain(|(_, score)| *score < min || *score > max);
    }

    fn zset_len(&mut self, key: &str) -> u64 {
        self.zset(key).entries.len() as u64
    }

    fn zset_expire(&mut self, key: &str, ttl: Duration) {
        let deadline = self.now_micros() + ttl.as_micros() as i64;
        self.zset(key).expires_at = Some(deadline);
    }
}

/// Store client holding all state in process memory.
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MemoryState::default()),
        }
    }

    /// Advance the store clock. Affects server time and expiry deadlines,
    /// exactly like waiting wall-clock time against a real store.
    pub fn advance(&self, duration: Duration) {
        let mut state = self.state.lock().unwrap();
        state.offset += duration;
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StoreClient for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut state = self.state.lock().unwrap();
        Ok(state.get_string(key))
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.set_string(key, value.to_string(), None);
        Ok(())
    }

    async fn set_with_expiry(&self, key: &str, value: &str, ttl_seconds: u64) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.set_string(
            key,
            value.to_string(),
            Some(Duration::from_secs(ttl_seconds)),
        );
        Ok(())
    }

    async fn zadd(&self, key: &str, score: f64, member: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.zset_add(key, score, member);
        Ok(())
    }

    async fn zremrangebyscore(&self, key: &str, min: f64, max: f64) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.zset_remove_range(key, min, max);
        Ok(())
    }

    async fn zcard(&self, key: &str) -> Result<u64> {
        let mut state = self.state.lock().unwrap();
        Ok(state.zset_len(key))
    }

    async fn server_time(&self) -> Result<StoreTime> {
        let state = self.state.lock().unwrap();
        Ok(state.now())
    }

    async fn token_bucket_acquire(
        &self,
        tokens_key: &str,
        timestamp_key: &str,
        capacity: i64,
        refill_rate: i64,
        now_ms: i64,
        cost: i64,
    ) -> Result<bool> {
        trace!(tokens_key = %tokens_key, capacity = capacity, "Token bucket transaction");

        let mut state = self.state.lock().unwrap();
        let last_refilled = state.get_i64(timestamp_key, 0);
        let current_tokens = state.get_i64(tokens_key, capacity);

        let delta = (now_ms - last_refilled).max(0);
        let refill = delta / 1000 * refill_rate;
        let current_tokens = (current_tokens + refill).min(capacity);

        let allowed = current_tokens >= cost;
        if allowed {
            // A denial writes nothing back, not even the refill
            state.set_i64(tokens_key, current_tokens - cost);
            state.set_i64(timestamp_key, now_ms);
        }
        Ok(allowed)
    }

    async fn leaky_bucket_acquire(
        &self,
        level_key: &str,
        timestamp_key: &str,
        capacity: i64,
        leak_rate: i64,
        now_ms: i64,
        cost: i64,
    ) -> Result<bool> {
        trace!(level_key = %level_key, capacity = capacity, "Leaky bucket transaction");

        let mut state = self.state.lock().unwrap();
        let last_leaked = state.get_i64(timestamp_key, 0);
        let current_level = state.get_i64(level_key, 0);

        let delta = (now_ms - last_leaked).max(0);
        let leaked = delta / 1000 * leak_rate;
        let current_level = (current_level - leaked).max(0);

        // The check is whether the bucket has not yet gone over capacity,
        // before this request's units are added
        let allowed = capacity >= current_level;
        if allowed {
            state.set_i64(level_key, current_level + cost);
            state.set_i64(timestamp_key, now_ms);
        }
        Ok(allowed)
    }

    async fn fixed_window_acquire(
        &self,
        count_key: &str,
        timestamp_key: &str,
        capacity: i64,
        window_seconds: i64,
        now_ms: i64,
    ) -> Result<bool> {
        trace!(count_key = %count_key, capacity = capacity, "Fixed window transaction");

        let mut state = self.state.lock().unwrap();
        let last_timestamp = state.get_i64(timestamp_key, 0);
        let mut request_count = state.get_i64(count_key, 0);

        let delta = (now_ms - last_timestamp).max(0);
        if delta / 1000 >= window_seconds {
            request_count = 0;
            state.set_i64(timestamp_key, now_ms);
        }

        request_count += 1;
        state.set_i64(count_key, request_count);

        Ok(capacity > request_count)
    }

    async fn sliding_log_acquire(
        &self,
        log_key: &str,
        capacity: i64,
        window_seconds: i64,
    ) -> Result<bool> {
        trace!(log_key = %log_key, capacity = capacity, "Sliding log transaction");

        let mut state = self.state.lock().unwrap();
        let now = state.now();
        let window_start = now.seconds - window_seconds;

        state.zset_remove_range(log_key, 0.0, window_start as f64);

        let request_count = state.zset_len(log_key) as i64;
        if request_count < capacity {
            // The sequence suffix keeps members unique even when two requests
            // land in the same microsecond
            state.seq += 1;
            let member = format!("{}{}-{}", now.seconds, now.micros, state.seq);
            state.zset_add(log_key, now.seconds as f64, &member);
            state.zset_expire(log_key, Duration::from_secs(window_seconds as u64));
            Ok(true)
        } else {
            Ok(false)
        }
    }

    async fn sliding_counter_acquire(
        &self,
        window_start_key: &str,
        current_count_key: &str,
        previous_count_key: &str,
        capacity: i64,
        window_seconds: i64,
    ) -> Result<bool> {
        trace!(window_start_key = %window_start_key, capacity = capacity, "Sliding counter transaction");

        let mut state = self.state.lock().unwrap();
        let window_start = state.get_i64(window_start_key, 0);
        let mut current_count = state.get_i64(current_count_key, 0);
        let mut previous_count = state.get_i64(previous_count_key, 0);

        let now = state.now();
        // The elapsed value is intentionally not recomputed after a shift
        let elapsed = now.seconds - window_start;
        if elapsed >= window_seconds {
            previous_count = current_count;
            current_count = 0;

            state.set_i64(previous_count_key, previous_count);
            state.set_i64(window_start_key, now.seconds);
        }

        let weighted = (previous_count as f64 * (window_seconds - elapsed) as f64
            / window_seconds as f64)
            .floor() as i64
            + current_count;

        if weighted <= capacity {
            current_count += 1;
            state.set_i64(current_count_key, current_count);
            Ok(true)
        } else {
            Ok(false)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_get_set_roundtrip() {
        let store = MemoryStore::new();
        assert_eq!(store.get("missing").await.unwrap(), None);

        store.set("key", "value").await.unwrap();
        assert_eq!(store.get("key").await.unwrap(), Some("value".to_string()));
    }

    #[tokio::test]
    async fn test_expiry_honors_advanced_clock() {
        let store = MemoryStore::new();
        store.set_with_expiry("key", "value", 10).await.unwrap();
        assert!(store.get("key").await.unwrap().is_some());

        store.advance(Duration::from_secs(11));
        assert_eq!(store.get("key").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_sorted_set_operations() {
        let store = MemoryStore::new();
        store.zadd("set", 1.0, "a").await.unwrap();
        store.zadd("set", 2.0, "b").await.unwrap();
        store.zadd("set", 3.0, "c").await.unwrap();
        assert_eq!(store.zcard("set").await.unwrap(), 3);

        // Re-adding an existing member updates its score, not the cardinality
        store.zadd("set", 5.0, "a").await.unwrap();
        assert_eq!(store.zcard("set").await.unwrap(), 3);

        store.zremrangebyscore("set", 0.0, 2.0).await.unwrap();
        assert_eq!(store.zcard("set").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_server_time_advances_with_offset() {
        let store = MemoryStore::new();
        let before = store.server_time().await.unwrap();
        store.advance(Duration::from_secs(60));
        let after = store.server_time().await.unwrap();
        assert!(after.seconds >= before.seconds + 60);
    }
}
