//! Redis-backed store client.
//!
//! Every policy transaction runs as a Lua script so the read-compute-write
//! sequence is indivisible with respect to concurrent transactions on the
//! same keys. Scripts are registered once at construction; the connection
//! manager transparently reconnects on failure.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Script};
use tracing::{debug, trace};

use super::{StoreClient, StoreTime};
use crate::error::Result;

const TOKEN_BUCKET_SCRIPT: &str = r#"
local tokens_key = KEYS[1]
local timestamp_key = KEYS[2]
local capacity = tonumber(ARGV[1])
local refill_rate = tonumber(ARGV[2])
local now = tonumber(ARGV[3])
local tokens_requested = tonumber(ARGV[4])

local last_refilled = tonumber(redis.call("get", timestamp_key) or "0")
local current_tokens = tonumber(redis.call("get", tokens_key) or capacity)

local delta = math.max(0, now - last_refilled)
local tokens_to_refill = math.floor(delta / 1000) * refill_rate
current_tokens = math.min(capacity, current_tokens + tokens_to_refill)

local allowed = current_tokens >= tokens_requested
if allowed then
    current_tokens = current_tokens - tokens_requested
    redis.call("set", tokens_key, current_tokens)
    redis.call("set", timestamp_key, now)
end

return allowed
"#;

const LEAKY_BUCKET_SCRIPT: &str = r#"
local level_key = KEYS[1]
local timestamp_key = KEYS[2]
local capacity = tonumber(ARGV[1])
local leak_rate = tonumber(ARGV[2])
local now = tonumber(ARGV[3])
local units_requested = tonumber(ARGV[4])

local last_leaked = tonumber(redis.call("get", timestamp_key) or "0")
local current_level = tonumber(redis.call("get", level_key) or "0")

local delta = math.max(0, now - last_leaked)
local units_to_leak = math.floor(delta / 1000) * leak_rate
current_level = math.max(0, current_level - units_to_leak)

local allowed = capacity >= current_level
if allowed then
    current_level = current_level + units_requested
    redis.call("set", level_key, current_level)
    redis.call("set", timestamp_key, now)
end

return allowed
"#;

const FIXED_WINDOW_SCRIPT: &str = r#"
local request_count_key = KEYS[1]
local last_timestamp_key = KEYS[2]
local capacity = tonumber(ARGV[1])
local window_in_seconds = tonumber(ARGV[2])
local now = tonumber(ARGV[3])

local last_timestamp = tonumber(redis.call("get", last_timestamp_key) or "0")
local request_count = tonumber(redis.call("get", request_count_key) or "0")

local delta = math.max(0, now - last_timestamp)
local reset_window = math.floor(delta / 1000) >= window_in_seconds
if reset_window then
    request_count = 0
    last_timestamp = now
    redis.call("set", last_timestamp_key, last_timestamp)
end

request_count = request_count + 1
redis.call("set", request_count_key, request_count)

return capacity > request_count
"#;

const SLIDING_LOG_SCRIPT: &str = r#"
local log_key = KEYS[1]
local capacity = tonumber(ARGV[1])
local window_in_seconds = tonumber(ARGV[2])

local current_time = redis.call("TIME")
local window_start = tonumber(current_time[1]) - window_in_seconds

redis.call('ZREMRANGEBYSCORE', log_key, 0, window_start)

local request_count = redis.call('ZCARD', log_key)

if request_count < capacity then
    redis.call('ZADD', log_key, tonumber(current_time[1]), tostring(current_time[1]) .. tostring(current_time[2]))
    redis.call('EXPIRE', log_key, window_in_seconds)
    return true
else
    return false
end
"#;

const SLIDING_COUNTER_SCRIPT: &str = r#"
local current_window_start_key = KEYS[1]
local current_window_count_key = KEYS[2]
local last_window_count_key = KEYS[3]

local capacity = tonumber(ARGV[1])
local window_in_seconds = tonumber(ARGV[2])

local current_window_start = tonumber(redis.call("get", current_window_start_key) or "0")
local current_window_count = tonumber(redis.call("get", current_window_count_key) or "0")
local last_window_count = tonumber(redis.call("get", last_window_count_key) or "0")

local current_time = redis.call("TIME")
local window = current_time[1] - current_window_start
if window >= window_in_seconds then
    last_window_count = current_window_count
    current_window_count = 0
    current_window_start = current_time[1]

    redis.call("set", last_window_count_key, last_window_count)
    redis.call("set", current_window_start_key, current_window_start)
end

local weighted_count = math.floor((last_window_count * (window_in_seconds - window) / window_in_seconds)) + current_window_count

if weighted_count <= capacity then
    current_window_count = current_window_count + 1
    redis.call("set", current_window_count_key, current_window_count)
    return true
else
    return false
end
"#;

/// Store client backed by a shared Redis instance.
pub struct RedisStore {
    conn: ConnectionManager,
    token_bucket: Script,
    leaky_bucket: Script,
    fixed_window: Script,
    sliding_log: Script,
    sliding_counter: Script,
}

impl RedisStore {
    /// Connect to Redis at the given URL (e.g. "redis://localhost:6379").
    pub async fn connect(url: &str) -> Result<Self> {
        debug!(url = %url, "Connecting to Redis store");

        let client = redis::Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;

        Ok(Self {
            conn,
            token_bucket: Script::new(TOKEN_BUCKET_SCRIPT),
            leaky_bucket: Script::new(LEAKY_BUCKET_SCRIPT),
            fixed_window: Script::new(FIXED_WINDOW_SCRIPT),
            sliding_log: Script::new(SLIDING_LOG_SCRIPT),
            sliding_counter: Script::new(SLIDING_COUNTER_SCRIPT),
        })
    }
}

#[async_trait]
impl StoreClient for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.conn.clone();
        Ok(conn.get(key).await?)
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        conn.set::<_, _, ()>(key, value).await?;
        Ok(())
    }

    async fn set_with_expiry(&self, key: &str, value: &str, ttl_seconds: u64) -> Result<()> {
        let mut conn = self.conn.clone();
        conn.set_ex::<_, _, ()>(key, value, ttl_seconds).await?;
        Ok(())
    }

    async fn zadd(&self, key: &str, score: f64, member: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        conn.zadd::<_, _, _, ()>(key, member, score).await?;
        Ok(())
    }

    async fn zremrangebyscore(&self, key: &str, min: f64, max: f64) -> Result<()> {
        let mut conn = self.conn.clone();
        conn.zrembyscore::<_, _, _, ()>(key, min, max).await?;
        Ok(())
    }

    async fn zcard(&self, key: &str) -> Result<u64> {
        let mut conn = self.conn.clone();
        Ok(conn.zcard(key).await?)
    }

    async fn server_time(&self) -> Result<StoreTime> {
        let mut conn = self.conn.clone();
        let (seconds, micros): (i64, i64) = redis::cmd("TIME").query_async(&mut conn).await?;
        Ok(StoreTime { seconds, micros })
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

        let mut conn = self.conn.clone();
        let allowed: bool = self
            .token_bucket
            .key(tokens_key)
            .key(timestamp_key)
            .arg(capacity)
            .arg(refill_rate)
            .arg(now_ms)
            .arg(cost)
            .invoke_async(&mut conn)
            .await?;
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

        let mut conn = self.conn.clone();
        let allowed: bool = self
            .leaky_bucket
            .key(level_key)
            .key(timestamp_key)
            .arg(capacity)
            .arg(leak_rate)
            .arg(now_ms)
            .arg(cost)
            .invoke_async(&mut conn)
            .await?;
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

        let mut conn = self.conn.clone();
        let allowed: bool = self
            .fixed_window
            .key(count_key)
            .key(timestamp_key)
            .arg(capacity)
            .arg(window_seconds)
            .arg(now_ms)
            .invoke_async(&mut conn)
            .await?;
        Ok(allowed)
    }

    async fn sliding_log_acquire(
        &self,
        log_key: &str,
        capacity: i64,
        window_seconds: i64,
    ) -> Result<bool> {
        trace!(log_key = %log_key, capacity = capacity, "Sliding log transaction");

        let mut conn = self.conn.clone();
        let allowed: bool = self
            .sliding_log
            .key(log_key)
            .arg(capacity)
            .arg(window_seconds)
            .invoke_async(&mut conn)
            .await?;
        Ok(allowed)
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

        let mut conn = self.conn.clone();
        let allowed: bool = self
            .sliding_counter
            .key(window_start_key)
            .key(current_count_key)
            .key(previous_count_key)
            .arg(capacity)
            .arg(window_seconds)
            .invoke_async(&mut conn)
            .await?;
        Ok(allowed)
    }
}
