//! Token bucket policy.
//!
//! Tokens are added to a fixed-capacity bucket at a constant rate; each
//! admitted request removes its cost in tokens. A request is denied when the
//! bucket holds fewer tokens than the request costs, and a denied request
//! changes nothing in the store: the refill computed while deciding is
//! discarded, so neither the token count nor the refill timestamp advances.

use tracing::trace;

use super::policy::{require_positive, require_text};
use crate::error::Result;
use crate::store::{unix_millis, StoreClient};

pub struct TokenBucketPolicy {
    /// Maximum number of tokens the bucket holds
    capacity: i64,
    /// Tokens added per second
    refill_rate: i64,
    /// Tokens removed per admitted request
    cost: i64,
    key_prefix: String,
    tokens_suffix: String,
    timestamp_suffix: String,
}

impl TokenBucketPolicy {
    pub fn new(
        capacity: i64,
        refill_rate: i64,
        cost: i64,
        key_prefix: &str,
        tokens_suffix: &str,
        timestamp_suffix: &str,
    ) -> Result<Self> {
        require_positive(capacity, "token bucket capacity")?;
        require_positive(refill_rate, "token bucket refill rate")?;
        require_positive(cost, "token bucket cost")?;
        require_text(key_prefix, "token bucket key prefix")?;
        require_text(tokens_suffix, "token bucket tokens suffix")?;
        require_text(timestamp_suffix, "token bucket timestamp suffix")?;

        Ok(Self {
            capacity,
            refill_rate,
            cost,
            key_prefix: key_prefix.to_string(),
            tokens_suffix: tokens_suffix.to_string(),
            timestamp_suffix: timestamp_suffix.to_string(),
        })
    }

    pub async fn decide(&self, client_id: &str, store: &dyn StoreClient) -> Result<bool> {
        let base = format!("{}{}", self.key_prefix, client_id);

        trace!(client_id = %client_id, key = %base, "Token bucket decision");

        store
            .token_bucket_acquire(
                &format!("{}{}", base, self.tokens_suffix),
                &format!("{}{}", base, self.timestamp_suffix),
                self.capacity,
                self.refill_rate,
                unix_millis(),
                self.cost,
            )
            .await
    }
}
