//! Fixed window counter policy.
//!
//! Counts requests within a window anchored at the first request after a
//! reset. The counter is incremented before the limit check and the check is
//! strict (`capacity > count`), so the effective admitted volume per window
//! is capacity − 1. Near a window boundary up to twice the nominal limit can
//! be admitted across the two windows; that is a documented characteristic
//! of the algorithm, not a defect.

use tracing::trace;

use super::policy::{require_positive, require_text};
use crate::error::Result;
use crate::store::{unix_millis, StoreClient};

pub struct FixedWindowPolicy {
    /// Maximum number of requests counted in the window
    capacity: i64,
    /// Window duration in seconds
    window_seconds: i64,
    key_prefix: String,
    count_suffix: String,
    timestamp_suffix: String,
}

impl FixedWindowPolicy {
    pub fn new(
        capacity: i64,
        window_seconds: i64,
        key_prefix: &str,
        count_suffix: &str,
        timestamp_suffix: &str,
    ) -> Result<Self> {
        require_positive(capacity, "fixed window capacity")?;
        require_positive(window_seconds, "fixed window duration")?;
        require_text(key_prefix, "fixed window key prefix")?;
        require_text(count_suffix, "fixed window count suffix")?;
        require_text(timestamp_suffix, "fixed window timestamp suffix")?;

        Ok(Self {
            capacity,
            window_seconds,
            key_prefix: key_prefix.to_string(),
            count_suffix: count_suffix.to_string(),
            timestamp_suffix: timestamp_suffix.to_string(),
        })
    }

    pub async fn decide(&self, client_id: &str, store: &dyn StoreClient) -> Result<bool> {
        let base = format!("{}{}", self.key_prefix, client_id);

        trace!(client_id = %client_id, key = %base, "Fixed window decision");

        store
            .fixed_window_acquire(
                &format!("{}{}", base, self.count_suffix),
                &format!("{}{}", base, self.timestamp_suffix),
                self.capacity,
                self.window_seconds,
                unix_millis(),
            )
            .await
    }
}
