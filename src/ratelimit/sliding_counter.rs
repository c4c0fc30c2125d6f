//! Sliding window counter policy.
//!
//! Keeps one counter for the current window and one for the previous window.
//! The trailing request total is estimated by weighting the previous count
//! by the fraction of the previous window still inside the trailing window
//! and adding the current count. O(1) state per key, at the cost of the
//! estimate being approximate; admission uses a non-strict
//! `weighted <= capacity` check.

use tracing::trace;

use super::policy::{require_positive, require_text};
use crate::error::Result;
use crate::store::StoreClient;

pub struct SlidingWindowCounterPolicy {
    /// Maximum number of requests allowed in the window
    capacity: i64,
    /// Window duration in seconds
    window_seconds: i64,
    key_prefix: String,
    window_start_suffix: String,
    current_count_suffix: String,
    previous_count_suffix: String,
}

impl SlidingWindowCounterPolicy {
    pub fn new(
        capacity: i64,
        window_seconds: i64,
        key_prefix: &str,
        window_start_suffix: &str,
        current_count_suffix: &str,
        previous_count_suffix: &str,
    ) -> Result<Self> {
        require_positive(capacity, "sliding window counter capacity")?;
        require_positive(window_seconds, "sliding window counter duration")?;
        require_text(key_prefix, "sliding window counter key prefix")?;
        require_text(window_start_suffix, "sliding window counter start suffix")?;
        require_text(current_count_suffix, "sliding window counter current suffix")?;
        require_text(previous_count_suffix, "sliding window counter previous suffix")?;

        Ok(Self {
            capacity,
            window_seconds,
            key_prefix: key_prefix.to_string(),
            window_start_suffix: window_start_suffix.to_string(),
            current_count_suffix: current_count_suffix.to_string(),
            previous_count_suffix: previous_count_suffix.to_string(),
        })
    }

    pub async fn decide(&self, client_id: &str, store: &dyn StoreClient) -> Result<bool> {
        let base = format!("{}{}", self.key_prefix, client_id);

        trace!(client_id = %client_id, key = %base, "Sliding window counter decision");

        store
            .sliding_counter_acquire(
                &format!("{}{}", base, self.window_start_suffix),
                &format!("{}{}", base, self.current_count_suffix),
                &format!("{}{}", base, self.previous_count_suffix),
                self.capacity,
                self.window_seconds,
            )
            .await
    }
}
