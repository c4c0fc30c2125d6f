//! Policy registry.
//!
//! Built once at startup from configuration and never mutated afterwards, so
//! lookups need no synchronization. Key prefixes and suffixes are fixed:
//! state is addressed by them, and changing the layout would silently reset
//! every client's state across a restart.

use std::collections::HashMap;

use tracing::debug;

use super::{
    FixedWindowPolicy, LeakyBucketPolicy, Policy, SlidingWindowCounterPolicy,
    SlidingWindowLogPolicy, TokenBucketPolicy,
};
use crate::config::PoliciesConfig;
use crate::error::Result;

/// Immutable mapping from policy name to a constructed, parameter-bound
/// policy.
pub struct PolicyRegistry {
    policies: HashMap<String, Policy>,
}

impl PolicyRegistry {
    /// Build the registry, validating every policy's parameters.
    ///
    /// Fails fast on the first invalid parameter so a misconfigured service
    /// never starts serving decisions.
    pub fn from_config(config: &PoliciesConfig) -> Result<Self> {
        let mut policies = HashMap::new();

        policies.insert("alwaysallow".to_string(), Policy::AllowAll);
        policies.insert("denyall".to_string(), Policy::DenyAll);

        policies.insert(
            "tokenbucket".to_string(),
            Policy::TokenBucket(TokenBucketPolicy::new(
                config.token_bucket.capacity,
                config.token_bucket.refill_rate,
                config.token_bucket.cost,
                "token_bucket_strategy:",
                ":tokens",
                ":timestamp",
            )?),
        );

        policies.insert(
            "leakybucket".to_string(),
            Policy::LeakyBucket(LeakyBucketPolicy::new(
                config.leaky_bucket.capacity,
                config.leaky_bucket.leak_rate,
                config.leaky_bucket.cost,
                "leaky_bucket_strategy:",
                ":tokens",
                ":timestamp",
            )?),
        );

        policies.insert(
            "fixedwindowcounter".to_string(),
            Policy::FixedWindow(FixedWindowPolicy::new(
                config.fixed_window.capacity,
                config.fixed_window.window_seconds,
                "fixed_window_counter_strategy:",
                ":requests",
                ":timestamp",
            )?),
        );

        policies.insert(
            "slidingwindowlog".to_string(),
            Policy::SlidingWindowLog(SlidingWindowLogPolicy::new(
                config.sliding_window_log.capacity,
                config.sliding_window_log.window_seconds,
                "sliding_window_log_strategy:",
                ":log",
            )?),
        );

        policies.insert(
            "slidingwindowcounter".to_string(),
            Policy::SlidingWindowCounter(SlidingWindowCounterPolicy::new(
                config.sliding_window_counter.capacity,
                config.sliding_window_counter.window_seconds,
                "sliding_window_counter_strategy:",
                ":current_window_start",
                ":current_window_count",
                ":previous_window_count",
            )?),
        );

        debug!(policy_count = policies.len(), "Policy registry built");

        Ok(Self { policies })
    }

    /// Look up a policy by its registered name.
    pub fn get(&self, name: &str) -> Option<&Policy> {
        self.policies.get(name)
    }

    /// Number of registered policies.
    pub fn len(&self) -> usize {
        self.policies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.policies.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_holds_all_seven_policies() {
        let registry = PolicyRegistry::from_config(&PoliciesConfig::default()).unwrap();
        assert_eq!(registry.len(), 7);

        for name in [
            "alwaysallow",
            "denyall",
            "tokenbucket",
            "leakybucket",
            "fixedwindowcounter",
            "slidingwindowlog",
            "slidingwindowcounter",
        ] {
            assert!(registry.get(name).is_some(), "missing policy {}", name);
        }
    }

    #[test]
    fn test_unknown_name_is_not_registered() {
        let registry = PolicyRegistry::from_config(&PoliciesConfig::default()).unwrap();
        assert!(registry.get("nosuchpolicy").is_none());
        // Lookup is exact, not case-folded
        assert!(registry.get("TokenBucket").is_none());
    }

    #[test]
    fn test_invalid_parameter_fails_registry_build() {
        let mut config = PoliciesConfig::default();
        config.token_bucket.capacity = 0;
        assert!(PolicyRegistry::from_config(&config).is_err());

        let mut config = PoliciesConfig::default();
        config.sliding_window_counter.window_seconds = -60;
        assert!(PolicyRegistry::from_config(&config).is_err());
    }
}
