//! Configuration management for Gatekeeper.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;

/// Main configuration for the Gatekeeper service.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GatekeeperConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Shared store configuration
    #[serde(default)]
    pub store: StoreConfig,

    /// Per-policy parameters
    #[serde(default)]
    pub policies: PoliciesConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// gRPC server address
    #[serde(default = "default_grpc_addr")]
    pub grpc_addr: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            grpc_addr: default_grpc_addr(),
        }
    }
}

fn default_grpc_addr() -> SocketAddr {
    "127.0.0.1:8081".parse().unwrap()
}

/// Which store implementation backs policy state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// Redis, shared across service replicas
    Redis,
    /// In-process store, single instance only
    Memory,
}

/// Shared store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Store implementation to use
    #[serde(default = "default_store_backend")]
    pub backend: StoreBackend,

    /// Redis connection URL (ignored by the memory backend)
    #[serde(default = "default_store_url")]
    pub url: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: default_store_backend(),
            url: default_store_url(),
        }
    }
}

fn default_store_backend() -> StoreBackend {
    StoreBackend::Redis
}

fn default_store_url() -> String {
    "redis://127.0.0.1:6379".to_string()
}

/// Parameters for every registered policy.
///
/// Defaults replicate the reference deployment. All values are validated when
/// the policy registry is built, so a non-positive parameter fails startup.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PoliciesConfig {
    #[serde(default)]
    pub token_bucket: TokenBucketConfig,

    #[serde(default)]
    pub leaky_bucket: LeakyBucketConfig,

    #[serde(default)]
    pub fixed_window: WindowConfig,

    #[serde(default)]
    pub sliding_window_log: WindowConfig,

    #[serde(default)]
    pub sliding_window_counter: WindowConfig,
}

/// Token bucket parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenBucketConfig {
    /// Maximum number of tokens the bucket holds
    #[serde(default = "default_capacity")]
    pub capacity: i64,

    /// Tokens added to the bucket per second
    #[serde(default = "default_refill_rate")]
    pub refill_rate: i64,

    /// Tokens consumed per request
    #[serde(default = "default_cost")]
    pub cost: i64,
}

impl Default for TokenBucketConfig {
    fn default() -> Self {
        Self {
            capacity: default_capacity(),
            refill_rate: default_refill_rate(),
            cost: default_cost(),
        }
    }
}

/// Leaky bucket parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeakyBucketConfig {
    /// Maximum level of the bucket
    #[serde(default = "default_capacity")]
    pub capacity: i64,

    /// Units drained from the bucket per second
    #[serde(default = "default_leak_rate")]
    pub leak_rate: i64,

    /// Units added per request
    #[serde(default = "default_cost")]
    pub cost: i64,
}

impl Default for LeakyBucketConfig {
    fn default() -> Self {
        Self {
            capacity: default_capacity(),
            leak_rate: default_leak_rate(),
            cost: default_cost(),
        }
    }
}

/// Parameters shared by the window-based policies.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WindowConfig {
    /// Maximum number of requests allowed in the window
    #[serde(default = "default_capacity")]
    pub capacity: i64,

    /// Window duration in seconds
    #[serde(default = "default_window_seconds")]
    pub window_seconds: i64,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            capacity: default_capacity(),
            window_seconds: default_window_seconds(),
        }
    }
}

fn default_capacity() -> i64 {
    20
}

fn default_refill_rate() -> i64 {
    4
}

fn default_leak_rate() -> i64 {
    2
}

fn default_cost() -> i64 {
    1
}

fn default_window_seconds() -> i64 {
    60
}

impl GatekeeperConfig {
    /// Load configuration from a YAML file path.
    pub fn from_file(path: &str) -> crate::error::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: GatekeeperConfig = serde_yaml::from_str(&contents)
            .map_err(|e| crate::error::GatekeeperError::Config(e.to_string()))?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_reference_deployment() {
        let config = GatekeeperConfig::default();
        assert_eq!(config.server.grpc_addr.port(), 8081);
        assert_eq!(config.store.backend, StoreBackend::Redis);
        assert_eq!(config.policies.token_bucket.capacity, 20);
        assert_eq!(config.policies.token_bucket.refill_rate, 4);
        assert_eq!(config.policies.token_bucket.cost, 1);
        assert_eq!(config.policies.leaky_bucket.leak_rate, 2);
        assert_eq!(config.policies.fixed_window.window_seconds, 60);
        assert_eq!(config.policies.sliding_window_counter.capacity, 20);
    }

    #[test]
    fn test_parse_partial_yaml() {
        let yaml = r#"
server:
  grpc_addr: 0.0.0.0:9000
store:
  backend: memory
policies:
  token_bucket:
    capacity: 100
"#;
        let config: GatekeeperConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.server.grpc_addr.port(), 9000);
        assert_eq!(config.store.backend, StoreBackend::Memory);
        assert_eq!(config.policies.token_bucket.capacity, 100);
        // Unspecified fields fall back to defaults
        assert_eq!(config.policies.token_bucket.refill_rate, 4);
        assert_eq!(config.policies.leaky_bucket.capacity, 20);
    }

    #[test]
    fn test_parse_empty_yaml_uses_defaults() {
        let config: GatekeeperConfig = serde_yaml::from_str("{}").unwrap();
        assert_eq!(config.policies.sliding_window_log.capacity, 20);
        assert_eq!(config.store.url, "redis://127.0.0.1:6379");
    }
}
