//! Loader configuration

use crate::error::{LoaderError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Pool tuning shared by the asset and resource tiers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Unused objects kept before the oldest are released
    pub capacity: usize,
    /// How long an unused object may stay pooled
    pub expire_time: Duration,
    /// How often unused objects are swept
    pub auto_release_interval: Duration,
}

impl PoolConfig {
    /// Pool settings
    pub const fn new(capacity: usize, expire_time: Duration, auto_release_interval: Duration) -> Self {
        Self {
            capacity,
            expire_time,
            auto_release_interval,
        }
    }
}

/// Configuration for the resource loader
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoaderConfig {
    /// Number of load agents working in parallel
    pub load_agent_count: usize,
    /// Asset pool
    pub asset_pool: PoolConfig,
    /// Resource pool
    pub resource_pool: PoolConfig,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            load_agent_count: 3,
            asset_pool: PoolConfig::new(64, Duration::from_secs(60), Duration::from_secs(60)),
            resource_pool: PoolConfig::new(16, Duration::from_secs(60), Duration::from_secs(60)),
        }
    }
}

impl LoaderConfig {
    /// Default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Read configuration from `STRATA_*` environment variables
    ///
    /// Unset or unparsable variables fall back to the defaults. Durations are
    /// given in whole seconds.
    pub fn from_env() -> Self {
        fn var<T: std::str::FromStr>(name: &str) -> Option<T> {
            std::env::var(name).ok().and_then(|s| s.parse().ok())
        }
        fn seconds(name: &str) -> Option<Duration> {
            var::<u64>(name).map(Duration::from_secs)
        }

        let defaults = Self::default();
        Self {
            load_agent_count: var("STRATA_LOAD_AGENT_COUNT").unwrap_or(defaults.load_agent_count),
            asset_pool: PoolConfig {
                capacity: var("STRATA_ASSET_CAPACITY").unwrap_or(defaults.asset_pool.capacity),
                expire_time: seconds("STRATA_ASSET_EXPIRE_TIME")
                    .unwrap_or(defaults.asset_pool.expire_time),
                auto_release_interval: seconds("STRATA_ASSET_AUTO_RELEASE_INTERVAL")
                    .unwrap_or(defaults.asset_pool.auto_release_interval),
            },
            resource_pool: PoolConfig {
                capacity: var("STRATA_RESOURCE_CAPACITY").unwrap_or(defaults.resource_pool.capacity),
                expire_time: seconds("STRATA_RESOURCE_EXPIRE_TIME")
                    .unwrap_or(defaults.resource_pool.expire_time),
                auto_release_interval: seconds("STRATA_RESOURCE_AUTO_RELEASE_INTERVAL")
                    .unwrap_or(defaults.resource_pool.auto_release_interval),
            },
        }
    }

    /// Set the number of load agents
    #[must_use]
    pub const fn with_load_agent_count(mut self, count: usize) -> Self {
        self.load_agent_count = count;
        self
    }

    /// Set the asset pool tuning
    #[must_use]
    pub const fn with_asset_pool(mut self, pool: PoolConfig) -> Self {
        self.asset_pool = pool;
        self
    }

    /// Set the resource pool tuning
    #[must_use]
    pub const fn with_resource_pool(mut self, pool: PoolConfig) -> Self {
        self.resource_pool = pool;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.load_agent_count == 0 {
            return Err(LoaderError::Config(
                "load_agent_count must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = LoaderConfig::default();
        assert_eq!(config.load_agent_count, 3);
        assert_eq!(config.asset_pool.capacity, 64);
        assert_eq!(config.resource_pool.capacity, 16);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_agents_rejected() {
        let config = LoaderConfig::new().with_load_agent_count(0);
        assert!(matches!(config.validate(), Err(LoaderError::Config(_))));
    }

    #[test]
    fn test_serde_round_trip() {
        let config = LoaderConfig::new()
            .with_load_agent_count(5)
            .with_asset_pool(PoolConfig::new(8, Duration::from_secs(5), Duration::from_secs(1)));
        let json = serde_json::to_string(&config).unwrap();
        let back: LoaderConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, config);
    }
}
