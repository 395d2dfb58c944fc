//! HTTP transport configuration

use crate::error::{Result, TransportError};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpTransportConfig {
    /// Downloads running at the same time
    pub agent_count: usize,

    /// Connection timeout
    pub connect_timeout: Duration,

    /// Longest wait for the next chunk of a response
    pub read_timeout: Duration,

    /// User agent sent with every request
    pub user_agent: String,
}

impl Default for HttpTransportConfig {
    fn default() -> Self {
        Self {
            agent_count: 4,
            connect_timeout: Duration::from_secs(10),
            read_timeout: Duration::from_secs(30),
            user_agent: format!("strata-protocol/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl HttpTransportConfig {
    /// Configuration from `STRATA_HTTP_*` variables, defaults for the rest
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            agent_count: std::env::var("STRATA_HTTP_AGENT_COUNT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.agent_count),
            connect_timeout: Duration::from_secs(
                std::env::var("STRATA_HTTP_CONNECT_TIMEOUT")
                    .unwrap_or_else(|_| "10".to_string())
                    .parse()
                    .unwrap_or(10),
            ),
            read_timeout: Duration::from_secs(
                std::env::var("STRATA_HTTP_READ_TIMEOUT")
                    .unwrap_or_else(|_| "30".to_string())
                    .parse()
                    .unwrap_or(30),
            ),
            user_agent: std::env::var("STRATA_HTTP_USER_AGENT").unwrap_or(defaults.user_agent),
        }
    }

    #[must_use]
    pub fn with_agent_count(mut self, agent_count: usize) -> Self {
        self.agent_count = agent_count;
        self
    }

    #[must_use]
    pub fn with_timeouts(mut self, connect_timeout: Duration, read_timeout: Duration) -> Self {
        self.connect_timeout = connect_timeout;
        self.read_timeout = read_timeout;
        self
    }

    #[must_use]
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.agent_count == 0 {
            return Err(TransportError::Config(
                "agent count must be at least 1".to_string(),
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
    fn test_default_config() {
        let config = HttpTransportConfig::default();
        assert_eq!(config.agent_count, 4);
        assert_eq!(config.connect_timeout, Duration::from_secs(10));
        assert_eq!(config.read_timeout, Duration::from_secs(30));
        assert!(config.user_agent.starts_with("strata-protocol/"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_agents_rejected() {
        let config = HttpTransportConfig::default().with_agent_count(0);
        assert!(matches!(config.validate(), Err(TransportError::Config(_))));
    }

    #[test]
    fn test_config_serialization() {
        let config = HttpTransportConfig::default()
            .with_user_agent("game/1.0")
            .with_timeouts(Duration::from_secs(3), Duration::from_secs(7));
        let json = serde_json::to_string(&config).expect("serialize");
        let back: HttpTransportConfig = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, config);
    }
}
