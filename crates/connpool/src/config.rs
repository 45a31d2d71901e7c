//! Pool configuration.

use std::time::Duration;

use crate::error::PoolError;

/// Default time a caller waits for a connection when the pool is saturated.
pub const DEFAULT_CONNECTION_TIMEOUT: Duration = Duration::from_secs(10);

/// Configuration for the connection pool.
///
/// This struct is marked `#[non_exhaustive]` to allow adding new fields
/// in future minor versions without breaking changes. Use the builder
/// pattern methods or [`Default::default()`] to construct instances.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct PoolConfig {
    /// Number of connections created up front and kept regardless of idleness.
    pub min_connections: u32,

    /// Maximum number of connections open at the same time.
    pub max_connections: u32,

    /// Time to wait for a connection before timing out.
    ///
    /// Once the pool is saturated this bounds the whole wait, including
    /// health checks of returned connections and factory calls made for
    /// slots freed while waiting.
    pub connection_timeout: Duration,

    /// Time a non-pinned connection can sit idle before it is evicted.
    ///
    /// `Duration::ZERO` disables idle eviction.
    pub idle_timeout: Duration,

    /// Whether to health-check idle connections on checkout.
    pub test_on_checkout: bool,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            min_connections: 1,
            max_connections: 10,
            connection_timeout: DEFAULT_CONNECTION_TIMEOUT,
            idle_timeout: Duration::from_secs(600),
            test_on_checkout: true,
        }
    }
}

impl PoolConfig {
    /// Create a new pool configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the minimum number of connections.
    #[must_use]
    pub fn min_connections(mut self, count: u32) -> Self {
        self.min_connections = count;
        self
    }

    /// Set the maximum number of connections.
    #[must_use]
    pub fn max_connections(mut self, count: u32) -> Self {
        self.max_connections = count;
        self
    }

    /// Set the connection acquisition timeout.
    #[must_use]
    pub fn connection_timeout(mut self, timeout: Duration) -> Self {
        self.connection_timeout = timeout;
        self
    }

    /// Set the idle connection timeout.
    #[must_use]
    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    /// Enable or disable health-checking connections on checkout.
    #[must_use]
    pub fn test_on_checkout(mut self, enabled: bool) -> Self {
        self.test_on_checkout = enabled;
        self
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), PoolError> {
        if self.min_connections == 0 {
            return Err(PoolError::Configuration(
                "min_connections must be greater than 0".into(),
            ));
        }
        if self.min_connections > self.max_connections {
            return Err(PoolError::Configuration(
                "min_connections cannot be greater than max_connections".into(),
            ));
        }
        Ok(())
    }

    /// Whether idle eviction is enabled.
    pub(crate) fn idle_eviction(&self) -> Option<Duration> {
        (!self.idle_timeout.is_zero()).then_some(self.idle_timeout)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = PoolConfig::default();
        assert_eq!(config.min_connections, 1);
        assert_eq!(config.max_connections, 10);
        assert_eq!(config.connection_timeout, Duration::from_secs(10));
        assert!(config.test_on_checkout);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_builder_methods() {
        let config = PoolConfig::new()
            .min_connections(5)
            .max_connections(20)
            .connection_timeout(Duration::from_secs(3))
            .idle_timeout(Duration::from_secs(15))
            .test_on_checkout(false);

        assert_eq!(config.min_connections, 5);
        assert_eq!(config.max_connections, 20);
        assert_eq!(config.connection_timeout, Duration::from_secs(3));
        assert_eq!(config.idle_timeout, Duration::from_secs(15));
        assert!(!config.test_on_checkout);
    }

    #[test]
    fn test_config_validation_min_greater_than_max() {
        let config = PoolConfig::new().min_connections(20).max_connections(10);

        let result = config.validate();
        assert!(
            result
                .unwrap_err()
                .to_string()
                .contains("min_connections cannot be greater than max_connections")
        );
    }

    #[test]
    fn test_config_validation_zero_min() {
        let config = PoolConfig::new().min_connections(0).max_connections(10);

        let result = config.validate();
        assert!(matches!(result, Err(PoolError::Configuration(_))));
    }

    #[test]
    fn test_config_equal_min_max() {
        let config = PoolConfig::new().min_connections(5).max_connections(5);

        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_idle_timeout_disables_eviction() {
        assert_eq!(PoolConfig::new().idle_timeout(Duration::ZERO).idle_eviction(), None);
        assert_eq!(
            PoolConfig::new()
                .idle_timeout(Duration::from_secs(1))
                .idle_eviction(),
            Some(Duration::from_secs(1))
        );
    }
}
