//! Resilience configuration with builder pattern
//!
//! Provides a unified configuration for retry, batching, and concurrency
//! behavior with sane defaults for Dataverse service limits.

use std::time::Duration;

/// Global resilience configuration for bulk execution
#[derive(Debug, Clone)]
pub struct ResilienceConfig {
    pub retry: RetryConfig,
    pub batch: BatchConfig,
    pub concurrency: ConcurrencyConfig,
}

/// Retry behavior for individual operations
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Additional attempts after the first, per operation
    pub max_retries: u32,
    /// Base delay before the first retry; doubles on each subsequent retry
    pub initial_backoff: Duration,
}

/// Batching configuration
#[derive(Debug, Clone)]
pub struct BatchConfig {
    /// Upper bound on operations per $batch call (Dataverse allows 1000)
    pub max_batch_size: usize,
    /// Deadline for a single $batch round trip
    pub timeout: Duration,
}

/// Concurrency limiting configuration
#[derive(Debug, Clone)]
pub struct ConcurrencyConfig {
    /// Maximum $batch calls in flight simultaneously
    pub max_concurrent_batches: usize,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff: Duration::from_millis(500),
        }
    }
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_batch_size: 100, // Conservative (Dataverse allows 1000)
            timeout: Duration::from_secs(120),
        }
    }
}

impl Default for ConcurrencyConfig {
    fn default() -> Self {
        Self {
            max_concurrent_batches: 1,
        }
    }
}

impl Default for ResilienceConfig {
    fn default() -> Self {
        Self {
            retry: RetryConfig::default(),
            batch: BatchConfig::default(),
            concurrency: ConcurrencyConfig::default(),
        }
    }
}

impl ResilienceConfig {
    /// Create a new builder for ResilienceConfig
    pub fn builder() -> ResilienceConfigBuilder {
        ResilienceConfigBuilder::new()
    }

    /// Conservative config for production environments
    pub fn conservative() -> Self {
        Self {
            retry: RetryConfig {
                max_retries: 2,
                initial_backoff: Duration::from_secs(2),
            },
            batch: BatchConfig {
                max_batch_size: 50,
                timeout: Duration::from_secs(180),
            },
            concurrency: ConcurrencyConfig {
                max_concurrent_batches: 1,
            },
        }
    }

    /// Aggressive config for development/testing
    pub fn development() -> Self {
        Self {
            retry: RetryConfig {
                max_retries: 5,
                initial_backoff: Duration::from_millis(100),
            },
            batch: BatchConfig {
                max_batch_size: 200,
                timeout: Duration::from_secs(60),
            },
            concurrency: ConcurrencyConfig {
                max_concurrent_batches: 4,
            },
        }
    }

    /// Disable batching and retries (for testing)
    pub fn disabled() -> Self {
        Self {
            retry: RetryConfig {
                max_retries: 0,
                initial_backoff: Duration::from_millis(0),
            },
            batch: BatchConfig {
                max_batch_size: 1,
                timeout: Duration::from_secs(120),
            },
            concurrency: ConcurrencyConfig {
                max_concurrent_batches: 1,
            },
        }
    }
}

/// Builder for ResilienceConfig
#[derive(Debug)]
pub struct ResilienceConfigBuilder {
    config: ResilienceConfig,
}

impl ResilienceConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: ResilienceConfig::default(),
        }
    }

    /// Configure retry behavior
    pub fn retry_config(mut self, retry: RetryConfig) -> Self {
        self.config.retry = retry;
        self
    }

    /// Set additional attempts after the first
    pub fn max_retries(mut self, retries: u32) -> Self {
        self.config.retry.max_retries = retries;
        self
    }

    /// Set the base delay before the first retry
    pub fn initial_backoff(mut self, backoff: Duration) -> Self {
        self.config.retry.initial_backoff = backoff;
        self
    }

    /// Configure batching
    pub fn batch_config(mut self, batch: BatchConfig) -> Self {
        self.config.batch = batch;
        self
    }

    /// Set the maximum operations per $batch call
    pub fn max_batch_size(mut self, size: usize) -> Self {
        self.config.batch.max_batch_size = size;
        self
    }

    /// Set the deadline for a single $batch round trip
    pub fn batch_timeout(mut self, timeout: Duration) -> Self {
        self.config.batch.timeout = timeout;
        self
    }

    /// Configure concurrency limiting
    pub fn concurrency_config(mut self, concurrency: ConcurrencyConfig) -> Self {
        self.config.concurrency = concurrency;
        self
    }

    /// Set the maximum $batch calls in flight simultaneously
    pub fn max_concurrent_batches(mut self, max: usize) -> Self {
        self.config.concurrency.max_concurrent_batches = max;
        self
    }

    /// Build the final configuration
    pub fn build(self) -> ResilienceConfig {
        self.config
    }
}

impl Default for ResilienceConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ResilienceConfig::default();

        assert_eq!(config.retry.max_retries, 3);
        assert_eq!(config.retry.initial_backoff, Duration::from_millis(500));
        assert_eq!(config.batch.max_batch_size, 100);
        assert_eq!(config.concurrency.max_concurrent_batches, 1);
    }

    #[test]
    fn test_conservative_config() {
        let config = ResilienceConfig::conservative();

        assert_eq!(config.retry.max_retries, 2);
        assert_eq!(config.batch.max_batch_size, 50);
        assert_eq!(config.concurrency.max_concurrent_batches, 1);
    }

    #[test]
    fn test_development_config() {
        let config = ResilienceConfig::development();

        assert_eq!(config.retry.max_retries, 5);
        assert_eq!(config.batch.max_batch_size, 200);
        assert_eq!(config.concurrency.max_concurrent_batches, 4);
    }

    #[test]
    fn test_disabled_config() {
        let config = ResilienceConfig::disabled();

        assert_eq!(config.retry.max_retries, 0);
        assert_eq!(config.batch.max_batch_size, 1);
        assert_eq!(config.concurrency.max_concurrent_batches, 1);
    }

    #[test]
    fn test_builder_pattern() {
        let config = ResilienceConfig::builder()
            .max_retries(5)
            .initial_backoff(Duration::from_millis(250))
            .max_batch_size(500)
            .batch_timeout(Duration::from_secs(30))
            .max_concurrent_batches(3)
            .build();

        assert_eq!(config.retry.max_retries, 5);
        assert_eq!(config.retry.initial_backoff, Duration::from_millis(250));
        assert_eq!(config.batch.max_batch_size, 500);
        assert_eq!(config.batch.timeout, Duration::from_secs(30));
        assert_eq!(config.concurrency.max_concurrent_batches, 3);
    }
}
