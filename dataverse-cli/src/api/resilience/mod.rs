//! Resilience and hardening features
//!
//! Provides retry/backoff configuration, batch concurrency limiting, and
//! fault classification for production-grade Dataverse interactions.

pub mod concurrency;
pub mod config;
pub mod policy;

pub use concurrency::{ConcurrencyLimiter, ConcurrencyStats};
pub use config::{
    BatchConfig, ConcurrencyConfig, ResilienceConfig, ResilienceConfigBuilder, RetryConfig,
};
pub use policy::{FaultDisposition, FaultPolicy, FaultRule};
