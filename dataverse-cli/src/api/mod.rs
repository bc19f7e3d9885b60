//! Dataverse Web API Module
//!
//! Provides the operation model, the HTTP transport, and the resilient
//! bulk execution engine used by the CLI commands.

pub mod bulk;
pub mod client;
pub mod executor;
pub mod fault;
pub mod operations;
pub mod resilience;

pub use bulk::{
    BulkError, BulkExecutor, BulkSummary, CollectingReporter, OutcomeReporter, ResponseConverter,
    WebApiConverter,
};
pub use client::DataverseClient;
pub use executor::{ExecuteResponse, Executor, ItemOutcome};
pub use fault::Fault;
pub use operations::{
    BatchRequest, BatchRequestBuilder, BatchResponseParser, Operation, OperationResult, Operations,
};
pub use resilience::{
    BatchConfig, ConcurrencyConfig, ConcurrencyLimiter, FaultDisposition, FaultPolicy, FaultRule,
    ResilienceConfig, RetryConfig,
};
