//! Resilient bulk execution engine
//!
//! Takes a stream of `(item, operation)` pairs, batches the operations
//! against the service within its throughput limits, recovers from
//! transient failures with per-item backoff and fault isolation, and
//! guarantees exactly one terminal outcome per input item.

mod context;
pub mod reporter;
pub mod scheduler;

pub use reporter::{
    BulkError, BulkSummary, CollectingReporter, OutcomeReporter, ResponseConverter,
    WebApiConverter,
};
pub use scheduler::BulkExecutor;
