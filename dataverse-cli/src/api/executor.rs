//! The execution seam between the bulk engine and the transport.

use crate::api::fault::Fault;
use crate::api::operations::Operation;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;

/// Raw response for a single executed operation, before conversion into a
/// caller-facing result.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExecuteResponse {
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub body: Option<Value>,
}

impl ExecuteResponse {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            headers: HashMap::new(),
            body: None,
        }
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// Per-item outcome of a submitted operation: the service answered with
/// either a response or a structured fault.
pub type ItemOutcome = Result<ExecuteResponse, Fault>;

/// Execution capability consumed by the bulk engine.
///
/// `execute_batch` returns one outcome per submitted operation, in
/// submission order. A transport-level problem (the call itself failing,
/// rather than the service answering per item) is reported through the
/// outer `Err`, in which case no per-item outcome exists and the scheduler
/// applies its batch-level failure semantics.
#[async_trait]
pub trait Executor: Send + Sync {
    async fn execute(&self, operation: &Operation) -> anyhow::Result<ItemOutcome>;

    async fn execute_batch(&self, operations: &[Operation]) -> anyhow::Result<Vec<ItemOutcome>>;
}
