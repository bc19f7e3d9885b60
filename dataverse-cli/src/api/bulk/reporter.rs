//! Terminal outcome reporting
//!
//! The engine guarantees exactly one terminal report per input item. The
//! sink receiving those reports, and the conversion from raw responses to
//! caller-facing results, both live behind traits so callers can plug in
//! console output, collections, or anything else.

use crate::api::executor::ExecuteResponse;
use crate::api::fault::Fault;
use crate::api::operations::{Operation, OperationResult};
use serde::Serialize;
use serde_json::json;
use std::fmt;

/// Caller-facing failure for one input item
#[derive(Debug, Clone, PartialEq)]
pub enum BulkError {
    /// The service rejected the operation with a non-retryable fault
    Fault { fault: Fault, attempts: u32 },
    /// Every attempt failed with a retryable fault and the budget ran out.
    /// Carries the fault from the final attempt.
    Exhausted { fault: Fault, attempts: u32 },
    /// The run was interrupted before this item reached a terminal outcome
    Cancelled,
}

impl BulkError {
    /// The remote fault behind this failure, if there is one
    pub fn fault(&self) -> Option<&Fault> {
        match self {
            Self::Fault { fault, .. } | Self::Exhausted { fault, .. } => Some(fault),
            Self::Cancelled => None,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    pub fn attempts(&self) -> u32 {
        match self {
            Self::Fault { attempts, .. } | Self::Exhausted { attempts, .. } => *attempts,
            Self::Cancelled => 0,
        }
    }
}

impl fmt::Display for BulkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fault { fault, .. } => write!(f, "{fault}"),
            Self::Exhausted { fault, attempts } => {
                write!(f, "gave up after {attempts} attempts; last fault: {fault}")
            }
            Self::Cancelled => write!(f, "cancelled before completion"),
        }
    }
}

impl std::error::Error for BulkError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.fault()
            .map(|fault| fault as &(dyn std::error::Error + 'static))
    }
}

/// Sink for terminal outcomes. The engine calls exactly one of these
/// methods, exactly once, per input item.
pub trait OutcomeReporter<T> {
    fn report_success(&mut self, item: T, result: OperationResult);
    fn report_failure(&mut self, item: T, error: BulkError);
}

/// Converts a raw response into the caller-facing result. Invoked only when
/// an operation completes.
pub trait ResponseConverter: Send + Sync {
    fn convert(&self, operation: &Operation, response: ExecuteResponse) -> OperationResult;
}

/// Default converter for Web API responses
///
/// Creates and upserts answer 204 with the new record's address in the
/// `OData-EntityId` header; this converter lifts the record id out of it so
/// callers don't have to parse headers themselves.
#[derive(Debug, Clone, Copy, Default)]
pub struct WebApiConverter;

impl ResponseConverter for WebApiConverter {
    fn convert(&self, operation: &Operation, response: ExecuteResponse) -> OperationResult {
        let mut data = response.body.clone();
        if data.is_none()
            && let Some(entity_id) = response.header("OData-EntityId")
        {
            data = Some(json!({
                "@odata.id": entity_id,
                "id": record_id_from_entity_id(entity_id),
            }));
        }

        OperationResult {
            operation: operation.clone(),
            success: true,
            data,
            error: None,
            status_code: Some(response.status),
            headers: response.headers,
        }
    }
}

/// Pull the GUID out of an `OData-EntityId` value like
/// `https://org.crm.dynamics.com/api/data/v9.2/contacts(1b2c...)`.
fn record_id_from_entity_id(entity_id: &str) -> Option<&str> {
    let start = entity_id.rfind('(')?;
    let end = entity_id.rfind(')')?;
    (start < end).then(|| &entity_id[start + 1..end])
}

/// Collects outcomes in memory, for tests and library callers
#[derive(Debug)]
pub struct CollectingReporter<T> {
    outcomes: Vec<(T, Result<OperationResult, BulkError>)>,
}

impl<T> CollectingReporter<T> {
    pub fn new() -> Self {
        Self {
            outcomes: Vec::new(),
        }
    }

    pub fn outcomes(&self) -> &[(T, Result<OperationResult, BulkError>)] {
        &self.outcomes
    }

    pub fn into_outcomes(self) -> Vec<(T, Result<OperationResult, BulkError>)> {
        self.outcomes
    }

    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    pub fn successes(&self) -> impl Iterator<Item = (&T, &OperationResult)> {
        self.outcomes
            .iter()
            .filter_map(|(item, outcome)| outcome.as_ref().ok().map(|result| (item, result)))
    }

    pub fn failures(&self) -> impl Iterator<Item = (&T, &BulkError)> {
        self.outcomes
            .iter()
            .filter_map(|(item, outcome)| outcome.as_ref().err().map(|error| (item, error)))
    }
}

impl<T> Default for CollectingReporter<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> OutcomeReporter<T> for CollectingReporter<T> {
    fn report_success(&mut self, item: T, result: OperationResult) {
        self.outcomes.push((item, Ok(result)));
    }

    fn report_failure(&mut self, item: T, error: BulkError) {
        self.outcomes.push((item, Err(error)));
    }
}

/// Counters for a completed run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BulkSummary {
    /// Input items accepted by the engine
    pub submitted: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub cancelled: usize,
    /// Retry attempts scheduled across all items
    pub retries: usize,
    /// $batch calls issued
    pub batches: usize,
}

impl BulkSummary {
    /// True when every submitted item received a terminal report
    pub fn is_accounted(&self) -> bool {
        self.succeeded + self.failed + self.cancelled == self.submitted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_converter_lifts_record_id_from_header() {
        let response = ExecuteResponse::new(204).with_header(
            "OData-EntityId",
            "https://org.crm.dynamics.com/api/data/v9.2/contacts(1b2c3d4e-0000-0000-0000-000000000000)",
        );
        let operation = Operation::create("contacts", json!({"lastname": "Doe"}));

        let result = WebApiConverter.convert(&operation, response);
        assert!(result.success);
        assert_eq!(result.status_code, Some(204));
        assert_eq!(
            result.data.unwrap()["id"],
            "1b2c3d4e-0000-0000-0000-000000000000"
        );
    }

    #[test]
    fn test_converter_prefers_body_over_header() {
        let response = ExecuteResponse::new(200)
            .with_body(json!({"name": "Contoso"}))
            .with_header("OData-EntityId", "https://x/api/data/v9.2/accounts(abc)");
        let operation = Operation::update("accounts", "abc", json!({}));

        let result = WebApiConverter.convert(&operation, response);
        assert_eq!(result.data, Some(json!({"name": "Contoso"})));
    }

    #[test]
    fn test_record_id_extraction() {
        assert_eq!(
            record_id_from_entity_id("https://x/api/data/v9.2/contacts(abc-123)"),
            Some("abc-123")
        );
        assert_eq!(record_id_from_entity_id("no parens here"), None);
    }

    #[test]
    fn test_bulk_error_display() {
        let exhausted = BulkError::Exhausted {
            fault: Fault::new("0x80072322", "throttled").with_status(429),
            attempts: 4,
        };
        assert_eq!(
            exhausted.to_string(),
            "gave up after 4 attempts; last fault: 0x80072322 (HTTP 429): throttled"
        );

        assert_eq!(BulkError::Cancelled.to_string(), "cancelled before completion");
        assert!(BulkError::Cancelled.is_cancelled());
        assert!(BulkError::Cancelled.fault().is_none());
    }

    #[test]
    fn test_collecting_reporter_partitions_outcomes() {
        let mut reporter = CollectingReporter::new();
        reporter.report_success(
            "a",
            OperationResult::success(Operation::delete("contacts", "1"), None),
        );
        reporter.report_failure("b", BulkError::Cancelled);

        assert_eq!(reporter.len(), 2);
        assert_eq!(reporter.successes().count(), 1);
        assert_eq!(reporter.failures().count(), 1);
    }

    #[test]
    fn test_summary_accounting() {
        let summary = BulkSummary {
            submitted: 5,
            succeeded: 3,
            failed: 1,
            cancelled: 1,
            retries: 2,
            batches: 4,
        };
        assert!(summary.is_accounted());
    }
}
