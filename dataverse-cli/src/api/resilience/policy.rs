//! Data-driven fault classification
//!
//! Decides what the scheduler does with a fault: retry it, surface it
//! immediately, or fail the whole run. Classification is an ordered rule
//! table matched against the fault's code, HTTP status, and the kind of
//! operation that produced it; the first matching rule wins.

use crate::api::fault::{Fault, codes};
use crate::api::operations::Operation;

/// What the scheduler should do with a fault
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultDisposition {
    /// Transient; retry with backoff while budget remains
    Retryable,
    /// Permanent for this operation; surface immediately
    NonRetryable,
    /// Permanent for the whole run (e.g. rejected credentials); stop
    /// submitting and fail the remaining work
    Fatal,
}

/// A single classification rule. Unset fields match anything.
#[derive(Debug, Clone)]
pub struct FaultRule {
    /// Matches `Operation::operation_type()`
    pub operation_type: Option<&'static str>,
    /// Matches the fault code, case-insensitively
    pub code: Option<String>,
    /// Matches the HTTP status carried by the fault
    pub status: Option<u16>,
    pub disposition: FaultDisposition,
}

impl FaultRule {
    pub fn for_code(code: impl Into<String>, disposition: FaultDisposition) -> Self {
        Self {
            operation_type: None,
            code: Some(code.into()),
            status: None,
            disposition,
        }
    }

    pub fn for_status(status: u16, disposition: FaultDisposition) -> Self {
        Self {
            operation_type: None,
            code: None,
            status: Some(status),
            disposition,
        }
    }

    /// Restrict the rule to one operation kind (see
    /// [`Operation::operation_type`]).
    pub fn for_operation(mut self, operation_type: &'static str) -> Self {
        self.operation_type = Some(operation_type);
        self
    }

    fn matches(&self, operation: &Operation, fault: &Fault) -> bool {
        if let Some(kind) = self.operation_type
            && kind != operation.operation_type()
        {
            return false;
        }
        if let Some(code) = &self.code
            && !fault.code.eq_ignore_ascii_case(code)
        {
            return false;
        }
        if let Some(status) = self.status
            && fault.status != Some(status)
        {
            return false;
        }
        true
    }
}

/// Ordered classification table with sensible Dataverse defaults
#[derive(Debug, Clone)]
pub struct FaultPolicy {
    rules: Vec<FaultRule>,
}

impl Default for FaultPolicy {
    fn default() -> Self {
        use FaultDisposition::*;
        Self {
            rules: vec![
                // Engine-generated faults for failed batch round trips
                FaultRule::for_code(codes::TRANSPORT, Retryable),
                FaultRule::for_code(codes::TIMEOUT, Retryable),
                // Service protection limits
                FaultRule::for_code(codes::THROTTLE_REQUEST_COUNT, Retryable),
                FaultRule::for_code(codes::THROTTLE_EXECUTION_TIME, Retryable),
                FaultRule::for_code(codes::THROTTLE_CONCURRENCY, Retryable),
                FaultRule::for_status(429, Retryable),
                FaultRule::for_status(408, Retryable),
                FaultRule::for_status(503, Retryable),
                FaultRule::for_status(504, Retryable),
                // A rejected principal dooms every subsequent request
                FaultRule::for_status(401, Fatal),
                FaultRule::for_status(403, Fatal),
                // Validation and addressing errors never heal on retry
                FaultRule::for_status(400, NonRetryable),
                FaultRule::for_status(404, NonRetryable),
                FaultRule::for_status(405, NonRetryable),
                FaultRule::for_status(412, NonRetryable),
                FaultRule::for_status(413, NonRetryable),
            ],
        }
    }
}

impl FaultPolicy {
    /// A policy with no rules; every fault falls through to the status
    /// defaults.
    pub fn empty() -> Self {
        Self { rules: Vec::new() }
    }

    /// Prepend a rule, giving it priority over the existing table.
    pub fn with_rule(mut self, rule: FaultRule) -> Self {
        self.rules.insert(0, rule);
        self
    }

    /// Classify a fault produced by `operation`.
    pub fn classify(&self, operation: &Operation, fault: &Fault) -> FaultDisposition {
        for rule in &self.rules {
            if rule.matches(operation, fault) {
                return rule.disposition;
            }
        }

        // Unmatched faults fall back on the status class: server-side
        // errors are presumed transient, client-side errors are not.
        match fault.status {
            Some(status) if status >= 500 => FaultDisposition::Retryable,
            _ => FaultDisposition::NonRetryable,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn op() -> Operation {
        Operation::create("contacts", json!({}))
    }

    #[test]
    fn test_throttling_is_retryable() {
        let policy = FaultPolicy::default();
        let fault = Fault::new(codes::THROTTLE_REQUEST_COUNT, "slow down").with_status(429);
        assert_eq!(policy.classify(&op(), &fault), FaultDisposition::Retryable);
    }

    #[test]
    fn test_http_429_without_code_is_retryable() {
        let policy = FaultPolicy::default();
        let fault = Fault::new("unknown", "too many requests").with_status(429);
        assert_eq!(policy.classify(&op(), &fault), FaultDisposition::Retryable);
    }

    #[test]
    fn test_transport_and_timeout_are_retryable() {
        let policy = FaultPolicy::default();
        assert_eq!(
            policy.classify(&op(), &Fault::transport("connection reset")),
            FaultDisposition::Retryable
        );
        assert_eq!(
            policy.classify(&op(), &Fault::timeout(std::time::Duration::from_secs(30))),
            FaultDisposition::Retryable
        );
    }

    #[test]
    fn test_validation_error_is_not_retryable() {
        let policy = FaultPolicy::default();
        let fault = Fault::new("0x80060891", "attribute does not exist").with_status(400);
        assert_eq!(
            policy.classify(&op(), &fault),
            FaultDisposition::NonRetryable
        );
    }

    #[test]
    fn test_rejected_credentials_are_fatal() {
        let policy = FaultPolicy::default();
        let fault = Fault::new("unknown", "token expired").with_status(401);
        assert_eq!(policy.classify(&op(), &fault), FaultDisposition::Fatal);
    }

    #[test]
    fn test_unknown_server_error_defaults_to_retryable() {
        let policy = FaultPolicy::default();
        let fault = Fault::new("0x80048d19", "generic SQL error").with_status(500);
        assert_eq!(policy.classify(&op(), &fault), FaultDisposition::Retryable);
    }

    #[test]
    fn test_unknown_client_error_defaults_to_non_retryable() {
        let policy = FaultPolicy::default();
        let fault = Fault::new("0x80040333", "duplicate record").with_status(409);
        assert_eq!(
            policy.classify(&op(), &fault),
            FaultDisposition::NonRetryable
        );
    }

    #[test]
    fn test_statusless_fault_defaults_to_non_retryable() {
        let policy = FaultPolicy::empty();
        let fault = Fault::new("mystery", "no status attached");
        assert_eq!(
            policy.classify(&op(), &fault),
            FaultDisposition::NonRetryable
        );
    }

    #[test]
    fn test_prepended_rule_wins() {
        // 404 on delete means the record is already gone; a caller may
        // choose to tolerate that differently from the default table.
        let policy = FaultPolicy::default().with_rule(
            FaultRule::for_status(404, FaultDisposition::Retryable).for_operation("delete"),
        );

        let fault = Fault::new("0x80040217", "does not exist").with_status(404);
        assert_eq!(
            policy.classify(&Operation::delete("contacts", "1"), &fault),
            FaultDisposition::Retryable
        );
        // Other operation kinds still hit the default rule
        assert_eq!(
            policy.classify(&op(), &fault),
            FaultDisposition::NonRetryable
        );
    }

    #[test]
    fn test_code_match_is_case_insensitive() {
        let policy = FaultPolicy::default();
        let fault = Fault::new("0X80072322", "throttled");
        assert_eq!(policy.classify(&op(), &fault), FaultDisposition::Retryable);
    }
}
