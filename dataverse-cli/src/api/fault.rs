//! Structured fault values returned by the Dataverse Web API.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::time::Duration;

/// Well-known fault codes used by the engine itself.
pub mod codes {
    /// The batch call failed before the service produced per-item outcomes.
    pub const TRANSPORT: &str = "transport";
    /// The batch call exceeded its configured deadline.
    pub const TIMEOUT: &str = "timeout";
    /// Service protection: number of requests exceeded.
    pub const THROTTLE_REQUEST_COUNT: &str = "0x80072322";
    /// Service protection: combined execution time exceeded.
    pub const THROTTLE_EXECUTION_TIME: &str = "0x80072321";
    /// Service protection: concurrent request limit exceeded.
    pub const THROTTLE_CONCURRENCY: &str = "0x80072326";
}

/// A structured error from the remote service or the transport layer.
///
/// Faults carry a machine-readable code and a human-readable message, and
/// optionally wrap the fault that caused them, mirroring the service's
/// `innererror` chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fault {
    /// Machine-readable error code (e.g. "0x80072322" or "transport").
    pub code: String,
    /// Human-readable message.
    pub message: String,
    /// HTTP status code, when the fault came from an HTTP response.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    /// The fault that caused this one, if the service reported one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inner: Option<Box<Fault>>,
}

impl Fault {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            status: None,
            inner: None,
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_inner(mut self, inner: Fault) -> Self {
        self.inner = Some(Box::new(inner));
        self
    }

    /// Fault applied to every operation in a batch whose submission failed
    /// outright (connection error, non-success status on the $batch call).
    pub fn transport(message: impl Into<String>) -> Self {
        Self::new(codes::TRANSPORT, message)
    }

    /// Fault applied to every operation in a batch whose submission exceeded
    /// the configured deadline.
    pub fn timeout(deadline: Duration) -> Self {
        Self::new(
            codes::TIMEOUT,
            format!("batch submission exceeded deadline of {deadline:?}"),
        )
    }

    /// Parse a Dataverse error body into a fault chain.
    ///
    /// The service reports errors as `{"error": {"code", "message",
    /// "innererror"?}}`; some endpoints omit the wrapper. Unparseable bodies
    /// still yield a fault carrying the HTTP status.
    pub fn from_error_body(status: u16, body: &Value) -> Self {
        let error = body.get("error").unwrap_or(body);
        let code = error
            .get("code")
            .and_then(Value::as_str)
            .filter(|c| !c.is_empty())
            .unwrap_or("unknown")
            .to_string();
        let message = error
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("the service returned an error without a message")
            .to_string();

        let mut fault = Fault::new(code, message).with_status(status);
        if let Some(inner) = error.get("innererror") {
            let inner_code = inner
                .get("type")
                .or_else(|| inner.get("code"))
                .and_then(Value::as_str)
                .unwrap_or("innererror");
            let inner_message = inner
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or_default();
            fault = fault.with_inner(Fault::new(inner_code, inner_message));
        }
        fault
    }

    /// Walk the chain from this fault down to its root cause.
    pub fn chain(&self) -> impl Iterator<Item = &Fault> {
        std::iter::successors(Some(self), |fault| fault.inner.as_deref())
    }

    pub fn root_cause(&self) -> &Fault {
        let mut current = self;
        while let Some(inner) = current.inner.as_deref() {
            current = inner;
        }
        current
    }
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status {
            Some(status) => write!(f, "{} (HTTP {}): {}", self.code, status, self.message),
            None => write!(f, "{}: {}", self.code, self.message),
        }
    }
}

impl std::error::Error for Fault {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.inner
            .as_deref()
            .map(|inner| inner as &(dyn std::error::Error + 'static))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_display_includes_status() {
        let fault = Fault::new("0x80072322", "rate limit exceeded").with_status(429);
        assert_eq!(
            fault.to_string(),
            "0x80072322 (HTTP 429): rate limit exceeded"
        );
    }

    #[test]
    fn test_chain_walks_to_root_cause() {
        let fault = Fault::new("outer", "outer message")
            .with_inner(Fault::new("middle", "middle message").with_inner(Fault::new("root", "root message")));

        let codes: Vec<&str> = fault.chain().map(|f| f.code.as_str()).collect();
        assert_eq!(codes, vec!["outer", "middle", "root"]);
        assert_eq!(fault.root_cause().code, "root");
    }

    #[test]
    fn test_from_error_body_with_wrapper() {
        let body = json!({
            "error": {
                "code": "0x80040217",
                "message": "account with id 123 does not exist",
                "innererror": {
                    "type": "ObjectNotFoundException",
                    "message": "entity not found"
                }
            }
        });

        let fault = Fault::from_error_body(404, &body);
        assert_eq!(fault.code, "0x80040217");
        assert_eq!(fault.status, Some(404));
        let inner = fault.inner.as_deref().expect("inner fault");
        assert_eq!(inner.code, "ObjectNotFoundException");
    }

    #[test]
    fn test_from_error_body_without_wrapper() {
        let body = json!({ "code": "0x80060891", "message": "bad request" });
        let fault = Fault::from_error_body(400, &body);
        assert_eq!(fault.code, "0x80060891");
        assert_eq!(fault.message, "bad request");
    }

    #[test]
    fn test_from_error_body_unparseable_keeps_status() {
        let fault = Fault::from_error_body(503, &json!("Service Unavailable"));
        assert_eq!(fault.code, "unknown");
        assert_eq!(fault.status, Some(503));
    }

    #[test]
    fn test_error_source_exposes_inner() {
        use std::error::Error;
        let fault = Fault::new("outer", "outer").with_inner(Fault::new("inner", "inner"));
        let source = fault.source().expect("source");
        assert_eq!(source.to_string(), "inner: inner");
    }
}
