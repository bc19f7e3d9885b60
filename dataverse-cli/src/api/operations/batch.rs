//! $batch request construction and response parsing
//!
//! Operations are rendered as independent parts of a `multipart/mixed`
//! payload, one embedded HTTP request per operation. Parts are deliberately
//! not wrapped in a changeset: a changeset is atomic, and bulk execution
//! needs each operation to fail independently of its batch-mates.

use super::operation::Operation;
use crate::api::executor::{ExecuteResponse, ItemOutcome};
use crate::api::fault::Fault;
use anyhow::{Context, Result};
use serde_json::Value;
use std::collections::HashMap;
use uuid::Uuid;

/// A rendered $batch payload ready for submission.
#[derive(Debug, Clone)]
pub struct BatchRequest {
    pub boundary: String,
    pub body: String,
}

impl BatchRequest {
    /// Value for the Content-Type header of the $batch call.
    pub fn content_type(&self) -> String {
        format!("multipart/mixed; boundary={}", self.boundary)
    }
}

/// Method, route and body of a single operation, relative to the Web API root.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct RequestParts {
    pub method: &'static str,
    pub path: String,
    pub body: Option<String>,
}

/// Map an operation onto its Web API route.
pub(crate) fn request_parts(operation: &Operation) -> Result<RequestParts> {
    let method = operation.http_method();
    let (path, body) = match operation {
        Operation::Create { entity, data } => (
            format!("/{entity}"),
            Some(serde_json::to_string(data)?),
        ),
        Operation::Update { entity, id, data } => (
            format!("/{entity}({id})"),
            Some(serde_json::to_string(data)?),
        ),
        Operation::Delete { entity, id } => (format!("/{entity}({id})"), None),
        Operation::Upsert {
            entity,
            key_field,
            key_value,
            data,
        } => (
            format!("/{entity}({key_field}='{}')", urlencoding::encode(key_value)),
            Some(serde_json::to_string(data)?),
        ),
        Operation::AssociateRef {
            entity,
            entity_ref,
            navigation_property,
            target_ref,
        } => (
            format!("/{entity}({entity_ref})/{navigation_property}/$ref"),
            Some(serde_json::to_string(
                &serde_json::json!({ "@odata.id": target_ref }),
            )?),
        ),
        Operation::DisassociateRef {
            entity,
            entity_ref,
            navigation_property,
            target_id,
        } => (
            format!("/{entity}({entity_ref})/{navigation_property}({target_id})/$ref"),
            None,
        ),
        Operation::Action { name, parameters } => (
            format!("/{name}"),
            if parameters.is_null() {
                None
            } else {
                Some(serde_json::to_string(parameters)?)
            },
        ),
    };
    Ok(RequestParts { method, path, body })
}

/// Builds a `multipart/mixed` $batch payload, preserving operation order and
/// numbering parts with sequential Content-IDs.
pub struct BatchRequestBuilder {
    api_path: String,
    boundary: String,
    parts: Vec<String>,
}

impl BatchRequestBuilder {
    /// `api_path` is the Web API root the embedded request lines address,
    /// e.g. "/api/data/v9.2".
    pub fn new(api_path: impl Into<String>) -> Self {
        Self {
            api_path: api_path.into(),
            boundary: format!("batch_{}", Uuid::new_v4()),
            parts: Vec::new(),
        }
    }

    /// Append one operation as an independent part.
    pub fn add(&mut self, operation: &Operation) -> Result<()> {
        let parts = request_parts(operation)?;
        let content_id = self.parts.len() + 1;

        let mut part = String::new();
        part.push_str("Content-Type: application/http\r\n");
        part.push_str("Content-Transfer-Encoding: binary\r\n");
        part.push_str(&format!("Content-ID: {content_id}\r\n"));
        part.push_str("\r\n");
        part.push_str(&format!(
            "{} {}{} HTTP/1.1\r\n",
            parts.method, self.api_path, parts.path
        ));
        if let Some(body) = parts.body {
            part.push_str("Content-Type: application/json\r\n");
            part.push_str("\r\n");
            part.push_str(&body);
            part.push_str("\r\n");
        } else {
            part.push_str("\r\n");
        }

        self.parts.push(part);
        Ok(())
    }

    pub fn build(self) -> Result<BatchRequest> {
        anyhow::ensure!(!self.parts.is_empty(), "cannot build an empty batch");

        let mut body = String::new();
        for part in &self.parts {
            body.push_str(&format!("--{}\r\n", self.boundary));
            body.push_str(part);
        }
        body.push_str(&format!("--{}--\r\n", self.boundary));

        Ok(BatchRequest {
            boundary: self.boundary,
            body,
        })
    }
}

/// Parses a `multipart/mixed` $batch response back into one outcome per
/// submitted operation, in document order.
pub struct BatchResponseParser;

impl BatchResponseParser {
    pub fn parse(content_type: &str, body: &str) -> Result<Vec<ItemOutcome>> {
        let boundary = Self::boundary_from_content_type(content_type)?;
        let normalized = body.replace("\r\n", "\n");

        let delimiter = format!("--{boundary}");
        let mut outcomes = Vec::new();
        for section in normalized.split(&delimiter).skip(1) {
            // The terminator renders as "--" followed by trailing whitespace.
            if section.trim_start().starts_with("--") || section.trim().is_empty() {
                continue;
            }
            outcomes.push(Self::parse_part(section)?);
        }
        Ok(outcomes)
    }

    fn boundary_from_content_type(content_type: &str) -> Result<String> {
        let boundary = content_type
            .split(';')
            .map(str::trim)
            .find_map(|param| param.strip_prefix("boundary="))
            .context("batch response Content-Type carries no boundary")?;
        Ok(boundary.trim_matches('"').to_string())
    }

    /// One part: outer MIME headers, a blank line, then an embedded HTTP
    /// response (status line, headers, blank line, optional body).
    fn parse_part(section: &str) -> Result<ItemOutcome> {
        let embedded = section
            .split_once("\n\n")
            .map(|(_, rest)| rest)
            .unwrap_or(section)
            .trim_start_matches('\n');

        let mut lines = embedded.lines();
        let status_line = lines
            .next()
            .context("batch response part is missing its status line")?;
        let status: u16 = status_line
            .split_whitespace()
            .nth(1)
            .and_then(|code| code.parse().ok())
            .with_context(|| format!("unparseable status line in batch response: {status_line}"))?;

        let mut headers = HashMap::new();
        let mut body_lines = Vec::new();
        let mut in_body = false;
        for line in lines {
            if in_body {
                body_lines.push(line);
            } else if line.trim().is_empty() {
                in_body = true;
            } else if let Some((name, value)) = line.split_once(':') {
                headers.insert(name.trim().to_string(), value.trim().to_string());
            }
        }

        let text = body_lines.join("\n");
        let text = text.trim();
        let body: Option<Value> = if text.is_empty() {
            None
        } else {
            Some(
                serde_json::from_str(text)
                    .unwrap_or_else(|_| Value::String(text.to_string())),
            )
        };

        if status >= 400 {
            let payload = body.unwrap_or(Value::Null);
            return Ok(Err(Fault::from_error_body(status, &payload)));
        }

        Ok(Ok(ExecuteResponse {
            status,
            headers,
            body,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_operations() -> Vec<Operation> {
        vec![
            Operation::create("contacts", json!({"lastname": "Doe"})),
            Operation::delete("accounts", "6f2a7c1e-0000-0000-0000-000000000001"),
            Operation::upsert("contacts", "emailaddress1", "a b@contoso.com", json!({"firstname": "A"})),
        ]
    }

    #[test]
    fn test_builder_renders_parts_in_order() {
        let mut builder = BatchRequestBuilder::new("/api/data/v9.2");
        for operation in &sample_operations() {
            builder.add(operation).unwrap();
        }
        let request = builder.build().unwrap();

        let first = request.body.find("Content-ID: 1").unwrap();
        let second = request.body.find("Content-ID: 2").unwrap();
        let third = request.body.find("Content-ID: 3").unwrap();
        assert!(first < second && second < third);

        assert!(request.body.contains("POST /api/data/v9.2/contacts HTTP/1.1"));
        assert!(request.body.contains(
            "DELETE /api/data/v9.2/accounts(6f2a7c1e-0000-0000-0000-000000000001) HTTP/1.1"
        ));
        // Alternate-key values are percent-encoded into the route
        assert!(request.body.contains("contacts(emailaddress1='a%20b%40contoso.com')"));
        assert!(request.body.ends_with(&format!("--{}--\r\n", request.boundary)));
    }

    #[test]
    fn test_builder_rejects_empty_batch() {
        let builder = BatchRequestBuilder::new("/api/data/v9.2");
        assert!(builder.build().is_err());
    }

    #[test]
    fn test_content_type_carries_boundary() {
        let mut builder = BatchRequestBuilder::new("/api/data/v9.2");
        builder.add(&Operation::delete("contacts", "1")).unwrap();
        let request = builder.build().unwrap();
        assert_eq!(
            request.content_type(),
            format!("multipart/mixed; boundary={}", request.boundary)
        );
    }

    #[test]
    fn test_associate_ref_body() {
        let operation = Operation::AssociateRef {
            entity: "accounts".to_string(),
            entity_ref: "guid-a".to_string(),
            navigation_property: "contact_customer_accounts".to_string(),
            target_ref: "/contacts(guid-b)".to_string(),
        };
        let parts = request_parts(&operation).unwrap();
        assert_eq!(parts.method, "POST");
        assert_eq!(parts.path, "/accounts(guid-a)/contact_customer_accounts/$ref");
        assert_eq!(parts.body.as_deref(), Some(r#"{"@odata.id":"/contacts(guid-b)"}"#));
    }

    fn sample_response(boundary: &str) -> String {
        [
            &format!("--{boundary}"),
            "Content-Type: application/http",
            "",
            "HTTP/1.1 204 No Content",
            "OData-EntityId: https://org.crm.dynamics.com/api/data/v9.2/contacts(11111111-0000-0000-0000-000000000000)",
            "",
            "",
            &format!("--{boundary}"),
            "Content-Type: application/http",
            "",
            "HTTP/1.1 412 Precondition Failed",
            "Content-Type: application/json; odata.metadata=minimal",
            "",
            r#"{"error":{"code":"0x80060891","message":"A record with matching key values already exists."}}"#,
            &format!("--{boundary}"),
            "Content-Type: application/http",
            "",
            "HTTP/1.1 200 OK",
            "Content-Type: application/json",
            "",
            r#"{"name":"Contoso"}"#,
            &format!("--{boundary}--"),
            "",
        ]
        .join("\r\n")
    }

    #[test]
    fn test_parser_preserves_part_order() {
        let boundary = "batchresponse_7f2e";
        let outcomes = BatchResponseParser::parse(
            &format!("multipart/mixed; boundary={boundary}"),
            &sample_response(boundary),
        )
        .unwrap();

        assert_eq!(outcomes.len(), 3);

        let first = outcomes[0].as_ref().unwrap();
        assert_eq!(first.status, 204);
        assert!(first.header("OData-EntityId").unwrap().contains("contacts("));

        let second = outcomes[1].as_ref().unwrap_err();
        assert_eq!(second.status, Some(412));
        assert_eq!(second.code, "0x80060891");

        let third = outcomes[2].as_ref().unwrap();
        assert_eq!(third.status, 200);
        assert_eq!(third.body, Some(json!({"name": "Contoso"})));
    }

    #[test]
    fn test_parser_handles_quoted_boundary() {
        let boundary = "batchresponse_abc";
        let outcomes = BatchResponseParser::parse(
            &format!(r#"multipart/mixed; boundary="{boundary}""#),
            &sample_response(boundary),
        )
        .unwrap();
        assert_eq!(outcomes.len(), 3);
    }

    #[test]
    fn test_parser_rejects_missing_boundary() {
        assert!(BatchResponseParser::parse("application/json", "{}").is_err());
    }

    #[test]
    fn test_parser_tolerates_bare_newlines() {
        let boundary = "batchresponse_lf";
        let body = sample_response(boundary).replace("\r\n", "\n");
        let outcomes = BatchResponseParser::parse(
            &format!("multipart/mixed; boundary={boundary}"),
            &body,
        )
        .unwrap();
        assert_eq!(outcomes.len(), 3);
    }

    #[test]
    fn test_parser_keeps_non_json_error_body() {
        let boundary = "b";
        let body = [
            &format!("--{boundary}"),
            "Content-Type: application/http",
            "",
            "HTTP/1.1 503 Service Unavailable",
            "",
            "upstream gateway saturated",
            &format!("--{boundary}--"),
            "",
        ]
        .join("\r\n");

        let outcomes =
            BatchResponseParser::parse(&format!("multipart/mixed; boundary={boundary}"), &body)
                .unwrap();
        let fault = outcomes[0].as_ref().unwrap_err();
        assert_eq!(fault.status, Some(503));
        assert_eq!(fault.code, "unknown");
    }
}
