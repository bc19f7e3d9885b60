//! Dataverse Web API client
//!
//! Implements the [`Executor`] capability over HTTP. Single operations go
//! to their OData route; batches go to `POST {api}/$batch` as
//! `multipart/mixed` with one independent part per operation, so a failing
//! part never aborts its batch-mates.

use anyhow::{Context, Result};
use async_trait::async_trait;
use log::debug;
use reqwest::header::{HeaderMap, HeaderValue};
use std::collections::HashMap;

use crate::api::executor::{ExecuteResponse, Executor, ItemOutcome};
use crate::api::fault::Fault;
use crate::api::operations::batch::request_parts;
use crate::api::operations::{BatchRequestBuilder, BatchResponseParser, Operation};

const API_PATH: &str = "/api/data/v9.2";

pub struct DataverseClient {
    http: reqwest::Client,
    base_url: String,
    token: String,
}

impl DataverseClient {
    /// `base_url` is the environment root, e.g.
    /// `https://yourorg.crm.dynamics.com`. Acquiring the bearer token is
    /// the caller's concern.
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert("OData-MaxVersion", HeaderValue::from_static("4.0"));
        headers.insert("OData-Version", HeaderValue::from_static("4.0"));
        headers.insert("Accept", HeaderValue::from_static("application/json"));

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .build()
            .context("failed to build HTTP client")?;

        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
        })
    }

    fn api_url(&self, path: &str) -> String {
        format!("{}{}{}", self.base_url, API_PATH, path)
    }

    fn headers_to_map(headers: &reqwest::header::HeaderMap) -> HashMap<String, String> {
        headers
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|value| (name.to_string(), value.to_string()))
            })
            .collect()
    }
}

#[async_trait]
impl Executor for DataverseClient {
    async fn execute(&self, operation: &Operation) -> Result<ItemOutcome> {
        let parts = request_parts(operation)?;
        let url = self.api_url(&parts.path);
        debug!("{} {}", parts.method, url);

        let method: reqwest::Method = parts
            .method
            .parse()
            .context("operation mapped to an invalid HTTP method")?;
        let mut request = self.http.request(method, &url).bearer_auth(&self.token);
        if let Some(body) = parts.body {
            request = request
                .header("Content-Type", "application/json")
                .body(body);
        }

        // A connection-level failure is a transport error; an HTTP error
        // status is a per-item fault.
        let response = request.send().await.context("request failed to send")?;
        let status = response.status().as_u16();
        let headers = Self::headers_to_map(response.headers());
        let text = response.text().await.context("failed to read response body")?;
        let body = if text.trim().is_empty() {
            None
        } else {
            serde_json::from_str(&text).ok()
        };

        if status >= 400 {
            let payload = body.unwrap_or(serde_json::Value::String(text));
            return Ok(Err(Fault::from_error_body(status, &payload)));
        }

        Ok(Ok(ExecuteResponse {
            status,
            headers,
            body,
        }))
    }

    async fn execute_batch(&self, operations: &[Operation]) -> Result<Vec<ItemOutcome>> {
        let mut builder = BatchRequestBuilder::new(API_PATH);
        for operation in operations {
            builder.add(operation)?;
        }
        let batch = builder.build()?;

        let url = self.api_url("/$batch");
        debug!("POST {} ({} part(s))", url, operations.len());

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.token)
            .header("Content-Type", batch.content_type())
            .header("Prefer", "odata.continue-on-error")
            .body(batch.body)
            .send()
            .await
            .context("$batch request failed to send")?;

        // A non-success status on the $batch call itself means no part was
        // individually answered; surface it as a batch-level failure.
        let status = response.status();
        if !status.is_success() {
            let snippet: String = response
                .text()
                .await
                .unwrap_or_default()
                .chars()
                .take(500)
                .collect();
            anyhow::bail!("$batch call failed with HTTP {status}: {snippet}");
        }

        let content_type = response
            .headers()
            .get("Content-Type")
            .and_then(|value| value.to_str().ok())
            .context("$batch response carries no Content-Type")?
            .to_string();
        let body = response
            .text()
            .await
            .context("failed to read $batch response body")?;

        BatchResponseParser::parse(&content_type, &body)
    }
}
