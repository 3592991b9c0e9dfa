// SPDX-FileCopyrightText: 2026 Zapflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP client for the instance-management API.
//!
//! Provides [`EvolutionClient`] which handles authentication, request
//! construction and status mapping. Response bodies are returned as raw JSON;
//! [`crate::parse`] turns them into typed values.

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::{Method, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;
use tracing::debug;
use zapflow_core::ZapflowError;
use zapflow_security::redact;

/// A non-2xx answer from the API, kept apart from transport failures so
/// callers can treat 404 as "absent".
#[derive(Debug)]
pub struct ApiStatusError {
    pub status: StatusCode,
    pub body: String,
}

impl std::fmt::Display for ApiStatusError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "API returned {}: {}", self.status, self.body)
    }
}

impl std::error::Error for ApiStatusError {}

/// HTTP client for instance API communication.
#[derive(Debug, Clone)]
pub struct EvolutionClient {
    client: reqwest::Client,
    base_url: String,
}

impl EvolutionClient {
    /// Creates a client that sends `api_key` in the `apikey` header of every request.
    pub fn new(
        base_url: &str,
        api_key: &SecretString,
        timeout: Duration,
    ) -> Result<Self, ZapflowError> {
        let mut headers = HeaderMap::new();
        let mut key = HeaderValue::from_str(api_key.expose_secret())
            .map_err(|e| ZapflowError::Config(format!("invalid API key header value: {e}")))?;
        key.set_sensitive(true);
        headers.insert("apikey", key);
        headers.insert("content-type", HeaderValue::from_static("application/json"));

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|e| ZapflowError::RemoteApi {
                message: format!("failed to build HTTP client: {e}"),
                source: Some(Box::new(e)),
            })?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn get(&self, path: &str, query: &[(&str, &str)]) -> Result<Value, ZapflowError> {
        self.send(Method::GET, path, query, None).await
    }

    pub async fn post(&self, path: &str, body: &Value) -> Result<Value, ZapflowError> {
        self.send(Method::POST, path, &[], Some(body)).await
    }

    pub async fn delete(&self, path: &str) -> Result<Value, ZapflowError> {
        self.send(Method::DELETE, path, &[], None).await
    }

    async fn send(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, &str)],
        body: Option<&Value>,
    ) -> Result<Value, ZapflowError> {
        let url = reqwest::Url::parse_with_params(&format!("{}{}", self.base_url, path), query)
            .map_err(|e| ZapflowError::Config(format!("invalid instance API URL: {e}")))?;
        let mut request = self.client.request(method.clone(), url);
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(|e| ZapflowError::RemoteApi {
            message: format!("{method} {path} failed: {e}"),
            source: Some(Box::new(e)),
        })?;

        let status = response.status();
        let text = response.text().await.map_err(|e| ZapflowError::RemoteApi {
            message: format!("failed to read response body: {e}"),
            source: Some(Box::new(e)),
        })?;
        let text = redact(&text, &[]);
        debug!(%method, path, status = %status, body = %truncate(&text, 512), "instance API response");

        if !status.is_success() {
            return Err(ZapflowError::RemoteApi {
                message: format!("{method} {path} returned {status}"),
                source: Some(Box::new(ApiStatusError { status, body: text })),
            });
        }

        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&text).map_err(|e| ZapflowError::RemoteApi {
            message: format!("failed to parse {path} response: {e}"),
            source: Some(Box::new(e)),
        })
    }
}

/// Returns the HTTP status carried by a [`ZapflowError::RemoteApi`], if any.
pub fn error_status(err: &ZapflowError) -> Option<StatusCode> {
    match err {
        ZapflowError::RemoteApi {
            source: Some(source),
            ..
        } => source.downcast_ref::<ApiStatusError>().map(|e| e.status),
        _ => None,
    }
}

fn truncate(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
