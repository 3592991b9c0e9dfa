// SPDX-FileCopyrightText: 2026 Zapflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP client for the hosted backend (REST tables and auth).

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::{Method, RequestBuilder, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;
use tracing::debug;
use zapflow_core::ZapflowError;
use zapflow_security::redact;

/// A non-2xx answer from the backend.
#[derive(Debug)]
pub struct BackendStatusError {
    pub status: StatusCode,
    pub body: String,
}

impl std::fmt::Display for BackendStatusError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "backend returned {}: {}", self.status, self.body)
    }
}

impl std::error::Error for BackendStatusError {}

/// A decoded backend response.
#[derive(Debug)]
pub struct BackendResponse {
    pub headers: HeaderMap,
    pub body: Value,
}

/// HTTP client sending the project's anon key as `apikey` on every request.
#[derive(Debug, Clone)]
pub struct BackendClient {
    client: reqwest::Client,
    base_url: String,
    anon_key: SecretString,
}

impl BackendClient {
    pub fn new(
        base_url: &str,
        anon_key: SecretString,
        timeout: Duration,
    ) -> Result<Self, ZapflowError> {
        let mut headers = HeaderMap::new();
        let mut key = HeaderValue::from_str(anon_key.expose_secret())
            .map_err(|e| ZapflowError::Config(format!("invalid backend key header value: {e}")))?;
        key.set_sensitive(true);
        headers.insert("apikey", key);
        headers.insert("content-type", HeaderValue::from_static("application/json"));

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|e| ZapflowError::Backend {
                message: format!("failed to build HTTP client: {e}"),
                source: Some(Box::new(e)),
            })?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            anon_key,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// The anon key, used as bearer when no user or service token applies.
    pub fn anon_key(&self) -> &SecretString {
        &self.anon_key
    }

    /// Starts a request to `path` authorized with `bearer`.
    pub fn request(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, &str)],
        bearer: &SecretString,
    ) -> Result<RequestBuilder, ZapflowError> {
        let url = reqwest::Url::parse_with_params(&format!("{}{}", self.base_url, path), query)
            .map_err(|e| ZapflowError::Config(format!("invalid backend URL: {e}")))?;
        Ok(self
            .client
            .request(method, url)
            .bearer_auth(bearer.expose_secret()))
    }

    /// Sends the request and decodes the JSON body. Non-2xx answers become
    /// [`ZapflowError::Backend`] carrying a [`BackendStatusError`].
    pub async fn execute(
        &self,
        request: RequestBuilder,
        what: &str,
    ) -> Result<BackendResponse, ZapflowError> {
        let response = request.send().await.map_err(|e| ZapflowError::Backend {
            message: format!("{what} failed: {e}"),
            source: Some(Box::new(e)),
        })?;

        let status = response.status();
        let headers = response.headers().clone();
        let text = response.text().await.map_err(|e| ZapflowError::Backend {
            message: format!("failed to read {what} response: {e}"),
            source: Some(Box::new(e)),
        })?;
        let text = redact(&text, &[]);
        debug!(what, status = %status, "backend response");

        if !status.is_success() {
            return Err(ZapflowError::Backend {
                message: format!("{what} returned {status}"),
                source: Some(Box::new(BackendStatusError { status, body: text })),
            });
        }

        let body = if text.trim().is_empty() {
            Value::Null
        } else {
            serde_json::from_str(&text).map_err(|e| ZapflowError::Backend {
                message: format!("failed to parse {what} response: {e}"),
                source: Some(Box::new(e)),
            })?
        };
        Ok(BackendResponse { headers, body })
    }
}

/// Returns the HTTP status carried by a [`ZapflowError::Backend`], if any.
pub fn error_status(err: &ZapflowError) -> Option<StatusCode> {
    match err {
        ZapflowError::Backend {
            source: Some(source),
            ..
        } => source.downcast_ref::<BackendStatusError>().map(|e| e.status),
        _ => None,
    }
}

/// Best human-readable message from an error body (`msg`, `error_description`,
/// `message`, `error`), falling back to the raw text.
pub fn error_message(err: &ZapflowError) -> String {
    if let ZapflowError::Backend {
        source: Some(source),
        ..
    } = err
        && let Some(status_err) = source.downcast_ref::<BackendStatusError>()
    {
        let parsed: Option<Value> = serde_json::from_str(&status_err.body).ok();
        return parsed
            .as_ref()
            .and_then(|v| {
                ["msg", "error_description", "message", "error"]
                    .iter()
                    .find_map(|k| v.get(*k).and_then(Value::as_str))
            })
            .map(str::to_string)
            .unwrap_or_else(|| status_err.body.clone());
    }
    err.to_string()
}
