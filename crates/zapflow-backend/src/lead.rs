// SPDX-FileCopyrightText: 2026 Zapflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Lead forwarding to the workflow-automation webhook.
//!
//! Delivery is best effort: failures are logged and never reach the caller.

use std::time::Duration;

use serde::Serialize;
use tracing::{debug, warn};
use zapflow_config::model::LeadsConfig;
use zapflow_core::types::now_timestamp;
use zapflow_core::ZapflowError;

/// Contact details captured at signup.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Lead {
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub company: Option<String>,
    pub plan: Option<String>,
}

#[derive(Serialize)]
struct LeadPayload<'a> {
    source: &'a str,
    #[serde(flatten)]
    lead: &'a Lead,
    submitted_at: String,
}

/// Posts leads to the configured webhook. Without a URL every call is a no-op.
#[derive(Debug, Clone)]
pub struct LeadNotifier {
    client: reqwest::Client,
    url: Option<String>,
    source: String,
}

impl LeadNotifier {
    pub fn new(config: &LeadsConfig, timeout: Duration) -> Result<Self, ZapflowError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ZapflowError::Backend {
                message: format!("failed to build HTTP client: {e}"),
                source: Some(Box::new(e)),
            })?;
        Ok(Self {
            client,
            url: config.webhook_url.clone().filter(|u| !u.is_empty()),
            source: config.source.clone(),
        })
    }

    pub fn is_enabled(&self) -> bool {
        self.url.is_some()
    }

    /// Sends `lead` and waits for the answer. Failures are logged at `warn!`.
    pub async fn notify(&self, lead: &Lead) {
        let Some(url) = &self.url else {
            debug!("lead webhook not configured, skipping");
            return;
        };

        let payload = LeadPayload {
            source: &self.source,
            lead,
            submitted_at: now_timestamp(),
        };
        match self.client.post(url).json(&payload).send().await {
            Ok(response) if response.status().is_success() => {
                debug!(status = %response.status(), "lead delivered");
            }
            Ok(response) => {
                warn!(status = %response.status(), "lead webhook rejected the lead");
            }
            Err(e) => warn!(error = %e, "lead webhook unreachable"),
        }
    }

    /// Sends `lead` on a background task without waiting for it.
    pub fn notify_detached(&self, lead: Lead) -> tokio::task::JoinHandle<()> {
        let notifier = self.clone();
        tokio::spawn(async move { notifier.notify(&lead).await })
    }
}
