// SPDX-FileCopyrightText: 2026 Zapflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Webhook receiver for instance API events.
//!
//! Message events are persisted through [`MessageRecorder`], delivery
//! status updates patch stored messages, and `open` connection updates
//! trigger a reconciliation of the configuration behind the instance.

pub mod auth;
pub mod events;
pub mod handlers;
pub mod server;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use zapflow_agent::MessageRecorder;
use zapflow_config::model::GatewayConfig;
use zapflow_core::ZapflowError;

pub use auth::WebhookAuth;
pub use events::{WebhookEvent, parse_webhook};
pub use server::{GatewayState, router};

/// The webhook receiver as a background task.
pub struct WebhookGateway {
    config: GatewayConfig,
    recorder: MessageRecorder,
}

impl WebhookGateway {
    pub fn new(config: &GatewayConfig, recorder: MessageRecorder) -> Self {
        Self {
            config: config.clone(),
            recorder,
        }
    }

    pub fn state(&self) -> GatewayState {
        GatewayState::new(
            self.recorder.clone(),
            WebhookAuth::new(self.config.webhook_secret.clone()),
        )
    }

    /// Spawns the server; it stops when `cancel` fires.
    pub fn spawn(self, cancel: CancellationToken) -> JoinHandle<Result<(), ZapflowError>> {
        let state = self.state();
        tokio::spawn(async move {
            server::start_server(&self.config.host, self.config.port, state, cancel).await
        })
    }
}
