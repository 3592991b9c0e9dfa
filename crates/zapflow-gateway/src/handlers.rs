// SPDX-FileCopyrightText: 2026 Zapflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Request handlers: `GET /health` and `POST /webhook/evolution`.

use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, error, info, warn};
use zapflow_core::ZapflowError;

use crate::events::{WebhookEvent, parse_webhook};
use crate::server::GatewayState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub uptime_secs: u64,
}

/// Acknowledgement returned for every accepted webhook call.
#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct WebhookAck {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl WebhookAck {
    fn new(status: &'static str) -> Self {
        Self {
            status,
            detail: None,
        }
    }

    fn with_detail(status: &'static str, detail: impl Into<String>) -> Self {
        Self {
            status,
            detail: Some(detail.into()),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// GET /health
pub async fn get_health(State(state): State<GatewayState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        uptime_secs: state.started_at.elapsed().as_secs(),
    })
}

/// POST /webhook/evolution
pub async fn post_evolution_webhook(
    State(state): State<GatewayState>,
    Json(body): Json<Value>,
) -> Response {
    let event = match parse_webhook(&body) {
        Ok(event) => event,
        Err(e) => return error_response(&e),
    };

    match event {
        WebhookEvent::Message(message) => match state.recorder.record(&message).await {
            Ok(stored) => {
                debug!(conversation_key = %stored.conversation_key, "webhook message stored");
                ack(WebhookAck::new("recorded"))
            }
            // Events for instances this deployment does not manage.
            Err(ZapflowError::NotFound { id, .. }) => {
                debug!(instance = %id, "webhook for unknown instance");
                ack(WebhookAck::with_detail("ignored", "unknown instance"))
            }
            Err(e) => error_response(&e),
        },
        WebhookEvent::Messages(messages) => {
            let mut recorded = 0usize;
            for message in &messages {
                match state.recorder.record(message).await {
                    Ok(_) => recorded += 1,
                    // Every entry of a batch shares the same instance.
                    Err(ZapflowError::NotFound { id, .. }) => {
                        debug!(instance = %id, "webhook batch for unknown instance");
                        return ack(WebhookAck::with_detail("ignored", "unknown instance"));
                    }
                    Err(e) => return error_response(&e),
                }
            }
            ack(WebhookAck::with_detail(
                "recorded",
                format!("{recorded}/{}", messages.len()),
            ))
        }
        WebhookEvent::StatusUpdates(updates) => {
            let mut updated = 0usize;
            for update in &updates {
                match state
                    .recorder
                    .update_status(&update.external_id, &update.status)
                    .await
                {
                    Ok(true) => updated += 1,
                    Ok(false) => {}
                    Err(e) => return error_response(&e),
                }
            }
            ack(WebhookAck::with_detail(
                "updated",
                format!("{updated}/{}", updates.len()),
            ))
        }
        WebhookEvent::Connection {
            instance_name,
            state: connection,
        } => {
            info!(instance = %instance_name, state = %connection, "connection update");
            if !connection.is_open() {
                return ack(WebhookAck::new("noted"));
            }
            match state.recorder.instance_connected(&instance_name).await {
                Ok(Some(outcome)) if outcome.needs_retry() => {
                    warn!(instance = %instance_name, ?outcome, "reconciliation incomplete");
                    ack(WebhookAck::with_detail("reconciled", "incomplete"))
                }
                Ok(Some(_)) => ack(WebhookAck::new("reconciled")),
                Ok(None) => ack(WebhookAck::with_detail("ignored", "unknown instance")),
                Err(e) => error_response(&e),
            }
        }
        WebhookEvent::Ignored { event, reason } => {
            debug!(event, reason, "webhook ignored");
            ack(WebhookAck::with_detail("ignored", reason))
        }
    }
}

fn ack(body: WebhookAck) -> Response {
    (StatusCode::OK, Json(body)).into_response()
}

fn error_response(err: &ZapflowError) -> Response {
    let status = match err {
        ZapflowError::Validation { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        ZapflowError::NotFound { .. } => StatusCode::NOT_FOUND,
        ZapflowError::InstanceUnresolved { .. } | ZapflowError::Timeout { .. } => {
            StatusCode::SERVICE_UNAVAILABLE
        }
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status.is_server_error() {
        error!(error = %err, "webhook processing failed");
    } else {
        debug!(error = %err, "webhook rejected");
    }
    (
        status,
        Json(ErrorResponse {
            error: err.to_string(),
        }),
    )
        .into_response()
}
