// SPDX-FileCopyrightText: 2026 Zapflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Webhook HTTP server built on axum.

use std::time::Instant;

use axum::{
    Router, middleware as axum_middleware,
    routing::{get, post},
};
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use zapflow_agent::MessageRecorder;
use zapflow_core::ZapflowError;

use crate::auth::{WebhookAuth, webhook_auth};
use crate::handlers;

/// Shared state for axum request handlers.
#[derive(Clone)]
pub struct GatewayState {
    pub recorder: MessageRecorder,
    pub auth: WebhookAuth,
    pub started_at: Instant,
}

impl GatewayState {
    pub fn new(recorder: MessageRecorder, auth: WebhookAuth) -> Self {
        Self {
            recorder,
            auth,
            started_at: Instant::now(),
        }
    }
}

/// Routes:
/// - `GET /health` (public)
/// - `POST /webhook/evolution` (shared-secret check when configured)
pub fn router(state: GatewayState) -> Router {
    let public_routes = Router::new()
        .route("/health", get(handlers::get_health))
        .with_state(state.clone());

    let webhook_routes = Router::new()
        .route("/webhook/evolution", post(handlers::post_evolution_webhook))
        .route_layer(axum_middleware::from_fn_with_state(
            state.auth.clone(),
            webhook_auth,
        ))
        .with_state(state);

    Router::new()
        .merge(public_routes)
        .merge(webhook_routes)
        .layer(TraceLayer::new_for_http())
}

/// Binds `host:port` and serves until `cancel` fires.
pub async fn start_server(
    host: &str,
    port: u16,
    state: GatewayState,
    cancel: CancellationToken,
) -> Result<(), ZapflowError> {
    let addr = format!("{host}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| ZapflowError::Config(format!("failed to bind gateway to {addr}: {e}")))?;

    tracing::info!(%addr, auth = state.auth.is_enabled(), "webhook receiver listening");
    if !state.auth.is_enabled() {
        tracing::warn!("gateway.webhook_secret is not set; webhooks are accepted without a key");
    }

    axum::serve(listener, router(state))
        .with_graceful_shutdown(cancel.cancelled_owned())
        .await
        .map_err(|e| ZapflowError::Internal(format!("gateway server error: {e}")))?;

    tracing::info!("webhook receiver stopped");
    Ok(())
}
