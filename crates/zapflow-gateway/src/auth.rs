// SPDX-FileCopyrightText: 2026 Zapflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Shared-secret check for webhook calls.
//!
//! The instance API sends its global key in the `apikey` header. When a
//! secret is configured, calls without the matching header are rejected.
//! Without one, every call is accepted.

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::Response,
};
use secrecy::{ExposeSecret, SecretString};

pub const SECRET_HEADER: &str = "apikey";

#[derive(Clone, Debug)]
pub struct WebhookAuth {
    secret: Option<SecretString>,
}

impl WebhookAuth {
    pub fn new(secret: Option<String>) -> Self {
        Self {
            secret: secret.filter(|s| !s.is_empty()).map(SecretString::from),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.secret.is_some()
    }

    fn accepts(&self, presented: Option<&str>) -> bool {
        match (&self.secret, presented) {
            (None, _) => true,
            (Some(expected), Some(presented)) => presented == expected.expose_secret(),
            (Some(_), None) => false,
        }
    }
}

pub async fn webhook_auth(
    State(auth): State<WebhookAuth>,
    request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let presented = request
        .headers()
        .get(SECRET_HEADER)
        .and_then(|v| v.to_str().ok());

    if auth.accepts(presented) {
        Ok(next.run(request).await)
    } else {
        tracing::warn!(
            header_present = presented.is_some(),
            "webhook call rejected: secret mismatch"
        );
        Err(StatusCode::UNAUTHORIZED)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_accepts_everything() {
        let auth = WebhookAuth::new(None);
        assert!(!auth.is_enabled());
        assert!(auth.accepts(None));
        assert!(auth.accepts(Some("anything")));
    }

    #[test]
    fn empty_secret_counts_as_disabled() {
        assert!(!WebhookAuth::new(Some(String::new())).is_enabled());
    }

    #[test]
    fn enabled_requires_exact_match() {
        let auth = WebhookAuth::new(Some("hook-secret".into()));
        assert!(auth.accepts(Some("hook-secret")));
        assert!(!auth.accepts(Some("hook-secre")));
        assert!(!auth.accepts(Some("hook-secret-2")));
        assert!(!auth.accepts(Some("HOOK-SECRET")));
        assert!(!auth.accepts(Some("")));
        assert!(!auth.accepts(None));
    }

    #[test]
    fn debug_does_not_leak_secret() {
        let auth = WebhookAuth::new(Some("hook-secret".into()));
        assert!(!format!("{auth:?}").contains("hook-secret"));
    }
}
