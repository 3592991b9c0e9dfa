// SPDX-FileCopyrightText: 2026 Zapflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `AuthAdapter` over the backend's auth endpoints (`/auth/v1`).

use async_trait::async_trait;
use reqwest::Method;
use secrecy::SecretString;
use serde_json::{json, Value};
use tracing::{debug, info};
use zapflow_core::{
    AdapterType, AuthAdapter, HealthStatus, OwnerId, PluginAdapter, Session, SignUpOutcome,
    ZapflowError,
};

use crate::client::{error_message, BackendClient};

/// Email + password auth with OTP confirmation.
pub struct RestAuth {
    client: BackendClient,
}

impl RestAuth {
    pub fn new(client: BackendClient) -> Self {
        Self { client }
    }

    async fn call(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, &str)],
        bearer: Option<&SecretString>,
        body: Value,
        what: &str,
    ) -> Result<Value, ZapflowError> {
        let bearer = bearer.unwrap_or(self.client.anon_key());
        let request = self.client.request(method, path, query, bearer)?.json(&body);
        match self.client.execute(request, what).await {
            Ok(response) => Ok(response.body),
            Err(e @ ZapflowError::Backend { .. }) => Err(ZapflowError::Auth {
                message: error_message(&e),
            }),
            Err(e) => Err(e),
        }
    }
}

/// Builds a session from a token grant (`access_token`, `refresh_token`,
/// `expires_at`, `user`).
fn parse_session(body: &Value) -> Option<Session> {
    let access_token = body.get("access_token")?.as_str()?;
    let user = body.get("user")?;
    Some(Session {
        owner_id: OwnerId(user.get("id")?.as_str()?.to_string()),
        email: user.get("email").and_then(Value::as_str).map(str::to_string),
        access_token: Some(SecretString::from(access_token)),
        refresh_token: body
            .get("refresh_token")
            .and_then(Value::as_str)
            .map(SecretString::from),
        expires_at: body.get("expires_at").and_then(Value::as_i64),
    })
}

fn session_or_error(body: &Value, what: &str) -> Result<Session, ZapflowError> {
    parse_session(body).ok_or_else(|| ZapflowError::Auth {
        message: format!("{what} response carried no session"),
    })
}

#[async_trait]
impl PluginAdapter for RestAuth {
    fn name(&self) -> &str {
        "rest-auth"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Auth
    }

    async fn health_check(&self) -> Result<HealthStatus, ZapflowError> {
        let request = self.client.request(
            Method::GET,
            "/auth/v1/health",
            &[],
            self.client.anon_key(),
        )?;
        match self.client.execute(request, "auth health").await {
            Ok(_) => Ok(HealthStatus::Healthy),
            Err(e) => Ok(HealthStatus::Unhealthy(e.to_string())),
        }
    }

    async fn shutdown(&self) -> Result<(), ZapflowError> {
        Ok(())
    }
}

#[async_trait]
impl AuthAdapter for RestAuth {
    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        metadata: Value,
    ) -> Result<SignUpOutcome, ZapflowError> {
        let body = self
            .call(
                Method::POST,
                "/auth/v1/signup",
                &[],
                None,
                json!({ "email": email, "password": password, "data": metadata }),
                "sign-up",
            )
            .await?;

        // With confirmation required the body is the bare user; otherwise a token grant.
        if let Some(session) = parse_session(&body) {
            info!(owner_id = %session.owner_id, "account created with session");
            return Ok(SignUpOutcome {
                owner_id: session.owner_id.clone(),
                session: Some(session),
            });
        }

        let owner_id = body
            .get("id")
            .or_else(|| body.get("user").and_then(|u| u.get("id")))
            .and_then(Value::as_str)
            .ok_or_else(|| ZapflowError::Auth {
                message: "sign-up response carried no user id".into(),
            })?;
        info!(owner_id, "account created, email confirmation pending");
        Ok(SignUpOutcome {
            owner_id: OwnerId(owner_id.to_string()),
            session: None,
        })
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<Session, ZapflowError> {
        let body = self
            .call(
                Method::POST,
                "/auth/v1/token",
                &[("grant_type", "password")],
                None,
                json!({ "email": email, "password": password }),
                "sign-in",
            )
            .await?;
        session_or_error(&body, "sign-in")
    }

    async fn verify_otp(&self, email: &str, token: &str) -> Result<Session, ZapflowError> {
        let body = self
            .call(
                Method::POST,
                "/auth/v1/verify",
                &[],
                None,
                json!({ "type": "signup", "email": email, "token": token }),
                "OTP verification",
            )
            .await?;
        session_or_error(&body, "OTP verification")
    }

    async fn update_user_metadata(
        &self,
        session: &Session,
        metadata: Value,
    ) -> Result<(), ZapflowError> {
        let token = session.access_token.as_ref().ok_or_else(|| ZapflowError::Auth {
            message: "updating user metadata requires a signed-in session".into(),
        })?;
        self.call(
            Method::PUT,
            "/auth/v1/user",
            &[],
            Some(token),
            json!({ "data": metadata }),
            "user metadata update",
        )
        .await?;
        debug!(owner_id = %session.owner_id, "user metadata updated");
        Ok(())
    }
}
