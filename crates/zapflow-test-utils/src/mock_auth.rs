// SPDX-FileCopyrightText: 2026 Zapflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock auth adapter for signup and configuration flows.
//!
//! Accounts live in memory. Every call is recorded so tests can assert on the
//! metadata that reached the auth service.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use secrecy::SecretString;
use tokio::sync::Mutex;

use zapflow_core::traits::adapter::PluginAdapter;
use zapflow_core::traits::auth::{AuthAdapter, SignUpOutcome};
use zapflow_core::types::{AdapterType, HealthStatus, OwnerId, Session};
use zapflow_core::ZapflowError;

#[derive(Debug, Clone)]
struct Account {
    owner_id: OwnerId,
    password: String,
    confirmed: bool,
    metadata: serde_json::Value,
}

/// A mock authentication service.
///
/// Sign-ups are unconfirmed until `verify_otp` is called with [`MockAuth::OTP`].
#[derive(Default)]
pub struct MockAuth {
    accounts: Arc<Mutex<HashMap<String, Account>>>,
    metadata_updates: Arc<Mutex<Vec<(OwnerId, serde_json::Value)>>>,
    fail_metadata: AtomicBool,
}

impl MockAuth {
    /// The one-time code every mock account accepts.
    pub const OTP: &'static str = "123456";

    pub fn new() -> Self {
        Self::default()
    }

    /// Makes `update_user_metadata` fail.
    pub fn fail_metadata(&self, fail: bool) {
        self.fail_metadata.store(fail, Ordering::SeqCst);
    }

    /// Metadata payloads received by `update_user_metadata`, in order.
    pub async fn metadata_updates(&self) -> Vec<(OwnerId, serde_json::Value)> {
        self.metadata_updates.lock().await.clone()
    }

    /// Metadata stored on an account, including sign-up metadata.
    pub async fn account_metadata(&self, email: &str) -> Option<serde_json::Value> {
        self.accounts
            .lock()
            .await
            .get(email)
            .map(|a| a.metadata.clone())
    }

    fn session(owner_id: &OwnerId, email: &str) -> Session {
        Session {
            owner_id: owner_id.clone(),
            email: Some(email.to_string()),
            access_token: Some(SecretString::from(format!("token-{owner_id}"))),
            refresh_token: None,
            expires_at: None,
        }
    }
}

#[async_trait]
impl PluginAdapter for MockAuth {
    fn name(&self) -> &str {
        "mock-auth"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Auth
    }

    async fn health_check(&self) -> Result<HealthStatus, ZapflowError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), ZapflowError> {
        Ok(())
    }
}

#[async_trait]
impl AuthAdapter for MockAuth {
    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        metadata: serde_json::Value,
    ) -> Result<SignUpOutcome, ZapflowError> {
        let mut accounts = self.accounts.lock().await;
        if accounts.contains_key(email) {
            return Err(ZapflowError::Auth {
                message: "User already registered".to_string(),
            });
        }
        let owner_id = OwnerId(uuid::Uuid::new_v4().to_string());
        accounts.insert(
            email.to_string(),
            Account {
                owner_id: owner_id.clone(),
                password: password.to_string(),
                confirmed: false,
                metadata,
            },
        );
        Ok(SignUpOutcome {
            owner_id,
            session: None,
        })
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<Session, ZapflowError> {
        let accounts = self.accounts.lock().await;
        match accounts.get(email) {
            Some(a) if a.password == password && a.confirmed => Ok(Self::session(&a.owner_id, email)),
            Some(a) if a.password == password => Err(ZapflowError::Auth {
                message: "Email not confirmed".to_string(),
            }),
            _ => Err(ZapflowError::Auth {
                message: "Invalid login credentials".to_string(),
            }),
        }
    }

    async fn verify_otp(&self, email: &str, token: &str) -> Result<Session, ZapflowError> {
        let mut accounts = self.accounts.lock().await;
        match accounts.get_mut(email) {
            Some(a) if token == Self::OTP => {
                a.confirmed = true;
                Ok(Self::session(&a.owner_id, email))
            }
            _ => Err(ZapflowError::Auth {
                message: "Token has expired or is invalid".to_string(),
            }),
        }
    }

    async fn update_user_metadata(
        &self,
        session: &Session,
        metadata: serde_json::Value,
    ) -> Result<(), ZapflowError> {
        if self.fail_metadata.load(Ordering::SeqCst) {
            return Err(ZapflowError::Auth {
                message: "metadata update rejected".to_string(),
            });
        }
        self.metadata_updates
            .lock()
            .await
            .push((session.owner_id.clone(), metadata));
        Ok(())
    }
}
