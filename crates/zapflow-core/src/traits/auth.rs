// SPDX-FileCopyrightText: 2026 Zapflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Auth adapter trait for the hosted authentication service.

use async_trait::async_trait;

use crate::error::ZapflowError;
use crate::traits::adapter::PluginAdapter;
use crate::types::{OwnerId, Session};

/// Outcome of an email + password sign-up.
#[derive(Debug)]
pub struct SignUpOutcome {
    pub owner_id: OwnerId,
    /// Present when the service does not require email confirmation first.
    pub session: Option<Session>,
}

/// Adapter for email + password authentication with OTP email verification.
#[async_trait]
pub trait AuthAdapter: PluginAdapter {
    /// Registers a new account. `metadata` is stored on the user record.
    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        metadata: serde_json::Value,
    ) -> Result<SignUpOutcome, ZapflowError>;

    async fn sign_in(&self, email: &str, password: &str) -> Result<Session, ZapflowError>;

    /// Confirms the email with the one-time code that was mailed to it.
    async fn verify_otp(&self, email: &str, token: &str) -> Result<Session, ZapflowError>;

    /// Merges `metadata` into the signed-in user's metadata.
    async fn update_user_metadata(
        &self,
        session: &Session,
        metadata: serde_json::Value,
    ) -> Result<(), ZapflowError>;
}
