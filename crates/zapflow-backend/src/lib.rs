// SPDX-FileCopyrightText: 2026 Zapflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Hosted backend adapters for Zapflow.
//!
//! - [`RestStorage`]: [`StorageAdapter`](zapflow_core::StorageAdapter) over REST tables
//! - [`RestAuth`]: [`AuthAdapter`](zapflow_core::AuthAdapter) over the auth endpoints
//! - [`LeadNotifier`]: fire-and-forget lead webhook

pub mod auth;
pub mod client;
pub mod lead;
pub mod storage;

use std::time::Duration;

use secrecy::SecretString;
use tracing::{info, warn};
use zapflow_config::model::BackendConfig;
use zapflow_core::ZapflowError;

pub use auth::RestAuth;
pub use client::BackendClient;
pub use lead::{Lead, LeadNotifier};
pub use storage::RestStorage;

/// Environment variable consulted when `backend.anon_key` is unset.
pub const ANON_KEY_ENV: &str = "BACKEND_ANON_KEY";

/// Environment variable consulted when `backend.service_key` is unset.
pub const SERVICE_KEY_ENV: &str = "BACKEND_SERVICE_KEY";

/// Builds the HTTP client from the `[backend]` section.
///
/// Key resolution order: config -> environment variable -> error.
pub fn client_from_config(config: &BackendConfig) -> Result<BackendClient, ZapflowError> {
    let url = config
        .url
        .as_deref()
        .filter(|u| !u.is_empty())
        .ok_or_else(|| ZapflowError::Config("backend.url is not set".into()))?;
    let anon_key = resolve_key(&config.anon_key, ANON_KEY_ENV).ok_or_else(|| {
        ZapflowError::Config(format!(
            "backend anon key not found. Set backend.anon_key in config or {ANON_KEY_ENV} environment variable."
        ))
    })?;

    let client = BackendClient::new(
        url,
        anon_key,
        Duration::from_secs(config.request_timeout_secs),
    )?;
    info!(base_url = %client.base_url(), "backend client initialized");
    Ok(client)
}

/// The bearer for server-side table access: the service key when available,
/// otherwise the anon key (row-level security then applies).
pub fn service_token(config: &BackendConfig, client: &BackendClient) -> SecretString {
    resolve_key(&config.service_key, SERVICE_KEY_ENV).unwrap_or_else(|| {
        warn!("backend service key not set, table access limited to anon policies");
        client.anon_key().clone()
    })
}

fn resolve_key(config_key: &Option<String>, env: &str) -> Option<SecretString> {
    if let Some(key) = config_key
        && !key.is_empty()
    {
        return Some(SecretString::from(key.clone()));
    }
    std::env::var(env)
        .ok()
        .filter(|k| !k.is_empty())
        .map(SecretString::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    fn config() -> BackendConfig {
        BackendConfig {
            url: Some("https://project.backend.local/".into()),
            anon_key: Some("anon".into()),
            service_key: Some("service".into()),
            ..BackendConfig::default()
        }
    }

    #[test]
    fn client_requires_url() {
        let mut cfg = config();
        cfg.url = None;
        assert!(matches!(client_from_config(&cfg), Err(ZapflowError::Config(_))));
    }

    #[test]
    fn service_key_is_preferred() {
        let cfg = config();
        let client = client_from_config(&cfg).unwrap();
        assert_eq!(client.base_url(), "https://project.backend.local");
        assert_eq!(service_token(&cfg, &client).expose_secret(), "service");
    }

    #[test]
    fn config_key_wins_over_env() {
        let key = resolve_key(&Some("from-config".into()), "ZAPFLOW_TEST_UNSET_ENV").unwrap();
        assert_eq!(key.expose_secret(), "from-config");
        assert!(resolve_key(&None, "ZAPFLOW_TEST_UNSET_ENV").is_none());
    }
}
