// SPDX-FileCopyrightText: 2026 Zapflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Instance-management API adapter for Zapflow.
//!
//! This crate implements [`InstanceApi`] over the Evolution HTTP API and
//! provides the [`InstanceDirectory`] that resolves instance names to remote
//! ids, creating instances on first use.

pub mod client;
pub mod directory;
pub mod parse;

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use secrecy::SecretString;
use serde_json::json;
use tracing::{debug, info};
use zapflow_config::model::EvolutionConfig;
use zapflow_core::{
    AdapterType, ConnectionState, HealthStatus, InstanceApi, InstanceName, PluginAdapter, QrCode,
    RemoteInstance, ZapflowError,
};

use crate::client::{error_status, EvolutionClient};

pub use directory::InstanceDirectory;

/// Environment variable consulted when `evolution.api_key` is unset.
pub const API_KEY_ENV: &str = "EVOLUTION_API_KEY";

/// Evolution API adapter implementing [`InstanceApi`].
///
/// API key resolution order: config -> `EVOLUTION_API_KEY` env var -> error.
pub struct EvolutionAdapter {
    client: EvolutionClient,
    integration: String,
}

impl EvolutionAdapter {
    /// Creates a new adapter from the `[evolution]` config section.
    pub fn new(config: &EvolutionConfig) -> Result<Self, ZapflowError> {
        let api_key = resolve_api_key(&config.api_key)?;
        let client = EvolutionClient::new(
            &config.base_url,
            &api_key,
            Duration::from_secs(config.request_timeout_secs),
        )?;

        info!(base_url = %config.base_url, "instance API adapter initialized");

        Ok(Self {
            client,
            integration: config.integration.clone(),
        })
    }

    /// Creates an adapter around an existing client.
    pub fn with_client(client: EvolutionClient, integration: impl Into<String>) -> Self {
        Self {
            client,
            integration: integration.into(),
        }
    }
}

#[async_trait]
impl PluginAdapter for EvolutionAdapter {
    fn name(&self) -> &str {
        "evolution"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::InstanceApi
    }

    async fn health_check(&self) -> Result<HealthStatus, ZapflowError> {
        // The root endpoint answers with a welcome payload and the API version.
        match self.client.get("/", &[]).await {
            Ok(_) => Ok(HealthStatus::Healthy),
            Err(e) => Ok(HealthStatus::Unhealthy(e.to_string())),
        }
    }

    async fn shutdown(&self) -> Result<(), ZapflowError> {
        debug!("instance API adapter shutting down");
        Ok(())
    }
}

#[async_trait]
impl InstanceApi for EvolutionAdapter {
    async fn fetch_instances(
        &self,
        name: &InstanceName,
    ) -> Result<Vec<RemoteInstance>, ZapflowError> {
        match self
            .client
            .get("/instance/fetchInstances", &[("instanceName", name.as_str())])
            .await
        {
            Ok(body) => Ok(parse::parse_instance_list(&body)),
            // Older API versions answer 404 for an unknown name instead of [].
            Err(e) if error_status(&e) == Some(StatusCode::NOT_FOUND) => {
                debug!(instance = %name, "fetchInstances returned 404, treating as absent");
                Ok(Vec::new())
            }
            Err(e) => Err(e),
        }
    }

    async fn create_instance(&self, name: &InstanceName) -> Result<(), ZapflowError> {
        let body = json!({
            "instanceName": name.as_str(),
            "qrcode": true,
            "integration": self.integration,
        });
        self.client.post("/instance/create", &body).await?;
        info!(instance = %name, "remote instance created");
        Ok(())
    }

    async fn connection_state(&self, name: &InstanceName) -> Result<ConnectionState, ZapflowError> {
        let body = self
            .client
            .get(&format!("/instance/connectionState/{name}"), &[])
            .await?;
        parse::parse_connection_state(&body).ok_or_else(|| ZapflowError::RemoteApi {
            message: format!("connection state missing for instance `{name}`"),
            source: None,
        })
    }

    async fn connect(&self, name: &InstanceName) -> Result<QrCode, ZapflowError> {
        let body = self
            .client
            .get(&format!("/instance/connect/{name}"), &[])
            .await?;
        parse::parse_qr_code(&body).ok_or_else(|| ZapflowError::RemoteApi {
            message: format!("no QR code available for instance `{name}`"),
            source: None,
        })
    }

    async fn logout(&self, name: &InstanceName) -> Result<(), ZapflowError> {
        self.client
            .delete(&format!("/instance/logout/{name}"))
            .await?;
        info!(instance = %name, "remote instance logged out");
        Ok(())
    }
}

fn resolve_api_key(config_key: &Option<String>) -> Result<SecretString, ZapflowError> {
    if let Some(key) = config_key
        && !key.is_empty()
    {
        return Ok(SecretString::from(key.clone()));
    }

    std::env::var(API_KEY_ENV)
        .ok()
        .filter(|k| !k.is_empty())
        .map(SecretString::from)
        .ok_or_else(|| {
            ZapflowError::Config(format!(
                "instance API key not found. Set evolution.api_key in config or {API_KEY_ENV} environment variable."
            ))
        })
}
