// SPDX-FileCopyrightText: 2026 Zapflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Process wiring: tracing, adapters and the services built on them.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};
use zapflow_agent::{ChatbotService, MessageRecorder, Reconciler, SignupFlow};
use zapflow_backend::{BackendClient, LeadNotifier, RestAuth, RestStorage};
use zapflow_config::model::{StorageBackend, ZapflowConfig};
use zapflow_core::{AuthAdapter, InstanceApi, StorageAdapter, ZapflowError};
use zapflow_evolution::{EvolutionAdapter, InstanceDirectory};
use zapflow_security::{RedactingWriter, SecretRegistry};
use zapflow_storage::SqliteStorage;

/// Installs the global subscriber. `RUST_LOG` overrides the configured level.
///
/// Output goes to stderr through a [`RedactingWriter`], so registered
/// secrets and bearer tokens never reach the terminal or journal.
pub fn init_tracing(log_level: &str, secrets: SecretRegistry) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("zapflow={log_level},warn")));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(false)
        .with_writer(move || RedactingWriter::new(std::io::stderr(), secrets.clone()))
        .try_init();
}

/// Registers every configured or env-provided secret for log redaction.
pub fn register_secrets(config: &ZapflowConfig, secrets: &SecretRegistry) {
    let configured = [
        config.evolution.api_key.as_deref(),
        config.backend.anon_key.as_deref(),
        config.backend.service_key.as_deref(),
        config.gateway.webhook_secret.as_deref(),
    ];
    for value in configured.into_iter().flatten() {
        secrets.add(value);
    }
    for env in [
        zapflow_evolution::API_KEY_ENV,
        zapflow_backend::ANON_KEY_ENV,
        zapflow_backend::SERVICE_KEY_ENV,
    ] {
        if let Ok(value) = std::env::var(env) {
            secrets.add(value);
        }
    }
}

/// Adapters shared by every command.
pub struct App {
    pub config: ZapflowConfig,
    pub storage: Arc<dyn StorageAdapter>,
    pub api: Arc<dyn InstanceApi>,
    pub directory: InstanceDirectory,
    backend: Option<BackendClient>,
}

impl App {
    /// Builds and initializes the adapters selected by `config`.
    pub async fn build(config: ZapflowConfig) -> Result<Self, ZapflowError> {
        let backend = backend_client(&config)?;

        let storage: Arc<dyn StorageAdapter> = match config.storage.backend {
            StorageBackend::Sqlite => Arc::new(SqliteStorage::new(config.storage.clone())),
            StorageBackend::Rest => {
                let client = backend.clone().ok_or_else(|| {
                    ZapflowError::Config("storage.backend = \"rest\" requires backend.url".into())
                })?;
                let token = zapflow_backend::service_token(&config.backend, &client);
                Arc::new(RestStorage::new(client, token))
            }
        };
        storage.initialize().await?;

        let api: Arc<dyn InstanceApi> = Arc::new(EvolutionAdapter::new(&config.evolution)?);
        let directory = InstanceDirectory::new(
            api.clone(),
            Duration::from_millis(config.evolution.settle_delay_ms),
        );

        debug!(storage = ?config.storage.backend, backend = backend.is_some(), "adapters ready");
        Ok(Self {
            config,
            storage,
            api,
            directory,
            backend,
        })
    }

    /// The hosted auth service, when `backend.url` is configured.
    pub fn auth(&self) -> Option<Arc<dyn AuthAdapter>> {
        self.backend
            .clone()
            .map(|client| Arc::new(RestAuth::new(client)) as Arc<dyn AuthAdapter>)
    }

    pub fn require_auth(&self) -> Result<Arc<dyn AuthAdapter>, ZapflowError> {
        self.auth().ok_or_else(|| {
            ZapflowError::Config("this command needs the hosted backend; set backend.url".into())
        })
    }

    pub fn reconciler(&self) -> Reconciler {
        Reconciler::new(self.storage.clone(), self.directory.clone())
    }

    pub fn recorder(&self) -> MessageRecorder {
        MessageRecorder::new(self.storage.clone(), self.reconciler())
    }

    pub fn chatbot_service(&self) -> ChatbotService {
        let service = ChatbotService::new(self.storage.clone(), self.directory.clone());
        match self.auth() {
            Some(auth) => service.with_auth(auth),
            None => service,
        }
    }

    pub fn signup_flow(&self) -> Result<SignupFlow, ZapflowError> {
        let leads = LeadNotifier::new(
            &self.config.leads,
            Duration::from_secs(self.config.backend.request_timeout_secs),
        )?;
        Ok(SignupFlow::new(self.require_auth()?, self.storage.clone(), leads))
    }

    pub async fn close(&self) {
        if let Err(e) = self.storage.close().await {
            warn!(error = %e, "storage close failed");
        }
    }
}

// Storage on SQLite does not need the backend; a half-configured one is
// only a warning there.
fn backend_client(config: &ZapflowConfig) -> Result<Option<BackendClient>, ZapflowError> {
    if !config.backend.url.as_deref().is_some_and(|u| !u.is_empty()) {
        return Ok(None);
    }
    match zapflow_backend::client_from_config(&config.backend) {
        Ok(client) => Ok(Some(client)),
        Err(e) if config.storage.backend == StorageBackend::Sqlite => {
            warn!(error = %e, "hosted backend unavailable, auth commands disabled");
            Ok(None)
        }
        Err(e) => Err(e),
    }
}
