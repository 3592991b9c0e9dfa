// SPDX-FileCopyrightText: 2026 Zapflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Chatbot configuration: validate, store, resolve the remote instance.

use std::sync::Arc;

use serde::Serialize;
use serde_json::json;
use tracing::{debug, info, warn};
use zapflow_core::types::now_timestamp;
use zapflow_core::{
    AuthAdapter, ChatbotConfig, FieldError, InstanceName, QrCode, Session, StorageAdapter,
    ZapflowError,
};
use zapflow_evolution::InstanceDirectory;

use crate::reconcile::{ReconcileOutcome, Reconciler};

/// Input of the configuration step.
#[derive(Debug, Clone, Default)]
pub struct ConfigureRequest {
    pub bot_name: String,
    pub company: Option<String>,
    pub category: Option<String>,
    pub tone: Option<String>,
    /// Explicit instance name; derived from bot name and company when `None`.
    pub instance_name: Option<String>,
}

/// Result of [`ChatbotService::configure`].
#[derive(Debug, Clone, Serialize)]
pub struct ConfigureOutcome {
    pub config: ChatbotConfig,
    /// Non-fatal problems (unresolved instance, metadata update failure).
    pub warnings: Vec<String>,
}

/// Creates chatbot configurations and serves the QR connection step.
pub struct ChatbotService {
    storage: Arc<dyn StorageAdapter>,
    auth: Option<Arc<dyn AuthAdapter>>,
    directory: InstanceDirectory,
    reconciler: Reconciler,
}

impl ChatbotService {
    pub fn new(storage: Arc<dyn StorageAdapter>, directory: InstanceDirectory) -> Self {
        Self {
            reconciler: Reconciler::new(storage.clone(), directory.clone()),
            storage,
            auth: None,
            directory,
        }
    }

    /// Records resolved instance ids on the signed-in user's metadata.
    pub fn with_auth(mut self, auth: Arc<dyn AuthAdapter>) -> Self {
        self.auth = Some(auth);
        self
    }

    /// Stores a new configuration for the session's owner and binds it to
    /// its remote instance, creating the instance when needed.
    pub async fn configure(
        &self,
        session: &Session,
        request: ConfigureRequest,
    ) -> Result<ConfigureOutcome, ZapflowError> {
        let name = validate(&request)?;

        // Remote instance names are global; another owner's name would bind
        // this configuration to their WhatsApp number.
        let holder = self
            .storage
            .find_config_by_instance_name(name.as_str())
            .await?;
        if holder.is_some_and(|existing| existing.owner_id != session.owner_id) {
            warn!(instance = %name, "instance name is held by another owner");
            return Err(ZapflowError::invalid("instance_name", "already in use"));
        }

        let now = now_timestamp();
        let config = ChatbotConfig {
            id: uuid::Uuid::new_v4().to_string(),
            owner_id: session.owner_id.clone(),
            bot_name: request.bot_name.trim().to_string(),
            category: non_empty(request.category),
            tone: non_empty(request.tone),
            instance_name: name.as_str().to_string(),
            instance_id: None,
            phone: None,
            active: true,
            created_at: now.clone(),
            updated_at: now,
        };
        self.storage.insert_config(&config).await?;
        info!(config_id = %config.id, instance = %name, "chatbot configuration stored");

        let mut warnings = Vec::new();
        match self.reconciler.reconcile_config(&config).await {
            ReconcileOutcome::Bound { instance_id, .. }
            | ReconcileOutcome::Unchanged { instance_id, .. } => {
                self.record_instance_metadata(session, &instance_id, &mut warnings)
                    .await;
            }
            ReconcileOutcome::MessagesStale { new, error, .. } => {
                warnings.push(format!("earlier messages were not moved: {error}"));
                self.record_instance_metadata(session, &new, &mut warnings).await;
            }
            ReconcileOutcome::Unresolved => {
                warnings.push(format!(
                    "instance `{name}` is not available yet; it will be bound when it connects"
                ));
            }
            ReconcileOutcome::ConfigUpdateFailed { error } => {
                return Err(ZapflowError::Storage {
                    source: format!("failed to store resolved instance: {error}").into(),
                });
            }
            ReconcileOutcome::Rekeyed { .. } => {}
        }

        let config = self
            .storage
            .get_config(&config.id)
            .await?
            .unwrap_or(config);
        Ok(ConfigureOutcome { config, warnings })
    }

    async fn record_instance_metadata(
        &self,
        session: &Session,
        instance_id: &str,
        warnings: &mut Vec<String>,
    ) {
        let Some(auth) = &self.auth else {
            return;
        };
        if session.access_token.is_none() {
            debug!(owner_id = %session.owner_id, "service session, skipping user metadata");
            return;
        }
        if let Err(e) = auth
            .update_user_metadata(session, json!({ "instance_id": instance_id }))
            .await
        {
            warn!(owner_id = %session.owner_id, error = %e, "failed to record instance id on user");
            warnings.push(format!("could not record the instance on the account: {e}"));
        }
    }

    /// QR code for connecting `name`. The instance is created when missing.
    pub async fn qr_code(&self, name: &InstanceName) -> Result<QrCode, ZapflowError> {
        if self.directory.resolve(name).await.is_none() {
            return Err(ZapflowError::InstanceUnresolved {
                instance_name: name.to_string(),
            });
        }
        self.directory.api().connect(name).await
    }
}

/// Collects every field error before any remote call.
fn validate(request: &ConfigureRequest) -> Result<InstanceName, ZapflowError> {
    let mut fields = Vec::new();
    if request.bot_name.trim().is_empty() {
        fields.push(FieldError::new("bot_name", "is required"));
    }

    let name = match request.instance_name.as_deref().map(str::trim) {
        Some(explicit) if !explicit.is_empty() => InstanceName::parse(explicit),
        _ => InstanceName::slugify(&[
            request.bot_name.as_str(),
            request.company.as_deref().unwrap_or_default(),
        ]),
    };

    match name {
        Ok(name) if fields.is_empty() => Ok(name),
        Ok(_) => Err(ZapflowError::Validation { fields }),
        Err(ZapflowError::Validation { fields: name_fields }) => {
            // The derived name is only meaningful when a bot name was given.
            if fields.is_empty() || request.instance_name.is_some() {
                fields.extend(name_fields);
            }
            Err(ZapflowError::Validation { fields })
        }
        Err(e) => Err(e),
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
