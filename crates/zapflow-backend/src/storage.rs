// SPDX-FileCopyrightText: 2026 Zapflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `StorageAdapter` over the backend's REST tables (`/rest/v1/<table>`).
//!
//! Filters use the `column=eq.value` query syntax. Writes that must report
//! what they touched ask for `Prefer: return=representation`.

use std::collections::BTreeSet;

use async_trait::async_trait;
use reqwest::{Method, StatusCode};
use secrecy::SecretString;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tracing::{debug, info};
use zapflow_core::types::now_timestamp;
use zapflow_core::{
    AdapterType, ChatbotConfig, ConversationKey, HealthStatus, OwnerId, PluginAdapter, Profile,
    StorageAdapter, StoredMessage, ZapflowError,
};

use crate::client::{error_status, BackendClient};

const PROFILES: &str = "/rest/v1/profiles";
const CONFIGS: &str = "/rest/v1/chatbot_configs";
const MESSAGES: &str = "/rest/v1/messages";

const RETURN_REPRESENTATION: &str = "return=representation";
const RETURN_MINIMAL: &str = "return=minimal";

/// REST-table storage adapter.
///
/// Requests are authorized with `token`: the service key for server-side use,
/// or a user's access token when row-level security should apply.
pub struct RestStorage {
    client: BackendClient,
    token: SecretString,
}

impl RestStorage {
    pub fn new(client: BackendClient, token: SecretString) -> Self {
        Self { client, token }
    }

    async fn select<T: DeserializeOwned>(
        &self,
        table: &str,
        query: &[(&str, &str)],
        what: &str,
    ) -> Result<Vec<T>, ZapflowError> {
        let request = self.client.request(Method::GET, table, query, &self.token)?;
        let response = self.client.execute(request, what).await?;
        decode_rows(response.body, what)
    }

    async fn insert(&self, table: &str, row: Value, prefer: &str, what: &str) -> Result<(), ZapflowError> {
        let request = self
            .client
            .request(Method::POST, table, &[], &self.token)?
            .header("prefer", prefer)
            .json(&row);
        self.client.execute(request, what).await?;
        Ok(())
    }

    /// PATCHes matching rows and returns how many were touched.
    async fn patch(
        &self,
        table: &str,
        query: &[(&str, &str)],
        changes: Value,
        what: &str,
    ) -> Result<usize, ZapflowError> {
        let request = self
            .client
            .request(Method::PATCH, table, query, &self.token)?
            .header("prefer", RETURN_REPRESENTATION)
            .json(&changes);
        let response = self.client.execute(request, what).await?;
        Ok(response.body.as_array().map_or(0, Vec::len))
    }

    async fn patch_config(
        &self,
        config_id: &str,
        changes: Value,
        what: &str,
    ) -> Result<(), ZapflowError> {
        let filter = eq(config_id);
        let touched = self.patch(CONFIGS, &[("id", filter.as_str())], changes, what).await?;
        if touched == 0 {
            return Err(ZapflowError::NotFound {
                entity: "chatbot config".into(),
                id: config_id.to_string(),
            });
        }
        Ok(())
    }
}

fn eq(value: &str) -> String {
    format!("eq.{value}")
}

fn decode_rows<T: DeserializeOwned>(body: Value, what: &str) -> Result<Vec<T>, ZapflowError> {
    if body.is_null() {
        return Ok(Vec::new());
    }
    serde_json::from_value(body).map_err(|e| ZapflowError::Backend {
        message: format!("unexpected {what} rows: {e}"),
        source: Some(Box::new(e)),
    })
}

#[async_trait]
impl PluginAdapter for RestStorage {
    fn name(&self) -> &str {
        "rest"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Storage
    }

    async fn health_check(&self) -> Result<HealthStatus, ZapflowError> {
        match self
            .select::<Value>(PROFILES, &[("select", "id"), ("limit", "1")], "health probe")
            .await
        {
            Ok(_) => Ok(HealthStatus::Healthy),
            Err(e) => Ok(HealthStatus::Unhealthy(e.to_string())),
        }
    }

    async fn shutdown(&self) -> Result<(), ZapflowError> {
        Ok(())
    }
}

#[async_trait]
impl StorageAdapter for RestStorage {
    async fn initialize(&self) -> Result<(), ZapflowError> {
        self.select::<Value>(PROFILES, &[("select", "id"), ("limit", "1")], "connectivity check")
            .await?;
        info!(base_url = %self.client.base_url(), "REST storage initialized");
        Ok(())
    }

    async fn close(&self) -> Result<(), ZapflowError> {
        Ok(())
    }

    async fn get_profile(&self, owner_id: &OwnerId) -> Result<Option<Profile>, ZapflowError> {
        let filter = eq(owner_id.as_str());
        let rows = self
            .select(PROFILES, &[("id", filter.as_str()), ("select", "*")], "profile lookup")
            .await?;
        Ok(rows.into_iter().next())
    }

    async fn insert_profile(&self, profile: &Profile) -> Result<(), ZapflowError> {
        let row = serde_json::to_value(profile).map_err(|e| ZapflowError::Internal(e.to_string()))?;
        self.insert(
            PROFILES,
            row,
            "resolution=ignore-duplicates,return=minimal",
            "profile insert",
        )
        .await
    }

    async fn insert_config(&self, config: &ChatbotConfig) -> Result<(), ZapflowError> {
        let row = serde_json::to_value(config).map_err(|e| ZapflowError::Internal(e.to_string()))?;
        match self.insert(CONFIGS, row, RETURN_MINIMAL, "config insert").await {
            Err(e) if error_status(&e) == Some(StatusCode::CONFLICT) => Err(ZapflowError::invalid(
                "instance_name",
                "already in use for this account",
            )),
            other => other,
        }
    }

    async fn get_config(&self, id: &str) -> Result<Option<ChatbotConfig>, ZapflowError> {
        let filter = eq(id);
        let rows = self
            .select(CONFIGS, &[("id", filter.as_str()), ("select", "*")], "config lookup")
            .await?;
        Ok(rows.into_iter().next())
    }

    async fn find_config_by_instance_name(
        &self,
        instance_name: &str,
    ) -> Result<Option<ChatbotConfig>, ZapflowError> {
        let filter = eq(instance_name);
        let rows = self
            .select(
                CONFIGS,
                &[
                    ("instance_name", filter.as_str()),
                    ("active", "is.true"),
                    ("order", "created_at.asc"),
                    ("limit", "1"),
                ],
                "config lookup by instance name",
            )
            .await?;
        Ok(rows.into_iter().next())
    }

    async fn list_configs(
        &self,
        owner_id: &OwnerId,
        active_only: bool,
    ) -> Result<Vec<ChatbotConfig>, ZapflowError> {
        let filter = eq(owner_id.as_str());
        let mut query = vec![("owner_id", filter.as_str()), ("order", "created_at.asc")];
        if active_only {
            query.push(("active", "is.true"));
        }
        self.select(CONFIGS, &query, "config listing").await
    }

    async fn list_active_owners(&self) -> Result<Vec<OwnerId>, ZapflowError> {
        #[derive(serde::Deserialize)]
        struct OwnerRow {
            owner_id: String,
        }

        let rows: Vec<OwnerRow> = self
            .select(
                CONFIGS,
                &[("select", "owner_id"), ("active", "is.true")],
                "owner listing",
            )
            .await?;
        let owners: BTreeSet<String> = rows.into_iter().map(|r| r.owner_id).collect();
        Ok(owners.into_iter().map(OwnerId).collect())
    }

    async fn update_config_instance(
        &self,
        config_id: &str,
        instance_id: &str,
        phone: Option<&str>,
    ) -> Result<(), ZapflowError> {
        let mut changes = json!({
            "instance_id": instance_id,
            "updated_at": now_timestamp(),
        });
        if let Some(phone) = phone {
            changes["phone"] = json!(phone);
        }
        self.patch_config(config_id, changes, "config instance update").await
    }

    async fn update_config_phone(&self, config_id: &str, phone: &str) -> Result<(), ZapflowError> {
        let changes = json!({ "phone": phone, "updated_at": now_timestamp() });
        self.patch_config(config_id, changes, "config phone update").await
    }

    async fn insert_message(&self, message: &StoredMessage) -> Result<(), ZapflowError> {
        let row = serde_json::to_value(message).map_err(|e| ZapflowError::Internal(e.to_string()))?;
        self.insert(MESSAGES, row, RETURN_MINIMAL, "message insert").await
    }

    async fn list_messages(
        &self,
        conversation_key: &str,
        limit: Option<i64>,
    ) -> Result<Vec<StoredMessage>, ZapflowError> {
        let filter = eq(conversation_key);
        match limit {
            Some(limit) => {
                let limit = limit.to_string();
                let mut rows: Vec<StoredMessage> = self
                    .select(
                        MESSAGES,
                        &[
                            ("conversation_key", filter.as_str()),
                            ("order", "created_at.desc"),
                            ("limit", limit.as_str()),
                        ],
                        "message listing",
                    )
                    .await?;
                rows.reverse();
                Ok(rows)
            }
            None => {
                self.select(
                    MESSAGES,
                    &[("conversation_key", filter.as_str()), ("order", "created_at.asc")],
                    "message listing",
                )
                .await
            }
        }
    }

    async fn count_messages(&self, instance_id: &str) -> Result<u64, ZapflowError> {
        let filter = eq(instance_id);
        let request = self
            .client
            .request(
                Method::GET,
                MESSAGES,
                &[("instance_id", filter.as_str()), ("select", "id"), ("limit", "1")],
                &self.token,
            )?
            .header("prefer", "count=exact");
        let response = self.client.execute(request, "message count").await?;

        // Content-Range: 0-0/42 (or */0 when empty)
        response
            .headers
            .get("content-range")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.rsplit_once('/'))
            .and_then(|(_, total)| total.parse().ok())
            .ok_or_else(|| ZapflowError::Backend {
                message: "message count response has no total".into(),
                source: None,
            })
    }

    async fn rekey_messages(
        &self,
        old_instance_id: &str,
        new_instance_id: &str,
    ) -> Result<u64, ZapflowError> {
        #[derive(serde::Deserialize)]
        struct PhoneRow {
            counterpart_phone: String,
        }

        let old_filter = eq(old_instance_id);
        let rows: Vec<PhoneRow> = self
            .select(
                MESSAGES,
                &[("instance_id", old_filter.as_str()), ("select", "counterpart_phone")],
                "rekey scan",
            )
            .await?;
        let phones: BTreeSet<String> = rows.into_iter().map(|r| r.counterpart_phone).collect();

        // One PATCH per conversation: the key depends on the counterpart phone.
        let mut moved = 0u64;
        for phone in phones {
            let key = ConversationKey::build(new_instance_id, &phone);
            let phone_filter = eq(&phone);
            let touched = self
                .patch(
                    MESSAGES,
                    &[
                        ("instance_id", old_filter.as_str()),
                        ("counterpart_phone", phone_filter.as_str()),
                    ],
                    json!({
                        "instance_id": new_instance_id,
                        "conversation_key": key.as_str(),
                        "updated_at": now_timestamp(),
                    }),
                    "message rekey",
                )
                .await?;
            moved += touched as u64;
        }
        debug!(old = old_instance_id, new = new_instance_id, moved, "messages rekeyed");
        Ok(moved)
    }

    async fn update_message_status(
        &self,
        external_id: &str,
        status: &str,
    ) -> Result<bool, ZapflowError> {
        let filter = eq(external_id);
        let touched = self
            .patch(
                MESSAGES,
                &[("external_id", filter.as_str())],
                json!({ "status": status, "updated_at": now_timestamp() }),
                "message status update",
            )
            .await?;
        Ok(touched > 0)
    }
}
