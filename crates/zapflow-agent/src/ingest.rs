// SPDX-FileCopyrightText: 2026 Zapflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Message recording for webhook events.

use std::sync::Arc;

use tracing::{debug, info};
use zapflow_core::types::now_timestamp;
use zapflow_core::{
    ChatbotConfig, ConversationKey, InboundEvent, StorageAdapter, StoredMessage, ZapflowError,
    normalize_phone,
};

use crate::reconcile::{ReconcileOutcome, Reconciler};

/// Persists message events under the configuration's resolved instance id.
#[derive(Clone)]
pub struct MessageRecorder {
    storage: Arc<dyn StorageAdapter>,
    reconciler: Reconciler,
}

impl MessageRecorder {
    pub fn new(storage: Arc<dyn StorageAdapter>, reconciler: Reconciler) -> Self {
        Self {
            storage,
            reconciler,
        }
    }

    /// Stores `event` and returns the persisted row.
    ///
    /// A configuration without a resolved id gets one reconciliation attempt
    /// first. Events for unknown instance names are `NotFound`.
    pub async fn record(&self, event: &InboundEvent) -> Result<StoredMessage, ZapflowError> {
        let config = self
            .storage
            .find_config_by_instance_name(&event.instance_name)
            .await?
            .ok_or_else(|| ZapflowError::NotFound {
                entity: "chatbot config".into(),
                id: event.instance_name.clone(),
            })?;
        let instance_id = self.partition_of(&config).await?;

        let phone = normalize_phone(&event.counterpart_phone);
        if phone.is_empty() {
            return Err(ZapflowError::invalid(
                "counterpart_phone",
                "contains no digits",
            ));
        }

        let now = now_timestamp();
        let message = StoredMessage {
            id: uuid::Uuid::new_v4().to_string(),
            owner_id: config.owner_id.clone(),
            conversation_key: ConversationKey::build(&instance_id, &phone).into_string(),
            instance_id,
            counterpart_phone: phone,
            content: event.content.clone(),
            direction: event.direction,
            message_type: event.message_type.clone(),
            status: None,
            external_id: event.external_id.clone(),
            created_at: event.timestamp.clone(),
            updated_at: now,
        };
        self.storage.insert_message(&message).await?;
        debug!(
            conversation_key = %message.conversation_key,
            direction = %message.direction,
            "message recorded"
        );
        Ok(message)
    }

    async fn partition_of(&self, config: &ChatbotConfig) -> Result<String, ZapflowError> {
        if let Some(id) = &config.instance_id {
            return Ok(id.clone());
        }

        info!(instance = %config.instance_name, "configuration unresolved, reconciling before recording");
        match self.reconciler.reconcile_config(config).await {
            ReconcileOutcome::Bound { instance_id, .. } => Ok(instance_id),
            // Config row already carries the id; messages can follow later.
            ReconcileOutcome::MessagesStale { new, .. } => Ok(new),
            _ => Err(ZapflowError::InstanceUnresolved {
                instance_name: config.instance_name.clone(),
            }),
        }
    }

    /// Reconciles the configuration behind `instance_name` after the instance
    /// reported a new connection. `None` when no configuration uses the name.
    pub async fn instance_connected(
        &self,
        instance_name: &str,
    ) -> Result<Option<ReconcileOutcome>, ZapflowError> {
        let Some(config) = self
            .storage
            .find_config_by_instance_name(instance_name)
            .await?
        else {
            debug!(instance = instance_name, "connection update for unknown instance");
            return Ok(None);
        };
        let outcome = self.reconciler.reconcile_config(&config).await;
        info!(instance = instance_name, ?outcome, "instance reconciled after connection update");
        Ok(Some(outcome))
    }

    /// Updates the delivery status of a stored message. Returns whether a
    /// message with that WhatsApp id exists.
    pub async fn update_status(&self, external_id: &str, status: &str) -> Result<bool, ZapflowError> {
        let found = self.storage.update_message_status(external_id, status).await?;
        if !found {
            debug!(external_id, status, "status update for unknown message");
        }
        Ok(found)
    }

    /// Messages exchanged with `phone` on instance `instance_id`, oldest first.
    pub async fn conversation(
        &self,
        instance_id: &str,
        phone: &str,
        limit: Option<i64>,
    ) -> Result<Vec<StoredMessage>, ZapflowError> {
        let key = ConversationKey::build(instance_id, phone);
        self.storage.list_messages(key.as_str(), limit).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use zapflow_core::MessageDirection;
    use zapflow_evolution::InstanceDirectory;
    use zapflow_test_utils::TestHarness;

    fn recorder(harness: &TestHarness) -> MessageRecorder {
        let directory = InstanceDirectory::new(harness.api.clone(), Duration::from_millis(1));
        MessageRecorder::new(
            harness.storage.clone(),
            Reconciler::new(harness.storage.clone(), directory),
        )
    }

    fn event(instance_name: &str, phone: &str, external_id: &str) -> InboundEvent {
        InboundEvent {
            instance_name: instance_name.to_string(),
            counterpart_phone: phone.to_string(),
            content: "Olá, quero agendar".to_string(),
            direction: MessageDirection::Inbound,
            message_type: "conversation".to_string(),
            external_id: Some(external_id.to_string()),
            push_name: Some("Carlos".to_string()),
            timestamp: "2026-03-01T12:00:00.000Z".to_string(),
        }
    }

    #[tokio::test]
    async fn records_under_resolved_instance_id() {
        let harness = TestHarness::new().await.unwrap();
        let owner = harness.seed_owner("Ana").await.unwrap();
        let config = harness.seed_config(&owner, "nina-clinicasp").await.unwrap();
        harness
            .storage
            .update_config_instance(&config.id, "remote-1", None)
            .await
            .unwrap();

        let recorder = recorder(&harness);
        let stored = recorder
            .record(&event("nina-clinicasp", "+55 (11) 99999-9999", "wamid-1"))
            .await
            .unwrap();
        assert_eq!(stored.conversation_key, "remote-1_5511999999999");
        assert_eq!(stored.owner_id, owner);

        let conversation = recorder
            .conversation("remote-1", "5511999999999", None)
            .await
            .unwrap();
        assert_eq!(conversation.len(), 1);
        assert_eq!(conversation[0].content, "Olá, quero agendar");
    }

    #[tokio::test]
    async fn unresolved_config_is_bound_first() {
        let harness = TestHarness::new().await.unwrap();
        let owner = harness.seed_owner("Ana").await.unwrap();
        let config = harness.seed_config(&owner, "nina-clinicasp").await.unwrap();
        harness.api.insert_instance("nina-clinicasp", "remote-7", None).await;

        let stored = recorder(&harness)
            .record(&event("nina-clinicasp", "5511", "wamid-1"))
            .await
            .unwrap();
        assert_eq!(stored.instance_id, "remote-7");
        let config = harness.storage.get_config(&config.id).await.unwrap().unwrap();
        assert_eq!(config.instance_id.as_deref(), Some("remote-7"));
    }

    #[tokio::test]
    async fn still_unresolved_is_an_error() {
        let harness = TestHarness::new().await.unwrap();
        let owner = harness.seed_owner("Ana").await.unwrap();
        harness.seed_config(&owner, "nina-clinicasp").await.unwrap();
        harness.api.fail_fetch(true);

        let err = recorder(&harness)
            .record(&event("nina-clinicasp", "5511", "wamid-1"))
            .await
            .unwrap_err();
        assert!(matches!(err, ZapflowError::InstanceUnresolved { .. }));
    }

    #[tokio::test]
    async fn unknown_instance_is_not_found() {
        let harness = TestHarness::new().await.unwrap();
        let err = recorder(&harness)
            .record(&event("ghost", "5511", "wamid-1"))
            .await
            .unwrap_err();
        assert!(matches!(err, ZapflowError::NotFound { .. }));
    }

    #[tokio::test]
    async fn status_update_touches_only_status() {
        let harness = TestHarness::new().await.unwrap();
        let owner = harness.seed_owner("Ana").await.unwrap();
        let config = harness.seed_config(&owner, "nina-clinicasp").await.unwrap();
        harness
            .storage
            .update_config_instance(&config.id, "remote-1", None)
            .await
            .unwrap();
        let recorder = recorder(&harness);
        recorder
            .record(&event("nina-clinicasp", "5511", "wamid-1"))
            .await
            .unwrap();

        assert!(recorder.update_status("wamid-1", "DELIVERY_ACK").await.unwrap());
        assert!(!recorder.update_status("wamid-404", "READ").await.unwrap());

        let conversation = recorder.conversation("remote-1", "5511", None).await.unwrap();
        assert_eq!(conversation[0].status.as_deref(), Some("DELIVERY_ACK"));
        assert_eq!(conversation[0].content, "Olá, quero agendar");
    }

    #[tokio::test]
    async fn connection_update_binds_configuration() {
        let harness = TestHarness::new().await.unwrap();
        let owner = harness.seed_owner("Ana").await.unwrap();
        let config = harness.seed_config(&owner, "nina-clinicasp").await.unwrap();
        harness
            .api
            .insert_instance("nina-clinicasp", "remote-1", Some("5511988887777"))
            .await;

        let outcome = recorder(&harness)
            .instance_connected("nina-clinicasp")
            .await
            .unwrap();
        assert!(matches!(outcome, Some(ReconcileOutcome::Bound { .. })));

        let stored = harness.storage.get_config(&config.id).await.unwrap().unwrap();
        assert_eq!(stored.instance_id.as_deref(), Some("remote-1"));
        assert!(
            recorder(&harness)
                .instance_connected("ghost")
                .await
                .unwrap()
                .is_none()
        );
    }
}
