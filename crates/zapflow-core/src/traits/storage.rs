// SPDX-FileCopyrightText: 2026 Zapflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Storage adapter trait for the relational tables behind the dashboard.

use async_trait::async_trait;

use crate::error::ZapflowError;
use crate::traits::adapter::PluginAdapter;
use crate::types::{ChatbotConfig, OwnerId, Profile, StoredMessage};

/// Adapter for the persistence collaborator (local SQLite or the hosted backend).
///
/// Every row is scoped by owner id. Implementations do not wrap multi-step
/// operations in transactions; callers sequence them.
#[async_trait]
pub trait StorageAdapter: PluginAdapter {
    /// Initializes the backend (migrations, connectivity check).
    async fn initialize(&self) -> Result<(), ZapflowError>;

    /// Closes the backend, flushing pending writes.
    async fn close(&self) -> Result<(), ZapflowError>;

    // --- Profiles ---

    async fn get_profile(&self, owner_id: &OwnerId) -> Result<Option<Profile>, ZapflowError>;

    async fn insert_profile(&self, profile: &Profile) -> Result<(), ZapflowError>;

    // --- Chatbot configurations ---

    /// Inserts a configuration. Fails when the owner already has one with the
    /// same instance name.
    async fn insert_config(&self, config: &ChatbotConfig) -> Result<(), ZapflowError>;

    async fn get_config(&self, id: &str) -> Result<Option<ChatbotConfig>, ZapflowError>;

    /// Looks up the active configuration bound to a remote instance name.
    async fn find_config_by_instance_name(
        &self,
        instance_name: &str,
    ) -> Result<Option<ChatbotConfig>, ZapflowError>;

    /// Lists an owner's configurations, oldest first.
    async fn list_configs(
        &self,
        owner_id: &OwnerId,
        active_only: bool,
    ) -> Result<Vec<ChatbotConfig>, ZapflowError>;

    /// Distinct owners with at least one active configuration.
    async fn list_active_owners(&self) -> Result<Vec<OwnerId>, ZapflowError>;

    /// Stores the resolved remote instance id (and phone, when known).
    async fn update_config_instance(
        &self,
        config_id: &str,
        instance_id: &str,
        phone: Option<&str>,
    ) -> Result<(), ZapflowError>;

    /// Stores the bound phone number.
    async fn update_config_phone(&self, config_id: &str, phone: &str) -> Result<(), ZapflowError>;

    // --- Messages ---

    async fn insert_message(&self, message: &StoredMessage) -> Result<(), ZapflowError>;

    /// Messages of one conversation in chronological order.
    async fn list_messages(
        &self,
        conversation_key: &str,
        limit: Option<i64>,
    ) -> Result<Vec<StoredMessage>, ZapflowError>;

    /// Number of messages partitioned under `instance_id`.
    async fn count_messages(&self, instance_id: &str) -> Result<u64, ZapflowError>;

    /// Moves every message stored under `old_instance_id` to `new_instance_id`,
    /// recomputing each conversation key. Returns the number of rows moved.
    async fn rekey_messages(
        &self,
        old_instance_id: &str,
        new_instance_id: &str,
    ) -> Result<u64, ZapflowError>;

    /// Updates the status of the message with the given WhatsApp message id.
    /// Returns whether a row matched.
    async fn update_message_status(
        &self,
        external_id: &str,
        status: &str,
    ) -> Result<bool, ZapflowError>;
}
