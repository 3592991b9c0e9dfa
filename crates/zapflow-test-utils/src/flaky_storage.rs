// SPDX-FileCopyrightText: 2026 Zapflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Storage wrapper with switchable write failures.
//!
//! Delegates to a real `StorageAdapter` and fails selected writes on demand,
//! for exercising partial-failure paths (stale messages after a config
//! update, profile insert warnings).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;

use zapflow_core::traits::adapter::PluginAdapter;
use zapflow_core::traits::storage::StorageAdapter;
use zapflow_core::types::{AdapterType, ChatbotConfig, HealthStatus, OwnerId, Profile, StoredMessage};
use zapflow_core::ZapflowError;

pub struct FlakyStorage {
    inner: Arc<dyn StorageAdapter>,
    fail_rekey: AtomicBool,
    fail_config_update: AtomicBool,
    fail_profile_insert: AtomicBool,
}

impl FlakyStorage {
    pub fn new(inner: Arc<dyn StorageAdapter>) -> Self {
        Self {
            inner,
            fail_rekey: AtomicBool::new(false),
            fail_config_update: AtomicBool::new(false),
            fail_profile_insert: AtomicBool::new(false),
        }
    }

    pub fn fail_rekey(&self, fail: bool) {
        self.fail_rekey.store(fail, Ordering::SeqCst);
    }

    /// Fails `update_config_instance` and `update_config_phone`.
    pub fn fail_config_update(&self, fail: bool) {
        self.fail_config_update.store(fail, Ordering::SeqCst);
    }

    pub fn fail_profile_insert(&self, fail: bool) {
        self.fail_profile_insert.store(fail, Ordering::SeqCst);
    }

    fn injected(what: &str) -> ZapflowError {
        ZapflowError::Storage {
            source: Box::new(std::io::Error::other(format!("injected {what} failure"))),
        }
    }
}

#[async_trait]
impl PluginAdapter for FlakyStorage {
    fn name(&self) -> &str {
        "flaky-storage"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Storage
    }

    async fn health_check(&self) -> Result<HealthStatus, ZapflowError> {
        self.inner.health_check().await
    }

    async fn shutdown(&self) -> Result<(), ZapflowError> {
        self.inner.shutdown().await
    }
}

#[async_trait]
impl StorageAdapter for FlakyStorage {
    async fn initialize(&self) -> Result<(), ZapflowError> {
        self.inner.initialize().await
    }

    async fn close(&self) -> Result<(), ZapflowError> {
        self.inner.close().await
    }

    async fn get_profile(&self, owner_id: &OwnerId) -> Result<Option<Profile>, ZapflowError> {
        self.inner.get_profile(owner_id).await
    }

    async fn insert_profile(&self, profile: &Profile) -> Result<(), ZapflowError> {
        if self.fail_profile_insert.load(Ordering::SeqCst) {
            return Err(Self::injected("profile insert"));
        }
        self.inner.insert_profile(profile).await
    }

    async fn insert_config(&self, config: &ChatbotConfig) -> Result<(), ZapflowError> {
        self.inner.insert_config(config).await
    }

    async fn get_config(&self, id: &str) -> Result<Option<ChatbotConfig>, ZapflowError> {
        self.inner.get_config(id).await
    }

    async fn find_config_by_instance_name(
        &self,
        instance_name: &str,
    ) -> Result<Option<ChatbotConfig>, ZapflowError> {
        self.inner.find_config_by_instance_name(instance_name).await
    }

    async fn list_configs(
        &self,
        owner_id: &OwnerId,
        active_only: bool,
    ) -> Result<Vec<ChatbotConfig>, ZapflowError> {
        self.inner.list_configs(owner_id, active_only).await
    }

    async fn list_active_owners(&self) -> Result<Vec<OwnerId>, ZapflowError> {
        self.inner.list_active_owners().await
    }

    async fn update_config_instance(
        &self,
        config_id: &str,
        instance_id: &str,
        phone: Option<&str>,
    ) -> Result<(), ZapflowError> {
        if self.fail_config_update.load(Ordering::SeqCst) {
            return Err(Self::injected("config update"));
        }
        self.inner
            .update_config_instance(config_id, instance_id, phone)
            .await
    }

    async fn update_config_phone(&self, config_id: &str, phone: &str) -> Result<(), ZapflowError> {
        if self.fail_config_update.load(Ordering::SeqCst) {
            return Err(Self::injected("config update"));
        }
        self.inner.update_config_phone(config_id, phone).await
    }

    async fn insert_message(&self, message: &StoredMessage) -> Result<(), ZapflowError> {
        self.inner.insert_message(message).await
    }

    async fn list_messages(
        &self,
        conversation_key: &str,
        limit: Option<i64>,
    ) -> Result<Vec<StoredMessage>, ZapflowError> {
        self.inner.list_messages(conversation_key, limit).await
    }

    async fn count_messages(&self, instance_id: &str) -> Result<u64, ZapflowError> {
        self.inner.count_messages(instance_id).await
    }

    async fn rekey_messages(
        &self,
        old_instance_id: &str,
        new_instance_id: &str,
    ) -> Result<u64, ZapflowError> {
        if self.fail_rekey.load(Ordering::SeqCst) {
            return Err(Self::injected("rekey"));
        }
        self.inner
            .rekey_messages(old_instance_id, new_instance_id)
            .await
    }

    async fn update_message_status(
        &self,
        external_id: &str,
        status: &str,
    ) -> Result<bool, ZapflowError> {
        self.inner.update_message_status(external_id, status).await
    }
}
