// SPDX-FileCopyrightText: 2026 Zapflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite implementation of the StorageAdapter trait.

use async_trait::async_trait;
use tokio::sync::OnceCell;
use tracing::debug;

use zapflow_config::model::StorageConfig;
use zapflow_core::{
    AdapterType, ChatbotConfig, HealthStatus, OwnerId, PluginAdapter, Profile, StorageAdapter,
    StoredMessage, ZapflowError,
};

use crate::database::Database;
use crate::queries;

/// SQLite-backed storage adapter.
///
/// The database is opened on [`StorageAdapter::initialize`]; every other
/// operation fails until then.
pub struct SqliteStorage {
    config: StorageConfig,
    db: OnceCell<Database>,
}

impl SqliteStorage {
    pub fn new(config: StorageConfig) -> Self {
        Self {
            config,
            db: OnceCell::new(),
        }
    }

    fn db(&self) -> Result<&Database, ZapflowError> {
        self.db.get().ok_or_else(|| ZapflowError::Storage {
            source: "storage not initialized -- call initialize() first".into(),
        })
    }
}

#[async_trait]
impl PluginAdapter for SqliteStorage {
    fn name(&self) -> &str {
        "sqlite"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Storage
    }

    async fn health_check(&self) -> Result<HealthStatus, ZapflowError> {
        let db = self.db()?;
        db.connection()
            .call(|conn| conn.execute_batch("SELECT 1;"))
            .await
            .map_err(crate::database::map_tr_err)?;
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), ZapflowError> {
        if let Some(db) = self.db.get() {
            db.checkpoint().await?;
            debug!("shutdown: WAL checkpoint complete");
        }
        Ok(())
    }
}

#[async_trait]
impl StorageAdapter for SqliteStorage {
    async fn initialize(&self) -> Result<(), ZapflowError> {
        let db = Database::open_with(&self.config.database_path, self.config.wal_mode).await?;
        self.db.set(db).map_err(|_| ZapflowError::Storage {
            source: "storage already initialized".into(),
        })?;
        debug!(path = %self.config.database_path, "SQLite storage initialized");
        Ok(())
    }

    async fn close(&self) -> Result<(), ZapflowError> {
        self.db()?.checkpoint().await?;
        debug!("WAL checkpoint complete");
        Ok(())
    }

    // --- Profiles ---

    async fn get_profile(&self, owner_id: &OwnerId) -> Result<Option<Profile>, ZapflowError> {
        queries::profiles::get_profile(self.db()?, owner_id).await
    }

    async fn insert_profile(&self, profile: &Profile) -> Result<(), ZapflowError> {
        queries::profiles::insert_profile(self.db()?, profile).await
    }

    // --- Chatbot configurations ---

    async fn insert_config(&self, config: &ChatbotConfig) -> Result<(), ZapflowError> {
        queries::configs::insert_config(self.db()?, config).await
    }

    async fn get_config(&self, id: &str) -> Result<Option<ChatbotConfig>, ZapflowError> {
        queries::configs::get_config(self.db()?, id).await
    }

    async fn find_config_by_instance_name(
        &self,
        instance_name: &str,
    ) -> Result<Option<ChatbotConfig>, ZapflowError> {
        queries::configs::find_config_by_instance_name(self.db()?, instance_name).await
    }

    async fn list_configs(
        &self,
        owner_id: &OwnerId,
        active_only: bool,
    ) -> Result<Vec<ChatbotConfig>, ZapflowError> {
        queries::configs::list_configs(self.db()?, owner_id, active_only).await
    }

    async fn list_active_owners(&self) -> Result<Vec<OwnerId>, ZapflowError> {
        queries::configs::list_active_owners(self.db()?).await
    }

    async fn update_config_instance(
        &self,
        config_id: &str,
        instance_id: &str,
        phone: Option<&str>,
    ) -> Result<(), ZapflowError> {
        queries::configs::update_config_instance(self.db()?, config_id, instance_id, phone).await
    }

    async fn update_config_phone(&self, config_id: &str, phone: &str) -> Result<(), ZapflowError> {
        queries::configs::update_config_phone(self.db()?, config_id, phone).await
    }

    // --- Messages ---

    async fn insert_message(&self, message: &StoredMessage) -> Result<(), ZapflowError> {
        queries::messages::insert_message(self.db()?, message).await
    }

    async fn list_messages(
        &self,
        conversation_key: &str,
        limit: Option<i64>,
    ) -> Result<Vec<StoredMessage>, ZapflowError> {
        queries::messages::list_messages(self.db()?, conversation_key, limit).await
    }

    async fn count_messages(&self, instance_id: &str) -> Result<u64, ZapflowError> {
        queries::messages::count_messages(self.db()?, instance_id).await
    }

    async fn rekey_messages(
        &self,
        old_instance_id: &str,
        new_instance_id: &str,
    ) -> Result<u64, ZapflowError> {
        queries::messages::rekey_messages(self.db()?, old_instance_id, new_instance_id).await
    }

    async fn update_message_status(
        &self,
        external_id: &str,
        status: &str,
    ) -> Result<bool, ZapflowError> {
        queries::messages::update_message_status(self.db()?, external_id, status).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;
    use zapflow_core::{ConversationKey, MessageDirection};

    fn make_config(path: &str) -> StorageConfig {
        StorageConfig {
            database_path: path.to_string(),
            ..StorageConfig::default()
        }
    }

    #[tokio::test]
    async fn sqlite_storage_implements_plugin_adapter() {
        let dir = tempdir().unwrap();
        let storage = SqliteStorage::new(make_config(dir.path().join("t.db").to_str().unwrap()));

        assert_eq!(storage.name(), "sqlite");
        assert_eq!(storage.version(), semver::Version::new(0, 1, 0));
        assert_eq!(storage.adapter_type(), AdapterType::Storage);
    }

    #[tokio::test]
    async fn initialize_twice_returns_error() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("double_init.db");
        let storage = SqliteStorage::new(make_config(db_path.to_str().unwrap()));

        storage.initialize().await.unwrap();
        assert!(db_path.exists());
        assert!(storage.initialize().await.is_err());
    }

    #[tokio::test]
    async fn operations_fail_before_initialize() {
        let dir = tempdir().unwrap();
        let storage = SqliteStorage::new(make_config(dir.path().join("no.db").to_str().unwrap()));

        assert!(storage.health_check().await.is_err());
        assert!(storage.get_config("c1").await.is_err());
        // Shutdown before initialize is a no-op.
        storage.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn health_check_returns_healthy_when_initialized() {
        let dir = tempdir().unwrap();
        let storage = SqliteStorage::new(make_config(dir.path().join("h.db").to_str().unwrap()));
        storage.initialize().await.unwrap();
        assert_eq!(storage.health_check().await.unwrap(), HealthStatus::Healthy);
    }

    #[tokio::test]
    async fn config_and_message_lifecycle_through_adapter() {
        let dir = tempdir().unwrap();
        let storage =
            SqliteStorage::new(make_config(dir.path().join("life.db").to_str().unwrap()));
        storage.initialize().await.unwrap();

        let owner = OwnerId("11111111-1111-1111-1111-111111111111".into());
        let config = ChatbotConfig {
            id: "cfg-1".into(),
            owner_id: owner.clone(),
            bot_name: "Nina".into(),
            category: None,
            tone: None,
            instance_name: "nina-clinicasp".into(),
            instance_id: None,
            phone: None,
            active: true,
            created_at: "2026-01-01T00:00:00.000Z".into(),
            updated_at: "2026-01-01T00:00:00.000Z".into(),
        };
        storage.insert_config(&config).await.unwrap();

        // A message stored before resolution lives under the owner id.
        let key = ConversationKey::build(owner.as_str(), "+55 11 99999-9999");
        storage
            .insert_message(&StoredMessage {
                id: "m1".into(),
                owner_id: owner.clone(),
                instance_id: owner.as_str().to_string(),
                conversation_key: key.as_str().to_string(),
                counterpart_phone: "5511999999999".into(),
                content: "oi".into(),
                direction: MessageDirection::Inbound,
                message_type: "text".into(),
                status: None,
                external_id: None,
                created_at: "2026-01-01T00:00:01.000Z".into(),
                updated_at: "2026-01-01T00:00:01.000Z".into(),
            })
            .await
            .unwrap();

        storage
            .update_config_instance("cfg-1", "remote-1", None)
            .await
            .unwrap();
        assert_eq!(
            storage.rekey_messages(owner.as_str(), "remote-1").await.unwrap(),
            1
        );

        let moved = storage
            .list_messages("remote-1_5511999999999", None)
            .await
            .unwrap();
        assert_eq!(moved.len(), 1);
        assert_eq!(storage.count_messages(owner.as_str()).await.unwrap(), 0);

        let listed = storage.list_configs(&owner, true).await.unwrap();
        assert_eq!(listed[0].instance_id.as_deref(), Some("remote-1"));

        storage.close().await.unwrap();
        storage.shutdown().await.unwrap();
    }
}
