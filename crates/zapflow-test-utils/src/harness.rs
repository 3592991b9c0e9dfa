// SPDX-FileCopyrightText: 2026 Zapflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test harness for service-level integration testing.
//!
//! `TestHarness` owns a temp SQLite database and an in-memory instance API,
//! with helpers to seed owners and chatbot configurations.

use std::sync::Arc;

use zapflow_config::model::StorageConfig;
use zapflow_core::types::now_timestamp;
use zapflow_core::{ChatbotConfig, OwnerId, Profile, StorageAdapter, ZapflowError};
use zapflow_storage::SqliteStorage;

use crate::mock_instance_api::MockInstanceApi;

/// A test environment with temp storage and a mock instance API.
pub struct TestHarness {
    /// SQLite storage adapter (temp DB, cleaned up on drop).
    pub storage: Arc<dyn StorageAdapter>,
    /// The mock instance API.
    pub api: Arc<MockInstanceApi>,
    /// Temp directory kept alive for cleanup on drop.
    _temp_dir: tempfile::TempDir,
}

impl TestHarness {
    /// Creates a harness with a fresh, initialized database.
    pub async fn new() -> Result<Self, ZapflowError> {
        let temp_dir =
            tempfile::TempDir::new().map_err(|e| ZapflowError::Storage { source: e.into() })?;
        let db_path = temp_dir.path().join("test.db");

        let storage = SqliteStorage::new(StorageConfig {
            database_path: db_path.to_string_lossy().to_string(),
            ..StorageConfig::default()
        });
        storage.initialize().await?;

        Ok(Self {
            storage: Arc::new(storage),
            api: Arc::new(MockInstanceApi::new()),
            _temp_dir: temp_dir,
        })
    }

    /// Inserts a profile for a fresh owner and returns its id.
    pub async fn seed_owner(&self, full_name: &str) -> Result<OwnerId, ZapflowError> {
        let owner_id = OwnerId(uuid::Uuid::new_v4().to_string());
        self.storage
            .insert_profile(&Profile {
                id: owner_id.clone(),
                full_name: full_name.to_string(),
                company: None,
                email: format!("{}@example.com", &owner_id.as_str()[..8]),
                phone: None,
                created_at: now_timestamp(),
            })
            .await?;
        Ok(owner_id)
    }

    /// Inserts an active, unresolved configuration for `owner_id`.
    pub async fn seed_config(
        &self,
        owner_id: &OwnerId,
        instance_name: &str,
    ) -> Result<ChatbotConfig, ZapflowError> {
        let now = now_timestamp();
        let config = ChatbotConfig {
            id: uuid::Uuid::new_v4().to_string(),
            owner_id: owner_id.clone(),
            bot_name: "Nina".to_string(),
            category: None,
            tone: None,
            instance_name: instance_name.to_string(),
            instance_id: None,
            phone: None,
            active: true,
            created_at: now.clone(),
            updated_at: now,
        };
        self.storage.insert_config(&config).await?;
        Ok(config)
    }
}
