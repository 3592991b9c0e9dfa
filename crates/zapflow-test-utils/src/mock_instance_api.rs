// SPDX-FileCopyrightText: 2026 Zapflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-memory instance API for deterministic testing.
//!
//! `MockInstanceApi` implements `InstanceApi` over a map of named instances,
//! with switchable failures and call counters for assertions.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use zapflow_core::traits::adapter::PluginAdapter;
use zapflow_core::traits::instance::InstanceApi;
use zapflow_core::types::{
    AdapterType, ConnectionState, HealthStatus, InstanceName, QrCode, RemoteInstance,
};
use zapflow_core::ZapflowError;

#[derive(Debug, Clone)]
struct MockInstance {
    id: String,
    state: ConnectionState,
    phone: Option<String>,
}

/// A mock instance-management API.
///
/// Instances created through `create_instance` get the id registered with
/// [`MockInstanceApi::assign_id_on_create`], or `id-<name>` by default.
#[derive(Default)]
pub struct MockInstanceApi {
    instances: Arc<Mutex<HashMap<String, MockInstance>>>,
    ids_on_create: Arc<Mutex<HashMap<String, String>>>,
    fail_fetch: AtomicBool,
    fail_state: AtomicBool,
    fail_create: AtomicBool,
    fetch_calls: AtomicUsize,
    create_calls: AtomicUsize,
    state_calls: AtomicUsize,
    connect_calls: AtomicUsize,
    logout_calls: AtomicUsize,
}

impl MockInstanceApi {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an existing instance (state `close`).
    pub async fn insert_instance(&self, name: &str, id: &str, phone: Option<&str>) {
        self.instances.lock().await.insert(
            name.to_string(),
            MockInstance {
                id: id.to_string(),
                state: ConnectionState::Close,
                phone: phone.map(str::to_string),
            },
        );
    }

    /// Sets the id the next `create_instance(name)` will assign.
    pub async fn assign_id_on_create(&self, name: &str, id: &str) {
        self.ids_on_create
            .lock()
            .await
            .insert(name.to_string(), id.to_string());
    }

    pub async fn set_state(&self, name: &str, state: ConnectionState) {
        if let Some(instance) = self.instances.lock().await.get_mut(name) {
            instance.state = state;
        }
    }

    pub async fn set_phone(&self, name: &str, phone: Option<&str>) {
        if let Some(instance) = self.instances.lock().await.get_mut(name) {
            instance.phone = phone.map(str::to_string);
        }
    }

    /// Simulates the instance being recreated remotely under a new id.
    pub async fn set_remote_id(&self, name: &str, id: &str) {
        if let Some(instance) = self.instances.lock().await.get_mut(name) {
            instance.id = id.to_string();
        }
    }

    pub fn fail_fetch(&self, fail: bool) {
        self.fail_fetch.store(fail, Ordering::SeqCst);
    }

    pub fn fail_state(&self, fail: bool) {
        self.fail_state.store(fail, Ordering::SeqCst);
    }

    pub fn fail_create(&self, fail: bool) {
        self.fail_create.store(fail, Ordering::SeqCst);
    }

    pub fn fetch_calls(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }

    pub fn create_calls(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst)
    }

    pub fn state_calls(&self) -> usize {
        self.state_calls.load(Ordering::SeqCst)
    }

    pub fn connect_calls(&self) -> usize {
        self.connect_calls.load(Ordering::SeqCst)
    }

    pub fn logout_calls(&self) -> usize {
        self.logout_calls.load(Ordering::SeqCst)
    }

    fn unreachable() -> ZapflowError {
        ZapflowError::RemoteApi {
            message: "mock instance API unreachable".to_string(),
            source: None,
        }
    }
}

#[async_trait]
impl PluginAdapter for MockInstanceApi {
    fn name(&self) -> &str {
        "mock-instance-api"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::InstanceApi
    }

    async fn health_check(&self) -> Result<HealthStatus, ZapflowError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), ZapflowError> {
        Ok(())
    }
}

#[async_trait]
impl InstanceApi for MockInstanceApi {
    async fn fetch_instances(
        &self,
        name: &InstanceName,
    ) -> Result<Vec<RemoteInstance>, ZapflowError> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_fetch.load(Ordering::SeqCst) {
            return Err(Self::unreachable());
        }
        Ok(self
            .instances
            .lock()
            .await
            .get(name.as_str())
            .map(|i| RemoteInstance {
                id: Some(i.id.clone()),
                name: Some(name.to_string()),
                state: Some(i.state.clone()),
                phone: i.phone.clone(),
            })
            .into_iter()
            .collect())
    }

    async fn create_instance(&self, name: &InstanceName) -> Result<(), ZapflowError> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(Self::unreachable());
        }
        let id = self
            .ids_on_create
            .lock()
            .await
            .remove(name.as_str())
            .unwrap_or_else(|| format!("id-{name}"));
        self.instances
            .lock()
            .await
            .entry(name.to_string())
            .or_insert(MockInstance {
                id,
                state: ConnectionState::Close,
                phone: None,
            });
        Ok(())
    }

    async fn connection_state(&self, name: &InstanceName) -> Result<ConnectionState, ZapflowError> {
        self.state_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_state.load(Ordering::SeqCst) {
            return Err(Self::unreachable());
        }
        self.instances
            .lock()
            .await
            .get(name.as_str())
            .map(|i| i.state.clone())
            .ok_or_else(|| ZapflowError::RemoteApi {
                message: format!("instance `{name}` does not exist"),
                source: None,
            })
    }

    async fn connect(&self, name: &InstanceName) -> Result<QrCode, ZapflowError> {
        self.connect_calls.fetch_add(1, Ordering::SeqCst);
        if !self.instances.lock().await.contains_key(name.as_str()) {
            return Err(ZapflowError::RemoteApi {
                message: format!("instance `{name}` does not exist"),
                source: None,
            });
        }
        Ok(QrCode::Raw {
            code: format!("2@{name}"),
            pairing_code: None,
        })
    }

    async fn logout(&self, name: &InstanceName) -> Result<(), ZapflowError> {
        self.logout_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(instance) = self.instances.lock().await.get_mut(name.as_str()) {
            instance.state = ConnectionState::Close;
            instance.phone = None;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn name(raw: &str) -> InstanceName {
        InstanceName::parse(raw).unwrap()
    }

    #[tokio::test]
    async fn create_then_fetch_returns_default_id() {
        let api = MockInstanceApi::new();
        assert!(api.fetch_instances(&name("nina")).await.unwrap().is_empty());

        api.create_instance(&name("nina")).await.unwrap();
        let list = api.fetch_instances(&name("nina")).await.unwrap();
        assert_eq!(list[0].id.as_deref(), Some("id-nina"));
        assert_eq!(api.create_calls(), 1);
        assert_eq!(api.fetch_calls(), 2);
    }

    #[tokio::test]
    async fn assigned_id_is_used_once() {
        let api = MockInstanceApi::new();
        api.assign_id_on_create("nina", "custom").await;
        api.create_instance(&name("nina")).await.unwrap();
        let list = api.fetch_instances(&name("nina")).await.unwrap();
        assert_eq!(list[0].id.as_deref(), Some("custom"));
    }

    #[tokio::test]
    async fn failures_are_switchable() {
        let api = MockInstanceApi::new();
        api.insert_instance("nina", "abc", None).await;
        api.fail_state(true);
        assert!(api.connection_state(&name("nina")).await.is_err());
        api.fail_state(false);
        assert_eq!(
            api.connection_state(&name("nina")).await.unwrap(),
            ConnectionState::Close
        );
    }

    #[tokio::test]
    async fn logout_clears_phone() {
        let api = MockInstanceApi::new();
        api.insert_instance("nina", "abc", Some("5511")).await;
        api.set_state("nina", ConnectionState::Open).await;
        api.logout(&name("nina")).await.unwrap();
        let list = api.fetch_instances(&name("nina")).await.unwrap();
        assert!(list[0].phone.is_none());
        assert_eq!(list[0].state, Some(ConnectionState::Close));
    }
}
