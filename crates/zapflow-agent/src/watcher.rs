// SPDX-FileCopyrightText: 2026 Zapflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Reacts to status snapshots for one chatbot configuration.
//!
//! On the transition into `Connected` the watcher resolves the instance,
//! stores the bound phone and, if the remote id differs from the stored one,
//! runs reconciliation for the owner once. While connected it stops asking
//! for a QR scan.

use std::sync::Arc;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use zapflow_core::{ChatbotConfig, InstanceName, StorageAdapter, ZapflowError};
use zapflow_evolution::InstanceDirectory;

use crate::poller::StatusSnapshot;
use crate::reconcile::{ReconcileReport, Reconciler};

/// What a snapshot changed.
#[derive(Debug)]
pub enum WatchEvent {
    /// Just connected. `reconciled` is set when the remote id had moved.
    Connected {
        phone: Option<String>,
        reconciled: Option<ReconcileReport>,
    },
    /// Connection lost after having been connected.
    Disconnected,
}

pub struct ConnectionWatcher {
    storage: Arc<dyn StorageAdapter>,
    directory: InstanceDirectory,
    reconciler: Reconciler,
    config: ChatbotConfig,
    name: InstanceName,
    connected: bool,
    reconciled: bool,
}

impl ConnectionWatcher {
    pub fn new(
        storage: Arc<dyn StorageAdapter>,
        directory: InstanceDirectory,
        config: ChatbotConfig,
    ) -> Result<Self, ZapflowError> {
        let name = InstanceName::parse(&config.instance_name)?;
        Ok(Self {
            reconciler: Reconciler::new(storage.clone(), directory.clone()),
            storage,
            directory,
            config,
            name,
            connected: false,
            reconciled: false,
        })
    }

    /// Whether the user should still be shown a QR code.
    pub fn wants_qr(&self) -> bool {
        !self.connected
    }

    /// The configuration as last known to the watcher.
    pub fn config(&self) -> &ChatbotConfig {
        &self.config
    }

    /// Applies one snapshot. Returns an event on connect/disconnect transitions.
    pub async fn observe(&mut self, snapshot: &StatusSnapshot) -> Option<WatchEvent> {
        match (self.connected, snapshot.status.is_connected()) {
            (false, true) => {
                self.connected = true;
                info!(instance = %self.name, "instance connected");
                Some(self.on_connected(snapshot).await)
            }
            (true, false) => {
                self.connected = false;
                info!(instance = %self.name, status = %snapshot.status, "instance no longer connected");
                Some(WatchEvent::Disconnected)
            }
            _ => None,
        }
    }

    async fn on_connected(&mut self, snapshot: &StatusSnapshot) -> WatchEvent {
        let Some(resolved) = self.directory.resolve(&self.name).await else {
            warn!(instance = %self.name, "connected instance could not be resolved");
            return WatchEvent::Connected {
                phone: snapshot.phone.clone(),
                reconciled: None,
            };
        };

        let phone = resolved.phone.clone().or_else(|| snapshot.phone.clone());
        if let Some(phone) = &phone
            && self.config.phone.as_ref() != Some(phone)
        {
            match self.storage.update_config_phone(&self.config.id, phone).await {
                Ok(()) => {
                    debug!(config_id = %self.config.id, "bound phone stored");
                    self.config.phone = Some(phone.clone());
                }
                Err(e) => warn!(config_id = %self.config.id, error = %e, "failed to store bound phone"),
            }
        }

        let mut reconciled = None;
        let moved = self.config.instance_id.as_deref() != Some(resolved.remote_id.as_str());
        if moved && !self.reconciled {
            self.reconciled = true;
            match self.reconciler.reconcile(&self.config.owner_id).await {
                Ok(report) => reconciled = Some(report),
                Err(e) => warn!(owner_id = %self.config.owner_id, error = %e, "reconciliation failed"),
            }
            match self.storage.get_config(&self.config.id).await {
                Ok(Some(config)) => self.config = config,
                Ok(None) => warn!(config_id = %self.config.id, "configuration disappeared"),
                Err(e) => warn!(config_id = %self.config.id, error = %e, "failed to reload configuration"),
            }
        }

        WatchEvent::Connected { phone, reconciled }
    }

    /// Observes snapshots until cancelled or the poller stops.
    pub async fn run(
        mut self,
        mut rx: watch::Receiver<StatusSnapshot>,
        cancel: CancellationToken,
    ) -> Self {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                changed = rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
            let snapshot = rx.borrow_and_update().clone();
            self.observe(&snapshot).await;
        }
        debug!(instance = %self.name, "connection watcher stopped");
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use zapflow_core::ConnectionStatus;
    use zapflow_test_utils::TestHarness;

    fn snapshot(status: ConnectionStatus, phone: Option<&str>) -> StatusSnapshot {
        StatusSnapshot {
            status,
            remote_state: None,
            phone: phone.map(Into::into),
            checked_at: None,
        }
    }

    async fn watcher_for(harness: &TestHarness, config: ChatbotConfig) -> ConnectionWatcher {
        ConnectionWatcher::new(
            harness.storage.clone(),
            InstanceDirectory::new(harness.api.clone(), Duration::from_millis(1)),
            config,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn connecting_stores_phone_and_stops_qr() {
        let harness = TestHarness::new().await.unwrap();
        let owner = harness.seed_owner("Ana").await.unwrap();
        let config = harness.seed_config(&owner, "nina-clinicasp").await.unwrap();
        harness
            .storage
            .update_config_instance(&config.id, "remote-1", None)
            .await
            .unwrap();
        let config = harness.storage.get_config(&config.id).await.unwrap().unwrap();
        harness
            .api
            .insert_instance("nina-clinicasp", "remote-1", Some("5511988887777"))
            .await;

        let mut watcher = watcher_for(&harness, config.clone()).await;
        assert!(watcher.wants_qr());
        assert!(watcher.observe(&snapshot(ConnectionStatus::Disconnected, None)).await.is_none());

        match watcher.observe(&snapshot(ConnectionStatus::Connected, None)).await {
            Some(WatchEvent::Connected { phone, reconciled }) => {
                assert_eq!(phone.as_deref(), Some("5511988887777"));
                assert!(reconciled.is_none(), "id unchanged, no reconciliation");
            }
            other => panic!("expected connected event, got {other:?}"),
        }
        assert!(!watcher.wants_qr());

        let stored = harness.storage.get_config(&config.id).await.unwrap().unwrap();
        assert_eq!(stored.phone.as_deref(), Some("5511988887777"));

        // Staying connected is not a new transition.
        assert!(watcher.observe(&snapshot(ConnectionStatus::Connected, None)).await.is_none());
    }

    #[tokio::test]
    async fn changed_remote_id_triggers_single_reconciliation() {
        let harness = TestHarness::new().await.unwrap();
        let owner = harness.seed_owner("Ana").await.unwrap();
        let config = harness.seed_config(&owner, "nina-clinicasp").await.unwrap();
        harness
            .storage
            .update_config_instance(&config.id, "old-id", None)
            .await
            .unwrap();
        let config = harness.storage.get_config(&config.id).await.unwrap().unwrap();
        harness.api.insert_instance("nina-clinicasp", "new-id", None).await;

        let mut watcher = watcher_for(&harness, config).await;
        match watcher.observe(&snapshot(ConnectionStatus::Connected, None)).await {
            Some(WatchEvent::Connected { reconciled: Some(report), .. }) => {
                assert!(report.is_clean());
            }
            other => panic!("expected reconciliation, got {other:?}"),
        }
        assert_eq!(watcher.config().instance_id.as_deref(), Some("new-id"));

        // Reconnecting after a drop does not reconcile again.
        assert!(matches!(
            watcher.observe(&snapshot(ConnectionStatus::Error, None)).await,
            Some(WatchEvent::Disconnected)
        ));
        assert!(watcher.wants_qr());
        harness.api.set_remote_id("nina-clinicasp", "newer-id").await;
        match watcher.observe(&snapshot(ConnectionStatus::Connected, None)).await {
            Some(WatchEvent::Connected { reconciled, .. }) => assert!(reconciled.is_none()),
            other => panic!("expected connected event, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn run_follows_the_channel_until_the_poller_stops() {
        let harness = TestHarness::new().await.unwrap();
        let owner = harness.seed_owner("Ana").await.unwrap();
        let config = harness.seed_config(&owner, "nina-clinicasp").await.unwrap();
        harness.api.insert_instance("nina-clinicasp", "remote-1", None).await;

        let watcher = watcher_for(&harness, config).await;
        let (tx, rx) = watch::channel(snapshot(ConnectionStatus::Unknown, None));
        let cancel = CancellationToken::new();
        let task = tokio::spawn(watcher.run(rx, cancel.clone()));

        tx.send(snapshot(ConnectionStatus::Connected, Some("5511"))).unwrap();
        // The last value is still delivered after the sender goes away.
        drop(tx);
        let watcher = task.await.unwrap();
        assert!(!cancel.is_cancelled());
        assert!(!watcher.wants_qr());
        assert_eq!(watcher.config().instance_id.as_deref(), Some("remote-1"));
    }
}
