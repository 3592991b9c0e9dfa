// SPDX-FileCopyrightText: 2026 Zapflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `zapflow serve` command implementation.
//!
//! Reconciles every active owner once (when enabled), starts a background
//! status poller plus connection watcher per active configuration, and runs
//! the webhook gateway. Everything stops on SIGTERM/SIGINT.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use zapflow_agent::shutdown;
use zapflow_agent::{ConnectionWatcher, Reconciler, StatusPoller};
use zapflow_config::model::ZapflowConfig;
use zapflow_core::{ChatbotConfig, InstanceApi, InstanceName, StorageAdapter, ZapflowError};
use zapflow_evolution::InstanceDirectory;
use zapflow_gateway::WebhookGateway;

use crate::app::App;

/// Grace period for background tasks after a shutdown signal.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

pub async fn run_serve(config: ZapflowConfig) -> Result<(), ZapflowError> {
    info!("starting zapflow serve");
    let app = App::build(config).await?;
    let cancel = shutdown::install_signal_handler();

    if app.config.poller.reconcile_on_start {
        reconcile_all(app.storage.as_ref(), &app.reconciler()).await;
    }

    let mut tasks = spawn_watchers(
        app.storage.clone(),
        app.api.clone(),
        &app.directory,
        Duration::from_secs(app.config.poller.background_interval_secs),
        &cancel,
    )
    .await?;

    if app.config.gateway.enabled {
        let gateway = WebhookGateway::new(&app.config.gateway, app.recorder());
        let server = gateway.spawn(cancel.child_token());
        let stop = cancel.clone();
        tasks.push(tokio::spawn(async move {
            match server.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    error!(error = %e, "webhook gateway failed");
                    stop.cancel();
                }
                Err(e) => {
                    error!(error = %e, "webhook gateway task panicked");
                    stop.cancel();
                }
            }
        }));
    } else {
        info!("webhook gateway disabled");
    }

    info!(tasks = tasks.len(), "zapflow serve running");
    cancel.cancelled().await;
    info!("shutting down");

    shutdown::drain_tasks(tasks, DRAIN_TIMEOUT).await;
    app.close().await;
    info!("zapflow serve stopped");
    Ok(())
}

/// Reconciles every owner with an active configuration. Failures are logged
/// and left for the next run. Returns the number of owners left clean.
pub async fn reconcile_all(storage: &dyn StorageAdapter, reconciler: &Reconciler) -> usize {
    let owners = match storage.list_active_owners().await {
        Ok(owners) => owners,
        Err(e) => {
            warn!(error = %e, "could not list owners for startup reconciliation");
            return 0;
        }
    };

    let mut clean = 0;
    for owner in owners {
        match reconciler.reconcile(&owner).await {
            Ok(report) if report.is_clean() => {
                clean += 1;
                info!(owner_id = %owner, moved = report.messages_moved(), "owner reconciled");
            }
            Ok(report) => warn!(
                owner_id = %owner,
                moved = report.messages_moved(),
                "owner reconciled with configurations needing another run"
            ),
            Err(e) => warn!(owner_id = %owner, error = %e, "owner reconciliation failed"),
        }
    }
    clean
}

/// One poller + watcher pair per active configuration.
pub async fn spawn_watchers(
    storage: Arc<dyn StorageAdapter>,
    api: Arc<dyn InstanceApi>,
    directory: &InstanceDirectory,
    period: Duration,
    cancel: &CancellationToken,
) -> Result<Vec<JoinHandle<()>>, ZapflowError> {
    let mut tasks = Vec::new();
    for owner in storage.list_active_owners().await? {
        for config in storage.list_configs(&owner, true).await? {
            let config_id = config.id.clone();
            match spawn_watcher(&storage, &api, directory, config, period, cancel) {
                Ok(task) => tasks.push(task),
                Err(e) => warn!(config_id, error = %e, "skipping configuration"),
            }
        }
    }
    Ok(tasks)
}

fn spawn_watcher(
    storage: &Arc<dyn StorageAdapter>,
    api: &Arc<dyn InstanceApi>,
    directory: &InstanceDirectory,
    config: ChatbotConfig,
    period: Duration,
    cancel: &CancellationToken,
) -> Result<JoinHandle<()>, ZapflowError> {
    let name = InstanceName::parse(&config.instance_name)?;
    let watcher = ConnectionWatcher::new(storage.clone(), directory.clone(), config)?;
    let poller = StatusPoller::new(api.clone(), name).spawn(period, cancel.child_token());
    let rx = poller.subscribe();
    let token = cancel.child_token();

    Ok(tokio::spawn(async move {
        watcher.run(rx, token).await;
        let _ = poller.into_task().await;
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use zapflow_core::{ConnectionState, ConversationKey, MessageDirection, StoredMessage};
    use zapflow_core::types::now_timestamp;
    use zapflow_test_utils::TestHarness;

    fn directory(harness: &TestHarness) -> InstanceDirectory {
        InstanceDirectory::new(harness.api.clone(), Duration::from_millis(1))
    }

    #[tokio::test]
    async fn one_watcher_per_active_config_and_all_stop_on_cancel() {
        let harness = TestHarness::new().await.unwrap();
        let ana = harness.seed_owner("Ana").await.unwrap();
        let bia = harness.seed_owner("Bia").await.unwrap();
        harness.seed_config(&ana, "nina-clinicasp").await.unwrap();
        harness.seed_config(&ana, "leo-petshop").await.unwrap();
        harness.seed_config(&bia, "bia-padaria").await.unwrap();

        let cancel = CancellationToken::new();
        let tasks = spawn_watchers(
            harness.storage.clone(),
            harness.api.clone(),
            &directory(&harness),
            Duration::from_millis(20),
            &cancel,
        )
        .await
        .unwrap();
        assert_eq!(tasks.len(), 3);

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(harness.api.state_calls() >= 3);

        cancel.cancel();
        for task in tasks {
            tokio::time::timeout(Duration::from_secs(2), task)
                .await
                .expect("watcher should stop")
                .unwrap();
        }
    }

    #[tokio::test]
    async fn watcher_stores_phone_once_connected() {
        let harness = TestHarness::new().await.unwrap();
        let owner = harness.seed_owner("Ana").await.unwrap();
        let config = harness.seed_config(&owner, "nina-clinicasp").await.unwrap();
        harness
            .api
            .insert_instance("nina-clinicasp", "remote-1", Some("5511988887777"))
            .await;
        harness.api.set_state("nina-clinicasp", ConnectionState::Open).await;

        let cancel = CancellationToken::new();
        let tasks = spawn_watchers(
            harness.storage.clone(),
            harness.api.clone(),
            &directory(&harness),
            Duration::from_millis(10),
            &cancel,
        )
        .await
        .unwrap();

        let mut stored = None;
        for _ in 0..100 {
            let current = harness.storage.get_config(&config.id).await.unwrap().unwrap();
            if current.phone.is_some() && current.instance_id.is_some() {
                stored = Some(current);
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        cancel.cancel();
        shutdown::drain_tasks(tasks, Duration::from_secs(2)).await;

        let stored = stored.expect("watcher should bind the configuration");
        assert_eq!(stored.phone.as_deref(), Some("5511988887777"));
        assert_eq!(stored.instance_id.as_deref(), Some("remote-1"));
    }

    #[tokio::test]
    async fn startup_reconciliation_binds_owner_keyed_history() {
        let harness = TestHarness::new().await.unwrap();
        let owner = harness.seed_owner("Ana").await.unwrap();
        let config = harness.seed_config(&owner, "nina-clinicasp").await.unwrap();
        harness.api.insert_instance("nina-clinicasp", "remote-1", None).await;

        let now = now_timestamp();
        harness
            .storage
            .insert_message(&StoredMessage {
                id: "m-1".into(),
                owner_id: owner.clone(),
                instance_id: owner.as_str().to_string(),
                conversation_key: ConversationKey::build(owner.as_str(), "5511977776666")
                    .into_string(),
                counterpart_phone: "5511977776666".into(),
                content: "oi".into(),
                direction: MessageDirection::Inbound,
                message_type: "text".into(),
                status: None,
                external_id: None,
                created_at: now.clone(),
                updated_at: now,
            })
            .await
            .unwrap();

        let reconciler = Reconciler::new(harness.storage.clone(), directory(&harness));
        assert_eq!(reconcile_all(harness.storage.as_ref(), &reconciler).await, 1);

        let config = harness.storage.get_config(&config.id).await.unwrap().unwrap();
        assert_eq!(config.instance_id.as_deref(), Some("remote-1"));
        assert_eq!(harness.storage.count_messages("remote-1").await.unwrap(), 1);
        assert_eq!(harness.storage.count_messages(owner.as_str()).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn startup_reconciliation_counts_unresolved_owner_as_unclean() {
        let harness = TestHarness::new().await.unwrap();
        let owner = harness.seed_owner("Ana").await.unwrap();
        harness.seed_config(&owner, "nina-clinicasp").await.unwrap();
        harness.api.fail_fetch(true);

        let reconciler = Reconciler::new(harness.storage.clone(), directory(&harness));
        assert_eq!(reconcile_all(harness.storage.as_ref(), &reconciler).await, 0);
    }
}
