// SPDX-FileCopyrightText: 2026 Zapflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Connection status polling for one remote instance.
//!
//! [`StatusPoller::poll_once`] turns a single remote read into a
//! [`StatusSnapshot`] and never fails. [`StatusPoller::spawn`] runs ticks on
//! an interval and publishes each snapshot on a `watch` channel until the
//! cancellation token fires.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use zapflow_core::types::now_timestamp;
use zapflow_core::{ConnectionStatus, InstanceApi, InstanceName};
use zapflow_evolution::directory::select_instance;

const MIN_PERIOD: Duration = Duration::from_millis(1);

/// Result of one status check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusSnapshot {
    pub status: ConnectionStatus,
    /// Raw state string reported by the API, when it answered.
    pub remote_state: Option<String>,
    /// Bound phone, digits only. Only looked up while connected.
    pub phone: Option<String>,
    pub checked_at: Option<String>,
}

impl StatusSnapshot {
    fn unknown() -> Self {
        Self {
            status: ConnectionStatus::Unknown,
            remote_state: None,
            phone: None,
            checked_at: None,
        }
    }

    fn connecting() -> Self {
        Self {
            status: ConnectionStatus::Connecting,
            ..Self::unknown()
        }
    }
}

/// Polls the connection state of one instance.
#[derive(Clone)]
pub struct StatusPoller {
    api: Arc<dyn InstanceApi>,
    name: InstanceName,
}

impl StatusPoller {
    pub fn new(api: Arc<dyn InstanceApi>, name: InstanceName) -> Self {
        Self { api, name }
    }

    pub fn name(&self) -> &InstanceName {
        &self.name
    }

    /// One status check. `"open"` is connected, any other state is
    /// disconnected, any failure is an error status.
    pub async fn poll_once(&self) -> StatusSnapshot {
        let checked_at = Some(now_timestamp());
        match self.api.connection_state(&self.name).await {
            Ok(state) if state.is_open() => StatusSnapshot {
                status: ConnectionStatus::Connected,
                remote_state: Some(state.to_string()),
                phone: self.bound_phone().await,
                checked_at,
            },
            Ok(state) => StatusSnapshot {
                status: ConnectionStatus::Disconnected,
                remote_state: Some(state.to_string()),
                phone: None,
                checked_at,
            },
            Err(e) => {
                warn!(instance = %self.name, error = %e, "connection state check failed");
                StatusSnapshot {
                    status: ConnectionStatus::Error,
                    remote_state: None,
                    phone: None,
                    checked_at,
                }
            }
        }
    }

    async fn bound_phone(&self) -> Option<String> {
        match self.api.fetch_instances(&self.name).await {
            Ok(instances) => select_instance(&self.name, &instances).and_then(|r| r.phone),
            Err(e) => {
                debug!(instance = %self.name, error = %e, "phone lookup failed");
                None
            }
        }
    }

    /// Runs ticks every `period` on a background task.
    ///
    /// The first tick fires immediately; `Connecting` is published while it
    /// is in flight. Ticks run one after another, so snapshots are published
    /// in order. A tick still running when `cancel` fires is dropped.
    /// Periods below one millisecond are raised to one millisecond.
    pub fn spawn(self, period: Duration, cancel: CancellationToken) -> PollerHandle {
        let period = period.max(MIN_PERIOD);
        let (tx, rx) = watch::channel(StatusSnapshot::unknown());

        let task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut first = true;

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = interval.tick() => {}
                }

                if first {
                    tx.send_replace(StatusSnapshot::connecting());
                    first = false;
                }

                let snapshot = tokio::select! {
                    _ = cancel.cancelled() => break,
                    snapshot = self.poll_once() => snapshot,
                };

                let previous = tx.send_replace(snapshot.clone()).status;
                if previous != snapshot.status {
                    info!(
                        instance = %self.name,
                        from = %previous,
                        to = %snapshot.status,
                        "connection status changed"
                    );
                }
            }
            debug!(instance = %self.name, "status poller stopped");
        });

        PollerHandle { rx, task }
    }
}

/// Handle to a running poller.
pub struct PollerHandle {
    rx: watch::Receiver<StatusSnapshot>,
    task: JoinHandle<()>,
}

impl PollerHandle {
    /// A receiver that sees every published snapshot from now on.
    pub fn subscribe(&self) -> watch::Receiver<StatusSnapshot> {
        self.rx.clone()
    }

    /// The most recently published snapshot.
    pub fn current(&self) -> StatusSnapshot {
        self.rx.borrow().clone()
    }

    pub fn into_task(self) -> JoinHandle<()> {
        self.task
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use zapflow_core::ConnectionState;
    use zapflow_test_utils::MockInstanceApi;

    fn nina() -> InstanceName {
        InstanceName::parse("nina-clinicasp").unwrap()
    }

    async fn api_with(state: ConnectionState, phone: Option<&str>) -> Arc<MockInstanceApi> {
        let api = Arc::new(MockInstanceApi::new());
        api.insert_instance("nina-clinicasp", "remote-1", phone).await;
        api.set_state("nina-clinicasp", state).await;
        api
    }

    #[tokio::test]
    async fn open_is_connected_with_phone() {
        let api = api_with(ConnectionState::Open, Some("5511988887777")).await;
        let snapshot = StatusPoller::new(api, nina()).poll_once().await;
        assert_eq!(snapshot.status, ConnectionStatus::Connected);
        assert_eq!(snapshot.remote_state.as_deref(), Some("open"));
        assert_eq!(snapshot.phone.as_deref(), Some("5511988887777"));
        assert!(snapshot.checked_at.is_some());
    }

    #[tokio::test]
    async fn every_other_state_is_disconnected() {
        for state in [
            ConnectionState::Close,
            ConnectionState::Connecting,
            ConnectionState::Other("refused".into()),
        ] {
            let api = api_with(state.clone(), None).await;
            let snapshot = StatusPoller::new(api.clone(), nina()).poll_once().await;
            assert_eq!(snapshot.status, ConnectionStatus::Disconnected, "{state}");
            assert!(snapshot.phone.is_none());
            // Phone is only looked up while connected.
            assert_eq!(api.fetch_calls(), 0);
        }
    }

    #[tokio::test]
    async fn failure_is_error_status() {
        let api = api_with(ConnectionState::Open, None).await;
        api.fail_state(true);
        let snapshot = StatusPoller::new(api, nina()).poll_once().await;
        assert_eq!(snapshot.status, ConnectionStatus::Error);
        assert!(snapshot.remote_state.is_none());
    }

    #[tokio::test]
    async fn failed_phone_lookup_keeps_connected() {
        let api = api_with(ConnectionState::Open, Some("5511")).await;
        api.fail_fetch(true);
        let snapshot = StatusPoller::new(api, nina()).poll_once().await;
        assert_eq!(snapshot.status, ConnectionStatus::Connected);
        assert!(snapshot.phone.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn spawned_poller_publishes_each_tick() {
        let api = api_with(ConnectionState::Close, None).await;
        let cancel = CancellationToken::new();
        let handle = StatusPoller::new(api.clone(), nina())
            .spawn(Duration::from_secs(5), cancel.clone());
        let mut rx = handle.subscribe();

        rx.wait_for(|s| s.status == ConnectionStatus::Disconnected)
            .await
            .unwrap();
        assert_eq!(api.state_calls(), 1);

        api.set_state("nina-clinicasp", ConnectionState::Open).await;
        rx.wait_for(|s| s.status == ConnectionStatus::Connected)
            .await
            .unwrap();
        assert_eq!(api.state_calls(), 2);

        cancel.cancel();
        handle.into_task().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_stops_the_loop() {
        let api = api_with(ConnectionState::Close, None).await;
        let cancel = CancellationToken::new();
        let handle = StatusPoller::new(api.clone(), nina())
            .spawn(Duration::from_secs(30), cancel.clone());
        let mut rx = handle.subscribe();
        rx.wait_for(|s| s.status == ConnectionStatus::Disconnected)
            .await
            .unwrap();

        cancel.cancel();
        handle.into_task().await.unwrap();
        let calls = api.state_calls();

        tokio::time::sleep(Duration::from_secs(300)).await;
        assert_eq!(api.state_calls(), calls);
    }

    #[tokio::test(start_paused = true)]
    async fn zero_period_polls_at_the_minimum_rate() {
        let api = api_with(ConnectionState::Close, None).await;
        let cancel = CancellationToken::new();
        let handle = StatusPoller::new(api.clone(), nina()).spawn(Duration::ZERO, cancel.clone());
        let mut rx = handle.subscribe();

        rx.wait_for(|s| s.status == ConnectionStatus::Disconnected)
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(api.state_calls() >= 2);

        cancel.cancel();
        handle.into_task().await.unwrap();
    }

    #[test]
    fn initial_snapshot_is_unknown() {
        assert_eq!(StatusSnapshot::unknown().status, ConnectionStatus::Unknown);
        assert_eq!(StatusSnapshot::connecting().status, ConnectionStatus::Connecting);
    }
}
