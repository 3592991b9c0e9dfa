// SPDX-FileCopyrightText: 2026 Zapflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Instance-identity reconciliation.
//!
//! Messages are partitioned by the configuration's resolved remote instance
//! id. When the remote side reports a different id than the one stored, the
//! configuration row is updated first and the messages are moved second.
//! The two steps are not transactional: a failure between them is reported
//! as [`ReconcileOutcome::MessagesStale`] and left for the next run.
//!
//! Rows written before any id was resolved are partitioned by owner id; the
//! first binding moves them to the resolved id.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, error, info, warn};
use zapflow_core::{ChatbotConfig, InstanceName, OwnerId, StorageAdapter, ZapflowError};
use zapflow_evolution::InstanceDirectory;

/// What reconciliation did to one configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ReconcileOutcome {
    /// The instance could not be resolved; nothing was written.
    Unresolved,
    /// First resolution stored. `messages` owner-keyed rows were moved.
    Bound { instance_id: String, messages: u64 },
    /// The stored id is current.
    Unchanged {
        instance_id: String,
        phone_updated: bool,
    },
    /// The stored id changed and the messages followed.
    Rekeyed {
        old: String,
        new: String,
        messages: u64,
    },
    /// The configuration row could not be updated; messages were not touched.
    ConfigUpdateFailed { error: String },
    /// The configuration points at `new` but messages are still under `old`.
    MessagesStale {
        old: String,
        new: String,
        error: String,
    },
}

impl ReconcileOutcome {
    /// Whether this outcome left data needing another run.
    pub fn needs_retry(&self) -> bool {
        matches!(
            self,
            ReconcileOutcome::Unresolved
                | ReconcileOutcome::ConfigUpdateFailed { .. }
                | ReconcileOutcome::MessagesStale { .. }
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConfigReconciliation {
    pub config_id: String,
    pub instance_name: String,
    #[serde(flatten)]
    pub outcome: ReconcileOutcome,
}

/// Per-configuration results of one reconciliation run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    pub owner_id: OwnerId,
    pub configs: Vec<ConfigReconciliation>,
}

impl ReconcileReport {
    pub fn is_clean(&self) -> bool {
        !self.configs.iter().any(|c| c.outcome.needs_retry())
    }

    /// Total number of messages moved between partitions.
    pub fn messages_moved(&self) -> u64 {
        self.configs
            .iter()
            .map(|c| match c.outcome {
                ReconcileOutcome::Bound { messages, .. }
                | ReconcileOutcome::Rekeyed { messages, .. } => messages,
                _ => 0,
            })
            .sum()
    }
}

/// Brings stored instance ids and message partitions in line with the
/// remote directory.
#[derive(Clone)]
pub struct Reconciler {
    storage: Arc<dyn StorageAdapter>,
    directory: InstanceDirectory,
}

impl Reconciler {
    pub fn new(storage: Arc<dyn StorageAdapter>, directory: InstanceDirectory) -> Self {
        Self { storage, directory }
    }

    /// Reconciles every active configuration of `owner_id`, one at a time.
    ///
    /// Only listing the configurations can fail; per-configuration problems
    /// are reported in the returned outcomes.
    pub async fn reconcile(&self, owner_id: &OwnerId) -> Result<ReconcileReport, ZapflowError> {
        let configs = self.storage.list_configs(owner_id, true).await?;
        debug!(owner_id = %owner_id, count = configs.len(), "reconciling configurations");

        let mut results = Vec::with_capacity(configs.len());
        for config in &configs {
            let outcome = self.reconcile_config(config).await;
            results.push(ConfigReconciliation {
                config_id: config.id.clone(),
                instance_name: config.instance_name.clone(),
                outcome,
            });
        }

        let report = ReconcileReport {
            owner_id: owner_id.clone(),
            configs: results,
        };
        info!(
            owner_id = %owner_id,
            configs = report.configs.len(),
            moved = report.messages_moved(),
            clean = report.is_clean(),
            "reconciliation finished"
        );
        Ok(report)
    }

    /// Reconciles a single configuration.
    pub async fn reconcile_config(&self, config: &ChatbotConfig) -> ReconcileOutcome {
        let name = match InstanceName::parse(&config.instance_name) {
            Ok(name) => name,
            Err(e) => {
                warn!(config_id = %config.id, error = %e, "stored instance name is invalid");
                return ReconcileOutcome::Unresolved;
            }
        };

        let Some(resolved) = self.directory.resolve(&name).await else {
            debug!(config_id = %config.id, instance = %name, "instance unresolved, skipping");
            return ReconcileOutcome::Unresolved;
        };
        let new_id = resolved.remote_id;
        let phone = resolved.phone.as_deref();

        match config.instance_id.as_deref() {
            None => {
                if let Err(e) = self
                    .storage
                    .update_config_instance(&config.id, &new_id, phone)
                    .await
                {
                    warn!(config_id = %config.id, error = %e, "failed to store resolved instance id");
                    return ReconcileOutcome::ConfigUpdateFailed {
                        error: e.to_string(),
                    };
                }
                info!(config_id = %config.id, instance_id = %new_id, "instance bound");

                let legacy = config.owner_id.as_str();
                match self.move_messages(legacy, &new_id).await {
                    Ok(messages) => ReconcileOutcome::Bound {
                        instance_id: new_id,
                        messages,
                    },
                    Err(e) => self.stale(config, legacy, new_id, e),
                }
            }
            Some(current) if current == new_id => {
                let phone_updated = match phone {
                    Some(phone) if config.phone.as_deref() != Some(phone) => {
                        match self.storage.update_config_phone(&config.id, phone).await {
                            Ok(()) => true,
                            Err(e) => {
                                warn!(config_id = %config.id, error = %e, "failed to store bound phone");
                                false
                            }
                        }
                    }
                    _ => false,
                };
                ReconcileOutcome::Unchanged {
                    instance_id: new_id,
                    phone_updated,
                }
            }
            Some(old) => {
                if let Err(e) = self
                    .storage
                    .update_config_instance(&config.id, &new_id, phone)
                    .await
                {
                    warn!(config_id = %config.id, error = %e, "failed to update instance id");
                    return ReconcileOutcome::ConfigUpdateFailed {
                        error: e.to_string(),
                    };
                }
                info!(config_id = %config.id, old, new = %new_id, "instance id changed");

                match self.move_messages(old, &new_id).await {
                    Ok(messages) => ReconcileOutcome::Rekeyed {
                        old: old.to_string(),
                        new: new_id,
                        messages,
                    },
                    Err(e) => self.stale(config, old, new_id, e),
                }
            }
        }
    }

    async fn move_messages(&self, old: &str, new: &str) -> Result<u64, ZapflowError> {
        let moved = self.storage.rekey_messages(old, new).await?;
        if moved > 0 {
            info!(old, new, moved, "messages moved to new partition");
        }
        Ok(moved)
    }

    fn stale(
        &self,
        config: &ChatbotConfig,
        old: &str,
        new: String,
        e: ZapflowError,
    ) -> ReconcileOutcome {
        error!(
            config_id = %config.id,
            old,
            new = %new,
            error = %e,
            "configuration updated but messages were not moved"
        );
        ReconcileOutcome::MessagesStale {
            old: old.to_string(),
            new,
            error: e.to_string(),
        }
    }
}
