// SPDX-FileCopyrightText: 2026 Zapflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Instance-identity services for Zapflow.
//!
//! - [`StatusPoller`] publishes the connection status of one instance.
//! - [`ConnectionWatcher`] reacts to status changes by storing the bound
//!   phone and reconciling a moved instance id.
//! - [`Reconciler`] rewrites configuration rows and message partitions when
//!   the remote id behind an instance name changes.
//! - [`MessageRecorder`], [`ChatbotService`] and [`SignupFlow`] are the entry
//!   points the webhook receiver and the CLI call into.

pub mod configure;
pub mod ingest;
pub mod poller;
pub mod reconcile;
pub mod shutdown;
pub mod signup;
pub mod watcher;

pub use configure::{ChatbotService, ConfigureOutcome, ConfigureRequest};
pub use ingest::MessageRecorder;
pub use poller::{PollerHandle, StatusPoller, StatusSnapshot};
pub use reconcile::{ConfigReconciliation, ReconcileOutcome, ReconcileReport, Reconciler};
pub use signup::{SignupFlow, SignupOutcome, SignupRequest};
pub use watcher::{ConnectionWatcher, WatchEvent};
