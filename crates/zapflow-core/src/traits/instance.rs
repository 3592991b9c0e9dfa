// SPDX-FileCopyrightText: 2026 Zapflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Instance API trait for the third-party WhatsApp instance manager.

use async_trait::async_trait;

use crate::error::ZapflowError;
use crate::traits::adapter::PluginAdapter;
use crate::types::{ConnectionState, InstanceName, QrCode, RemoteInstance};

/// Adapter for the remote instance-management HTTP API.
///
/// Implementations return `Err` on transport failures and non-2xx responses;
/// callers decide whether that means "not found" or "error".
#[async_trait]
pub trait InstanceApi: PluginAdapter {
    /// Lists instances whose name matches `name`.
    async fn fetch_instances(&self, name: &InstanceName) -> Result<Vec<RemoteInstance>, ZapflowError>;

    /// Creates an instance with QR pairing enabled.
    async fn create_instance(&self, name: &InstanceName) -> Result<(), ZapflowError>;

    /// Reads the current connection state.
    async fn connection_state(&self, name: &InstanceName) -> Result<ConnectionState, ZapflowError>;

    /// Starts (or restarts) pairing and returns the QR payload.
    async fn connect(&self, name: &InstanceName) -> Result<QrCode, ZapflowError>;

    /// Unbinds the phone so a new QR scan is required.
    async fn logout(&self, name: &InstanceName) -> Result<(), ZapflowError>;
}
