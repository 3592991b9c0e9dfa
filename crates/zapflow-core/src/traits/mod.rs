// SPDX-FileCopyrightText: 2026 Zapflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Adapter trait definitions.
//!
//! All adapters extend the [`PluginAdapter`] base trait and use
//! `#[async_trait]` for dynamic dispatch compatibility.

pub mod adapter;
pub mod auth;
pub mod instance;
pub mod storage;

pub use adapter::PluginAdapter;
pub use auth::{AuthAdapter, SignUpOutcome};
pub use instance::InstanceApi;
pub use storage::StorageAdapter;
