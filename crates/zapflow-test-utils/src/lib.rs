// SPDX-FileCopyrightText: 2026 Zapflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for Zapflow integration tests.
//!
//! Provides mock adapters and test harness infrastructure for fast,
//! deterministic, CI-runnable tests without external services.
//!
//! # Components
//!
//! - [`MockInstanceApi`] - In-memory instance API with failure switches
//! - [`MockAuth`] - In-memory auth service
//! - [`FlakyStorage`] - Storage wrapper that fails selected writes
//! - [`TestHarness`] - Temp SQLite storage plus a mock instance API

pub mod flaky_storage;
pub mod harness;
pub mod mock_auth;
pub mod mock_instance_api;

pub use flaky_storage::FlakyStorage;
pub use harness::TestHarness;
pub use mock_auth::MockAuth;
pub use mock_instance_api::MockInstanceApi;
