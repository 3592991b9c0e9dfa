// SPDX-FileCopyrightText: 2026 Zapflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Secret hygiene for Zapflow.
//!
//! API keys, service keys and session tokens must never reach log output.
//! [`RedactingWriter`] is installed under the tracing subscriber; [`redact`]
//! is available for ad-hoc error text.

pub mod redact;

pub use redact::{redact, RedactingWriter, SecretRegistry};
