// SPDX-FileCopyrightText: 2026 Zapflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for Zapflow.

use thiserror::Error;

/// A single field-level validation failure, surfaced inline by the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    /// Name of the offending field (e.g. `"password_confirmation"`).
    pub field: String,
    /// Human-readable reason.
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for FieldError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// The primary error type used across all Zapflow adapter traits and services.
#[derive(Debug, Error)]
pub enum ZapflowError {
    /// Configuration errors (invalid TOML, missing required fields, bad header values).
    #[error("configuration error: {0}")]
    Config(String),

    /// Input rejected before any remote call was made.
    #[error("validation failed: {}", format_fields(.fields))]
    Validation { fields: Vec<FieldError> },

    /// Local storage errors (database connection, query failure, serialization).
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Backend-as-a-service errors (REST table access, unexpected status codes).
    #[error("backend error: {message}")]
    Backend {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Instance-management API errors (transport failure, non-2xx, bad payload).
    #[error("remote API error: {message}")]
    RemoteApi {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Authentication collaborator rejected the request.
    #[error("auth error: {message}")]
    Auth { message: String },

    /// A row that was expected to exist does not.
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// A chatbot configuration has no resolved remote instance id yet.
    #[error("instance `{instance_name}` has no resolved remote id")]
    InstanceUnresolved { instance_name: String },

    /// Operation timed out.
    #[error("operation timed out after {duration:?}")]
    Timeout { duration: std::time::Duration },

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ZapflowError {
    /// Shorthand for a single-field validation error.
    pub fn invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        ZapflowError::Validation {
            fields: vec![FieldError::new(field, message)],
        }
    }
}

fn format_fields(fields: &[FieldError]) -> String {
    fields
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_error_lists_every_field() {
        let err = ZapflowError::Validation {
            fields: vec![
                FieldError::new("email", "required"),
                FieldError::new("password_confirmation", "does not match"),
            ],
        };
        let msg = err.to_string();
        assert!(msg.contains("email: required"), "got: {msg}");
        assert!(msg.contains("password_confirmation: does not match"), "got: {msg}");
    }

    #[test]
    fn invalid_shorthand_builds_single_field() {
        match ZapflowError::invalid("bot_name", "required") {
            ZapflowError::Validation { fields } => {
                assert_eq!(fields, vec![FieldError::new("bot_name", "required")]);
            }
            other => panic!("unexpected variant: {other:?}"),
        }
    }

    #[test]
    fn unresolved_mentions_instance_name() {
        let err = ZapflowError::InstanceUnresolved {
            instance_name: "nina-clinicasp".into(),
        };
        assert!(err.to_string().contains("nina-clinicasp"));
    }
}
