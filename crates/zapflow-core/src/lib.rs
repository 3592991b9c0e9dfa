// SPDX-FileCopyrightText: 2026 Zapflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for Zapflow.
//!
//! This crate provides the trait definitions, error type, and common types
//! shared by the storage, instance API, auth, and service crates.

pub mod error;
pub mod key;
pub mod traits;
pub mod types;

// Re-export key items at crate root for ergonomic imports.
pub use error::{FieldError, ZapflowError};
pub use key::{ConversationKey, normalize_phone, phone_from_jid};
pub use types::{
    AdapterType, ChatbotConfig, ConnectionState, ConnectionStatus, HealthStatus, InboundEvent,
    InstanceName, MessageDirection, OwnerId, Profile, QrCode, RemoteInstance, ResolvedInstance,
    Session, StoredMessage,
};

pub use traits::{AuthAdapter, InstanceApi, PluginAdapter, SignUpOutcome, StorageAdapter};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zapflow_error_has_all_variants() {
        let _config = ZapflowError::Config("test".into());
        let _validation = ZapflowError::invalid("email", "required");
        let _storage = ZapflowError::Storage {
            source: Box::new(std::io::Error::other("test")),
        };
        let _backend = ZapflowError::Backend {
            message: "test".into(),
            source: None,
        };
        let _remote = ZapflowError::RemoteApi {
            message: "test".into(),
            source: None,
        };
        let _auth = ZapflowError::Auth {
            message: "test".into(),
        };
        let _not_found = ZapflowError::NotFound {
            entity: "chatbot_config".into(),
            id: "x".into(),
        };
        let _unresolved = ZapflowError::InstanceUnresolved {
            instance_name: "x".into(),
        };
        let _timeout = ZapflowError::Timeout {
            duration: std::time::Duration::from_secs(30),
        };
        let _internal = ZapflowError::Internal("test".into());
    }

    #[test]
    fn adapter_type_display_round_trip() {
        use std::str::FromStr;

        for variant in [AdapterType::Storage, AdapterType::InstanceApi, AdapterType::Auth] {
            let parsed = AdapterType::from_str(&variant.to_string()).expect("should parse back");
            assert_eq!(variant, parsed);
        }
    }

    #[test]
    fn service_session_has_no_tokens() {
        let session = Session::service(OwnerId("owner-1".into()));
        assert_eq!(session.owner_id.as_str(), "owner-1");
        assert!(session.access_token.is_none());
        assert!(session.refresh_token.is_none());
    }

    #[test]
    fn all_trait_modules_are_exported() {
        fn _assert_plugin_adapter<T: PluginAdapter>() {}
        fn _assert_storage_adapter<T: StorageAdapter>() {}
        fn _assert_instance_api<T: InstanceApi>() {}
        fn _assert_auth_adapter<T: AuthAdapter>() {}
    }
}
