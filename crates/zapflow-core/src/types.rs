// SPDX-FileCopyrightText: 2026 Zapflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Common types used across adapter traits and Zapflow services.

use std::fmt;

use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::error::ZapflowError;

/// Opaque account id assigned by the auth collaborator at signup.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OwnerId(pub String);

impl OwnerId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Health status reported by adapter health checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    /// Adapter is fully operational.
    Healthy,
    /// Adapter is operational but experiencing issues.
    Degraded(String),
    /// Adapter is not operational.
    Unhealthy(String),
}

/// Identifies the kind of adapter behind a trait object.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
pub enum AdapterType {
    Storage,
    InstanceApi,
    Auth,
}

// --- Instance names ---

/// Longest instance name accepted by the instance-management API.
pub const MAX_INSTANCE_NAME_LEN: usize = 64;

/// A validated remote-instance name (lowercase slug).
///
/// Accepted characters are ASCII lowercase letters, digits, `-` and `_`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct InstanceName(String);

impl InstanceName {
    /// Validates `raw` as an instance name.
    pub fn parse(raw: &str) -> Result<Self, ZapflowError> {
        let name = raw.trim();
        if name.is_empty() {
            return Err(ZapflowError::invalid("instance_name", "must not be empty"));
        }
        if name.len() > MAX_INSTANCE_NAME_LEN {
            return Err(ZapflowError::invalid(
                "instance_name",
                format!("must be at most {MAX_INSTANCE_NAME_LEN} characters"),
            ));
        }
        if let Some(bad) = name
            .chars()
            .find(|c| !(c.is_ascii_lowercase() || c.is_ascii_digit() || *c == '-' || *c == '_'))
        {
            return Err(ZapflowError::invalid(
                "instance_name",
                format!("invalid character `{bad}` (allowed: a-z, 0-9, `-`, `_`)"),
            ));
        }
        Ok(Self(name.to_string()))
    }

    /// Derives an instance name from free-text parts such as bot name and company.
    ///
    /// Each part is accent-folded, lowercased and stripped to `[a-z0-9]`; the
    /// non-empty parts are joined with `-`. `("Nina", "Clínica SP")` becomes
    /// `nina-clinicasp`.
    pub fn slugify(parts: &[&str]) -> Result<Self, ZapflowError> {
        let slug = parts
            .iter()
            .map(|part| {
                part.chars()
                    .map(fold_accent)
                    .flat_map(char::to_lowercase)
                    .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
                    .collect::<String>()
            })
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join("-");
        let truncated: String = slug.chars().take(MAX_INSTANCE_NAME_LEN).collect();
        Self::parse(truncated.trim_end_matches('-'))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for InstanceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for InstanceName {
    type Error = ZapflowError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<InstanceName> for String {
    fn from(value: InstanceName) -> Self {
        value.0
    }
}

fn fold_accent(c: char) -> char {
    match c {
        'á' | 'à' | 'â' | 'ã' | 'ä' | 'Á' | 'À' | 'Â' | 'Ã' | 'Ä' => 'a',
        'é' | 'è' | 'ê' | 'ë' | 'É' | 'È' | 'Ê' | 'Ë' => 'e',
        'í' | 'ì' | 'î' | 'ï' | 'Í' | 'Ì' | 'Î' | 'Ï' => 'i',
        'ó' | 'ò' | 'ô' | 'õ' | 'ö' | 'Ó' | 'Ò' | 'Ô' | 'Õ' | 'Ö' => 'o',
        'ú' | 'ù' | 'û' | 'ü' | 'Ú' | 'Ù' | 'Û' | 'Ü' => 'u',
        'ç' | 'Ç' => 'c',
        'ñ' | 'Ñ' => 'n',
        other => other,
    }
}

// --- Remote instance ---

/// Connection state reported by the instance-management API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    Open,
    Close,
    Connecting,
    /// Any state string the API reports that is not one of the above.
    Other(String),
}

impl ConnectionState {
    /// Maps the raw state string. Only the literal `"open"` counts as open.
    pub fn parse(raw: &str) -> Self {
        match raw {
            "open" => ConnectionState::Open,
            "close" => ConnectionState::Close,
            "connecting" => ConnectionState::Connecting,
            other => ConnectionState::Other(other.to_string()),
        }
    }

    pub fn is_open(&self) -> bool {
        matches!(self, ConnectionState::Open)
    }

    pub fn as_str(&self) -> &str {
        match self {
            ConnectionState::Open => "open",
            ConnectionState::Close => "close",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Other(s) => s,
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entry of the remote instance listing, after field-path parsing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteInstance {
    /// Opaque id assigned by the remote API. May be a placeholder sentinel.
    pub id: Option<String>,
    pub name: Option<String>,
    pub state: Option<ConnectionState>,
    /// Bound phone number, digits only.
    pub phone: Option<String>,
}

/// Result of resolving an instance name to its remote identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedInstance {
    pub remote_id: String,
    /// Digits-only bound phone; `None` until a QR scan binds a number.
    pub phone: Option<String>,
}

/// QR payload returned by the connect endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum QrCode {
    /// A ready-to-display image as a `data:` URI.
    Image {
        data_uri: String,
        pairing_code: Option<String>,
    },
    /// The raw QR payload; the caller renders it.
    Raw {
        code: String,
        pairing_code: Option<String>,
    },
}

/// Simplified connection status exposed to dashboards and the CLI.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    Unknown,
    Connecting,
    Connected,
    Disconnected,
    Error,
}

impl ConnectionStatus {
    pub fn is_connected(self) -> bool {
        self == ConnectionStatus::Connected
    }
}

// --- Persistent rows ---

/// Display profile of an owner account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub id: OwnerId,
    pub full_name: String,
    #[serde(default)]
    pub company: Option<String>,
    pub email: String,
    #[serde(default)]
    pub phone: Option<String>,
    pub created_at: String,
}

/// One configured chatbot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatbotConfig {
    pub id: String,
    pub owner_id: OwnerId,
    pub bot_name: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub tone: Option<String>,
    pub instance_name: String,
    /// Resolved remote instance id; `None` until the directory resolves it.
    #[serde(default)]
    pub instance_id: Option<String>,
    /// Digits-only bound phone; `None` until connected.
    #[serde(default)]
    pub phone: Option<String>,
    pub active: bool,
    pub created_at: String,
    pub updated_at: String,
}

/// Direction of a stored message relative to the chatbot owner.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum MessageDirection {
    Inbound,
    Outbound,
}

/// A persisted inbound or outbound message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredMessage {
    pub id: String,
    pub owner_id: OwnerId,
    /// Partition identity: the configuration's resolved remote instance id.
    pub instance_id: String,
    pub conversation_key: String,
    /// Digits-only counterpart phone.
    pub counterpart_phone: String,
    pub content: String,
    pub direction: MessageDirection,
    pub message_type: String,
    #[serde(default)]
    pub status: Option<String>,
    /// Message id assigned by WhatsApp, used for status updates.
    #[serde(default)]
    pub external_id: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// A message event delivered by the instance API webhook.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundEvent {
    pub instance_name: String,
    pub counterpart_phone: String,
    pub content: String,
    pub direction: MessageDirection,
    pub message_type: String,
    pub external_id: Option<String>,
    pub push_name: Option<String>,
    /// ISO 8601 timestamp.
    pub timestamp: String,
}

/// Authenticated session, passed explicitly to operations acting on behalf of an owner.
#[derive(Debug)]
pub struct Session {
    pub owner_id: OwnerId,
    pub email: Option<String>,
    /// Bearer token for the backend; `None` for service-level sessions.
    pub access_token: Option<SecretString>,
    pub refresh_token: Option<SecretString>,
    /// Unix timestamp (seconds) at which the access token expires.
    pub expires_at: Option<i64>,
}

impl Session {
    /// A session acting as `owner_id` without user credentials (CLI, webhooks).
    pub fn service(owner_id: OwnerId) -> Self {
        Self {
            owner_id,
            email: None,
            access_token: None,
            refresh_token: None,
            expires_at: None,
        }
    }
}

/// Timestamp format used by every stored row (sortable as text).
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3fZ";

/// Current UTC time in the storage timestamp format.
pub fn now_timestamp() -> String {
    chrono::Utc::now().format(TIMESTAMP_FORMAT).to_string()
}

/// Formats Unix seconds in the storage timestamp format.
///
/// Out-of-range values fall back to the current time.
pub fn timestamp_from_unix(secs: i64) -> String {
    chrono::DateTime::from_timestamp(secs, 0)
        .map(|dt| dt.format(TIMESTAMP_FORMAT).to_string())
        .unwrap_or_else(now_timestamp)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn instance_name_accepts_slug() {
        let name = InstanceName::parse("nina-clinicasp").unwrap();
        assert_eq!(name.as_str(), "nina-clinicasp");
    }

    #[test]
    fn instance_name_rejects_empty_and_uppercase() {
        assert!(InstanceName::parse("   ").is_err());
        assert!(InstanceName::parse("Nina").is_err());
        assert!(InstanceName::parse("nina clinic").is_err());
    }

    #[test]
    fn instance_name_rejects_overlong() {
        let long = "a".repeat(MAX_INSTANCE_NAME_LEN + 1);
        assert!(InstanceName::parse(&long).is_err());
    }

    #[test]
    fn slugify_folds_accents_and_joins_parts() {
        let name = InstanceName::slugify(&["Nina", "Clínica SP"]).unwrap();
        assert_eq!(name.as_str(), "nina-clinicasp");
    }

    #[test]
    fn slugify_skips_empty_parts() {
        let name = InstanceName::slugify(&["", "Ação & Cia", "  "]).unwrap();
        assert_eq!(name.as_str(), "acaocia");
    }

    #[test]
    fn slugify_of_symbols_only_fails() {
        assert!(InstanceName::slugify(&["!!!", "???"]).is_err());
    }

    #[test]
    fn connection_state_only_literal_open_is_open() {
        assert!(ConnectionState::parse("open").is_open());
        assert!(!ConnectionState::parse("OPEN").is_open());
        assert!(!ConnectionState::parse("connecting").is_open());
        assert_eq!(
            ConnectionState::parse("refused"),
            ConnectionState::Other("refused".into())
        );
    }

    #[test]
    fn connection_status_round_trips_through_strum() {
        use std::str::FromStr;
        for status in [
            ConnectionStatus::Unknown,
            ConnectionStatus::Connecting,
            ConnectionStatus::Connected,
            ConnectionStatus::Disconnected,
            ConnectionStatus::Error,
        ] {
            let parsed = ConnectionStatus::from_str(&status.to_string()).unwrap();
            assert_eq!(parsed, status);
        }
        assert_eq!(ConnectionStatus::Connected.to_string(), "connected");
    }

    #[test]
    fn message_direction_serializes_lowercase() {
        let json = serde_json::to_string(&MessageDirection::Inbound).unwrap();
        assert_eq!(json, "\"inbound\"");
        assert_eq!(MessageDirection::Outbound.to_string(), "outbound");
    }

    #[test]
    fn timestamp_from_unix_known_instants() {
        assert_eq!(timestamp_from_unix(0), "1970-01-01T00:00:00.000Z");
        assert_eq!(timestamp_from_unix(1_767_225_600), "2026-01-01T00:00:00.000Z");
    }

    #[test]
    fn now_timestamp_has_millisecond_precision() {
        let ts = now_timestamp();
        assert_eq!(ts.len(), "2026-01-01T00:00:00.000Z".len());
        assert!(ts.ends_with('Z'));
    }

    #[test]
    fn chatbot_config_deserializes_with_null_instance() {
        let json = serde_json::json!({
            "id": "cfg-1",
            "owner_id": "owner-1",
            "bot_name": "Nina",
            "instance_name": "nina-clinicasp",
            "instance_id": null,
            "active": true,
            "created_at": "2026-01-01T00:00:00.000Z",
            "updated_at": "2026-01-01T00:00:00.000Z"
        });
        let cfg: ChatbotConfig = serde_json::from_value(json).unwrap();
        assert_eq!(cfg.owner_id, OwnerId("owner-1".into()));
        assert!(cfg.instance_id.is_none());
        assert!(cfg.phone.is_none());
    }
}
