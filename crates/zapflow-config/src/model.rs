// SPDX-FileCopyrightText: 2026 Zapflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for Zapflow.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup, providing actionable error messages.

use serde::{Deserialize, Serialize};

/// Top-level Zapflow configuration.
///
/// Loaded from TOML files following XDG hierarchy, with environment variable overrides.
/// All sections are optional and default to sensible values.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ZapflowConfig {
    /// Process identity and logging.
    #[serde(default)]
    pub app: AppConfig,

    /// Instance-management API (WhatsApp connectivity).
    #[serde(default)]
    pub evolution: EvolutionConfig,

    /// Hosted backend-as-a-service (auth + REST tables).
    #[serde(default)]
    pub backend: BackendConfig,

    /// Storage selection and local SQLite settings.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Connection status polling intervals.
    #[serde(default)]
    pub poller: PollerConfig,

    /// Webhook receiver settings.
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Lead-capture webhook settings.
    #[serde(default)]
    pub leads: LeadsConfig,
}

/// Process identity and logging configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    /// Display name used in logs.
    #[serde(default = "default_app_name")]
    pub name: String,

    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            name: default_app_name(),
            log_level: default_log_level(),
        }
    }
}

fn default_app_name() -> String {
    "zapflow".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Instance-management API configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct EvolutionConfig {
    /// Fixed base URL of the API (no trailing slash needed).
    #[serde(default = "default_evolution_base_url")]
    pub base_url: String,

    /// Static API key sent in the `apikey` header. `None` requires the env var.
    #[serde(default)]
    pub api_key: Option<String>,

    /// Integration flag sent on instance creation.
    #[serde(default = "default_integration")]
    pub integration: String,

    /// Delay between creating an instance and fetching it again.
    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,

    /// Per-request timeout.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for EvolutionConfig {
    fn default() -> Self {
        Self {
            base_url: default_evolution_base_url(),
            api_key: None,
            integration: default_integration(),
            settle_delay_ms: default_settle_delay_ms(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

fn default_evolution_base_url() -> String {
    "http://127.0.0.1:8080".to_string()
}

fn default_integration() -> String {
    "WHATSAPP-BAILEYS".to_string()
}

fn default_settle_delay_ms() -> u64 {
    2000
}

fn default_request_timeout_secs() -> u64 {
    15
}

/// Hosted backend-as-a-service configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct BackendConfig {
    /// Project URL, e.g. `https://xyz.supabase.co`. `None` disables the backend.
    #[serde(default)]
    pub url: Option<String>,

    /// Public anon key, sent as `apikey` on every request.
    #[serde(default)]
    pub anon_key: Option<String>,

    /// Service-role key for server-side table access (bypasses row-level security).
    #[serde(default)]
    pub service_key: Option<String>,

    /// Per-request timeout.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            url: None,
            anon_key: None,
            service_key: None,
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

/// Which storage adapter backs the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// Local SQLite database at `storage.database_path`.
    Sqlite,
    /// Hosted REST tables at `backend.url`.
    Rest,
}

/// Storage configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    #[serde(default = "default_storage_backend")]
    pub backend: StorageBackend,

    /// Path to the SQLite database file.
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// Enable WAL (Write-Ahead Logging) mode for SQLite.
    #[serde(default = "default_wal_mode")]
    pub wal_mode: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: default_storage_backend(),
            database_path: default_database_path(),
            wal_mode: default_wal_mode(),
        }
    }
}

fn default_storage_backend() -> StorageBackend {
    StorageBackend::Sqlite
}

fn default_database_path() -> String {
    dirs::data_dir()
        .map(|p| p.join("zapflow").join("zapflow.db"))
        .unwrap_or_else(|| std::path::PathBuf::from("zapflow.db"))
        .to_string_lossy()
        .into_owned()
}

fn default_wal_mode() -> bool {
    true
}

/// Connection status polling configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct PollerConfig {
    /// Interval while a QR code is on screen waiting to be scanned.
    #[serde(default = "default_qr_interval_secs")]
    pub qr_interval_secs: u64,

    /// Interval for background dashboard checks.
    #[serde(default = "default_background_interval_secs")]
    pub background_interval_secs: u64,

    /// Run a reconciliation for every owner with active configurations at startup.
    #[serde(default)]
    pub reconcile_on_start: bool,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            qr_interval_secs: default_qr_interval_secs(),
            background_interval_secs: default_background_interval_secs(),
            reconcile_on_start: false,
        }
    }
}

fn default_qr_interval_secs() -> u64 {
    5
}

fn default_background_interval_secs() -> u64 {
    30
}

/// Webhook receiver configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct GatewayConfig {
    /// Whether `zapflow serve` starts the webhook receiver.
    #[serde(default = "default_gateway_enabled")]
    pub enabled: bool,

    /// Address to bind.
    #[serde(default = "default_gateway_host")]
    pub host: String,

    /// Port to bind.
    #[serde(default = "default_gateway_port")]
    pub port: u16,

    /// Shared secret expected in the `apikey` header of webhook calls.
    /// `None` accepts unauthenticated calls.
    #[serde(default)]
    pub webhook_secret: Option<String>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            enabled: default_gateway_enabled(),
            host: default_gateway_host(),
            port: default_gateway_port(),
            webhook_secret: None,
        }
    }
}

fn default_gateway_enabled() -> bool {
    true
}

fn default_gateway_host() -> String {
    "127.0.0.1".to_string()
}

fn default_gateway_port() -> u16 {
    3100
}

/// Lead-capture webhook configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct LeadsConfig {
    /// Workflow-automation endpoint. `None` disables lead forwarding.
    #[serde(default)]
    pub webhook_url: Option<String>,

    /// Value of the `source` field in every lead payload.
    #[serde(default = "default_lead_source")]
    pub source: String,
}

impl Default for LeadsConfig {
    fn default() -> Self {
        Self {
            webhook_url: None,
            source: default_lead_source(),
        }
    }
}

fn default_lead_source() -> String {
    "signup".to_string()
}
