// SPDX-FileCopyrightText: 2026 Zapflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration loader using Figment for layered config merging.
//!
//! Supports XDG hierarchy: `./zapflow.toml` > `~/.config/zapflow/zapflow.toml` > `/etc/zapflow/zapflow.toml`
//! with environment variable overrides via `ZAPFLOW_` prefix.

#![allow(clippy::result_large_err)] // figment::Error is external and cannot be boxed without wrapper

use std::path::{Path, PathBuf};

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment, Metadata, Provider,
};

use crate::model::ZapflowConfig;

pub const ENV_PREFIX: &str = "ZAPFLOW_";

/// Config sections that accept `ZAPFLOW_<SECTION>_<KEY>` overrides.
const ENV_SECTIONS: &[&str] = &[
    "app", "evolution", "backend", "storage", "poller", "gateway", "leads",
];

/// `ZAPFLOW_*` variables read directly by the CLI, never config keys.
pub const CLI_ONLY_ENV: &[&str] = &["password"];

/// Load configuration from the standard XDG hierarchy with env var overrides.
///
/// Merge order (later overrides earlier):
/// 1. Compiled defaults
/// 2. `/etc/zapflow/zapflow.toml` (system-wide)
/// 3. `~/.config/zapflow/zapflow.toml` (user XDG config)
/// 4. `./zapflow.toml` (local directory)
/// 5. `ZAPFLOW_*` environment variables
pub fn load_config() -> Result<ZapflowConfig, figment::Error> {
    build_figment().extract()
}

/// Load configuration from a TOML string only (no XDG lookup, no env).
///
/// Used for testing and explicit configuration.
pub fn load_config_from_str(toml_content: &str) -> Result<ZapflowConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(ZapflowConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from a specific file path with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<ZapflowConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(ZapflowConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// Config files in merge order, lowest precedence first.
pub fn search_paths() -> Vec<PathBuf> {
    let mut paths = vec![PathBuf::from("/etc/zapflow/zapflow.toml")];
    if let Some(dir) = dirs::config_dir() {
        paths.push(dir.join("zapflow/zapflow.toml"));
    }
    paths.push(PathBuf::from("zapflow.toml"));
    paths
}

pub fn build_figment() -> Figment {
    search_paths()
        .into_iter()
        .fold(
            Figment::new().merge(Serialized::defaults(ZapflowConfig::default())),
            |figment, path| figment.merge(Toml::file(path)),
        )
        .merge(env_provider())
}

/// Create the environment variable provider using explicit `map()` for section-to-dot mapping.
///
/// Uses `Env::map()` rather than `Env::split("_")`: `ZAPFLOW_EVOLUTION_API_KEY`
/// must map to `evolution.api_key`, not `evolution.api.key`.
fn env_provider() -> Env {
    Env::prefixed(ENV_PREFIX)
        .ignore(CLI_ONLY_ENV)
        .map(|key| map_env_key(key.as_str()).into())
}

/// Whether `metadata` describes a value read from a `ZAPFLOW_*` variable.
pub(crate) fn is_env_metadata(metadata: &Metadata) -> bool {
    metadata.name == env_provider().metadata().name
}

/// Maps a lowercased, prefix-stripped env var name to its dotted config path.
pub fn map_env_key(key: &str) -> String {
    for section in ENV_SECTIONS {
        if let Some(rest) = key
            .strip_prefix(section)
            .and_then(|r| r.strip_prefix('_'))
        {
            return format!("{section}.{rest}");
        }
    }
    key.to_string()
}
