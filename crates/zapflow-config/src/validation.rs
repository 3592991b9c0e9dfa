// SPDX-FileCopyrightText: 2026 Zapflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Checks serde cannot express: URL schemes, non-zero intervals and the
//! settings each storage backend depends on.

use crate::diagnostic::ConfigError;
use crate::model::{StorageBackend, ZapflowConfig};

/// Every problem with `config`, not just the first.
pub fn validate_config(config: &ZapflowConfig) -> Result<(), Vec<ConfigError>> {
    let mut problems: Vec<String> = Vec::new();

    let urls = [
        ("evolution.base_url", Some(&config.evolution.base_url)),
        ("backend.url", config.backend.url.as_ref()),
        ("leads.webhook_url", config.leads.webhook_url.as_ref()),
    ];
    for (key, url) in urls {
        if let Some(url) = url.filter(|url| !is_http_url(url)) {
            problems.push(format!("{key} `{url}` must start with http:// or https://"));
        }
    }

    if config.evolution.integration.trim().is_empty() {
        problems.push("evolution.integration must not be empty".into());
    }

    let at_least_one_second = [
        ("evolution.request_timeout_secs", config.evolution.request_timeout_secs),
        ("backend.request_timeout_secs", config.backend.request_timeout_secs),
        ("poller.qr_interval_secs", config.poller.qr_interval_secs),
        ("poller.background_interval_secs", config.poller.background_interval_secs),
    ];
    for (key, secs) in at_least_one_second {
        if secs == 0 {
            problems.push(format!("{key} must be at least 1"));
        }
    }

    match config.storage.backend {
        StorageBackend::Sqlite if config.storage.database_path.trim().is_empty() => {
            problems.push("storage.database_path must not be empty".into());
        }
        StorageBackend::Sqlite => {}
        StorageBackend::Rest => {
            if config.backend.url.is_none() {
                problems.push("storage.backend = \"rest\" requires backend.url".into());
            }
            if config.backend.anon_key.is_none() && config.backend.service_key.is_none() {
                problems.push(
                    "storage.backend = \"rest\" requires backend.anon_key or backend.service_key"
                        .into(),
                );
            }
        }
    }

    let host = config.gateway.host.trim();
    if host.is_empty() {
        problems.push("gateway.host must not be empty".into());
    } else if host.parse::<std::net::IpAddr>().is_err()
        && !host
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-'))
    {
        problems.push(format!("gateway.host `{host}` is not an IP address or hostname"));
    }

    if problems.is_empty() {
        return Ok(());
    }
    Err(problems
        .into_iter()
        .map(|message| ConfigError::Validation { message })
        .collect())
}

fn is_http_url(url: &str) -> bool {
    let url = url.trim();
    (url.starts_with("http://") && url.len() > "http://".len())
        || (url.starts_with("https://") && url.len() > "https://".len())
}
