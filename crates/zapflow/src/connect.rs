// SPDX-FileCopyrightText: 2026 Zapflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `zapflow connect` command implementation.
//!
//! Shows the pairing QR code for an instance, then polls until a phone is
//! paired. When a configuration uses the instance, the connect transition
//! stores the bound phone and reconciles the owner if the remote id moved.

use std::path::{Path, PathBuf};
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use qrcode::render::unicode;
use serde_json::json;
use tracing::debug;
use zapflow_agent::shutdown;
use zapflow_agent::{ConnectionWatcher, StatusPoller, WatchEvent};
use zapflow_core::{InstanceName, QrCode, ZapflowError};

use crate::app::App;
use crate::commands::print_report;
use crate::output;

/// Pairing codes rotate on the server; fetch a fresh one this often.
const QR_REFRESH: Duration = Duration::from_secs(30);

pub async fn run_connect(
    app: &App,
    name: &str,
    out: Option<PathBuf>,
    no_wait: bool,
    json: bool,
) -> Result<(), ZapflowError> {
    let name = InstanceName::parse(name)?;
    let out = out.unwrap_or_else(|| PathBuf::from(format!("{name}-qr.png")));
    let service = app.chatbot_service();

    let qr = service.qr_code(&name).await?;
    show_qr(&name, &qr, &out, json)?;
    if no_wait {
        return Ok(());
    }

    let mut watcher = match app.storage.find_config_by_instance_name(name.as_str()).await? {
        Some(config) => Some(ConnectionWatcher::new(
            app.storage.clone(),
            app.directory.clone(),
            config,
        )?),
        None => None,
    };

    let cancel = shutdown::install_signal_handler();
    let handle = StatusPoller::new(app.api.clone(), name.clone()).spawn(
        Duration::from_secs(app.config.poller.qr_interval_secs),
        cancel.child_token(),
    );
    let mut rx = handle.subscribe();
    let mut refresh = tokio::time::interval(QR_REFRESH);
    refresh.tick().await;

    if !json {
        println!("  Waiting for the phone to pair (Ctrl+C to stop)...");
    }

    let mut paired = false;
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = refresh.tick() => {
                match service.qr_code(&name).await {
                    Ok(qr) => show_qr(&name, &qr, &out, json)?,
                    Err(e) => debug!(instance = %name, error = %e, "QR refresh failed"),
                }
            }
            changed = rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = rx.borrow_and_update().clone();
                if !snapshot.status.is_connected() {
                    continue;
                }
                let event = match watcher.as_mut() {
                    Some(watcher) => watcher.observe(&snapshot).await,
                    None => Some(WatchEvent::Connected { phone: snapshot.phone.clone(), reconciled: None }),
                };
                if let Some(WatchEvent::Connected { phone, reconciled }) = event {
                    print_connected(&name, phone.as_deref(), json);
                    if let Some(report) = reconciled {
                        if json {
                            output::print_json(&report);
                        } else {
                            print_report(&report);
                        }
                    }
                    paired = true;
                    break;
                }
            }
        }
    }

    cancel.cancel();
    let _ = handle.into_task().await;
    if paired {
        Ok(())
    } else {
        Err(ZapflowError::Internal(format!(
            "stopped before instance `{name}` was paired"
        )))
    }
}

fn show_qr(name: &InstanceName, qr: &QrCode, out: &Path, json: bool) -> Result<(), ZapflowError> {
    let (file, pairing_code) = match qr {
        QrCode::Image {
            data_uri,
            pairing_code,
        } => {
            let bytes = decode_data_uri(data_uri)?;
            std::fs::write(out, bytes).map_err(|e| {
                ZapflowError::Internal(format!("failed to write {}: {e}", out.display()))
            })?;
            (Some(out), pairing_code)
        }
        QrCode::Raw { code, pairing_code } => {
            if !json {
                println!("{}", render_terminal(code)?);
            }
            (None, pairing_code)
        }
    };

    if json {
        output::print_json(&json!({
            "instance": name.as_str(),
            "qr_file": file.map(|p| p.display().to_string()),
            "pairing_code": pairing_code,
        }));
        return Ok(());
    }

    output::header(&format!("zapflow connect: {name}"));
    if let Some(file) = file {
        output::field("QR image", &file.display().to_string());
    }
    if let Some(code) = pairing_code {
        output::field("Code", code);
    }
    println!();
    Ok(())
}

/// Decodes a `data:<mime>;base64,<payload>` URI. A bare base64 payload is
/// accepted too.
pub fn decode_data_uri(uri: &str) -> Result<Vec<u8>, ZapflowError> {
    let payload = match uri.split_once("base64,") {
        Some((_, payload)) => payload,
        None => uri,
    };
    STANDARD
        .decode(payload.trim())
        .map_err(|e| ZapflowError::RemoteApi {
            message: format!("QR image is not valid base64: {e}"),
            source: None,
        })
}

/// Renders a QR payload with half-block characters, two modules per row.
pub fn render_terminal(code: &str) -> Result<String, ZapflowError> {
    let qr = qrcode::QrCode::new(code.as_bytes())
        .map_err(|e| ZapflowError::Internal(format!("failed to encode QR code: {e}")))?;
    Ok(qr
        .render::<unicode::Dense1x2>()
        .dark_color(unicode::Dense1x2::Light)
        .light_color(unicode::Dense1x2::Dark)
        .quiet_zone(true)
        .build())
}

fn print_connected(name: &InstanceName, phone: Option<&str>, json: bool) {
    if json {
        output::print_json(&json!({ "instance": name.as_str(), "connected": true, "phone": phone }));
    } else {
        output::row("State", "connected", true);
        output::field("Phone", phone.unwrap_or("(unknown)"));
        println!();
    }
}
