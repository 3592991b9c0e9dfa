// SPDX-FileCopyrightText: 2026 Zapflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `zapflow status` command implementation.
//!
//! Polls the connection state of one instance once, or keeps polling at the
//! QR interval with `--watch` until interrupted.

use std::time::Duration;

use serde::Serialize;
use zapflow_agent::shutdown;
use zapflow_agent::{StatusPoller, StatusSnapshot};
use zapflow_core::{ConnectionStatus, InstanceName, ZapflowError};

use crate::app::App;
use crate::output;

/// Structured status output for `--json` mode.
#[derive(Debug, Serialize)]
pub struct StatusReport<'a> {
    pub instance: &'a str,
    #[serde(flatten)]
    pub snapshot: &'a StatusSnapshot,
}

pub async fn run_status(app: &App, name: &str, watch: bool, json: bool) -> Result<(), ZapflowError> {
    let name = InstanceName::parse(name)?;
    let poller = StatusPoller::new(app.api.clone(), name.clone());

    if !watch {
        let snapshot = poller.poll_once().await;
        print_snapshot(&name, &snapshot, json);
        return Ok(());
    }

    let cancel = shutdown::install_signal_handler();
    let handle = poller.spawn(
        Duration::from_secs(app.config.poller.qr_interval_secs),
        cancel.child_token(),
    );
    let mut rx = handle.subscribe();
    let mut last = None;
    loop {
        let snapshot = rx.borrow_and_update().clone();
        // Every tick republishes; only print changes.
        let key = (snapshot.status, snapshot.phone.clone());
        if last.as_ref() != Some(&key) {
            print_snapshot(&name, &snapshot, json);
            last = Some(key);
        }
        tokio::select! {
            _ = cancel.cancelled() => break,
            changed = rx.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }
    }

    cancel.cancel();
    let _ = handle.into_task().await;
    Ok(())
}

fn print_snapshot(name: &InstanceName, snapshot: &StatusSnapshot, json: bool) {
    if json {
        output::print_json(&StatusReport {
            instance: name.as_str(),
            snapshot,
        });
        return;
    }

    output::header(&format!("zapflow status: {name}"));
    let state = match &snapshot.remote_state {
        Some(remote) => format!("{} ({remote})", snapshot.status),
        None => snapshot.status.to_string(),
    };
    output::row("State", &state, snapshot.status.is_connected());
    if let Some(phone) = &snapshot.phone {
        output::field("Phone", phone);
    }
    if let Some(checked_at) = &snapshot.checked_at {
        output::field("Checked", checked_at);
    }
    if snapshot.status == ConnectionStatus::Disconnected {
        println!();
        println!("  Scan the QR code with: zapflow connect {name}");
    }
    println!();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_report_flattens_snapshot() {
        let snapshot = StatusSnapshot {
            status: ConnectionStatus::Connected,
            remote_state: Some("open".into()),
            phone: Some("5511988887777".into()),
            checked_at: Some("2026-01-01T00:00:00.000Z".into()),
        };
        let value = serde_json::to_value(StatusReport {
            instance: "nina-clinicasp",
            snapshot: &snapshot,
        })
        .unwrap();
        assert_eq!(value["instance"], "nina-clinicasp");
        assert_eq!(value["status"], "connected");
        assert_eq!(value["phone"], "5511988887777");
    }
}
