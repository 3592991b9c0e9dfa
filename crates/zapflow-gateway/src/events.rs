// SPDX-FileCopyrightText: 2026 Zapflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Webhook payload parsing.
//!
//! The instance API posts `{"event", "instance", "data"}` envelopes. Event
//! names arrive either dotted (`messages.upsert`) or, with per-event webhooks
//! enabled, upper snake case (`MESSAGES_UPSERT`); both are accepted.

use serde_json::Value;
use tracing::warn;
use zapflow_core::types::{now_timestamp, timestamp_from_unix};
use zapflow_core::{ConnectionState, InboundEvent, MessageDirection, ZapflowError, phone_from_jid};
use zapflow_evolution::parse::{first_string, lookup};

const CONTENT_PATHS: &[&str] = &[
    "message.conversation",
    "message.extendedTextMessage.text",
    "message.imageMessage.caption",
    "message.videoMessage.caption",
    "message.documentMessage.caption",
    "message.buttonsResponseMessage.selectedDisplayText",
    "message.listResponseMessage.title",
];

const STATUS_ID_PATHS: &[&str] = &["keyId", "key.id", "messageId", "id"];

/// A webhook call, reduced to what the receiver acts on.
#[derive(Debug, Clone, PartialEq)]
pub enum WebhookEvent {
    /// `messages.upsert` (inbound or echoed) and `send.message` (outbound).
    Message(InboundEvent),
    /// A batched `messages.upsert`, direct conversations only, in payload order.
    Messages(Vec<InboundEvent>),
    /// `messages.update`: delivery status changes.
    StatusUpdates(Vec<StatusUpdate>),
    /// `connection.update`.
    Connection {
        instance_name: String,
        state: ConnectionState,
    },
    /// Anything else, including group and broadcast messages.
    Ignored { event: String, reason: &'static str },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusUpdate {
    pub external_id: String,
    pub status: String,
}

/// `MESSAGES_UPSERT` and `messages.upsert` both become `messages.upsert`.
pub fn normalize_event_name(raw: &str) -> String {
    raw.trim().to_ascii_lowercase().replace('_', ".")
}

/// Parses a webhook body.
pub fn parse_webhook(body: &Value) -> Result<WebhookEvent, ZapflowError> {
    let event = body
        .get("event")
        .and_then(Value::as_str)
        .map(normalize_event_name)
        .ok_or_else(|| ZapflowError::invalid("event", "is required"))?;
    let data = body.get("data").unwrap_or(&Value::Null);

    match event.as_str() {
        "messages.upsert" | "send.message" => {
            let instance_name = instance_name(body)?;
            parse_message(&event, instance_name, data)
        }
        "messages.update" => Ok(WebhookEvent::StatusUpdates(parse_status_updates(data))),
        "connection.update" => {
            let instance_name = instance_name(body)?;
            let state = first_string(data, &["state", "connection"])
                .map(|s| ConnectionState::parse(&s))
                .ok_or_else(|| ZapflowError::invalid("data.state", "is required"))?;
            Ok(WebhookEvent::Connection {
                instance_name,
                state,
            })
        }
        _ => Ok(WebhookEvent::Ignored {
            event,
            reason: "unhandled event",
        }),
    }
}

fn instance_name(body: &Value) -> Result<String, ZapflowError> {
    first_string(body, &["instance", "instance.instanceName", "data.instance"])
        .ok_or_else(|| ZapflowError::invalid("instance", "is required"))
}

fn parse_message(event: &str, instance_name: String, data: &Value) -> Result<WebhookEvent, ZapflowError> {
    let Value::Array(items) = data else {
        return Ok(match parse_entry(event, &instance_name, data)? {
            Some(message) => WebhookEvent::Message(message),
            None => WebhookEvent::Ignored {
                event: event.to_string(),
                reason: "not a direct conversation",
            },
        });
    };

    // Malformed entries are skipped; the rest of the batch is kept.
    let mut messages = Vec::with_capacity(items.len());
    for (index, item) in items.iter().enumerate() {
        match parse_entry(event, &instance_name, item) {
            Ok(Some(message)) => messages.push(message),
            Ok(None) => {}
            Err(e) => warn!(instance = %instance_name, index, error = %e, "skipping batch entry"),
        }
    }
    if messages.is_empty() {
        return Ok(WebhookEvent::Ignored {
            event: event.to_string(),
            reason: "no direct messages in batch",
        });
    }
    Ok(WebhookEvent::Messages(messages))
}

/// One message entry; `None` for group, broadcast and channel chats.
fn parse_entry(
    event: &str,
    instance_name: &str,
    data: &Value,
) -> Result<Option<InboundEvent>, ZapflowError> {
    let jid = first_string(data, &["key.remoteJid"])
        .ok_or_else(|| ZapflowError::invalid("data.key.remoteJid", "is required"))?;
    if jid.ends_with("@g.us") || jid.ends_with("@broadcast") || jid.ends_with("@newsletter") {
        return Ok(None);
    }

    let from_me = lookup(data, "key.fromMe")
        .and_then(Value::as_bool)
        .unwrap_or(false);
    let direction = if from_me || event == "send.message" {
        MessageDirection::Outbound
    } else {
        MessageDirection::Inbound
    };

    let message_type = first_string(data, &["messageType"]).unwrap_or_else(|| "conversation".into());
    let content = first_string(data, CONTENT_PATHS).unwrap_or_else(|| format!("[{message_type}]"));
    let timestamp = match lookup(data, "messageTimestamp") {
        Some(Value::Number(n)) => n.as_i64().map(timestamp_from_unix),
        Some(Value::String(s)) => s.parse().ok().map(timestamp_from_unix),
        _ => None,
    }
    .unwrap_or_else(now_timestamp);

    Ok(Some(InboundEvent {
        instance_name: instance_name.to_string(),
        counterpart_phone: phone_from_jid(&jid),
        content,
        direction,
        message_type,
        external_id: first_string(data, &["key.id"]),
        push_name: first_string(data, &["pushName"]),
        timestamp,
    }))
}

fn parse_status_updates(data: &Value) -> Vec<StatusUpdate> {
    let items: Vec<&Value> = match data {
        Value::Array(items) => items.iter().collect(),
        other => vec![other],
    };
    items
        .into_iter()
        .filter_map(|item| {
            Some(StatusUpdate {
                external_id: first_string(item, STATUS_ID_PATHS)?,
                status: first_string(item, &["status", "update.status"])?,
            })
        })
        .collect()
}
