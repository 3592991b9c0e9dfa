// SPDX-FileCopyrightText: 2026 Zapflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Message persistence operations.

use std::str::FromStr;

use rusqlite::params;
use zapflow_core::key::KEY_SEPARATOR;
use zapflow_core::types::now_timestamp;
use zapflow_core::{MessageDirection, OwnerId, StoredMessage, ZapflowError};

use crate::database::{map_tr_err, Database};

const MESSAGE_COLUMNS: &str = "id, owner_id, instance_id, conversation_key, counterpart_phone, \
     content, direction, message_type, status, external_id, created_at, updated_at";

fn row_to_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<StoredMessage> {
    let direction: String = row.get(6)?;
    let direction = MessageDirection::from_str(&direction).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(6, rusqlite::types::Type::Text, Box::new(e))
    })?;
    Ok(StoredMessage {
        id: row.get(0)?,
        owner_id: OwnerId(row.get(1)?),
        instance_id: row.get(2)?,
        conversation_key: row.get(3)?,
        counterpart_phone: row.get(4)?,
        content: row.get(5)?,
        direction,
        message_type: row.get(7)?,
        status: row.get(8)?,
        external_id: row.get(9)?,
        created_at: row.get(10)?,
        updated_at: row.get(11)?,
    })
}

pub async fn insert_message(db: &Database, msg: &StoredMessage) -> Result<(), ZapflowError> {
    let msg = msg.clone();
    db.connection()
        .call(move |conn| {
            conn.execute(
                &format!(
                    "INSERT INTO messages ({MESSAGE_COLUMNS})
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)"
                ),
                params![
                    msg.id,
                    msg.owner_id.as_str(),
                    msg.instance_id,
                    msg.conversation_key,
                    msg.counterpart_phone,
                    msg.content,
                    msg.direction.to_string(),
                    msg.message_type,
                    msg.status,
                    msg.external_id,
                    msg.created_at,
                    msg.updated_at,
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Messages of one conversation, oldest first. With a limit, the most recent
/// `limit` messages are returned (still oldest first).
pub async fn list_messages(
    db: &Database,
    conversation_key: &str,
    limit: Option<i64>,
) -> Result<Vec<StoredMessage>, ZapflowError> {
    let conversation_key = conversation_key.to_string();
    let limit = limit.unwrap_or(-1);
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {MESSAGE_COLUMNS} FROM (
                     SELECT {MESSAGE_COLUMNS} FROM messages
                     WHERE conversation_key = ?1
                     ORDER BY created_at DESC, id DESC
                     LIMIT ?2
                 ) ORDER BY created_at ASC, id ASC"
            ))?;
            let rows = stmt.query_map(params![conversation_key, limit], row_to_message)?;
            rows.collect::<Result<Vec<_>, _>>()
        })
        .await
        .map_err(map_tr_err)
}

pub async fn count_messages(db: &Database, instance_id: &str) -> Result<u64, ZapflowError> {
    let instance_id = instance_id.to_string();
    db.connection()
        .call(move |conn| {
            conn.query_row(
                "SELECT COUNT(*) FROM messages WHERE instance_id = ?1",
                params![instance_id],
                |row| row.get::<_, i64>(0),
            )
        })
        .await
        .map(|n| n.max(0) as u64)
        .map_err(map_tr_err)
}

/// Moves all messages from `old_instance_id` to `new_instance_id` and
/// rebuilds their conversation keys from the stored counterpart phone.
pub async fn rekey_messages(
    db: &Database,
    old_instance_id: &str,
    new_instance_id: &str,
) -> Result<u64, ZapflowError> {
    let old = old_instance_id.to_string();
    let new = new_instance_id.to_string();
    let now = now_timestamp();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE messages
                 SET instance_id = ?2,
                     conversation_key = ?2 || ?4 || counterpart_phone,
                     updated_at = ?3
                 WHERE instance_id = ?1",
                params![old, new, now, KEY_SEPARATOR.to_string()],
            )
        })
        .await
        .map(|n| n as u64)
        .map_err(map_tr_err)
}

pub async fn update_message_status(
    db: &Database,
    external_id: &str,
    status: &str,
) -> Result<bool, ZapflowError> {
    let external_id = external_id.to_string();
    let status = status.to_string();
    let now = now_timestamp();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE messages SET status = ?2, updated_at = ?3 WHERE external_id = ?1",
                params![external_id, status, now],
            )
        })
        .await
        .map(|n| n > 0)
        .map_err(map_tr_err)
}
