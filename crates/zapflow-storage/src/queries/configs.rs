// SPDX-FileCopyrightText: 2026 Zapflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Chatbot configuration operations.

use rusqlite::{params, ErrorCode, OptionalExtension};
use zapflow_core::types::now_timestamp;
use zapflow_core::{ChatbotConfig, OwnerId, ZapflowError};

use crate::database::{map_tr_err, Database};

const CONFIG_COLUMNS: &str = "id, owner_id, bot_name, category, tone, instance_name, \
     instance_id, phone, active, created_at, updated_at";

fn row_to_config(row: &rusqlite::Row<'_>) -> rusqlite::Result<ChatbotConfig> {
    Ok(ChatbotConfig {
        id: row.get(0)?,
        owner_id: OwnerId(row.get(1)?),
        bot_name: row.get(2)?,
        category: row.get(3)?,
        tone: row.get(4)?,
        instance_name: row.get(5)?,
        instance_id: row.get(6)?,
        phone: row.get(7)?,
        active: row.get::<_, i64>(8)? != 0,
        created_at: row.get(9)?,
        updated_at: row.get(10)?,
    })
}

/// Inserts a configuration.
///
/// A second configuration with the same instance name for the same owner is
/// rejected as a validation error on `instance_name`.
pub async fn insert_config(db: &Database, config: &ChatbotConfig) -> Result<(), ZapflowError> {
    let config = config.clone();
    let inserted = db
        .connection()
        .call(move |conn| {
            let result = conn.execute(
                "INSERT INTO chatbot_configs (id, owner_id, bot_name, category, tone, instance_name,
                     instance_id, phone, active, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                params![
                    config.id,
                    config.owner_id.as_str(),
                    config.bot_name,
                    config.category,
                    config.tone,
                    config.instance_name,
                    config.instance_id,
                    config.phone,
                    config.active as i64,
                    config.created_at,
                    config.updated_at,
                ],
            );
            match result {
                Ok(_) => Ok(true),
                Err(rusqlite::Error::SqliteFailure(e, _))
                    if e.code == ErrorCode::ConstraintViolation =>
                {
                    Ok(false)
                }
                Err(e) => Err(e),
            }
        })
        .await
        .map_err(map_tr_err)?;

    if inserted {
        Ok(())
    } else {
        Err(ZapflowError::invalid(
            "instance_name",
            "already in use for this account",
        ))
    }
}

pub async fn get_config(db: &Database, id: &str) -> Result<Option<ChatbotConfig>, ZapflowError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| {
            conn.query_row(
                &format!("SELECT {CONFIG_COLUMNS} FROM chatbot_configs WHERE id = ?1"),
                params![id],
                row_to_config,
            )
            .optional()
        })
        .await
        .map_err(map_tr_err)
}

/// The oldest active configuration using `instance_name`.
pub async fn find_config_by_instance_name(
    db: &Database,
    instance_name: &str,
) -> Result<Option<ChatbotConfig>, ZapflowError> {
    let instance_name = instance_name.to_string();
    db.connection()
        .call(move |conn| {
            conn.query_row(
                &format!(
                    "SELECT {CONFIG_COLUMNS} FROM chatbot_configs
                     WHERE instance_name = ?1 AND active = 1
                     ORDER BY created_at ASC, id ASC LIMIT 1"
                ),
                params![instance_name],
                row_to_config,
            )
            .optional()
        })
        .await
        .map_err(map_tr_err)
}

pub async fn list_configs(
    db: &Database,
    owner_id: &OwnerId,
    active_only: bool,
) -> Result<Vec<ChatbotConfig>, ZapflowError> {
    let owner_id = owner_id.as_str().to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {CONFIG_COLUMNS} FROM chatbot_configs
                 WHERE owner_id = ?1 AND (?2 = 0 OR active = 1)
                 ORDER BY created_at ASC, id ASC"
            ))?;
            let rows = stmt.query_map(params![owner_id, active_only as i64], row_to_config)?;
            rows.collect::<Result<Vec<_>, _>>()
        })
        .await
        .map_err(map_tr_err)
}

pub async fn list_active_owners(db: &Database) -> Result<Vec<OwnerId>, ZapflowError> {
    db.connection()
        .call(|conn| {
            let mut stmt = conn.prepare(
                "SELECT DISTINCT owner_id FROM chatbot_configs WHERE active = 1 ORDER BY owner_id",
            )?;
            let rows = stmt.query_map([], |row| row.get::<_, String>(0).map(OwnerId))?;
            rows.collect::<Result<Vec<_>, _>>()
        })
        .await
        .map_err(map_tr_err)
}

/// Stores the resolved instance id. A `None` phone keeps the stored one.
pub async fn update_config_instance(
    db: &Database,
    config_id: &str,
    instance_id: &str,
    phone: Option<&str>,
) -> Result<(), ZapflowError> {
    let config_id = config_id.to_string();
    let instance_id = instance_id.to_string();
    let phone = phone.map(str::to_string);
    let now = now_timestamp();
    let id = config_id.clone();
    let updated = db
        .connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE chatbot_configs
                 SET instance_id = ?2, phone = COALESCE(?3, phone), updated_at = ?4
                 WHERE id = ?1",
                params![id, instance_id, phone, now],
            )
        })
        .await
        .map_err(map_tr_err)?;

    ensure_updated(updated, config_id)
}

pub async fn update_config_phone(
    db: &Database,
    config_id: &str,
    phone: &str,
) -> Result<(), ZapflowError> {
    let config_id = config_id.to_string();
    let phone = phone.to_string();
    let now = now_timestamp();
    let id = config_id.clone();
    let updated = db
        .connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE chatbot_configs SET phone = ?2, updated_at = ?3 WHERE id = ?1",
                params![id, phone, now],
            )
        })
        .await
        .map_err(map_tr_err)?;

    ensure_updated(updated, config_id)
}

fn ensure_updated(rows: usize, config_id: String) -> Result<(), ZapflowError> {
    if rows == 0 {
        return Err(ZapflowError::NotFound {
            entity: "chatbot config".into(),
            id: config_id,
        });
    }
    Ok(())
}
