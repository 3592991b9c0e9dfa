// SPDX-FileCopyrightText: 2026 Zapflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Owner profile operations.

use rusqlite::{params, OptionalExtension};
use zapflow_core::{OwnerId, Profile, ZapflowError};

use crate::database::{map_tr_err, Database};

pub async fn get_profile(db: &Database, owner_id: &OwnerId) -> Result<Option<Profile>, ZapflowError> {
    let owner_id = owner_id.as_str().to_string();
    db.connection()
        .call(move |conn| {
            conn.query_row(
                "SELECT id, full_name, company, email, phone, created_at
                 FROM profiles WHERE id = ?1",
                params![owner_id],
                |row| {
                    Ok(Profile {
                        id: OwnerId(row.get(0)?),
                        full_name: row.get(1)?,
                        company: row.get(2)?,
                        email: row.get(3)?,
                        phone: row.get(4)?,
                        created_at: row.get(5)?,
                    })
                },
            )
            .optional()
        })
        .await
        .map_err(map_tr_err)
}

/// Inserts a profile. An existing profile with the same id is left untouched.
pub async fn insert_profile(db: &Database, profile: &Profile) -> Result<(), ZapflowError> {
    let profile = profile.clone();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO profiles (id, full_name, company, email, phone, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(id) DO NOTHING",
                params![
                    profile.id.as_str(),
                    profile.full_name,
                    profile.company,
                    profile.email,
                    profile.phone,
                    profile.created_at,
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn profile(id: &str, name: &str) -> Profile {
        Profile {
            id: OwnerId(id.to_string()),
            full_name: name.to_string(),
            company: Some("Clínica SP".to_string()),
            email: format!("{id}@example.com"),
            phone: None,
            created_at: "2026-01-01T00:00:00.000Z".to_string(),
        }
    }

    #[tokio::test]
    async fn insert_and_get_profile() {
        let dir = tempdir().unwrap();
        let db = Database::open(dir.path().join("p.db").to_str().unwrap())
            .await
            .unwrap();

        insert_profile(&db, &profile("owner-1", "Ana Souza")).await.unwrap();
        let loaded = get_profile(&db, &OwnerId("owner-1".into()))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(loaded.full_name, "Ana Souza");
        assert_eq!(loaded.company.as_deref(), Some("Clínica SP"));

        assert!(get_profile(&db, &OwnerId("missing".into())).await.unwrap().is_none());
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn second_insert_keeps_first_profile() {
        let dir = tempdir().unwrap();
        let db = Database::open(dir.path().join("p.db").to_str().unwrap())
            .await
            .unwrap();

        insert_profile(&db, &profile("owner-1", "First")).await.unwrap();
        insert_profile(&db, &profile("owner-1", "Second")).await.unwrap();
        let loaded = get_profile(&db, &OwnerId("owner-1".into()))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(loaded.full_name, "First");
        db.close().await.unwrap();
    }
}
