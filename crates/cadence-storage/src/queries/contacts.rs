// SPDX-FileCopyrightText: 2026 Cadence Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Contact reads and status updates.

use cadence_core::{CadenceError, Contact, ContactProfile, ContactStatus};
use rusqlite::params;
use rusqlite::types::Type;

use crate::database::{Database, enum_col, to_ts, ts_col};

const COLUMNS: &str = "id, phone, timezone, status, created_at, profile";

fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Contact> {
    let profile: String = row.get(5)?;
    let profile: ContactProfile = serde_json::from_str(&profile)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(5, Type::Text, Box::new(e)))?;
    Ok(Contact {
        id: row.get(0)?,
        phone: row.get(1)?,
        timezone: row.get(2)?,
        status: enum_col(row, 3)?,
        created_at: ts_col(row, 4)?,
        profile,
    })
}

/// Insert a contact or overwrite every field of an existing one.
pub async fn upsert_contact(db: &Database, contact: &Contact) -> Result<(), CadenceError> {
    let profile = serde_json::to_string(&contact.profile)
        .map_err(|e| CadenceError::Storage { source: Box::new(e) })?;
    let contact = contact.clone();
    db.connection()
        .call(move |conn| -> Result<(), rusqlite::Error> {
            conn.execute(
                "INSERT INTO contacts (id, phone, timezone, status, created_at, profile)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(id) DO UPDATE SET
                    phone = excluded.phone,
                    timezone = excluded.timezone,
                    status = excluded.status,
                    created_at = excluded.created_at,
                    profile = excluded.profile",
                params![
                    contact.id,
                    contact.phone,
                    contact.timezone,
                    contact.status.to_string(),
                    to_ts(contact.created_at),
                    profile,
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Get a contact by ID.
pub async fn get_contact(db: &Database, id: &str) -> Result<Option<Contact>, CadenceError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| -> Result<Option<Contact>, rusqlite::Error> {
            let sql = format!("SELECT {COLUMNS} FROM contacts WHERE id = ?1");
            match conn.query_row(&sql, params![id], from_row) {
                Ok(contact) => Ok(Some(contact)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e),
            }
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Get the most recently created contact with this phone number.
pub async fn find_by_phone(db: &Database, phone: &str) -> Result<Option<Contact>, CadenceError> {
    let phone = phone.to_string();
    db.connection()
        .call(move |conn| -> Result<Option<Contact>, rusqlite::Error> {
            let sql = format!(
                "SELECT {COLUMNS} FROM contacts WHERE phone = ?1 ORDER BY created_at DESC LIMIT 1"
            );
            match conn.query_row(&sql, params![phone], from_row) {
                Ok(contact) => Ok(Some(contact)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e),
            }
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Set a contact's status. Returns false if no such contact exists.
pub async fn set_status(
    db: &Database,
    id: &str,
    status: ContactStatus,
) -> Result<bool, CadenceError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| -> Result<bool, rusqlite::Error> {
            let changed = conn.execute(
                "UPDATE contacts SET status = ?1 WHERE id = ?2",
                params![status.to_string(), id],
            )?;
            Ok(changed == 1)
        })
        .await
        .map_err(crate::database::map_tr_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use tempfile::tempdir;

    async fn setup_db() -> (Database, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("contacts.db");
        let db = Database::open(db_path.to_str().unwrap()).await.unwrap();
        (db, dir)
    }

    fn contact(id: &str, phone: &str) -> Contact {
        Contact {
            id: id.to_string(),
            phone: phone.to_string(),
            timezone: "America/Chicago".to_string(),
            status: ContactStatus::Active,
            created_at: Utc.with_ymd_and_hms(2024, 3, 1, 14, 0, 0).unwrap(),
            profile: ContactProfile {
                first_name: Some("Dana".to_string()),
                vehicle_year: Some(2019),
                ..ContactProfile::default()
            },
        }
    }

    #[tokio::test]
    async fn upsert_and_get() {
        let (db, _dir) = setup_db().await;
        let c = contact("c-1", "+15550000001");
        upsert_contact(&db, &c).await.unwrap();

        let loaded = get_contact(&db, "c-1").await.unwrap().unwrap();
        assert_eq!(loaded, c);
        assert!(get_contact(&db, "missing").await.unwrap().is_none());
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn upsert_overwrites() {
        let (db, _dir) = setup_db().await;
        let mut c = contact("c-1", "+15550000001");
        upsert_contact(&db, &c).await.unwrap();
        c.timezone = "America/Denver".to_string();
        c.profile.first_name = None;
        upsert_contact(&db, &c).await.unwrap();

        let loaded = get_contact(&db, "c-1").await.unwrap().unwrap();
        assert_eq!(loaded.timezone, "America/Denver");
        assert!(loaded.profile.first_name.is_none());
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn find_by_phone_and_set_status() {
        let (db, _dir) = setup_db().await;
        upsert_contact(&db, &contact("c-1", "+15550000001")).await.unwrap();

        let found = find_by_phone(&db, "+15550000001").await.unwrap().unwrap();
        assert_eq!(found.id, "c-1");
        assert!(find_by_phone(&db, "+15559999999").await.unwrap().is_none());

        assert!(set_status(&db, "c-1", ContactStatus::OptedOut).await.unwrap());
        assert!(!set_status(&db, "nope", ContactStatus::OptedOut).await.unwrap());
        let loaded = get_contact(&db, "c-1").await.unwrap().unwrap();
        assert_eq!(loaded.status, ContactStatus::OptedOut);
        db.close().await.unwrap();
    }
}
