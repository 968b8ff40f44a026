// SPDX-FileCopyrightText: 2026 Cadence Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Append-only delivery log.

use cadence_core::{CadenceError, DeliveryRecord, NewDeliveryRecord};
use rusqlite::{OptionalExtension, params};

use crate::database::{Database, enum_col, to_ts, ts_col};

/// Insert a record on an open connection or transaction. Returns the new row id.
pub(crate) fn insert_in(
    conn: &rusqlite::Connection,
    record: &NewDeliveryRecord,
) -> rusqlite::Result<i64> {
    conn.execute(
        "INSERT INTO delivery_records
            (contact_id, scheduled_message_id, direction, body, external_id, sent_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            record.contact_id,
            record.scheduled_message_id,
            record.direction.to_string(),
            record.body,
            record.external_id,
            to_ts(record.sent_at),
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Append a record. Fails if `scheduled_message_id` already has one.
pub async fn insert(
    db: &Database,
    record: &NewDeliveryRecord,
) -> Result<DeliveryRecord, CadenceError> {
    let record = record.clone();
    db.connection()
        .call(move |conn| -> Result<DeliveryRecord, rusqlite::Error> {
            let id = insert_in(conn, &record)?;
            Ok(DeliveryRecord {
                id,
                contact_id: record.contact_id,
                scheduled_message_id: record.scheduled_message_id,
                direction: record.direction,
                body: record.body,
                external_id: record.external_id,
                sent_at: record.sent_at,
            })
        })
        .await
        .map_err(crate::database::map_tr_err)
}

fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<DeliveryRecord> {
    Ok(DeliveryRecord {
        id: row.get(0)?,
        contact_id: row.get(1)?,
        scheduled_message_id: row.get(2)?,
        direction: enum_col(row, 3)?,
        body: row.get(4)?,
        external_id: row.get(5)?,
        sent_at: ts_col(row, 6)?,
    })
}

/// The inbound record with this gateway message id.
pub async fn find_inbound(
    db: &Database,
    external_id: &str,
) -> Result<Option<DeliveryRecord>, CadenceError> {
    let external_id = external_id.to_string();
    db.connection()
        .call(move |conn| -> Result<Option<DeliveryRecord>, rusqlite::Error> {
            conn.query_row(
                "SELECT id, contact_id, scheduled_message_id, direction, body, external_id, sent_at
                 FROM delivery_records WHERE direction = 'INBOUND' AND external_id = ?1",
                params![external_id],
                from_row,
            )
            .optional()
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Records for a contact, oldest first.
pub async fn list_for_contact(
    db: &Database,
    contact_id: &str,
) -> Result<Vec<DeliveryRecord>, CadenceError> {
    let contact_id = contact_id.to_string();
    db.connection()
        .call(move |conn| -> Result<Vec<DeliveryRecord>, rusqlite::Error> {
            let mut stmt = conn.prepare(
                "SELECT id, contact_id, scheduled_message_id, direction, body, external_id, sent_at
                 FROM delivery_records WHERE contact_id = ?1 ORDER BY sent_at, id",
            )?;
            let rows = stmt.query_map(params![contact_id], from_row)?;
            rows.collect()
        })
        .await
        .map_err(crate::database::map_tr_err)
}
