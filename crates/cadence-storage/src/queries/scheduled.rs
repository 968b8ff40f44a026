// SPDX-FileCopyrightText: 2026 Cadence Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Scheduled-message lifecycle: creation, atomic claims and state transitions.
//!
//! Every state change is a single conditional statement (or one transaction)
//! on the writer connection. A lost race shows up as zero changed rows.

use cadence_core::{
    CadenceError, MessageStatus, NewScheduledMessage, ScheduledMessage, Transition,
};
use chrono::{DateTime, Utc};
use rusqlite::{OptionalExtension, params};

use crate::database::{Database, enum_col, opt_ts_col, to_ts, ts_col};
use crate::queries::deliveries;

const COLUMNS: &str = "id, contact_id, day, variant, scheduled_for, status, attempt_count, \
                       deferral_count, claimed_at, processed_at, last_error, created_at";

pub(crate) fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ScheduledMessage> {
    Ok(ScheduledMessage {
        id: row.get(0)?,
        contact_id: row.get(1)?,
        day: row.get(2)?,
        variant: row.get(3)?,
        scheduled_for: ts_col(row, 4)?,
        status: enum_col(row, 5)?,
        attempt_count: row.get(6)?,
        deferral_count: row.get(7)?,
        claimed_at: opt_ts_col(row, 8)?,
        processed_at: opt_ts_col(row, 9)?,
        last_error: row.get(10)?,
        created_at: ts_col(row, 11)?,
    })
}

/// Create a PENDING row. Returns `None` when (contact, day) already has one.
pub async fn insert(
    db: &Database,
    new: &NewScheduledMessage,
    now: DateTime<Utc>,
) -> Result<Option<ScheduledMessage>, CadenceError> {
    let new = new.clone();
    db.connection()
        .call(move |conn| -> Result<Option<ScheduledMessage>, rusqlite::Error> {
            let sql = format!(
                "INSERT INTO scheduled_messages (contact_id, day, variant, scheduled_for, status, created_at)
                 VALUES (?1, ?2, ?3, ?4, 'PENDING', ?5)
                 ON CONFLICT(contact_id, day) DO NOTHING
                 RETURNING {COLUMNS}"
            );
            conn.query_row(
                &sql,
                params![
                    new.contact_id,
                    new.day,
                    new.variant,
                    to_ts(new.scheduled_for),
                    to_ts(now)
                ],
                from_row,
            )
            .optional()
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Swap the CANCELLED row `id` for a fresh PENDING row for the same (contact, day).
pub async fn replace_cancelled(
    db: &Database,
    id: i64,
    new: &NewScheduledMessage,
    now: DateTime<Utc>,
) -> Result<Option<ScheduledMessage>, CadenceError> {
    let new = new.clone();
    db.connection()
        .call(move |conn| -> Result<Option<ScheduledMessage>, rusqlite::Error> {
            let tx = conn.transaction()?;
            let removed = tx.execute(
                "DELETE FROM scheduled_messages
                 WHERE id = ?1 AND status = 'CANCELLED' AND contact_id = ?2 AND day = ?3",
                params![id, new.contact_id, new.day],
            )?;
            if removed == 0 {
                tx.commit()?;
                return Ok(None);
            }
            let sql = format!(
                "INSERT INTO scheduled_messages (contact_id, day, variant, scheduled_for, status, created_at)
                 VALUES (?1, ?2, ?3, ?4, 'PENDING', ?5)
                 RETURNING {COLUMNS}"
            );
            let row = tx.query_row(
                &sql,
                params![
                    new.contact_id,
                    new.day,
                    new.variant,
                    to_ts(new.scheduled_for),
                    to_ts(now)
                ],
                from_row,
            )?;
            tx.commit()?;
            Ok(Some(row))
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Get a scheduled message by ID.
pub async fn get(db: &Database, id: i64) -> Result<Option<ScheduledMessage>, CadenceError> {
    db.connection()
        .call(move |conn| -> Result<Option<ScheduledMessage>, rusqlite::Error> {
            let sql = format!("SELECT {COLUMNS} FROM scheduled_messages WHERE id = ?1");
            conn.query_row(&sql, params![id], from_row).optional()
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// All rows for a contact ordered by day.
pub async fn list_for_contact(
    db: &Database,
    contact_id: &str,
) -> Result<Vec<ScheduledMessage>, CadenceError> {
    let contact_id = contact_id.to_string();
    db.connection()
        .call(move |conn| -> Result<Vec<ScheduledMessage>, rusqlite::Error> {
            let sql = format!(
                "SELECT {COLUMNS} FROM scheduled_messages WHERE contact_id = ?1 ORDER BY day"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params![contact_id], from_row)?;
            rows.collect()
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Due PENDING rows, oldest `scheduled_for` first.
pub async fn due_pending(
    db: &Database,
    now: DateTime<Utc>,
    limit: usize,
) -> Result<Vec<ScheduledMessage>, CadenceError> {
    let limit = i64::try_from(limit).unwrap_or(i64::MAX);
    db.connection()
        .call(move |conn| -> Result<Vec<ScheduledMessage>, rusqlite::Error> {
            let sql = format!(
                "SELECT {COLUMNS} FROM scheduled_messages
                 WHERE status = 'PENDING' AND scheduled_for <= ?1
                 ORDER BY scheduled_for, id
                 LIMIT ?2"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params![to_ts(now), limit], from_row)?;
            rows.collect()
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// PROCESSING rows whose claim predates `claimed_before`.
pub async fn stale_processing(
    db: &Database,
    claimed_before: DateTime<Utc>,
    limit: usize,
) -> Result<Vec<ScheduledMessage>, CadenceError> {
    let limit = i64::try_from(limit).unwrap_or(i64::MAX);
    db.connection()
        .call(move |conn| -> Result<Vec<ScheduledMessage>, rusqlite::Error> {
            let sql = format!(
                "SELECT {COLUMNS} FROM scheduled_messages
                 WHERE status = 'PROCESSING' AND claimed_at < ?1
                 ORDER BY claimed_at, id
                 LIMIT ?2"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params![to_ts(claimed_before), limit], from_row)?;
            rows.collect()
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// PENDING -> PROCESSING, gated on the row being due.
pub async fn claim(
    db: &Database,
    id: i64,
    now: DateTime<Utc>,
) -> Result<Option<ScheduledMessage>, CadenceError> {
    db.connection()
        .call(move |conn| -> Result<Option<ScheduledMessage>, rusqlite::Error> {
            let sql = format!(
                "UPDATE scheduled_messages
                 SET status = 'PROCESSING', claimed_at = ?2
                 WHERE id = ?1 AND status = 'PENDING' AND scheduled_for <= ?2
                 RETURNING {COLUMNS}"
            );
            conn.query_row(&sql, params![id, to_ts(now)], from_row)
                .optional()
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Take over an abandoned PROCESSING claim, charging one attempt.
pub async fn reclaim_stale(
    db: &Database,
    id: i64,
    claimed_before: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Result<Option<ScheduledMessage>, CadenceError> {
    db.connection()
        .call(move |conn| -> Result<Option<ScheduledMessage>, rusqlite::Error> {
            let sql = format!(
                "UPDATE scheduled_messages
                 SET attempt_count = attempt_count + 1, claimed_at = ?3
                 WHERE id = ?1 AND status = 'PROCESSING' AND claimed_at < ?2
                 RETURNING {COLUMNS}"
            );
            conn.query_row(
                &sql,
                params![id, to_ts(claimed_before), to_ts(now)],
                from_row,
            )
            .optional()
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Apply a transition to a PROCESSING row. Returns false if the row was not PROCESSING.
pub async fn transition(
    db: &Database,
    id: i64,
    transition: &Transition,
) -> Result<bool, CadenceError> {
    let transition = transition.clone();
    db.connection()
        .call(move |conn| -> Result<bool, rusqlite::Error> {
            let tx = conn.transaction()?;
            let status = transition.target_status().to_string();
            let changed = match &transition {
                Transition::Complete { processed_at, .. } => tx.execute(
                    "UPDATE scheduled_messages
                     SET status = ?2, processed_at = ?3, claimed_at = NULL, last_error = NULL
                     WHERE id = ?1 AND status = 'PROCESSING'",
                    params![id, status, to_ts(*processed_at)],
                )?,
                Transition::Defer { scheduled_for } => tx.execute(
                    "UPDATE scheduled_messages
                     SET status = ?2, scheduled_for = ?3, deferral_count = deferral_count + 1,
                         claimed_at = NULL
                     WHERE id = ?1 AND status = 'PROCESSING'",
                    params![id, status, to_ts(*scheduled_for)],
                )?,
                Transition::Retry {
                    attempt_count,
                    scheduled_for,
                    error,
                } => tx.execute(
                    "UPDATE scheduled_messages
                     SET status = ?2, attempt_count = ?3, scheduled_for = ?4, last_error = ?5,
                         claimed_at = NULL
                     WHERE id = ?1 AND status = 'PROCESSING'",
                    params![id, status, attempt_count, to_ts(*scheduled_for), error],
                )?,
                Transition::Fail {
                    attempt_count,
                    processed_at,
                    error,
                } => tx.execute(
                    "UPDATE scheduled_messages
                     SET status = ?2, attempt_count = ?3, processed_at = ?4, last_error = ?5,
                         claimed_at = NULL
                     WHERE id = ?1 AND status = 'PROCESSING'",
                    params![id, status, attempt_count, to_ts(*processed_at), error],
                )?,
                Transition::Cancel {
                    processed_at,
                    reason,
                } => tx.execute(
                    "UPDATE scheduled_messages
                     SET status = ?2, processed_at = ?3, last_error = ?4, claimed_at = NULL
                     WHERE id = ?1 AND status = 'PROCESSING'",
                    params![id, status, to_ts(*processed_at), reason],
                )?,
            };

            if changed == 0 {
                tx.commit()?;
                return Ok(false);
            }
            if let Transition::Complete { delivery, .. } = &transition {
                deliveries::insert_in(&tx, delivery)?;
            }
            tx.commit()?;
            Ok(true)
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// PENDING -> CANCELLED for every row of the contact.
pub async fn cancel_pending(
    db: &Database,
    contact_id: &str,
    now: DateTime<Utc>,
) -> Result<u64, CadenceError> {
    let contact_id = contact_id.to_string();
    let status = MessageStatus::Cancelled.to_string();
    db.connection()
        .call(move |conn| -> Result<u64, rusqlite::Error> {
            let changed = conn.execute(
                "UPDATE scheduled_messages SET status = ?1, processed_at = ?2
                 WHERE contact_id = ?3 AND status = 'PENDING'",
                params![status, to_ts(now), contact_id],
            )?;
            Ok(changed as u64)
        })
        .await
        .map_err(crate::database::map_tr_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use cadence_core::{Direction, NewDeliveryRecord};
    use chrono::{Duration, TimeZone};
    use tempfile::tempdir;

    async fn setup_db() -> (Database, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("scheduled.db");
        let db = Database::open(db_path.to_str().unwrap()).await.unwrap();
        (db, dir)
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 10, 15, 0, 0).unwrap()
    }

    fn new_row(contact: &str, day: u32, at: DateTime<Utc>) -> NewScheduledMessage {
        NewScheduledMessage {
            contact_id: contact.to_string(),
            day,
            variant: 1,
            scheduled_for: at,
        }
    }

    #[tokio::test]
    async fn insert_is_unique_per_contact_day() {
        let (db, _dir) = setup_db().await;
        let first = insert(&db, &new_row("c-1", 3, t0()), t0()).await.unwrap();
        let first = first.expect("first insert creates a row");
        assert_eq!(first.status, MessageStatus::Pending);
        assert_eq!(first.attempt_count, 0);
        assert_eq!(first.scheduled_for, t0());

        let dup = insert(&db, &new_row("c-1", 3, t0() + Duration::hours(1)), t0())
            .await
            .unwrap();
        assert!(dup.is_none());
        assert!(insert(&db, &new_row("c-2", 3, t0()), t0()).await.unwrap().is_some());
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn claim_requires_due_pending() {
        let (db, _dir) = setup_db().await;
        let row = insert(&db, &new_row("c-1", 1, t0()), t0()).await.unwrap().unwrap();

        assert!(claim(&db, row.id, t0() - Duration::seconds(1)).await.unwrap().is_none());
        let claimed = claim(&db, row.id, t0()).await.unwrap().unwrap();
        assert_eq!(claimed.status, MessageStatus::Processing);
        assert_eq!(claimed.claimed_at, Some(t0()));
        assert!(claim(&db, row.id, t0()).await.unwrap().is_none());
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn due_pending_orders_by_schedule() {
        let (db, _dir) = setup_db().await;
        insert(&db, &new_row("c-1", 5, t0() + Duration::minutes(10)), t0()).await.unwrap();
        insert(&db, &new_row("c-2", 5, t0()), t0()).await.unwrap();
        insert(&db, &new_row("c-3", 5, t0() + Duration::days(1)), t0()).await.unwrap();

        let due = due_pending(&db, t0() + Duration::hours(1), 10).await.unwrap();
        let contacts: Vec<_> = due.iter().map(|m| m.contact_id.as_str()).collect();
        assert_eq!(contacts, ["c-2", "c-1"]);

        let limited = due_pending(&db, t0() + Duration::hours(1), 1).await.unwrap();
        assert_eq!(limited.len(), 1);
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn complete_writes_record_atomically_once() {
        let (db, _dir) = setup_db().await;
        let row = insert(&db, &new_row("c-1", 0, t0()), t0()).await.unwrap().unwrap();
        claim(&db, row.id, t0()).await.unwrap().unwrap();

        let complete = Transition::Complete {
            processed_at: t0(),
            delivery: NewDeliveryRecord {
                contact_id: "c-1".to_string(),
                scheduled_message_id: Some(row.id),
                direction: Direction::Outbound,
                body: "hello".to_string(),
                external_id: Some("SM1".to_string()),
                sent_at: t0(),
            },
        };
        assert!(transition(&db, row.id, &complete).await.unwrap());
        assert!(!transition(&db, row.id, &complete).await.unwrap());

        let loaded = get(&db, row.id).await.unwrap().unwrap();
        assert_eq!(loaded.status, MessageStatus::Completed);
        assert_eq!(loaded.processed_at, Some(t0()));
        assert!(loaded.claimed_at.is_none());

        let records = deliveries::list_for_contact(&db, "c-1").await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].scheduled_message_id, Some(row.id));
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn defer_keeps_attempts_and_counts_deferral() {
        let (db, _dir) = setup_db().await;
        let row = insert(&db, &new_row("c-1", 1, t0()), t0()).await.unwrap().unwrap();
        claim(&db, row.id, t0()).await.unwrap().unwrap();

        let later = t0() + Duration::hours(10);
        assert!(
            transition(&db, row.id, &Transition::Defer { scheduled_for: later })
                .await
                .unwrap()
        );
        let loaded = get(&db, row.id).await.unwrap().unwrap();
        assert_eq!(loaded.status, MessageStatus::Pending);
        assert_eq!(loaded.scheduled_for, later);
        assert_eq!(loaded.attempt_count, 0);
        assert_eq!(loaded.deferral_count, 1);
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn cancel_pending_leaves_other_states() {
        let (db, _dir) = setup_db().await;
        let done = insert(&db, &new_row("c-1", 0, t0()), t0()).await.unwrap().unwrap();
        let busy = insert(&db, &new_row("c-1", 1, t0()), t0()).await.unwrap().unwrap();
        insert(&db, &new_row("c-1", 3, t0() + Duration::days(3)), t0()).await.unwrap();
        insert(&db, &new_row("c-1", 5, t0() + Duration::days(5)), t0()).await.unwrap();

        claim(&db, done.id, t0()).await.unwrap();
        transition(
            &db,
            done.id,
            &Transition::Fail {
                attempt_count: 1,
                processed_at: t0(),
                error: "invalid number".to_string(),
            },
        )
        .await
        .unwrap();
        claim(&db, busy.id, t0()).await.unwrap();

        let cancelled = cancel_pending(&db, "c-1", t0()).await.unwrap();
        assert_eq!(cancelled, 2);

        let rows = list_for_contact(&db, "c-1").await.unwrap();
        let statuses: Vec<_> = rows.iter().map(|r| r.status).collect();
        assert_eq!(
            statuses,
            [
                MessageStatus::Failed,
                MessageStatus::Processing,
                MessageStatus::Cancelled,
                MessageStatus::Cancelled
            ]
        );
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn reclaim_only_stale_claims() {
        let (db, _dir) = setup_db().await;
        let row = insert(&db, &new_row("c-1", 1, t0()), t0()).await.unwrap().unwrap();
        claim(&db, row.id, t0()).await.unwrap().unwrap();

        let fresh_cutoff = t0() - Duration::minutes(1);
        assert!(reclaim_stale(&db, row.id, fresh_cutoff, t0()).await.unwrap().is_none());
        assert!(stale_processing(&db, fresh_cutoff, 10).await.unwrap().is_empty());

        let later = t0() + Duration::minutes(30);
        let cutoff = later - Duration::minutes(15);
        let stale = stale_processing(&db, cutoff, 10).await.unwrap();
        assert_eq!(stale.len(), 1);
        let reclaimed = reclaim_stale(&db, row.id, cutoff, later).await.unwrap().unwrap();
        assert_eq!(reclaimed.attempt_count, 1);
        assert_eq!(reclaimed.claimed_at, Some(later));
        assert_eq!(reclaimed.status, MessageStatus::Processing);
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn replace_cancelled_only_touches_cancelled_rows() {
        let (db, _dir) = setup_db().await;
        let row = insert(&db, &new_row("c-1", 7, t0()), t0()).await.unwrap().unwrap();

        let fresh = new_row("c-1", 7, t0() + Duration::days(7));
        assert!(replace_cancelled(&db, row.id, &fresh, t0()).await.unwrap().is_none());

        cancel_pending(&db, "c-1", t0()).await.unwrap();
        let replaced = replace_cancelled(&db, row.id, &fresh, t0()).await.unwrap().unwrap();
        assert_ne!(replaced.id, row.id);
        assert_eq!(replaced.status, MessageStatus::Pending);
        assert_eq!(replaced.scheduled_for, fresh.scheduled_for);

        let rows = list_for_contact(&db, "c-1").await.unwrap();
        assert_eq!(rows.len(), 1);
        db.close().await.unwrap();
    }
}
