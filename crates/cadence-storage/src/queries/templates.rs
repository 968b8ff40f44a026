// SPDX-FileCopyrightText: 2026 Cadence Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Template catalog persistence.

use cadence_core::{CadenceError, Template};
use rusqlite::params;

use crate::database::Database;

/// List every template, active or not, ordered by (day, variant).
pub async fn list_templates(db: &Database) -> Result<Vec<Template>, CadenceError> {
    db.connection()
        .call(|conn| -> Result<Vec<Template>, rusqlite::Error> {
            let mut stmt = conn.prepare(
                "SELECT day, variant, body, active FROM templates ORDER BY day, variant",
            )?;
            let rows = stmt.query_map([], |row| {
                Ok(Template {
                    day: row.get(0)?,
                    variant: row.get(1)?,
                    body: row.get(2)?,
                    active: row.get(3)?,
                })
            })?;
            rows.collect()
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Insert or replace the template for (day, variant).
pub async fn upsert_template(db: &Database, template: &Template) -> Result<(), CadenceError> {
    let template = template.clone();
    db.connection()
        .call(move |conn| -> Result<(), rusqlite::Error> {
            conn.execute(
                "INSERT INTO templates (day, variant, body, active) VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(day, variant) DO UPDATE SET
                    body = excluded.body,
                    active = excluded.active",
                params![template.day, template.variant, template.body, template.active],
            )?;
            Ok(())
        })
        .await
        .map_err(crate::database::map_tr_err)
}
