// SPDX-FileCopyrightText: 2026 Cadence Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Timetable construction for new and reactivated contacts.

use std::collections::HashMap;
use std::sync::Arc;

use cadence_core::{
    CADENCE_DAYS, CadenceError, Contact, ContactStatus, DeliveryQueue, MessageStatus,
    NewScheduledMessage, ScheduledMessage, Store,
};
use chrono::{DateTime, Days, Utc};
use chrono_tz::Tz;
use rand::SeedableRng;
use rand::rngs::StdRng;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::catalog::TemplateCatalog;
use crate::compliance::{ComplianceHandle, ComplianceWindow, local_instant};

/// What a timetable pass did, day by day.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TimetableReport {
    /// Rows created (or recreated from CANCELLED) in this pass.
    pub created: Vec<ScheduledMessage>,
    /// Days left alone because a row already exists.
    pub existing_days: Vec<u32>,
    /// Days with no active template variant.
    pub skipped_days: Vec<u32>,
}

impl TimetableReport {
    /// Errors for the skipped days, for callers that surface them.
    pub fn skipped_errors(&self) -> Vec<CadenceError> {
        self.skipped_days
            .iter()
            .map(|&day| CadenceError::Template {
                day,
                message: "no active template variant".to_string(),
            })
            .collect()
    }
}

/// Creates one PENDING touchpoint per cadence day.
pub struct ScheduleEngine {
    store: Arc<dyn Store>,
    catalog: Arc<TemplateCatalog>,
    compliance: ComplianceHandle,
    queue: Arc<dyn DeliveryQueue>,
    send_hour_offset: u32,
    rng: Mutex<StdRng>,
}

impl ScheduleEngine {
    pub fn new(
        store: Arc<dyn Store>,
        catalog: Arc<TemplateCatalog>,
        compliance: ComplianceHandle,
        queue: Arc<dyn DeliveryQueue>,
        send_hour_offset: u32,
    ) -> Self {
        Self::with_rng(
            store,
            catalog,
            compliance,
            queue,
            send_hour_offset,
            StdRng::from_entropy(),
        )
    }

    /// Construct with an explicit RNG for reproducible variant selection.
    pub fn with_rng(
        store: Arc<dyn Store>,
        catalog: Arc<TemplateCatalog>,
        compliance: ComplianceHandle,
        queue: Arc<dyn DeliveryQueue>,
        send_hour_offset: u32,
        rng: StdRng,
    ) -> Self {
        Self {
            store,
            catalog,
            compliance,
            queue,
            send_hour_offset,
            rng: Mutex::new(rng),
        }
    }

    /// Create the follow-up timetable for an ACTIVE contact.
    ///
    /// Days that already have a row are left alone, so repeated calls are
    /// harmless.
    pub async fn build_timetable(
        &self,
        contact: &Contact,
        now: DateTime<Utc>,
    ) -> Result<TimetableReport, CadenceError> {
        if contact.status != ContactStatus::Active {
            warn!(
                contact_id = %contact.id,
                status = %contact.status,
                "timetable requested for a non-active contact, nothing scheduled"
            );
            return Ok(TimetableReport::default());
        }

        let existing = self.existing_rows(&contact.id).await?;
        let window = self.compliance.current();
        let tz = window.timezone(&contact.timezone);
        let mut report = TimetableReport::default();

        for day in CADENCE_DAYS {
            if existing.contains_key(&day) {
                report.existing_days.push(day);
                continue;
            }
            let scheduled_for = self.target_instant(&window, tz, contact, day, now);
            self.create_day(contact, day, scheduled_for, None, &mut report)
                .await?;
        }

        info!(
            contact_id = %contact.id,
            created = report.created.len(),
            existing = report.existing_days.len(),
            skipped = report.skipped_days.len(),
            "timetable built"
        );
        Ok(report)
    }

    /// Fill the timetable back in after a reactivation.
    ///
    /// Missing days are created. CANCELLED days whose target is still ahead
    /// are replaced with fresh rows. Day 0 is never revived.
    pub async fn reschedule(
        &self,
        contact: &Contact,
        now: DateTime<Utc>,
    ) -> Result<TimetableReport, CadenceError> {
        if contact.status != ContactStatus::Active {
            warn!(
                contact_id = %contact.id,
                status = %contact.status,
                "reschedule requested for a non-active contact, nothing scheduled"
            );
            return Ok(TimetableReport::default());
        }

        let existing = self.existing_rows(&contact.id).await?;
        let window = self.compliance.current();
        let tz = window.timezone(&contact.timezone);
        let mut report = TimetableReport::default();

        for day in CADENCE_DAYS.into_iter().filter(|&day| day != 0) {
            let target = self.target_instant(&window, tz, contact, day, now);
            match existing.get(&day) {
                None => {
                    self.create_day(contact, day, target, None, &mut report)
                        .await?;
                }
                Some(row) if row.status == MessageStatus::Cancelled && target > now => {
                    self.create_day(contact, day, target, Some(row.id), &mut report)
                        .await?;
                }
                Some(row) => {
                    debug!(
                        contact_id = %contact.id,
                        message_id = row.id,
                        day,
                        status = %row.status,
                        "day kept as-is"
                    );
                    report.existing_days.push(day);
                }
            }
        }

        info!(
            contact_id = %contact.id,
            created = report.created.len(),
            existing = report.existing_days.len(),
            skipped = report.skipped_days.len(),
            "timetable rescheduled"
        );
        Ok(report)
    }

    async fn existing_rows(
        &self,
        contact_id: &str,
    ) -> Result<HashMap<u32, ScheduledMessage>, CadenceError> {
        Ok(self
            .store
            .list_scheduled_for_contact(contact_id)
            .await?
            .into_iter()
            .map(|row| (row.day, row))
            .collect())
    }

    /// Day 0 goes out now when the window allows. Later days go out at
    /// `start_hour + send_hour_offset` local on the contact's creation date
    /// plus the day offset.
    fn target_instant(
        &self,
        window: &ComplianceWindow,
        tz: Tz,
        contact: &Contact,
        day: u32,
        now: DateTime<Utc>,
    ) -> DateTime<Utc> {
        if day == 0 {
            return window.evaluate(now, tz).next_valid;
        }
        let created = contact.created_at.with_timezone(&tz).date_naive();
        let date = created
            .checked_add_days(Days::new(u64::from(day)))
            .unwrap_or(created);
        local_instant(date, window.start_hour() + self.send_hour_offset, tz)
    }

    async fn create_day(
        &self,
        contact: &Contact,
        day: u32,
        scheduled_for: DateTime<Utc>,
        replaces: Option<i64>,
        report: &mut TimetableReport,
    ) -> Result<(), CadenceError> {
        let variant = {
            let mut rng = self.rng.lock().await;
            self.catalog.pick(day, &mut *rng).map(|t| t.variant)
        };
        let Some(variant) = variant else {
            warn!(
                contact_id = %contact.id,
                day,
                "no active template variant, day skipped"
            );
            report.skipped_days.push(day);
            return Ok(());
        };

        let new = NewScheduledMessage {
            contact_id: contact.id.clone(),
            day,
            variant,
            scheduled_for,
        };
        let created = match replaces {
            Some(id) => self.store.replace_cancelled(id, &new).await?,
            None => self.store.insert_scheduled(&new).await?,
        };

        match created {
            Some(row) => {
                if let Err(e) = self.queue.enqueue(row.id, row.scheduled_for).await {
                    // The sweeper still finds the row once it is due.
                    warn!(
                        contact_id = %contact.id,
                        message_id = row.id,
                        error = %e,
                        "enqueue failed"
                    );
                }
                report.created.push(row);
            }
            None => report.existing_days.push(day),
        }
        Ok(())
    }
}
