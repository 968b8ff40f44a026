// SPDX-FileCopyrightText: 2026 Cadence Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Contact-level cancellation and reactivation.

use std::sync::Arc;

use cadence_core::{CadenceError, ContactStatus, Store};
use chrono::{DateTime, Utc};
use tracing::info;

use crate::schedule::{ScheduleEngine, TimetableReport};

/// Effect of a status change on the contact's touchpoints.
#[derive(Debug, Clone, PartialEq)]
pub enum StatusEffect {
    /// PENDING touchpoints cancelled.
    Cancelled(u64),
    Rescheduled(TimetableReport),
    /// Status stored, touchpoints untouched.
    Unchanged,
}

/// Stops and restarts a contact's follow-up sequence.
pub struct CancellationService {
    store: Arc<dyn Store>,
    schedule: Arc<ScheduleEngine>,
}

impl CancellationService {
    pub fn new(store: Arc<dyn Store>, schedule: Arc<ScheduleEngine>) -> Self {
        Self { store, schedule }
    }

    /// Cancel every PENDING touchpoint of the contact.
    ///
    /// PROCESSING rows finish their current attempt; the coordinator cancels
    /// them if the contact is suppressed by then.
    pub async fn cancel(&self, contact_id: &str, now: DateTime<Utc>) -> Result<u64, CadenceError> {
        let cancelled = self.store.cancel_pending(contact_id, now).await?;
        info!(contact_id, cancelled, "pending touchpoints cancelled");
        Ok(cancelled)
    }

    /// Mark the contact ACTIVE and fill its timetable back in.
    pub async fn reactivate(
        &self,
        contact_id: &str,
        now: DateTime<Utc>,
    ) -> Result<TimetableReport, CadenceError> {
        let mut contact =
            self.store
                .get_contact(contact_id)
                .await?
                .ok_or_else(|| CadenceError::NotFound {
                    entity: "contact",
                    id: contact_id.to_string(),
                })?;

        if contact.status != ContactStatus::Active {
            self.store
                .set_contact_status(contact_id, ContactStatus::Active)
                .await?;
            info!(contact_id, previous = %contact.status, "contact reactivated");
            contact.status = ContactStatus::Active;
        }

        self.schedule.reschedule(&contact, now).await
    }

    /// Persist a status change and react to it.
    ///
    /// OPTED_OUT and ARCHIVED cancel pending touchpoints. A move to ACTIVE from
    /// any other status reactivates.
    pub async fn apply_status(
        &self,
        contact_id: &str,
        status: ContactStatus,
        now: DateTime<Utc>,
    ) -> Result<StatusEffect, CadenceError> {
        let contact =
            self.store
                .get_contact(contact_id)
                .await?
                .ok_or_else(|| CadenceError::NotFound {
                    entity: "contact",
                    id: contact_id.to_string(),
                })?;
        let previous = contact.status;

        if status == ContactStatus::Active {
            if previous == ContactStatus::Active {
                return Ok(StatusEffect::Unchanged);
            }
            return Ok(StatusEffect::Rescheduled(
                self.reactivate(contact_id, now).await?,
            ));
        }

        if previous != status {
            self.store.set_contact_status(contact_id, status).await?;
            info!(contact_id, %previous, %status, "contact status changed");
        }

        if status.is_suppressed() {
            return Ok(StatusEffect::Cancelled(self.cancel(contact_id, now).await?));
        }
        Ok(StatusEffect::Unchanged)
    }
}
