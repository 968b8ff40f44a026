// SPDX-FileCopyrightText: 2026 Cadence Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Contact intake: resolve the timezone once, store the contact, schedule it.

use std::sync::Arc;

use cadence_core::{
    CadenceError, Contact, ContactProfile, ContactStatus, Store, TimezoneResolver,
};
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use tracing::{debug, info};

use crate::schedule::{ScheduleEngine, TimetableReport};

/// A lead handed to the engine by the surrounding application.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NewContact {
    pub id: String,
    /// E.164 phone number.
    pub phone: String,
    /// IANA timezone. Resolved from the profile's ZIP or state when absent.
    pub timezone: Option<String>,
    pub profile: ContactProfile,
}

/// Result of an enrollment.
#[derive(Debug, Clone, PartialEq)]
pub struct Enrolled {
    pub contact: Contact,
    /// False when the contact already existed and was left as stored.
    pub created: bool,
    pub timetable: TimetableReport,
}

/// Stores new contacts and builds their timetable.
pub struct Enrollment {
    store: Arc<dyn Store>,
    schedule: Arc<ScheduleEngine>,
    resolver: Arc<dyn TimezoneResolver>,
}

impl Enrollment {
    pub fn new(
        store: Arc<dyn Store>,
        schedule: Arc<ScheduleEngine>,
        resolver: Arc<dyn TimezoneResolver>,
    ) -> Self {
        Self {
            store,
            schedule,
            resolver,
        }
    }

    /// Enroll a contact created at `now`.
    ///
    /// An existing contact keeps its stored record; only its missing
    /// timetable days are filled in.
    pub async fn enroll(
        &self,
        new: NewContact,
        now: DateTime<Utc>,
    ) -> Result<Enrolled, CadenceError> {
        if new.id.trim().is_empty() || new.phone.trim().is_empty() {
            return Err(CadenceError::Config(
                "a contact needs a non-empty id and phone".to_string(),
            ));
        }

        if let Some(contact) = self.store.get_contact(&new.id).await? {
            debug!(contact_id = %contact.id, "contact already enrolled");
            let timetable = self.schedule.build_timetable(&contact, now).await?;
            return Ok(Enrolled {
                contact,
                created: false,
                timetable,
            });
        }

        let timezone = match new.timezone {
            Some(timezone) => {
                timezone.parse::<Tz>().map_err(|e| {
                    CadenceError::Config(format!("unknown timezone `{timezone}`: {e}"))
                })?;
                timezone
            }
            None => {
                let key = new
                    .profile
                    .zip
                    .as_deref()
                    .or(new.profile.state.as_deref())
                    .unwrap_or_default();
                self.resolver.resolve(key).await
            }
        };

        let contact = Contact {
            id: new.id,
            phone: new.phone,
            timezone,
            status: ContactStatus::Active,
            created_at: now,
            profile: new.profile,
        };
        self.store.upsert_contact(&contact).await?;
        info!(
            contact_id = %contact.id,
            timezone = %contact.timezone,
            "contact enrolled"
        );

        let timetable = self.schedule.build_timetable(&contact, now).await?;
        Ok(Enrolled {
            contact,
            created: true,
            timetable,
        })
    }
}
