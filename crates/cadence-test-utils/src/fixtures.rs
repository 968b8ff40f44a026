// SPDX-FileCopyrightText: 2026 Cadence Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Shared contacts and templates for engine and end-to-end tests.

use chrono::{DateTime, TimeZone, Utc};

use cadence_core::{CADENCE_DAYS, Contact, ContactProfile, ContactStatus, Store, Template};

/// Opt-out notice appended to every fixture template.
pub const NOTICE: &str = "\u{2013}Quoting Fast STOP";

/// 2024-01-10T15:00:00Z, 07:00 in Los Angeles.
pub fn la_morning() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 10, 15, 0, 0).unwrap()
}

/// An ACTIVE contact with a full profile.
pub fn contact(id: &str, timezone: &str, created_at: DateTime<Utc>) -> Contact {
    Contact {
        id: id.to_string(),
        phone: format!("+1555{:07}", id.bytes().map(u32::from).sum::<u32>()),
        timezone: timezone.to_string(),
        status: ContactStatus::Active,
        created_at,
        profile: ContactProfile {
            first_name: Some("Maria".to_string()),
            last_name: Some("Lopez".to_string()),
            vehicle_year: Some(2018),
            vehicle_make: Some("Honda".to_string()),
            vehicle_model: Some("Civic".to_string()),
            city: Some("Pasadena".to_string()),
            state: Some("CA".to_string()),
            zip: Some("91101".to_string()),
            savings: Some("480".to_string()),
            tracking_token: Some(format!("t{}", id.replace('-', ""))),
        },
    }
}

/// The Los Angeles contact used by the timetable scenarios.
pub fn la_contact() -> Contact {
    contact("lead-la", "America/Los_Angeles", la_morning())
}

/// Two active variants for every cadence day.
pub fn templates() -> Vec<Template> {
    CADENCE_DAYS
        .iter()
        .flat_map(|&day| {
            [
                Template {
                    day,
                    variant: 1,
                    body: format!(
                        "Hi {{FirstName}}! Day {day}: your {{VehicleMake}} quote is ready at quotingfast.io/{{LeadID}}. {NOTICE}"
                    ),
                    active: true,
                },
                Template {
                    day,
                    variant: 2,
                    body: format!(
                        "{{FirstName}}, {{City}} drivers save ${{Savings}}/yr. Day {day} check: quotingfast.io/{{LeadID}}. {NOTICE}"
                    ),
                    active: true,
                },
            ]
        })
        .collect()
}

/// Load [`templates`] into a store.
pub async fn seed_templates<S: Store + ?Sized>(store: &S) {
    for template in templates() {
        store
            .upsert_template(&template)
            .await
            .expect("seeding templates should succeed");
    }
}
