// SPDX-FileCopyrightText: 2026 Cadence Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Domain types shared across adapter traits and the engine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Day offsets of the follow-up sequence, relative to contact creation.
pub const CADENCE_DAYS: [u32; 9] = [0, 1, 3, 5, 7, 10, 14, 21, 28];

/// Returns true if `day` is one of the fixed touchpoint offsets.
pub fn is_cadence_day(day: u32) -> bool {
    CADENCE_DAYS.contains(&day)
}

/// Health status reported by adapter health checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    /// Adapter is fully operational.
    Healthy,
    /// Adapter is operational but experiencing issues.
    Degraded(String),
    /// Adapter is not operational.
    Unhealthy(String),
}

/// Identifies the kind of adapter behind a trait object.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
pub enum AdapterType {
    Store,
    Gateway,
}

/// Lifecycle status of a contact, owned by the surrounding application.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ContactStatus {
    Active,
    OptedOut,
    Converted,
    Archived,
    Inactive,
}

impl ContactStatus {
    /// Statuses that forbid any further outbound follow-up.
    pub fn is_suppressed(self) -> bool {
        matches!(self, ContactStatus::OptedOut | ContactStatus::Archived)
    }
}

/// Status of a scheduled touchpoint.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

impl MessageStatus {
    /// COMPLETED, FAILED and CANCELLED accept no further transitions.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            MessageStatus::Completed | MessageStatus::Failed | MessageStatus::Cancelled
        )
    }
}

/// Direction of a delivery log entry.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Direction {
    Outbound,
    Inbound,
}

/// Attributes used to fill template placeholders. Every field is optional;
/// the renderer substitutes neutral defaults for missing values.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContactProfile {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub vehicle_year: Option<u16>,
    pub vehicle_make: Option<String>,
    pub vehicle_model: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub zip: Option<String>,
    pub savings: Option<String>,
    /// Token embedded in the tracking link. Defaults to the contact id.
    pub tracking_token: Option<String>,
}

/// A message recipient.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contact {
    pub id: String,
    /// E.164 phone number.
    pub phone: String,
    /// IANA timezone identifier, resolved once at contact creation.
    pub timezone: String,
    pub status: ContactStatus,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub profile: ContactProfile,
}

/// A message body for one (day, variant) pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Template {
    pub day: u32,
    pub variant: u32,
    pub body: String,
    pub active: bool,
}

/// A persisted touchpoint for one contact and day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduledMessage {
    pub id: i64,
    pub contact_id: String,
    pub day: u32,
    pub variant: u32,
    pub scheduled_for: DateTime<Utc>,
    pub status: MessageStatus,
    /// Delivery attempts consumed (gateway failures and stale reclaims).
    pub attempt_count: u32,
    /// Compliance-window deferrals. Never consumes attempts.
    pub deferral_count: u32,
    /// When the current PROCESSING claim was taken.
    pub claimed_at: Option<DateTime<Utc>>,
    pub processed_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Input for creating a PENDING touchpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewScheduledMessage {
    pub contact_id: String,
    pub day: u32,
    pub variant: u32,
    pub scheduled_for: DateTime<Utc>,
}

/// An append-only log entry of a sent or received SMS.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryRecord {
    pub id: i64,
    pub contact_id: String,
    /// The touchpoint this record completes. `None` for inbound messages.
    pub scheduled_message_id: Option<i64>,
    pub direction: Direction,
    pub body: String,
    pub external_id: Option<String>,
    pub sent_at: DateTime<Utc>,
}

/// Input for appending a delivery log entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewDeliveryRecord {
    pub contact_id: String,
    pub scheduled_message_id: Option<i64>,
    pub direction: Direction,
    pub body: String,
    pub external_id: Option<String>,
    pub sent_at: DateTime<Utc>,
}

/// A state change applied to a claimed (PROCESSING) touchpoint.
///
/// Stores apply a transition only if the row is still PROCESSING, in a single
/// atomic operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    /// Sent. Appends the outbound record and marks the row COMPLETED together.
    Complete {
        processed_at: DateTime<Utc>,
        delivery: NewDeliveryRecord,
    },
    /// Outside the compliance window. Back to PENDING, attempts untouched.
    Defer { scheduled_for: DateTime<Utc> },
    /// Transient failure with attempts left. Back to PENDING after backoff.
    Retry {
        attempt_count: u32,
        scheduled_for: DateTime<Utc>,
        error: String,
    },
    /// Terminal failure or attempts exhausted.
    Fail {
        attempt_count: u32,
        processed_at: DateTime<Utc>,
        error: String,
    },
    /// Contact opted out, was archived, or no longer exists.
    Cancel {
        processed_at: DateTime<Utc>,
        reason: String,
    },
}

impl Transition {
    /// The status the row ends up in after this transition.
    pub fn target_status(&self) -> MessageStatus {
        match self {
            Transition::Complete { .. } => MessageStatus::Completed,
            Transition::Defer { .. } | Transition::Retry { .. } => MessageStatus::Pending,
            Transition::Fail { .. } => MessageStatus::Failed,
            Transition::Cancel { .. } => MessageStatus::Cancelled,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn status_strings_are_screaming_snake_case() {
        assert_eq!(ContactStatus::OptedOut.to_string(), "OPTED_OUT");
        assert_eq!(MessageStatus::Processing.to_string(), "PROCESSING");
        assert_eq!(Direction::Outbound.to_string(), "OUTBOUND");
        assert_eq!(
            ContactStatus::from_str("ARCHIVED").unwrap(),
            ContactStatus::Archived
        );
        assert_eq!(
            MessageStatus::from_str("CANCELLED").unwrap(),
            MessageStatus::Cancelled
        );
    }

    #[test]
    fn status_serde_matches_display() {
        let json = serde_json::to_string(&ContactStatus::OptedOut).unwrap();
        assert_eq!(json, "\"OPTED_OUT\"");
        let parsed: MessageStatus = serde_json::from_str("\"COMPLETED\"").unwrap();
        assert_eq!(parsed, MessageStatus::Completed);
    }

    #[test]
    fn terminal_states() {
        assert!(!MessageStatus::Pending.is_terminal());
        assert!(!MessageStatus::Processing.is_terminal());
        assert!(MessageStatus::Completed.is_terminal());
        assert!(MessageStatus::Failed.is_terminal());
        assert!(MessageStatus::Cancelled.is_terminal());
    }

    #[test]
    fn suppressed_statuses() {
        assert!(ContactStatus::OptedOut.is_suppressed());
        assert!(ContactStatus::Archived.is_suppressed());
        assert!(!ContactStatus::Active.is_suppressed());
        assert!(!ContactStatus::Converted.is_suppressed());
    }

    #[test]
    fn cadence_days_are_sorted_and_known() {
        assert!(CADENCE_DAYS.windows(2).all(|w| w[0] < w[1]));
        assert!(is_cadence_day(0));
        assert!(is_cadence_day(28));
        assert!(!is_cadence_day(2));
    }

    #[test]
    fn transition_targets() {
        let now = Utc::now();
        assert_eq!(
            Transition::Defer { scheduled_for: now }.target_status(),
            MessageStatus::Pending
        );
        assert_eq!(
            Transition::Cancel {
                processed_at: now,
                reason: "opted out".into()
            }
            .target_status(),
            MessageStatus::Cancelled
        );
    }

    #[test]
    fn profile_deserializes_with_missing_fields() {
        let profile: ContactProfile = serde_json::from_str(r#"{"first_name":"Ana"}"#).unwrap();
        assert_eq!(profile.first_name.as_deref(), Some("Ana"));
        assert!(profile.zip.is_none());
    }
}
