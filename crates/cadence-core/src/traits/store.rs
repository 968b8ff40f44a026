// SPDX-FileCopyrightText: 2026 Cadence Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Persistence trait for contacts, templates, touchpoints and the delivery log.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::CadenceError;
use crate::traits::adapter::PluginAdapter;
use crate::types::{
    Contact, ContactStatus, DeliveryRecord, NewDeliveryRecord, NewScheduledMessage,
    ScheduledMessage, Template, Transition,
};

/// Adapter for the engine's persistence backend.
///
/// Every state change on a scheduled message is a conditional update. Methods
/// returning `Option` or `bool` report whether the condition held; losing a
/// race is not an error.
#[async_trait]
pub trait Store: PluginAdapter {
    // --- contacts ---

    async fn get_contact(&self, id: &str) -> Result<Option<Contact>, CadenceError>;

    /// Looks up a contact by E.164 phone number.
    async fn find_contact_by_phone(&self, phone: &str) -> Result<Option<Contact>, CadenceError>;

    async fn upsert_contact(&self, contact: &Contact) -> Result<(), CadenceError>;

    /// Sets the contact's status. Returns false if the contact does not exist.
    async fn set_contact_status(
        &self,
        id: &str,
        status: ContactStatus,
    ) -> Result<bool, CadenceError>;

    // --- templates ---

    async fn list_templates(&self) -> Result<Vec<Template>, CadenceError>;

    async fn upsert_template(&self, template: &Template) -> Result<(), CadenceError>;

    // --- scheduled messages ---

    /// Creates a PENDING row. Returns `None` if a row for (contact, day) already exists.
    async fn insert_scheduled(
        &self,
        new: &NewScheduledMessage,
    ) -> Result<Option<ScheduledMessage>, CadenceError>;

    /// Replaces the CANCELLED row `id` with a fresh PENDING row for the same
    /// (contact, day). Returns `None` if the row is no longer CANCELLED.
    async fn replace_cancelled(
        &self,
        id: i64,
        new: &NewScheduledMessage,
    ) -> Result<Option<ScheduledMessage>, CadenceError>;

    async fn get_scheduled(&self, id: i64) -> Result<Option<ScheduledMessage>, CadenceError>;

    /// All rows for a contact, ordered by day.
    async fn list_scheduled_for_contact(
        &self,
        contact_id: &str,
    ) -> Result<Vec<ScheduledMessage>, CadenceError>;

    /// PENDING rows with `scheduled_for <= now`, oldest first.
    async fn due_pending(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<ScheduledMessage>, CadenceError>;

    /// PROCESSING rows claimed before `claimed_before`, oldest claim first.
    async fn stale_processing(
        &self,
        claimed_before: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<ScheduledMessage>, CadenceError>;

    /// Atomically moves a due PENDING row to PROCESSING and stamps `claimed_at`.
    ///
    /// Gated on `status = PENDING AND scheduled_for <= now`. Of any number of
    /// concurrent callers exactly one receives `Some`.
    async fn claim(
        &self,
        id: i64,
        now: DateTime<Utc>,
    ) -> Result<Option<ScheduledMessage>, CadenceError>;

    /// Re-claims a PROCESSING row whose claim predates `claimed_before`,
    /// charging one attempt and restamping `claimed_at = now`.
    async fn reclaim_stale(
        &self,
        id: i64,
        claimed_before: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<Option<ScheduledMessage>, CadenceError>;

    /// Applies `transition` to a PROCESSING row in one atomic step.
    ///
    /// Returns false if the row was not PROCESSING. A `Complete` transition
    /// appends its delivery record in the same transaction.
    async fn transition(&self, id: i64, transition: &Transition) -> Result<bool, CadenceError>;

    /// Moves every PENDING row of the contact to CANCELLED. Returns the count.
    async fn cancel_pending(
        &self,
        contact_id: &str,
        now: DateTime<Utc>,
    ) -> Result<u64, CadenceError>;

    // --- delivery log ---

    async fn record_delivery(
        &self,
        record: &NewDeliveryRecord,
    ) -> Result<DeliveryRecord, CadenceError>;

    /// The inbound record carrying the gateway's message id, if already logged.
    async fn find_inbound(&self, external_id: &str)
    -> Result<Option<DeliveryRecord>, CadenceError>;

    /// Delivery records for a contact, oldest first.
    async fn list_deliveries(&self, contact_id: &str)
    -> Result<Vec<DeliveryRecord>, CadenceError>;
}
