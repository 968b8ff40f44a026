// SPDX-FileCopyrightText: 2026 Cadence Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-memory `Store` for engine tests.
//!
//! All state sits behind one mutex, so every method is atomic with respect to
//! every other, matching the conditional-update contract of the SQLite store.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use cadence_core::{
    AdapterType, CadenceError, Contact, ContactStatus, DeliveryRecord, Direction, HealthStatus,
    MessageStatus, NewDeliveryRecord, NewScheduledMessage, PluginAdapter, ScheduledMessage,
    Store, Template, Transition,
};

#[derive(Default)]
struct State {
    contacts: HashMap<String, Contact>,
    templates: BTreeMap<(u32, u32), Template>,
    scheduled: BTreeMap<i64, ScheduledMessage>,
    deliveries: Vec<DeliveryRecord>,
    next_scheduled_id: i64,
    next_delivery_id: i64,
    poisoned_contacts: HashSet<String>,
}

impl State {
    fn append_delivery(&mut self, record: &NewDeliveryRecord) -> Result<DeliveryRecord, CadenceError> {
        if let Some(sid) = record.scheduled_message_id {
            if self
                .deliveries
                .iter()
                .any(|d| d.scheduled_message_id == Some(sid))
            {
                return Err(CadenceError::storage(format!(
                    "UNIQUE constraint failed: delivery_records.scheduled_message_id ({sid})"
                )));
            }
        }
        if record.direction == Direction::Inbound {
            if let Some(external_id) = &record.external_id {
                if self.find_inbound(external_id).is_some() {
                    return Err(CadenceError::storage(format!(
                        "UNIQUE constraint failed: delivery_records.external_id ({external_id})"
                    )));
                }
            }
        }
        self.next_delivery_id += 1;
        let stored = DeliveryRecord {
            id: self.next_delivery_id,
            contact_id: record.contact_id.clone(),
            scheduled_message_id: record.scheduled_message_id,
            direction: record.direction,
            body: record.body.clone(),
            external_id: record.external_id.clone(),
            sent_at: record.sent_at,
        };
        self.deliveries.push(stored.clone());
        Ok(stored)
    }

    fn find_inbound(&self, external_id: &str) -> Option<&DeliveryRecord> {
        self.deliveries.iter().find(|d| {
            d.direction == Direction::Inbound && d.external_id.as_deref() == Some(external_id)
        })
    }

    fn create_row(&mut self, new: &NewScheduledMessage) -> ScheduledMessage {
        self.next_scheduled_id += 1;
        let row = ScheduledMessage {
            id: self.next_scheduled_id,
            contact_id: new.contact_id.clone(),
            day: new.day,
            variant: new.variant,
            scheduled_for: new.scheduled_for,
            status: MessageStatus::Pending,
            attempt_count: 0,
            deferral_count: 0,
            claimed_at: None,
            processed_at: None,
            last_error: None,
            created_at: Utc::now(),
        };
        self.scheduled.insert(row.id, row.clone());
        row
    }
}

/// A `Store` held entirely in memory.
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<State>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every `get_contact` for `contact_id` fail with a storage error.
    pub async fn poison_contact(&self, contact_id: &str) {
        self.state
            .lock()
            .await
            .poisoned_contacts
            .insert(contact_id.to_string());
    }

    /// Every scheduled row, ordered by id.
    pub async fn all_scheduled(&self) -> Vec<ScheduledMessage> {
        self.state.lock().await.scheduled.values().cloned().collect()
    }

    /// Overwrite a scheduled row directly, bypassing the state machine.
    pub async fn put_scheduled(&self, row: ScheduledMessage) {
        self.state.lock().await.scheduled.insert(row.id, row);
    }
}

#[async_trait]
impl PluginAdapter for MemoryStore {
    fn name(&self) -> &str {
        "memory"
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Store
    }

    async fn health_check(&self) -> Result<HealthStatus, CadenceError> {
        Ok(HealthStatus::Healthy)
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn get_contact(&self, id: &str) -> Result<Option<Contact>, CadenceError> {
        let state = self.state.lock().await;
        if state.poisoned_contacts.contains(id) {
            return Err(CadenceError::storage(format!("contact {id} is unreadable")));
        }
        Ok(state.contacts.get(id).cloned())
    }

    async fn find_contact_by_phone(&self, phone: &str) -> Result<Option<Contact>, CadenceError> {
        let state = self.state.lock().await;
        Ok(state
            .contacts
            .values()
            .filter(|c| c.phone == phone)
            .max_by_key(|c| c.created_at)
            .cloned())
    }

    async fn upsert_contact(&self, contact: &Contact) -> Result<(), CadenceError> {
        self.state
            .lock()
            .await
            .contacts
            .insert(contact.id.clone(), contact.clone());
        Ok(())
    }

    async fn set_contact_status(
        &self,
        id: &str,
        status: ContactStatus,
    ) -> Result<bool, CadenceError> {
        let mut state = self.state.lock().await;
        Ok(match state.contacts.get_mut(id) {
            Some(contact) => {
                contact.status = status;
                true
            }
            None => false,
        })
    }

    async fn list_templates(&self) -> Result<Vec<Template>, CadenceError> {
        Ok(self.state.lock().await.templates.values().cloned().collect())
    }

    async fn upsert_template(&self, template: &Template) -> Result<(), CadenceError> {
        self.state
            .lock()
            .await
            .templates
            .insert((template.day, template.variant), template.clone());
        Ok(())
    }

    async fn insert_scheduled(
        &self,
        new: &NewScheduledMessage,
    ) -> Result<Option<ScheduledMessage>, CadenceError> {
        let mut state = self.state.lock().await;
        let exists = state
            .scheduled
            .values()
            .any(|m| m.contact_id == new.contact_id && m.day == new.day);
        if exists {
            return Ok(None);
        }
        Ok(Some(state.create_row(new)))
    }

    async fn replace_cancelled(
        &self,
        id: i64,
        new: &NewScheduledMessage,
    ) -> Result<Option<ScheduledMessage>, CadenceError> {
        let mut state = self.state.lock().await;
        let replaceable = state.scheduled.get(&id).is_some_and(|m| {
            m.status == MessageStatus::Cancelled
                && m.contact_id == new.contact_id
                && m.day == new.day
        });
        if !replaceable {
            return Ok(None);
        }
        state.scheduled.remove(&id);
        Ok(Some(state.create_row(new)))
    }

    async fn get_scheduled(&self, id: i64) -> Result<Option<ScheduledMessage>, CadenceError> {
        Ok(self.state.lock().await.scheduled.get(&id).cloned())
    }

    async fn list_scheduled_for_contact(
        &self,
        contact_id: &str,
    ) -> Result<Vec<ScheduledMessage>, CadenceError> {
        let state = self.state.lock().await;
        let mut rows: Vec<_> = state
            .scheduled
            .values()
            .filter(|m| m.contact_id == contact_id)
            .cloned()
            .collect();
        rows.sort_by_key(|m| m.day);
        Ok(rows)
    }

    async fn due_pending(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<ScheduledMessage>, CadenceError> {
        let state = self.state.lock().await;
        let mut rows: Vec<_> = state
            .scheduled
            .values()
            .filter(|m| m.status == MessageStatus::Pending && m.scheduled_for <= now)
            .cloned()
            .collect();
        rows.sort_by_key(|m| (m.scheduled_for, m.id));
        rows.truncate(limit);
        Ok(rows)
    }

    async fn stale_processing(
        &self,
        claimed_before: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<ScheduledMessage>, CadenceError> {
        let state = self.state.lock().await;
        let mut rows: Vec<_> = state
            .scheduled
            .values()
            .filter(|m| {
                m.status == MessageStatus::Processing
                    && m.claimed_at.is_some_and(|at| at < claimed_before)
            })
            .cloned()
            .collect();
        rows.sort_by_key(|m| (m.claimed_at, m.id));
        rows.truncate(limit);
        Ok(rows)
    }

    async fn claim(
        &self,
        id: i64,
        now: DateTime<Utc>,
    ) -> Result<Option<ScheduledMessage>, CadenceError> {
        let mut state = self.state.lock().await;
        Ok(match state.scheduled.get_mut(&id) {
            Some(m) if m.status == MessageStatus::Pending && m.scheduled_for <= now => {
                m.status = MessageStatus::Processing;
                m.claimed_at = Some(now);
                Some(m.clone())
            }
            _ => None,
        })
    }

    async fn reclaim_stale(
        &self,
        id: i64,
        claimed_before: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<Option<ScheduledMessage>, CadenceError> {
        let mut state = self.state.lock().await;
        Ok(match state.scheduled.get_mut(&id) {
            Some(m)
                if m.status == MessageStatus::Processing
                    && m.claimed_at.is_some_and(|at| at < claimed_before) =>
            {
                m.attempt_count += 1;
                m.claimed_at = Some(now);
                Some(m.clone())
            }
            _ => None,
        })
    }

    async fn transition(&self, id: i64, transition: &Transition) -> Result<bool, CadenceError> {
        let mut state = self.state.lock().await;
        let processing = state
            .scheduled
            .get(&id)
            .is_some_and(|m| m.status == MessageStatus::Processing);
        if !processing {
            return Ok(false);
        }
        if let Transition::Complete { delivery, .. } = transition {
            state.append_delivery(delivery)?;
        }
        let Some(m) = state.scheduled.get_mut(&id) else {
            return Ok(false);
        };
        m.status = transition.target_status();
        m.claimed_at = None;
        match transition {
            Transition::Complete { processed_at, .. } => {
                m.processed_at = Some(*processed_at);
                m.last_error = None;
            }
            Transition::Defer { scheduled_for } => {
                m.scheduled_for = *scheduled_for;
                m.deferral_count += 1;
            }
            Transition::Retry {
                attempt_count,
                scheduled_for,
                error,
            } => {
                m.attempt_count = *attempt_count;
                m.scheduled_for = *scheduled_for;
                m.last_error = Some(error.clone());
            }
            Transition::Fail {
                attempt_count,
                processed_at,
                error,
            } => {
                m.attempt_count = *attempt_count;
                m.processed_at = Some(*processed_at);
                m.last_error = Some(error.clone());
            }
            Transition::Cancel {
                processed_at,
                reason,
            } => {
                m.processed_at = Some(*processed_at);
                m.last_error = Some(reason.clone());
            }
        }
        Ok(true)
    }

    async fn cancel_pending(
        &self,
        contact_id: &str,
        now: DateTime<Utc>,
    ) -> Result<u64, CadenceError> {
        let mut state = self.state.lock().await;
        let mut count = 0;
        for m in state.scheduled.values_mut() {
            if m.contact_id == contact_id && m.status == MessageStatus::Pending {
                m.status = MessageStatus::Cancelled;
                m.processed_at = Some(now);
                count += 1;
            }
        }
        Ok(count)
    }

    async fn record_delivery(
        &self,
        record: &NewDeliveryRecord,
    ) -> Result<DeliveryRecord, CadenceError> {
        self.state.lock().await.append_delivery(record)
    }

    async fn find_inbound(
        &self,
        external_id: &str,
    ) -> Result<Option<DeliveryRecord>, CadenceError> {
        Ok(self.state.lock().await.find_inbound(external_id).cloned())
    }

    async fn list_deliveries(
        &self,
        contact_id: &str,
    ) -> Result<Vec<DeliveryRecord>, CadenceError> {
        let state = self.state.lock().await;
        Ok(state
            .deliveries
            .iter()
            .filter(|d| d.contact_id == contact_id)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn due() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 10, 16, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn claim_then_transition() {
        let store = MemoryStore::new();
        let row = store
            .insert_scheduled(&NewScheduledMessage {
                contact_id: "c-1".into(),
                day: 1,
                variant: 1,
                scheduled_for: due(),
            })
            .await
            .unwrap()
            .unwrap();

        assert!(store.claim(row.id, due()).await.unwrap().is_some());
        assert!(store.claim(row.id, due()).await.unwrap().is_none());
        let defer = Transition::Defer {
            scheduled_for: due() + chrono::Duration::hours(12),
        };
        assert!(store.transition(row.id, &defer).await.unwrap());
        assert!(!store.transition(row.id, &defer).await.unwrap());

        let loaded = store.get_scheduled(row.id).await.unwrap().unwrap();
        assert_eq!(loaded.status, MessageStatus::Pending);
        assert_eq!(loaded.deferral_count, 1);
    }

    #[tokio::test]
    async fn duplicate_contact_day_is_rejected() {
        let store = MemoryStore::new();
        let new = NewScheduledMessage {
            contact_id: "c-1".into(),
            day: 3,
            variant: 1,
            scheduled_for: due(),
        };
        assert!(store.insert_scheduled(&new).await.unwrap().is_some());
        assert!(store.insert_scheduled(&new).await.unwrap().is_none());
    }
}
