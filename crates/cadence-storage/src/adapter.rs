// SPDX-FileCopyrightText: 2026 Cadence Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite implementation of the Store trait.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::OnceCell;
use tracing::debug;

use cadence_config::model::StorageConfig;
use cadence_core::{
    AdapterType, CadenceError, Contact, ContactStatus, DeliveryRecord, HealthStatus,
    NewDeliveryRecord, NewScheduledMessage, PluginAdapter, ScheduledMessage, Store, Template,
    Transition,
};

use crate::database::Database;
use crate::queries;

/// SQLite-backed store.
///
/// Wraps a [`Database`] handle and delegates to the typed query modules. The
/// database is opened on the first call to [`SqliteStore::initialize`].
pub struct SqliteStore {
    config: StorageConfig,
    db: OnceCell<Database>,
}

impl SqliteStore {
    /// Create a new SqliteStore. Nothing is opened until [`Self::initialize`].
    pub fn new(config: StorageConfig) -> Self {
        Self {
            config,
            db: OnceCell::new(),
        }
    }

    /// Open the database and run migrations.
    pub async fn initialize(&self) -> Result<(), CadenceError> {
        let db = Database::open_with(&self.config.database_path, self.config.wal_mode).await?;
        self.db
            .set(db)
            .map_err(|_| CadenceError::storage("store already initialized"))?;
        debug!(path = %self.config.database_path, "SQLite store initialized");
        Ok(())
    }

    /// Checkpoint the WAL so the database file is self-contained.
    pub async fn close(&self) -> Result<(), CadenceError> {
        self.db()?
            .connection()
            .call(|conn| -> Result<(), rusqlite::Error> {
                conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);")
            })
            .await
            .map_err(crate::database::map_tr_err)?;
        debug!("WAL checkpoint complete");
        Ok(())
    }

    fn db(&self) -> Result<&Database, CadenceError> {
        self.db
            .get()
            .ok_or_else(|| CadenceError::storage("store not initialized -- call initialize() first"))
    }
}

#[async_trait]
impl PluginAdapter for SqliteStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Store
    }

    async fn health_check(&self) -> Result<HealthStatus, CadenceError> {
        self.db()?
            .connection()
            .call(|conn| -> Result<i64, rusqlite::Error> {
                conn.query_row("SELECT 1", [], |row| row.get(0))
            })
            .await
            .map_err(crate::database::map_tr_err)?;
        Ok(HealthStatus::Healthy)
    }
}

#[async_trait]
impl Store for SqliteStore {
    // --- contacts ---

    async fn get_contact(&self, id: &str) -> Result<Option<Contact>, CadenceError> {
        queries::contacts::get_contact(self.db()?, id).await
    }

    async fn find_contact_by_phone(&self, phone: &str) -> Result<Option<Contact>, CadenceError> {
        queries::contacts::find_by_phone(self.db()?, phone).await
    }

    async fn upsert_contact(&self, contact: &Contact) -> Result<(), CadenceError> {
        queries::contacts::upsert_contact(self.db()?, contact).await
    }

    async fn set_contact_status(
        &self,
        id: &str,
        status: ContactStatus,
    ) -> Result<bool, CadenceError> {
        queries::contacts::set_status(self.db()?, id, status).await
    }

    // --- templates ---

    async fn list_templates(&self) -> Result<Vec<Template>, CadenceError> {
        queries::templates::list_templates(self.db()?).await
    }

    async fn upsert_template(&self, template: &Template) -> Result<(), CadenceError> {
        queries::templates::upsert_template(self.db()?, template).await
    }

    // --- scheduled messages ---

    async fn insert_scheduled(
        &self,
        new: &NewScheduledMessage,
    ) -> Result<Option<ScheduledMessage>, CadenceError> {
        queries::scheduled::insert(self.db()?, new, Utc::now()).await
    }

    async fn replace_cancelled(
        &self,
        id: i64,
        new: &NewScheduledMessage,
    ) -> Result<Option<ScheduledMessage>, CadenceError> {
        queries::scheduled::replace_cancelled(self.db()?, id, new, Utc::now()).await
    }

    async fn get_scheduled(&self, id: i64) -> Result<Option<ScheduledMessage>, CadenceError> {
        queries::scheduled::get(self.db()?, id).await
    }

    async fn list_scheduled_for_contact(
        &self,
        contact_id: &str,
    ) -> Result<Vec<ScheduledMessage>, CadenceError> {
        queries::scheduled::list_for_contact(self.db()?, contact_id).await
    }

    async fn due_pending(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<ScheduledMessage>, CadenceError> {
        queries::scheduled::due_pending(self.db()?, now, limit).await
    }

    async fn stale_processing(
        &self,
        claimed_before: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<ScheduledMessage>, CadenceError> {
        queries::scheduled::stale_processing(self.db()?, claimed_before, limit).await
    }

    async fn claim(
        &self,
        id: i64,
        now: DateTime<Utc>,
    ) -> Result<Option<ScheduledMessage>, CadenceError> {
        queries::scheduled::claim(self.db()?, id, now).await
    }

    async fn reclaim_stale(
        &self,
        id: i64,
        claimed_before: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<Option<ScheduledMessage>, CadenceError> {
        queries::scheduled::reclaim_stale(self.db()?, id, claimed_before, now).await
    }

    async fn transition(&self, id: i64, transition: &Transition) -> Result<bool, CadenceError> {
        queries::scheduled::transition(self.db()?, id, transition).await
    }

    async fn cancel_pending(
        &self,
        contact_id: &str,
        now: DateTime<Utc>,
    ) -> Result<u64, CadenceError> {
        queries::scheduled::cancel_pending(self.db()?, contact_id, now).await
    }

    // --- delivery log ---

    async fn record_delivery(
        &self,
        record: &NewDeliveryRecord,
    ) -> Result<DeliveryRecord, CadenceError> {
        queries::deliveries::insert(self.db()?, record).await
    }

    async fn find_inbound(
        &self,
        external_id: &str,
    ) -> Result<Option<DeliveryRecord>, CadenceError> {
        queries::deliveries::find_inbound(self.db()?, external_id).await
    }

    async fn list_deliveries(
        &self,
        contact_id: &str,
    ) -> Result<Vec<DeliveryRecord>, CadenceError> {
        queries::deliveries::list_for_contact(self.db()?, contact_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use cadence_core::MessageStatus;
    use chrono::TimeZone;
    use tempfile::tempdir;

    fn make_config(path: &str) -> StorageConfig {
        StorageConfig {
            database_path: path.to_string(),
            wal_mode: true,
        }
    }

    async fn open_store(dir: &tempfile::TempDir) -> SqliteStore {
        let path = dir.path().join("store.db");
        let store = SqliteStore::new(make_config(path.to_str().unwrap()));
        store.initialize().await.unwrap();
        store
    }

    #[tokio::test]
    async fn identifies_as_store_adapter() {
        let dir = tempdir().unwrap();
        let store = SqliteStore::new(make_config(dir.path().join("x.db").to_str().unwrap()));
        assert_eq!(store.name(), "sqlite");
        assert_eq!(store.adapter_type(), AdapterType::Store);
    }

    #[tokio::test]
    async fn health_check_requires_initialize() {
        let dir = tempdir().unwrap();
        let store = SqliteStore::new(make_config(dir.path().join("h.db").to_str().unwrap()));
        assert!(store.health_check().await.is_err());
        store.initialize().await.unwrap();
        assert_eq!(store.health_check().await.unwrap(), HealthStatus::Healthy);
    }

    #[tokio::test]
    async fn double_initialize_fails() {
        let dir = tempdir().unwrap();
        let store = open_store(&dir).await;
        assert!(store.initialize().await.is_err());
    }

    #[tokio::test]
    async fn concurrent_claims_have_exactly_one_winner() {
        let dir = tempdir().unwrap();
        let store = Arc::new(open_store(&dir).await);
        let due = Utc.with_ymd_and_hms(2024, 1, 10, 16, 0, 0).unwrap();
        let row = store
            .insert_scheduled(&NewScheduledMessage {
                contact_id: "c-1".to_string(),
                day: 0,
                variant: 1,
                scheduled_for: due,
            })
            .await
            .unwrap()
            .unwrap();

        let mut handles = Vec::new();
        for _ in 0..16 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move { store.claim(row.id, due).await }));
        }

        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap().unwrap().is_some() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);

        let loaded = store.get_scheduled(row.id).await.unwrap().unwrap();
        assert_eq!(loaded.status, MessageStatus::Processing);
        store.close().await.unwrap();
    }

    #[tokio::test]
    async fn transition_requires_processing() {
        let dir = tempdir().unwrap();
        let store = open_store(&dir).await;
        let now = Utc.with_ymd_and_hms(2024, 1, 10, 16, 0, 0).unwrap();
        let row = store
            .insert_scheduled(&NewScheduledMessage {
                contact_id: "c-1".to_string(),
                day: 1,
                variant: 1,
                scheduled_for: now,
            })
            .await
            .unwrap()
            .unwrap();

        let cancel = Transition::Cancel {
            processed_at: now,
            reason: "opted out".to_string(),
        };
        assert!(!store.transition(row.id, &cancel).await.unwrap());
        store.claim(row.id, now).await.unwrap().unwrap();
        assert!(store.transition(row.id, &cancel).await.unwrap());

        let loaded = store.get_scheduled(row.id).await.unwrap().unwrap();
        assert_eq!(loaded.status, MessageStatus::Cancelled);
        assert_eq!(loaded.last_error.as_deref(), Some("opted out"));
    }
}
