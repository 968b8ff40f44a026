// SPDX-FileCopyrightText: 2026 Cadence Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! End-to-end runs of the engine against a real SQLite database.
//!
//! Each test opens its own temp database and mock gateway. Tests are
//! independent and order-insensitive.

use std::sync::Arc;

use cadence_config::model::{CadenceConfig, StorageConfig};
use cadence_core::{CADENCE_DAYS, ContactStatus, Direction, MessageStatus, NoopQueue, Store};
use cadence_engine::{DispatchOutcome, Engine};
use cadence_storage::SqliteStore;
use cadence_test_utils::{MockGateway, fixtures};
use chrono::{DateTime, TimeZone, Utc};
use tempfile::TempDir;

fn utc(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
}

async fn open(dir: &TempDir) -> Arc<SqliteStore> {
    let store = SqliteStore::new(StorageConfig {
        database_path: dir.path().join("cadence.db").to_str().unwrap().to_string(),
        wal_mode: true,
    });
    store.initialize().await.unwrap();
    Arc::new(store)
}

async fn build_engine(store: &Arc<SqliteStore>, gateway: &MockGateway) -> Engine {
    let mut config = CadenceConfig::default();
    config.schedule.variant_seed = Some(7);
    Engine::from_config(
        &config,
        Arc::clone(store) as Arc<dyn Store>,
        Arc::new(gateway.clone()),
        Arc::new(NoopQueue),
    )
    .await
    .unwrap()
}

/// Seeded database with the Los Angeles contact and its timetable.
async fn scheduled(dir: &TempDir, gateway: &MockGateway) -> (Arc<SqliteStore>, Engine) {
    let store = open(dir).await;
    fixtures::seed_templates(store.as_ref()).await;
    let contact = fixtures::la_contact();
    store.upsert_contact(&contact).await.unwrap();

    let engine = build_engine(&store, gateway).await;
    let report = engine
        .schedule
        .build_timetable(&contact, fixtures::la_morning())
        .await
        .unwrap();
    assert_eq!(report.created.len(), CADENCE_DAYS.len());
    (store, engine)
}

#[tokio::test]
async fn due_touchpoints_are_sent_and_logged() {
    let dir = tempfile::tempdir().unwrap();
    let gateway = MockGateway::new();
    let (store, engine) = scheduled(&dir, &gateway).await;

    // 10:30 in Los Angeles on day 1.
    let report = engine.delivery.sweep(utc(2024, 1, 11, 18, 30)).await;
    assert_eq!(report.delivered, 2);
    assert_eq!(report.errors, 0);

    let calls = gateway.calls().await;
    assert_eq!(calls.len(), 2);
    for sms in &calls {
        assert_eq!(sms.to, fixtures::la_contact().phone);
        assert!(sms.body.len() <= 160);
        assert!(sms.body.contains("quotingfast.io/tleadla"), "{}", sms.body);
        assert!(sms.body.ends_with(fixtures::NOTICE), "{}", sms.body);
    }

    let rows = store.list_scheduled_for_contact("lead-la").await.unwrap();
    for row in &rows {
        let expected = if row.day <= 1 {
            MessageStatus::Completed
        } else {
            MessageStatus::Pending
        };
        assert_eq!(row.status, expected, "day {}", row.day);
    }

    let log = store.list_deliveries("lead-la").await.unwrap();
    assert_eq!(log.len(), 2);
    assert!(log.iter().all(|r| r.direction == Direction::Outbound));
    assert!(log.iter().all(|r| r.external_id.is_some()));
}

#[tokio::test]
async fn night_sweep_defers_until_the_window_opens() {
    let dir = tempfile::tempdir().unwrap();
    let gateway = MockGateway::new();
    let (store, engine) = scheduled(&dir, &gateway).await;

    // 22:00 in Los Angeles on day 1.
    let report = engine.delivery.sweep(utc(2024, 1, 12, 6, 0)).await;
    assert_eq!(report.deferred, 2);
    assert_eq!(gateway.call_count().await, 0);

    let morning = utc(2024, 1, 12, 16, 0);
    for row in store.list_scheduled_for_contact("lead-la").await.unwrap() {
        if row.day <= 1 {
            assert_eq!(row.scheduled_for, morning, "day {}", row.day);
            assert_eq!(row.deferral_count, 1);
            assert_eq!(row.attempt_count, 0);
        }
    }

    let report = engine.delivery.sweep(morning).await;
    assert_eq!(report.delivered, 2);
}

#[tokio::test]
async fn timetable_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let gateway = MockGateway::new();
    let (store, engine) = scheduled(&dir, &gateway).await;
    engine.delivery.sweep(utc(2024, 1, 11, 18, 30)).await;
    store.close().await.unwrap();
    drop(engine);
    drop(store);

    let store = open(&dir).await;
    let engine = build_engine(&store, &gateway).await;

    let report = engine
        .schedule
        .build_timetable(&fixtures::la_contact(), utc(2024, 1, 11, 19, 0))
        .await
        .unwrap();
    assert!(report.created.is_empty());
    assert_eq!(report.existing_days.len(), CADENCE_DAYS.len());

    // Nothing new is due at the same instant.
    let report = engine.delivery.sweep(utc(2024, 1, 11, 18, 30)).await;
    assert_eq!(report.processed(), 0);
    assert_eq!(gateway.call_count().await, 2);
}

#[tokio::test]
async fn concurrent_dispatch_claims_once() {
    let dir = tempfile::tempdir().unwrap();
    let gateway = MockGateway::new();
    let (store, engine) = scheduled(&dir, &gateway).await;
    let day0 = store
        .list_scheduled_for_contact("lead-la")
        .await
        .unwrap()
        .into_iter()
        .find(|r| r.day == 0)
        .unwrap();

    let (id, now) = (day0.id, day0.scheduled_for);
    let handles: Vec<_> = (0..8)
        .map(|_| {
            let delivery = Arc::clone(&engine.delivery);
            tokio::spawn(async move { delivery.dispatch(id, now).await.unwrap() })
        })
        .collect();

    let mut delivered = 0;
    for handle in handles {
        if matches!(handle.await.unwrap(), DispatchOutcome::Delivered { .. }) {
            delivered += 1;
        }
    }
    assert_eq!(delivered, 1);
    assert_eq!(gateway.call_count().await, 1);
}

#[tokio::test]
async fn stop_reply_cancels_then_reactivation_restores() {
    let dir = tempfile::tempdir().unwrap();
    let gateway = MockGateway::new();
    let (store, engine) = scheduled(&dir, &gateway).await;
    let phone = fixtures::la_contact().phone;
    let replied_at = utc(2024, 1, 10, 20, 0);

    engine
        .inbound
        .handle(&phone, "stop please", Some("SMin1"), replied_at)
        .await
        .unwrap();

    let contact = store.get_contact("lead-la").await.unwrap().unwrap();
    assert_eq!(contact.status, ContactStatus::OptedOut);
    let rows = store.list_scheduled_for_contact("lead-la").await.unwrap();
    assert!(rows.iter().all(|r| r.status == MessageStatus::Cancelled));

    let report = engine.delivery.sweep(utc(2024, 3, 1, 18, 0)).await;
    assert_eq!(report.delivered, 0);

    // Back to ACTIVE: future days only, day 0 stays cancelled.
    let restored = engine
        .cancellation
        .reactivate("lead-la", replied_at)
        .await
        .unwrap();
    assert_eq!(restored.created.len(), CADENCE_DAYS.len() - 1);

    let rows = store.list_scheduled_for_contact("lead-la").await.unwrap();
    assert_eq!(rows.len(), CADENCE_DAYS.len());
    for row in rows {
        let expected = if row.day == 0 {
            MessageStatus::Cancelled
        } else {
            MessageStatus::Pending
        };
        assert_eq!(row.status, expected, "day {}", row.day);
    }
}
