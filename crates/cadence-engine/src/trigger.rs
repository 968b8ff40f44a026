// SPDX-FileCopyrightText: 2026 Cadence Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Trigger paths that feed touchpoints to the [`DeliveryCoordinator`].
//!
//! The timer path keeps a [`DelayQueue`] of enqueued ids and dispatches each
//! one when it comes due. The sweep path polls the store on a fixed interval.
//! Both go through the same atomic claim, so running them together never
//! double-sends.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use cadence_core::{CadenceError, DeliveryQueue};
use chrono::{DateTime, Utc};
use futures::StreamExt;
use tokio::sync::{Semaphore, mpsc};
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tokio_util::time::DelayQueue;
use tracing::{debug, error, info};

use crate::delivery::{DeliveryCoordinator, DispatchOutcome};

type Job = (i64, DateTime<Utc>);

/// In-process [`DeliveryQueue`] feeding [`run_timer_trigger`].
#[derive(Debug, Clone)]
pub struct TimerQueue {
    tx: mpsc::UnboundedSender<Job>,
}

impl TimerQueue {
    /// Create the queue and the receiver to hand to [`run_timer_trigger`].
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Job>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

#[async_trait]
impl DeliveryQueue for TimerQueue {
    async fn enqueue(&self, message_id: i64, run_at: DateTime<Utc>) -> Result<(), CadenceError> {
        self.tx
            .send((message_id, run_at))
            .map_err(|_| CadenceError::Internal("timer trigger is not running".into()))
    }
}

/// Dispatch enqueued touchpoints as they come due, at most `workers` at a
/// time. In-flight dispatches finish before this returns.
pub async fn run_timer_trigger(
    mut jobs: mpsc::UnboundedReceiver<Job>,
    coordinator: Arc<DeliveryCoordinator>,
    workers: usize,
    cancel: CancellationToken,
) {
    let semaphore = Arc::new(Semaphore::new(workers.max(1)));
    let mut timers: DelayQueue<Job> = DelayQueue::new();
    let mut in_flight = JoinSet::new();
    let mut open = true;

    info!(workers, "timer trigger started");
    loop {
        if !open && timers.is_empty() {
            break;
        }
        tokio::select! {
            _ = cancel.cancelled() => break,
            job = jobs.recv(), if open => match job {
                Some((message_id, run_at)) => {
                    let delay = (run_at - Utc::now()).to_std().unwrap_or(Duration::ZERO);
                    debug!(message_id, ?delay, "touchpoint timer set");
                    timers.insert((message_id, run_at), delay);
                }
                None => open = false,
            },
            Some(expired) = timers.next(), if !timers.is_empty() => {
                let (message_id, run_at) = expired.into_inner();
                let Ok(permit) = Arc::clone(&semaphore).acquire_owned().await else {
                    break;
                };
                let coordinator = Arc::clone(&coordinator);
                in_flight.spawn(async move {
                    let _permit = permit;
                    // Never evaluate before the scheduled instant, even if the
                    // timer fired a hair early against the wall clock.
                    let now = Utc::now().max(run_at);
                    match coordinator.dispatch(message_id, now).await {
                        Ok(DispatchOutcome::Skipped) => {}
                        Ok(outcome) => debug!(message_id, ?outcome, "timer dispatch done"),
                        Err(e) => error!(message_id, error = %e, "timer dispatch failed"),
                    }
                });
            }
        }
        while in_flight.try_join_next().is_some() {}
    }

    while in_flight.join_next().await.is_some() {}
    info!(abandoned = timers.len(), "timer trigger stopped");
}

/// Sweep due and stale touchpoints every `every` until cancelled.
pub async fn run_sweeper(
    coordinator: Arc<DeliveryCoordinator>,
    every: Duration,
    cancel: CancellationToken,
) {
    let mut interval = tokio::time::interval(every);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately.
    interval.tick().await;

    info!(interval_secs = every.as_secs(), "sweeper started");
    loop {
        tokio::select! {
            _ = interval.tick() => {
                let report = coordinator.sweep(Utc::now()).await;
                debug!(?report, "sweep tick");
            }
            _ = cancel.cancelled() => {
                info!("sweeper shutting down");
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cadence_core::{MessageStatus, NewScheduledMessage, Store};
    use cadence_test_utils::{MemoryStore, MockGateway, fixtures};
    use chrono::TimeDelta;
    use chrono_tz::America::New_York;

    use crate::catalog::TemplateCatalog;
    use crate::compliance::{ComplianceHandle, ComplianceWindow};
    use crate::delivery::DeliveryPolicy;
    use crate::render::MessageRenderer;

    fn coordinator(
        store: &MemoryStore,
        gateway: &MockGateway,
        queue: Arc<dyn DeliveryQueue>,
    ) -> Arc<DeliveryCoordinator> {
        Arc::new(DeliveryCoordinator::new(
            Arc::new(store.clone()),
            Arc::new(gateway.clone()),
            Arc::new(TemplateCatalog::new(fixtures::templates())),
            // Open around the clock so wall-clock tests never defer.
            ComplianceHandle::new(ComplianceWindow::new(0, 24, New_York).unwrap()),
            queue,
            MessageRenderer::new(160, r"quotingfast\.io/[A-Za-z0-9]+", fixtures::NOTICE).unwrap(),
            DeliveryPolicy::default(),
        ))
    }

    async fn due_row(store: &MemoryStore) -> i64 {
        let created = Utc::now() - TimeDelta::days(2);
        let contact = fixtures::contact("lead-timer", "America/New_York", created);
        store.upsert_contact(&contact).await.unwrap();
        store
            .insert_scheduled(&NewScheduledMessage {
                contact_id: contact.id,
                day: 1,
                variant: 1,
                scheduled_for: Utc::now() - TimeDelta::minutes(1),
            })
            .await
            .unwrap()
            .unwrap()
            .id
    }

    async fn wait_for_completion(store: &MemoryStore, id: i64) {
        for _ in 0..200 {
            let row = store.get_scheduled(id).await.unwrap().unwrap();
            if row.status == MessageStatus::Completed {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("touchpoint {id} never completed");
    }

    #[tokio::test]
    async fn timer_dispatches_due_jobs() {
        let store = MemoryStore::new();
        let gateway = MockGateway::new();
        let (queue, rx) = TimerQueue::new();
        let coordinator = coordinator(&store, &gateway, Arc::new(queue.clone()));
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(run_timer_trigger(rx, coordinator, 2, cancel.clone()));

        let id = due_row(&store).await;
        queue.enqueue(id, Utc::now()).await.unwrap();
        // A duplicate timer for the same row loses the claim.
        queue.enqueue(id, Utc::now()).await.unwrap();

        wait_for_completion(&store, id).await;
        cancel.cancel();
        handle.await.unwrap();
        assert_eq!(gateway.call_count().await, 1);
    }

    #[tokio::test]
    async fn timer_stops_when_senders_drop() {
        let store = MemoryStore::new();
        let gateway = MockGateway::new();
        let (queue, rx) = TimerQueue::new();
        let coordinator = coordinator(&store, &gateway, Arc::new(cadence_core::NoopQueue));
        drop(queue);

        tokio::time::timeout(
            Duration::from_secs(5),
            run_timer_trigger(rx, coordinator, 1, CancellationToken::new()),
        )
        .await
        .expect("trigger should stop once the queue is closed");
    }

    #[tokio::test]
    async fn enqueue_after_shutdown_errors() {
        let (queue, rx) = TimerQueue::new();
        drop(rx);
        let err = queue.enqueue(1, Utc::now()).await.unwrap_err();
        assert!(matches!(err, CadenceError::Internal(_)));
    }

    #[tokio::test]
    async fn sweeper_picks_up_due_rows() {
        let store = MemoryStore::new();
        let gateway = MockGateway::new();
        let coordinator = coordinator(&store, &gateway, Arc::new(cadence_core::NoopQueue));
        let id = due_row(&store).await;

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(run_sweeper(
            coordinator,
            Duration::from_millis(20),
            cancel.clone(),
        ));

        wait_for_completion(&store, id).await;
        cancel.cancel();
        handle.await.unwrap();
        assert_eq!(gateway.call_count().await, 1);
    }
}
