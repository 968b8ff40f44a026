// SPDX-FileCopyrightText: 2026 Cadence Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Claim-and-deliver state machine shared by the timer and sweep triggers.
//!
//! ```text
//! PENDING --claim--> PROCESSING --> COMPLETED | FAILED | CANCELLED
//!                        |
//!                        +--> PENDING (compliance deferral, transient retry)
//! ```
//!
//! Every transition out of PROCESSING is conditional on the row still being
//! PROCESSING, so a lost race is observed as a no-op rather than a double
//! send or a double write.

use std::sync::Arc;
use std::time::Duration;

use cadence_config::model::{ComplianceConfig, DeliveryConfig};
use cadence_core::{
    CadenceError, DeliveryQueue, Direction, NewDeliveryRecord, ScheduledMessage, SmsGateway,
    Store, Transition,
};
use chrono::{DateTime, TimeDelta, Utc};
use futures::StreamExt;
use rand::SeedableRng;
use rand::rngs::StdRng;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::catalog::TemplateCatalog;
use crate::compliance::ComplianceHandle;
use crate::render::MessageRenderer;

/// Attempt limits, timings and sweep sizing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryPolicy {
    /// Delivery attempts before a row is FAILED.
    pub max_attempts: u32,
    pub retry_backoff: TimeDelta,
    /// Age of a PROCESSING claim after which the sweep may take it over.
    pub stale_after: TimeDelta,
    pub send_timeout: Duration,
    /// Compliance deferrals before a row is FAILED. `None` never gives up.
    pub max_deferrals: Option<u32>,
    pub sweep_batch_size: usize,
    /// Rows processed concurrently within one sweep.
    pub concurrency: usize,
}

impl DeliveryPolicy {
    pub fn from_config(delivery: &DeliveryConfig, compliance: &ComplianceConfig) -> Self {
        Self {
            max_attempts: delivery.max_attempts,
            retry_backoff: secs(delivery.retry_backoff_secs),
            stale_after: secs(delivery.stale_after_secs),
            send_timeout: Duration::from_secs(delivery.send_timeout_secs),
            max_deferrals: compliance.max_deferrals,
            sweep_batch_size: delivery.sweep_batch_size,
            concurrency: delivery.workers.max(1),
        }
    }
}

impl Default for DeliveryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 2,
            retry_backoff: TimeDelta::minutes(5),
            stale_after: TimeDelta::minutes(15),
            send_timeout: Duration::from_secs(30),
            max_deferrals: None,
            sweep_batch_size: 10,
            concurrency: 5,
        }
    }
}

fn secs(value: u64) -> TimeDelta {
    i64::try_from(value)
        .ok()
        .and_then(TimeDelta::try_seconds)
        .unwrap_or(TimeDelta::MAX)
}

/// What happened to one touchpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Not claimable: already claimed elsewhere, terminal, or not yet due.
    Skipped,
    Delivered { external_id: String },
    /// Outside the compliance window; back to PENDING until `until`.
    Deferred { until: DateTime<Utc> },
    RetryScheduled {
        attempt_count: u32,
        at: DateTime<Utc>,
    },
    Failed { error: String },
    Cancelled { reason: String },
}

/// Counters for one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub reclaimed: usize,
    pub delivered: usize,
    pub deferred: usize,
    pub retried: usize,
    pub failed: usize,
    pub cancelled: usize,
    pub skipped: usize,
    pub errors: usize,
}

impl SweepReport {
    fn record(&mut self, outcome: &Result<DispatchOutcome, CadenceError>) {
        match outcome {
            Ok(DispatchOutcome::Skipped) => self.skipped += 1,
            Ok(DispatchOutcome::Delivered { .. }) => self.delivered += 1,
            Ok(DispatchOutcome::Deferred { .. }) => self.deferred += 1,
            Ok(DispatchOutcome::RetryScheduled { .. }) => self.retried += 1,
            Ok(DispatchOutcome::Failed { .. }) => self.failed += 1,
            Ok(DispatchOutcome::Cancelled { .. }) => self.cancelled += 1,
            Err(_) => self.errors += 1,
        }
    }

    /// Rows that left PENDING or PROCESSING for good or got rescheduled.
    pub fn processed(&self) -> usize {
        self.delivered + self.deferred + self.retried + self.failed + self.cancelled
    }
}

/// Drives claimed touchpoints through compliance, rendering and sending.
pub struct DeliveryCoordinator {
    store: Arc<dyn Store>,
    gateway: Arc<dyn SmsGateway>,
    catalog: Arc<TemplateCatalog>,
    compliance: ComplianceHandle,
    queue: Arc<dyn DeliveryQueue>,
    renderer: MessageRenderer,
    policy: DeliveryPolicy,
    rng: Mutex<StdRng>,
}

impl DeliveryCoordinator {
    pub fn new(
        store: Arc<dyn Store>,
        gateway: Arc<dyn SmsGateway>,
        catalog: Arc<TemplateCatalog>,
        compliance: ComplianceHandle,
        queue: Arc<dyn DeliveryQueue>,
        renderer: MessageRenderer,
        policy: DeliveryPolicy,
    ) -> Self {
        Self {
            store,
            gateway,
            catalog,
            compliance,
            queue,
            renderer,
            policy,
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    /// Replace the RNG used when a scheduled variant has to be substituted.
    pub fn with_rng(mut self, rng: StdRng) -> Self {
        self.rng = Mutex::new(rng);
        self
    }

    pub fn policy(&self) -> &DeliveryPolicy {
        &self.policy
    }

    /// Claim one touchpoint and run it to its next state.
    pub async fn dispatch(
        &self,
        message_id: i64,
        now: DateTime<Utc>,
    ) -> Result<DispatchOutcome, CadenceError> {
        match self.store.claim(message_id, now).await? {
            Some(row) => self.process_claimed(row, now).await,
            None => {
                debug!(message_id, "claim lost or not due, skipping");
                Ok(DispatchOutcome::Skipped)
            }
        }
    }

    /// Take over stale claims, then claim and process due rows.
    ///
    /// Failures are logged and counted per row; one bad row never stops the
    /// rest of the batch.
    pub async fn sweep(&self, now: DateTime<Utc>) -> SweepReport {
        let mut report = SweepReport::default();
        let limit = self.policy.sweep_batch_size;
        let claimed_before = now - self.policy.stale_after;

        match self.store.stale_processing(claimed_before, limit).await {
            Ok(rows) => {
                let outcomes: Vec<_> = futures::stream::iter(rows)
                    .map(|row| self.recover_stale(row, claimed_before, now))
                    .buffer_unordered(self.policy.concurrency)
                    .collect()
                    .await;
                for (reclaimed, outcome) in outcomes {
                    if reclaimed {
                        report.reclaimed += 1;
                    }
                    report.record(&outcome);
                }
            }
            Err(e) => {
                error!(error = %e, "listing stale claims failed");
                report.errors += 1;
            }
        }

        match self.store.due_pending(now, limit).await {
            Ok(rows) => {
                let outcomes: Vec<_> = futures::stream::iter(rows)
                    .map(|row| async move {
                        let outcome = self.dispatch(row.id, now).await;
                        if let Err(e) = &outcome {
                            error!(
                                message_id = row.id,
                                contact_id = %row.contact_id,
                                error = %e,
                                "dispatch failed"
                            );
                        }
                        outcome
                    })
                    .buffer_unordered(self.policy.concurrency)
                    .collect()
                    .await;
                for outcome in &outcomes {
                    report.record(outcome);
                }
            }
            Err(e) => {
                error!(error = %e, "listing due touchpoints failed");
                report.errors += 1;
            }
        }

        if report.processed() > 0 || report.errors > 0 {
            info!(
                reclaimed = report.reclaimed,
                delivered = report.delivered,
                deferred = report.deferred,
                retried = report.retried,
                failed = report.failed,
                cancelled = report.cancelled,
                errors = report.errors,
                "sweep finished"
            );
        }
        report
    }

    async fn recover_stale(
        &self,
        row: ScheduledMessage,
        claimed_before: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> (bool, Result<DispatchOutcome, CadenceError>) {
        let reclaimed = match self.store.reclaim_stale(row.id, claimed_before, now).await {
            Ok(Some(reclaimed)) => reclaimed,
            Ok(None) => return (false, Ok(DispatchOutcome::Skipped)),
            Err(e) => {
                error!(message_id = row.id, error = %e, "reclaiming stale claim failed");
                return (false, Err(e));
            }
        };

        warn!(
            message_id = reclaimed.id,
            contact_id = %reclaimed.contact_id,
            attempt_count = reclaimed.attempt_count,
            "stale claim reclaimed"
        );

        let outcome = if reclaimed.attempt_count >= self.policy.max_attempts {
            self.fail(
                &reclaimed,
                reclaimed.attempt_count,
                "processing stalled, attempts exhausted".to_string(),
                now,
            )
            .await
        } else {
            self.process_claimed(reclaimed, now).await
        };
        if let Err(e) = &outcome {
            error!(message_id = row.id, contact_id = %row.contact_id, error = %e, "stale recovery failed");
        }
        (true, outcome)
    }

    /// Run a PROCESSING row to its next state.
    async fn process_claimed(
        &self,
        row: ScheduledMessage,
        now: DateTime<Utc>,
    ) -> Result<DispatchOutcome, CadenceError> {
        let contact = match self.store.get_contact(&row.contact_id).await? {
            Some(contact) if !contact.status.is_suppressed() => contact,
            Some(contact) => {
                return self
                    .cancel(&row, format!("contact is {}", contact.status), now)
                    .await;
            }
            None => return self.cancel(&row, "contact not found".to_string(), now).await,
        };

        let decision = self
            .compliance
            .current()
            .evaluate_in(now, &contact.timezone);
        if !decision.allowed {
            return self.defer(&row, decision.next_valid, now).await;
        }

        let template = {
            let mut rng = self.rng.lock().await;
            self.catalog
                .resolve(row.day, row.variant, &mut *rng)
                .map(|t| (t.variant, t.body.clone()))
        };
        let Some((variant, template)) = template else {
            let err = CadenceError::Template {
                day: row.day,
                message: "no active template variant".to_string(),
            };
            return self.fail(&row, row.attempt_count, err.to_string(), now).await;
        };
        if variant != row.variant {
            info!(
                message_id = row.id,
                day = row.day,
                scheduled_variant = row.variant,
                variant,
                "scheduled variant inactive, substituted"
            );
        }

        let body = self.renderer.render(&template, &contact);
        let sent = match tokio::time::timeout(
            self.policy.send_timeout,
            self.gateway.send(&contact.phone, &body),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(CadenceError::Timeout {
                duration: self.policy.send_timeout,
            }),
        };

        match sent {
            Ok(external_id) => self.complete(&row, body, external_id, now).await,
            Err(e @ CadenceError::TerminalDelivery { .. }) => {
                warn!(
                    message_id = row.id,
                    contact_id = %row.contact_id,
                    error = %e,
                    "terminal delivery failure"
                );
                self.fail(&row, row.attempt_count + 1, e.to_string(), now)
                    .await
            }
            Err(e) if e.is_retryable() => self.retry(&row, e, now).await,
            Err(e) => self.hold(&row, e, now).await,
        }
    }

    async fn complete(
        &self,
        row: &ScheduledMessage,
        body: String,
        external_id: String,
        now: DateTime<Utc>,
    ) -> Result<DispatchOutcome, CadenceError> {
        let transition = Transition::Complete {
            processed_at: now,
            delivery: NewDeliveryRecord {
                contact_id: row.contact_id.clone(),
                scheduled_message_id: Some(row.id),
                direction: Direction::Outbound,
                body,
                external_id: Some(external_id.clone()),
                sent_at: now,
            },
        };
        if !self.apply(row, &transition).await? {
            return Ok(DispatchOutcome::Skipped);
        }
        info!(
            message_id = row.id,
            contact_id = %row.contact_id,
            day = row.day,
            external_id = %external_id,
            "touchpoint delivered"
        );
        Ok(DispatchOutcome::Delivered { external_id })
    }

    async fn defer(
        &self,
        row: &ScheduledMessage,
        until: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<DispatchOutcome, CadenceError> {
        let cap_reached = self
            .policy
            .max_deferrals
            .filter(|&cap| row.deferral_count >= cap);
        if let Some(cap) = cap_reached {
            return self
                .fail(
                    row,
                    row.attempt_count,
                    format!("deferred {cap} times outside the compliance window"),
                    now,
                )
                .await;
        }

        if !self
            .apply(row, &Transition::Defer { scheduled_for: until })
            .await?
        {
            return Ok(DispatchOutcome::Skipped);
        }
        info!(
            message_id = row.id,
            contact_id = %row.contact_id,
            until = %until,
            "outside compliance window, deferred"
        );
        self.requeue(row, until).await;
        Ok(DispatchOutcome::Deferred { until })
    }

    async fn retry(
        &self,
        row: &ScheduledMessage,
        err: CadenceError,
        now: DateTime<Utc>,
    ) -> Result<DispatchOutcome, CadenceError> {
        let attempt_count = row.attempt_count + 1;
        if attempt_count >= self.policy.max_attempts {
            warn!(
                message_id = row.id,
                contact_id = %row.contact_id,
                attempt_count,
                error = %err,
                "transient failure, attempts exhausted"
            );
            return self.fail(row, attempt_count, err.to_string(), now).await;
        }

        let at = now + self.policy.retry_backoff;
        let transition = Transition::Retry {
            attempt_count,
            scheduled_for: at,
            error: err.to_string(),
        };
        if !self.apply(row, &transition).await? {
            return Ok(DispatchOutcome::Skipped);
        }
        warn!(
            message_id = row.id,
            contact_id = %row.contact_id,
            attempt_count,
            retry_at = %at,
            error = %err,
            "transient failure, retry scheduled"
        );
        self.requeue(row, at).await;
        Ok(DispatchOutcome::RetryScheduled { attempt_count, at })
    }

    /// The gateway itself is unusable (credentials, account). Put the row
    /// back after the backoff without charging an attempt.
    async fn hold(
        &self,
        row: &ScheduledMessage,
        err: CadenceError,
        now: DateTime<Utc>,
    ) -> Result<DispatchOutcome, CadenceError> {
        let at = now + self.policy.retry_backoff;
        let transition = Transition::Retry {
            attempt_count: row.attempt_count,
            scheduled_for: at,
            error: err.to_string(),
        };
        if !self.apply(row, &transition).await? {
            return Ok(DispatchOutcome::Skipped);
        }
        error!(
            message_id = row.id,
            contact_id = %row.contact_id,
            retry_at = %at,
            error = %err,
            "gateway unavailable, touchpoint held"
        );
        self.requeue(row, at).await;
        Ok(DispatchOutcome::RetryScheduled {
            attempt_count: row.attempt_count,
            at,
        })
    }

    async fn fail(
        &self,
        row: &ScheduledMessage,
        attempt_count: u32,
        error: String,
        now: DateTime<Utc>,
    ) -> Result<DispatchOutcome, CadenceError> {
        let transition = Transition::Fail {
            attempt_count,
            processed_at: now,
            error: error.clone(),
        };
        if !self.apply(row, &transition).await? {
            return Ok(DispatchOutcome::Skipped);
        }
        error!(
            message_id = row.id,
            contact_id = %row.contact_id,
            attempt_count,
            error = %error,
            "touchpoint failed"
        );
        Ok(DispatchOutcome::Failed { error })
    }

    async fn cancel(
        &self,
        row: &ScheduledMessage,
        reason: String,
        now: DateTime<Utc>,
    ) -> Result<DispatchOutcome, CadenceError> {
        let transition = Transition::Cancel {
            processed_at: now,
            reason: reason.clone(),
        };
        if !self.apply(row, &transition).await? {
            return Ok(DispatchOutcome::Skipped);
        }
        info!(
            message_id = row.id,
            contact_id = %row.contact_id,
            reason = %reason,
            "touchpoint cancelled"
        );
        Ok(DispatchOutcome::Cancelled { reason })
    }

    /// Apply a transition; `false` when the row was no longer ours.
    async fn apply(
        &self,
        row: &ScheduledMessage,
        transition: &Transition,
    ) -> Result<bool, CadenceError> {
        let applied = self.store.transition(row.id, transition).await?;
        if !applied {
            warn!(
                message_id = row.id,
                contact_id = %row.contact_id,
                target = %transition.target_status(),
                "claim lost before transition"
            );
        }
        Ok(applied)
    }

    async fn requeue(&self, row: &ScheduledMessage, at: DateTime<Utc>) {
        if let Err(e) = self.queue.enqueue(row.id, at).await {
            warn!(
                message_id = row.id,
                contact_id = %row.contact_id,
                error = %e,
                "re-enqueue failed, sweep will pick the row up"
            );
        }
    }
}
