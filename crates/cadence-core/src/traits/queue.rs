// SPDX-FileCopyrightText: 2026 Cadence Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Delayed-job trigger trait.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::CadenceError;

/// A delayed-job scheduler that fires a dispatch for `message_id` at `run_at`.
///
/// Enqueueing is best-effort: the periodic sweep picks up anything a queue
/// loses, so callers log enqueue failures instead of failing the operation.
#[async_trait]
pub trait DeliveryQueue: Send + Sync {
    async fn enqueue(&self, message_id: i64, run_at: DateTime<Utc>) -> Result<(), CadenceError>;
}

/// Queue used when no delayed-job scheduler is available. Delivery relies on
/// the periodic sweep alone.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopQueue;

#[async_trait]
impl DeliveryQueue for NoopQueue {
    async fn enqueue(&self, _message_id: i64, _run_at: DateTime<Utc>) -> Result<(), CadenceError> {
        Ok(())
    }
}
