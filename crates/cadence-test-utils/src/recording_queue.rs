// SPDX-FileCopyrightText: 2026 Cadence Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Delivery queue that only records what it is asked to schedule.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use cadence_core::{CadenceError, DeliveryQueue};

/// A `DeliveryQueue` that captures `(message_id, run_at)` pairs.
///
/// Set `failing` to simulate an unavailable job queue.
#[derive(Clone, Default)]
pub struct RecordingQueue {
    jobs: Arc<Mutex<Vec<(i64, DateTime<Utc>)>>>,
    failing: bool,
}

impl RecordingQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// A queue whose every enqueue fails.
    pub fn failing() -> Self {
        Self {
            failing: true,
            ..Self::default()
        }
    }

    pub async fn jobs(&self) -> Vec<(i64, DateTime<Utc>)> {
        self.jobs.lock().await.clone()
    }

    /// Jobs recorded for one message id.
    pub async fn jobs_for(&self, message_id: i64) -> Vec<DateTime<Utc>> {
        self.jobs
            .lock()
            .await
            .iter()
            .filter(|(id, _)| *id == message_id)
            .map(|(_, at)| *at)
            .collect()
    }
}

#[async_trait]
impl DeliveryQueue for RecordingQueue {
    async fn enqueue(&self, message_id: i64, run_at: DateTime<Utc>) -> Result<(), CadenceError> {
        if self.failing {
            return Err(CadenceError::Internal("job queue unavailable".into()));
        }
        self.jobs.lock().await.push((message_id, run_at));
        Ok(())
    }
}
