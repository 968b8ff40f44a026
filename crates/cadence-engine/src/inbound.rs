// SPDX-FileCopyrightText: 2026 Cadence Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Inbound SMS handling: logging replies and honouring opt-out keywords.

use std::sync::Arc;

use cadence_core::{CadenceError, ContactStatus, Direction, NewDeliveryRecord, Store};
use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::cancel::{CancellationService, StatusEffect};

const OPT_OUT_KEYWORDS: [&str; 7] = [
    "stop",
    "unsubscribe",
    "cancel",
    "end",
    "quit",
    "optout",
    "opt out",
];

/// Whether a reply asks to stop receiving messages.
///
/// Keywords match whole words; punctuation separates words like whitespace.
pub fn is_opt_out(text: &str) -> bool {
    let lowered = text.to_lowercase();
    let words: Vec<&str> = lowered
        .split(|c: char| !c.is_alphanumeric())
        .filter(|word| !word.is_empty())
        .collect();
    OPT_OUT_KEYWORDS.iter().any(|keyword| {
        let parts: Vec<&str> = keyword.split(' ').collect();
        words.windows(parts.len()).any(|window| window == parts.as_slice())
    })
}

/// What an inbound message led to.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundOutcome {
    /// Sender is not a known contact.
    UnknownSender,
    /// This message id was already handled; nothing was done.
    Duplicate,
    /// Logged, no action.
    Recorded,
    /// Logged and the contact opted out.
    OptedOut { cancelled: u64 },
}

pub struct InboundHandler {
    store: Arc<dyn Store>,
    cancellation: Arc<CancellationService>,
}

impl InboundHandler {
    pub fn new(store: Arc<dyn Store>, cancellation: Arc<CancellationService>) -> Self {
        Self {
            store,
            cancellation,
        }
    }

    pub async fn handle(
        &self,
        from: &str,
        body: &str,
        external_id: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<InboundOutcome, CadenceError> {
        let Some(contact) = self.store.find_contact_by_phone(from).await? else {
            warn!(from, "inbound message from unknown number ignored");
            return Ok(InboundOutcome::UnknownSender);
        };

        // Twilio retries a webhook until it gets a 2xx, reusing the MessageSid.
        if let Some(id) = external_id {
            if self.store.find_inbound(id).await?.is_some() {
                debug!(
                    contact_id = %contact.id,
                    message_sid = id,
                    "inbound message already handled"
                );
                return Ok(InboundOutcome::Duplicate);
            }
        }

        self.store
            .record_delivery(&NewDeliveryRecord {
                contact_id: contact.id.clone(),
                scheduled_message_id: None,
                direction: Direction::Inbound,
                body: body.to_string(),
                external_id: external_id.map(str::to_string),
                sent_at: now,
            })
            .await?;

        if !is_opt_out(body) {
            info!(contact_id = %contact.id, "inbound message recorded");
            return Ok(InboundOutcome::Recorded);
        }

        let effect = self
            .cancellation
            .apply_status(&contact.id, ContactStatus::OptedOut, now)
            .await?;
        let cancelled = match effect {
            StatusEffect::Cancelled(count) => count,
            _ => 0,
        };
        info!(contact_id = %contact.id, cancelled, "contact opted out by reply");
        Ok(InboundOutcome::OptedOut { cancelled })
    }
}
