// SPDX-FileCopyrightText: 2026 Cadence Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Outbound SMS transport trait.

use async_trait::async_trait;

use crate::error::CadenceError;
use crate::traits::adapter::PluginAdapter;

/// Adapter for an external SMS gateway.
///
/// Implementations classify failures: [`CadenceError::TransientDelivery`] for
/// timeouts, rate limits and 5xx responses, [`CadenceError::TerminalDelivery`]
/// for permanently undeliverable numbers. The engine calls `send` at most once
/// per claim and never cancels an issued call.
#[async_trait]
pub trait SmsGateway: PluginAdapter {
    /// Sends `body` to the E.164 number `to`. Returns the gateway's message id.
    async fn send(&self, to: &str, body: &str) -> Result<String, CadenceError>;
}
