// SPDX-FileCopyrightText: 2026 Cadence Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock SMS gateway for deterministic testing.
//!
//! `MockGateway` implements `SmsGateway` with a queue of scripted outcomes
//! and captures every call for assertion in tests.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;

use cadence_core::{AdapterType, CadenceError, HealthStatus, PluginAdapter, SmsGateway};

/// Outcome of one scripted `send` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayScript {
    /// Succeed with a generated message id.
    Accept,
    /// Fail with a transient error.
    Transient(String),
    /// Fail with a terminal error.
    Terminal(String),
    /// Fail with an account-level gateway error, e.g. rejected credentials.
    Unavailable(String),
    /// Never answer within any reasonable timeout.
    Hang,
}

/// A captured `send` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentSms {
    pub to: String,
    pub body: String,
}

/// A mock SMS gateway.
///
/// Scripted outcomes are consumed in order; once the script is empty every
/// call succeeds. Every call, successful or not, is captured.
#[derive(Clone)]
pub struct MockGateway {
    script: Arc<Mutex<VecDeque<GatewayScript>>>,
    calls: Arc<Mutex<Vec<SentSms>>>,
}

impl MockGateway {
    pub fn new() -> Self {
        Self {
            script: Arc::new(Mutex::new(VecDeque::new())),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Create a gateway that plays `outcomes` before succeeding.
    pub fn with_script(outcomes: impl IntoIterator<Item = GatewayScript>) -> Self {
        Self {
            script: Arc::new(Mutex::new(outcomes.into_iter().collect())),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Append an outcome to the script.
    pub async fn push(&self, outcome: GatewayScript) {
        self.script.lock().await.push_back(outcome);
    }

    /// All calls made so far, in order.
    pub async fn calls(&self) -> Vec<SentSms> {
        self.calls.lock().await.clone()
    }

    pub async fn call_count(&self) -> usize {
        self.calls.lock().await.len()
    }
}

impl Default for MockGateway {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PluginAdapter for MockGateway {
    fn name(&self) -> &str {
        "mock-gateway"
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Gateway
    }

    async fn health_check(&self) -> Result<HealthStatus, CadenceError> {
        Ok(HealthStatus::Healthy)
    }
}

#[async_trait]
impl SmsGateway for MockGateway {
    async fn send(&self, to: &str, body: &str) -> Result<String, CadenceError> {
        self.calls.lock().await.push(SentSms {
            to: to.to_string(),
            body: body.to_string(),
        });
        let next = self.script.lock().await.pop_front();
        match next.unwrap_or(GatewayScript::Accept) {
            GatewayScript::Accept => Ok(format!("SM{}", uuid::Uuid::new_v4().simple())),
            GatewayScript::Transient(message) => Err(CadenceError::TransientDelivery {
                message,
                source: None,
            }),
            GatewayScript::Terminal(message) => Err(CadenceError::TerminalDelivery { message }),
            GatewayScript::Unavailable(message) => Err(CadenceError::Gateway { message }),
            GatewayScript::Hang => {
                tokio::time::sleep(Duration::from_secs(24 * 60 * 60)).await;
                Err(CadenceError::Internal("mock gateway hang elapsed".into()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn plays_script_then_accepts() {
        let gateway = MockGateway::with_script([
            GatewayScript::Transient("503".into()),
            GatewayScript::Terminal("21211".into()),
        ]);

        let first = gateway.send("+15550001", "a").await.unwrap_err();
        assert!(first.is_retryable());
        let second = gateway.send("+15550001", "b").await.unwrap_err();
        assert!(!second.is_retryable());
        let third = gateway.send("+15550001", "c").await.unwrap();
        assert!(third.starts_with("SM"));

        let calls = gateway.calls().await;
        assert_eq!(calls.len(), 3);
        assert_eq!(calls[2].body, "c");
    }

    #[tokio::test]
    async fn clones_share_state() {
        let gateway = MockGateway::new();
        let clone = gateway.clone();
        clone.push(GatewayScript::Transient("429".into())).await;
        assert!(gateway.send("+1", "x").await.is_err());
        assert_eq!(clone.call_count().await, 1);
    }
}
