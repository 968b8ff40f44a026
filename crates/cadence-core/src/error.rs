// SPDX-FileCopyrightText: 2026 Cadence Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Cadence follow-up engine.

use thiserror::Error;

/// The primary error type used across all Cadence adapter traits and engine operations.
#[derive(Debug, Error)]
pub enum CadenceError {
    /// Configuration errors (invalid TOML, bad compliance hours, unparsable patterns).
    #[error("configuration error: {0}")]
    Config(String),

    /// Storage backend errors (database connection, query failure, row decoding).
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// A template required for a touchpoint is missing or inactive.
    ///
    /// Non-fatal: the affected day is skipped and reported.
    #[error("template error for day {day}: {message}")]
    Template { day: u32, message: String },

    /// The gateway could not deliver right now (timeout, 5xx, rate limit, network).
    #[error("transient delivery failure: {message}")]
    TransientDelivery {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The gateway rejected the message permanently (invalid or blocked number).
    #[error("terminal delivery failure: {message}")]
    TerminalDelivery { message: String },

    /// Operation timed out.
    #[error("operation timed out after {duration:?}")]
    Timeout { duration: std::time::Duration },

    /// A referenced entity does not exist.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// Gateway adapter errors unrelated to a specific delivery (bad credentials config,
    /// webhook signature mismatch).
    #[error("gateway error: {message}")]
    Gateway { message: String },

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl CadenceError {
    /// Whether a delivery attempt that produced this error may be retried.
    ///
    /// Terminal gateway rejections are the only delivery errors that never retry.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            CadenceError::TransientDelivery { .. } | CadenceError::Timeout { .. }
        )
    }

    /// Convenience constructor for storage errors built from a message.
    pub fn storage(message: impl Into<String>) -> Self {
        let message: String = message.into();
        CadenceError::Storage {
            source: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_and_timeout_are_retryable() {
        let transient = CadenceError::TransientDelivery {
            message: "503".into(),
            source: None,
        };
        let timeout = CadenceError::Timeout {
            duration: std::time::Duration::from_secs(30),
        };
        assert!(transient.is_retryable());
        assert!(timeout.is_retryable());
    }

    #[test]
    fn terminal_and_storage_are_not_retryable() {
        let terminal = CadenceError::TerminalDelivery {
            message: "invalid number".into(),
        };
        assert!(!terminal.is_retryable());
        assert!(!CadenceError::storage("disk full").is_retryable());
        assert!(!CadenceError::Config("bad".into()).is_retryable());
    }

    #[test]
    fn display_includes_context() {
        let err = CadenceError::Template {
            day: 7,
            message: "no active variants".into(),
        };
        assert_eq!(err.to_string(), "template error for day 7: no active variants");

        let err = CadenceError::NotFound {
            entity: "contact",
            id: "c-1".into(),
        };
        assert_eq!(err.to_string(), "contact not found: c-1");
    }
}
