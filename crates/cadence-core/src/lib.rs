// SPDX-FileCopyrightText: 2026 Cadence Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Cadence follow-up engine.
//!
//! This crate provides the foundational trait definitions, error types, and
//! domain types used throughout the Cadence workspace. Storage, SMS transport,
//! timezone resolution and delayed-job triggering are all seams defined here.

pub mod error;
pub mod traits;
pub mod types;

// Re-export key items at crate root for ergonomic imports.
pub use error::CadenceError;
pub use types::{
    AdapterType, CADENCE_DAYS, Contact, ContactProfile, ContactStatus, DeliveryRecord, Direction,
    HealthStatus, MessageStatus, NewDeliveryRecord, NewScheduledMessage, ScheduledMessage,
    Template, Transition,
};

// Re-export all adapter traits at crate root.
pub use traits::{
    DeliveryQueue, FixedTimezoneResolver, NoopQueue, PluginAdapter, SmsGateway, Store,
    TimezoneResolver,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cadence_error_has_all_variants() {
        let _config = CadenceError::Config("test".into());
        let _storage = CadenceError::Storage {
            source: Box::new(std::io::Error::other("test")),
        };
        let _template = CadenceError::Template {
            day: 3,
            message: "test".into(),
        };
        let _transient = CadenceError::TransientDelivery {
            message: "test".into(),
            source: None,
        };
        let _terminal = CadenceError::TerminalDelivery {
            message: "test".into(),
        };
        let _timeout = CadenceError::Timeout {
            duration: std::time::Duration::from_secs(30),
        };
        let _not_found = CadenceError::NotFound {
            entity: "contact",
            id: "c-1".into(),
        };
        let _gateway = CadenceError::Gateway {
            message: "test".into(),
        };
        let _internal = CadenceError::Internal("test".into());
    }

    #[test]
    fn adapter_type_round_trips() {
        use std::str::FromStr;

        for variant in [AdapterType::Store, AdapterType::Gateway] {
            let s = variant.to_string();
            let parsed = AdapterType::from_str(&s).expect("should parse back");
            assert_eq!(variant, parsed);
        }
    }

    #[test]
    fn health_status_variants() {
        let healthy = HealthStatus::Healthy;
        let degraded = HealthStatus::Degraded("slow".into());
        let unhealthy = HealthStatus::Unhealthy("down".into());

        assert_ne!(degraded, healthy);
        assert_ne!(unhealthy, healthy);
    }

    #[tokio::test]
    async fn noop_queue_accepts_everything() {
        let queue = NoopQueue;
        queue.enqueue(42, chrono::Utc::now()).await.unwrap();
    }

    #[test]
    fn all_traits_are_exported() {
        fn _assert_plugin_adapter<T: PluginAdapter>() {}
        fn _assert_store<T: Store>() {}
        fn _assert_gateway<T: SmsGateway>() {}
        fn _assert_resolver<T: TimezoneResolver>() {}
        fn _assert_queue<T: DeliveryQueue>() {}
    }
}
