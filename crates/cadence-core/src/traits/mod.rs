// SPDX-FileCopyrightText: 2026 Cadence Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Adapter trait definitions for the engine's external collaborators.
//!
//! Adapters use `#[async_trait]` for dynamic dispatch compatibility.

pub mod adapter;
pub mod gateway;
pub mod queue;
pub mod store;
pub mod timezone;

pub use adapter::PluginAdapter;
pub use gateway::SmsGateway;
pub use queue::{DeliveryQueue, NoopQueue};
pub use store::Store;
pub use timezone::{FixedTimezoneResolver, TimezoneResolver};
