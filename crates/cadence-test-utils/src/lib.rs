// SPDX-FileCopyrightText: 2026 Cadence Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for Cadence integration tests.
//!
//! Provides in-memory and mock adapters for fast, deterministic tests without
//! a database or an SMS provider.
//!
//! # Components
//!
//! - [`MemoryStore`] - `Store` backed by a mutex-guarded in-memory state
//! - [`MockGateway`] - `SmsGateway` with scripted outcomes and captured sends
//! - [`RecordingQueue`] - `DeliveryQueue` that records every enqueue
//! - [`fixtures`] - contacts and a full template catalog

pub mod fixtures;
pub mod memory_store;
pub mod mock_gateway;
pub mod recording_queue;

pub use memory_store::MemoryStore;
pub use mock_gateway::{GatewayScript, MockGateway, SentSms};
pub use recording_queue::RecordingQueue;
