// SPDX-FileCopyrightText: 2026 Cadence Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Base adapter trait that the storage and gateway adapters implement.

use async_trait::async_trait;

use crate::error::CadenceError;
use crate::types::{AdapterType, HealthStatus};

/// The base trait for Cadence adapters.
///
/// Provides identity and health check capabilities for the binary's
/// startup checks and logs.
#[async_trait]
pub trait PluginAdapter: Send + Sync + 'static {
    /// Returns the human-readable name of this adapter instance.
    fn name(&self) -> &str;

    /// Returns the type of adapter (store, gateway).
    fn adapter_type(&self) -> AdapterType;

    /// Performs a health check and returns the adapter's current status.
    async fn health_check(&self) -> Result<HealthStatus, CadenceError>;
}
