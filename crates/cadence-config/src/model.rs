// SPDX-FileCopyrightText: 2026 Cadence Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the Cadence follow-up engine.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup, providing actionable error messages.

use serde::{Deserialize, Serialize};

/// Top-level Cadence configuration.
///
/// Loaded from TOML files following XDG hierarchy, with environment variable overrides.
/// All sections are optional and default to sensible values.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct CadenceConfig {
    /// Service identity and logging.
    #[serde(default)]
    pub service: ServiceConfig,

    /// Storage backend settings.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Legal sending window.
    #[serde(default)]
    pub compliance: ComplianceConfig,

    /// Timetable construction.
    #[serde(default)]
    pub schedule: ScheduleConfig,

    /// Claiming, retry and trigger settings.
    #[serde(default)]
    pub delivery: DeliveryConfig,

    /// Message body rendering.
    #[serde(default)]
    pub render: RenderConfig,

    /// Twilio gateway credentials.
    #[serde(default)]
    pub twilio: TwilioConfig,

    /// Inbound webhook listener.
    #[serde(default)]
    pub webhook: WebhookConfig,
}

/// Service identity configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ServiceConfig {
    /// Name used in logs.
    #[serde(default = "default_service_name")]
    pub name: String,

    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: default_service_name(),
            log_level: default_log_level(),
        }
    }
}

fn default_service_name() -> String {
    "cadence".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Storage backend configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// Enable WAL (Write-Ahead Logging) mode for SQLite.
    #[serde(default = "default_wal_mode")]
    pub wal_mode: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            wal_mode: default_wal_mode(),
        }
    }
}

fn default_database_path() -> String {
    "cadence.db".to_string()
}

fn default_wal_mode() -> bool {
    true
}

/// Compliance window configuration.
///
/// Sending is allowed when `start_hour <= local hour < end_hour` in the
/// recipient's timezone.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ComplianceConfig {
    /// First local hour at which sending is allowed.
    #[serde(default = "default_start_hour")]
    pub start_hour: u32,

    /// Local hour at which sending stops (exclusive).
    #[serde(default = "default_end_hour")]
    pub end_hour: u32,

    /// IANA timezone assigned to contacts whose ZIP or region cannot be resolved.
    #[serde(default = "default_timezone")]
    pub default_timezone: String,

    /// Deferrals after which a touchpoint is marked FAILED. `None` defers forever.
    #[serde(default)]
    pub max_deferrals: Option<u32>,
}

impl Default for ComplianceConfig {
    fn default() -> Self {
        Self {
            start_hour: default_start_hour(),
            end_hour: default_end_hour(),
            default_timezone: default_timezone(),
            max_deferrals: None,
        }
    }
}

fn default_start_hour() -> u32 {
    8
}

fn default_end_hour() -> u32 {
    21
}

fn default_timezone() -> String {
    "America/New_York".to_string()
}

/// Timetable configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ScheduleConfig {
    /// Hours after the window opens at which days 1..28 are sent.
    #[serde(default = "default_send_hour_offset")]
    pub send_hour_offset: u32,

    /// Fixed RNG seed for variant selection. Random when unset.
    #[serde(default)]
    pub variant_seed: Option<u64>,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            send_hour_offset: default_send_hour_offset(),
            variant_seed: None,
        }
    }
}

fn default_send_hour_offset() -> u32 {
    2
}

/// How due touchpoints are triggered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TriggerMode {
    /// In-process delayed-job timer plus the periodic sweep.
    Timer,
    /// Periodic sweep only.
    Sweep,
}

/// Delivery coordinator configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct DeliveryConfig {
    /// Gateway attempts before a touchpoint is marked FAILED.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay before retrying after a transient failure.
    #[serde(default = "default_retry_backoff_secs")]
    pub retry_backoff_secs: u64,

    /// Age after which a PROCESSING claim is considered abandoned.
    #[serde(default = "default_stale_after_secs")]
    pub stale_after_secs: u64,

    /// Upper bound on a single gateway call.
    #[serde(default = "default_send_timeout_secs")]
    pub send_timeout_secs: u64,

    /// Period of the polling sweep.
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,

    /// Rows claimed per sweep.
    #[serde(default = "default_sweep_batch_size")]
    pub sweep_batch_size: usize,

    /// Concurrent timer-triggered dispatches.
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Trigger mode.
    #[serde(default = "default_trigger")]
    pub trigger: TriggerMode,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            retry_backoff_secs: default_retry_backoff_secs(),
            stale_after_secs: default_stale_after_secs(),
            send_timeout_secs: default_send_timeout_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
            sweep_batch_size: default_sweep_batch_size(),
            workers: default_workers(),
            trigger: default_trigger(),
        }
    }
}

fn default_max_attempts() -> u32 {
    2
}

fn default_retry_backoff_secs() -> u64 {
    300
}

fn default_stale_after_secs() -> u64 {
    900
}

fn default_send_timeout_secs() -> u64 {
    30
}

fn default_sweep_interval_secs() -> u64 {
    60
}

fn default_sweep_batch_size() -> usize {
    10
}

fn default_workers() -> usize {
    5
}

fn default_trigger() -> TriggerMode {
    TriggerMode::Timer
}

/// Message renderer configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RenderConfig {
    /// Transport byte limit for one message body.
    #[serde(default = "default_max_bytes")]
    pub max_bytes: usize,

    /// Regex matching the tracking link that truncation must keep.
    #[serde(default = "default_link_pattern")]
    pub link_pattern: String,

    /// Opt-out notice that truncation must keep.
    #[serde(default = "default_opt_out_notice")]
    pub opt_out_notice: String,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            max_bytes: default_max_bytes(),
            link_pattern: default_link_pattern(),
            opt_out_notice: default_opt_out_notice(),
        }
    }
}

fn default_max_bytes() -> usize {
    160
}

fn default_link_pattern() -> String {
    r"quotingfast\.io/[A-Za-z0-9]+".to_string()
}

fn default_opt_out_notice() -> String {
    "\u{2013}Quoting Fast STOP".to_string()
}

/// Twilio gateway configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct TwilioConfig {
    /// Account SID. `None` disables sending.
    #[serde(default)]
    pub account_sid: Option<String>,

    /// Auth token, also used to validate webhook signatures.
    #[serde(default)]
    pub auth_token: Option<String>,

    /// Sender number in E.164 format.
    #[serde(default)]
    pub from_number: Option<String>,

    /// REST API base URL.
    #[serde(default = "default_twilio_base_url")]
    pub base_url: String,

    /// Reject inbound webhooks without a valid `X-Twilio-Signature`.
    #[serde(default = "default_validate_signatures")]
    pub validate_signatures: bool,
}

impl Default for TwilioConfig {
    fn default() -> Self {
        Self {
            account_sid: None,
            auth_token: None,
            from_number: None,
            base_url: default_twilio_base_url(),
            validate_signatures: default_validate_signatures(),
        }
    }
}

fn default_twilio_base_url() -> String {
    "https://api.twilio.com".to_string()
}

fn default_validate_signatures() -> bool {
    true
}

/// Inbound webhook listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct WebhookConfig {
    /// Start the inbound webhook server with `serve`.
    #[serde(default)]
    pub enabled: bool,

    /// Address to bind.
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    /// Port to bind.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Public URL Twilio posts to. Required for signature validation behind a proxy.
    #[serde(default)]
    pub public_url: Option<String>,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            bind_address: default_bind_address(),
            port: default_port(),
            public_url: None,
        }
    }
}

fn default_bind_address() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3080
}
