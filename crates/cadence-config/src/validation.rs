// SPDX-FileCopyrightText: 2026 Cadence Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.
//!
//! Validates semantic constraints that cannot be expressed via serde attributes,
//! such as compliance hour ordering, parsable link patterns, and known timezones.

use crate::diagnostic::ConfigError;
use crate::model::CadenceConfig;

/// Validate a deserialized configuration for semantic correctness.
///
/// Returns `Ok(())` if all validations pass, or `Err(Vec<ConfigError>)` with
/// all collected validation errors (does not fail fast).
pub fn validate_config(config: &CadenceConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();
    let mut fail = |message: String| errors.push(ConfigError::Validation { message });

    let compliance = &config.compliance;
    if compliance.start_hour >= compliance.end_hour || compliance.end_hour > 24 {
        fail(format!(
            "compliance hours must satisfy 0 <= start_hour < end_hour <= 24, got {}..{}",
            compliance.start_hour, compliance.end_hour
        ));
    }

    if compliance
        .default_timezone
        .parse::<chrono_tz::Tz>()
        .is_err()
    {
        fail(format!(
            "compliance.default_timezone `{}` is not a known IANA timezone",
            compliance.default_timezone
        ));
    }

    if compliance.max_deferrals == Some(0) {
        fail("compliance.max_deferrals must be at least 1 when set".to_string());
    }

    if compliance.start_hour + config.schedule.send_hour_offset >= compliance.end_hour {
        fail(format!(
            "schedule.send_hour_offset {} puts the send hour outside the compliance window",
            config.schedule.send_hour_offset
        ));
    }

    if config.storage.database_path.trim().is_empty() {
        fail("storage.database_path must not be empty".to_string());
    }

    let delivery = &config.delivery;
    if delivery.max_attempts < 1 {
        fail("delivery.max_attempts must be at least 1".to_string());
    }
    if delivery.sweep_interval_secs == 0 {
        fail("delivery.sweep_interval_secs must be positive".to_string());
    }
    if delivery.sweep_batch_size == 0 {
        fail("delivery.sweep_batch_size must be positive".to_string());
    }
    if delivery.workers == 0 {
        fail("delivery.workers must be positive".to_string());
    }
    if delivery.send_timeout_secs == 0 {
        fail("delivery.send_timeout_secs must be positive".to_string());
    }
    if delivery.stale_after_secs <= delivery.send_timeout_secs {
        fail(format!(
            "delivery.stale_after_secs ({}) must exceed delivery.send_timeout_secs ({})",
            delivery.stale_after_secs, delivery.send_timeout_secs
        ));
    }

    let render = &config.render;
    if let Err(e) = regex::Regex::new(&render.link_pattern) {
        fail(format!("render.link_pattern is not a valid regex: {e}"));
    }
    if render.opt_out_notice.is_empty() {
        fail("render.opt_out_notice must not be empty".to_string());
    }
    if render.max_bytes < render.opt_out_notice.len() + 8 {
        fail(format!(
            "render.max_bytes {} is too small for the opt-out notice",
            render.max_bytes
        ));
    }

    if config.webhook.bind_address.trim().is_empty() {
        fail("webhook.bind_address must not be empty".to_string());
    }
    if config.webhook.enabled
        && config.twilio.validate_signatures
        && config.twilio.auth_token.is_none()
    {
        fail("webhook signature validation requires twilio.auth_token".to_string());
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
