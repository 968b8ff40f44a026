// SPDX-FileCopyrightText: 2026 Cadence Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Twilio integration for Cadence.
//!
//! [`TwilioGateway`] implements `SmsGateway` over the Twilio Messages REST
//! API. The [`signature`] module validates `X-Twilio-Signature` headers on
//! inbound webhooks.

pub mod signature;
pub mod twilio;

pub use signature::{compute_signature, validate_signature};
pub use twilio::TwilioGateway;
