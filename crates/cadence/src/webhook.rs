// SPDX-FileCopyrightText: 2026 Cadence Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Inbound SMS webhook.
//!
//! Twilio posts replies to `POST /webhooks/sms` as a form with `From`, `Body`
//! and `MessageSid`. With signature validation on, requests without a valid
//! `X-Twilio-Signature` are rejected with 403.

use std::sync::Arc;

use axum::Router;
use axum::extract::{Form, State};
use axum::http::header::{CONTENT_TYPE, HOST};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use cadence_config::model::CadenceConfig;
use cadence_engine::{Engine, InboundHandler, InboundOutcome};
use chrono::Utc;
use tracing::{debug, error, info, warn};

pub const SMS_PATH: &str = "/webhooks/sms";
const SIGNATURE_HEADER: &str = "x-twilio-signature";
const EMPTY_TWIML: &str = "<?xml version=\"1.0\" encoding=\"UTF-8\"?><Response></Response>";

/// Shared state for the webhook handlers.
#[derive(Clone)]
pub struct WebhookState {
    pub inbound: Arc<InboundHandler>,
    /// `None` disables signature validation.
    pub auth_token: Option<String>,
    /// Externally visible base URL, e.g. `https://sms.example.com`.
    pub public_url: Option<String>,
}

impl WebhookState {
    pub fn from_config(config: &CadenceConfig, engine: &Engine) -> Self {
        let auth_token = if config.twilio.validate_signatures {
            config.twilio.auth_token.clone()
        } else {
            warn!("twilio signature validation disabled");
            None
        };
        Self {
            inbound: Arc::clone(&engine.inbound),
            auth_token,
            public_url: config.webhook.public_url.clone(),
        }
    }

    /// The URL Twilio signed: the public URL when configured, otherwise
    /// rebuilt from the Host header.
    fn signed_url(&self, headers: &HeaderMap) -> Option<String> {
        match &self.public_url {
            Some(base) => Some(format!("{}{SMS_PATH}", base.trim_end_matches('/'))),
            None => headers
                .get(HOST)
                .and_then(|h| h.to_str().ok())
                .map(|host| format!("http://{host}{SMS_PATH}")),
        }
    }
}

/// Build the webhook router.
pub fn router(state: WebhookState) -> Router {
    Router::new()
        .route(SMS_PATH, post(post_sms))
        .with_state(state)
}

fn param<'a>(params: &'a [(String, String)], key: &str) -> Option<&'a str> {
    params
        .iter()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.as_str())
}

fn twiml() -> Response {
    (StatusCode::OK, [(CONTENT_TYPE, "text/xml")], EMPTY_TWIML).into_response()
}

/// POST /webhooks/sms
async fn post_sms(
    State(state): State<WebhookState>,
    headers: HeaderMap,
    Form(params): Form<Vec<(String, String)>>,
) -> Response {
    if let Some(token) = &state.auth_token {
        let signature = headers
            .get(SIGNATURE_HEADER)
            .and_then(|v| v.to_str().ok());
        let valid = match (signature, state.signed_url(&headers)) {
            (Some(signature), Some(url)) => {
                cadence_sms::validate_signature(token, &url, &params, signature)
            }
            _ => false,
        };
        if !valid {
            warn!("inbound webhook rejected: bad or missing signature");
            return StatusCode::FORBIDDEN.into_response();
        }
    }

    let Some(from) = param(&params, "From").filter(|f| !f.trim().is_empty()) else {
        warn!("inbound webhook without a From number");
        return (StatusCode::BAD_REQUEST, "missing From").into_response();
    };
    let body = param(&params, "Body").unwrap_or_default();
    let message_sid = param(&params, "MessageSid");

    match state.inbound.handle(from, body, message_sid, Utc::now()).await {
        Ok(InboundOutcome::OptedOut { cancelled }) => {
            info!(from, cancelled, "opt-out received");
            twiml()
        }
        Ok(outcome) => {
            debug!(from, ?outcome, "inbound message handled");
            twiml()
        }
        Err(e) => {
            error!(from, error = %e, "failed to handle inbound message");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
