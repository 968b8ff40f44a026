// SPDX-FileCopyrightText: 2026 Cadence Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `SmsGateway` implementation for the Twilio Messages API.
//!
//! Failures are classified for the delivery state machine:
//! - network errors, HTTP 429 and 5xx are transient
//! - HTTP 401/403 and the account codes 20003 (authentication) and 20005
//!   (account not active) are gateway errors; the recipient was never judged
//! - any other 4xx is terminal, including the recipient errors 21211
//!   (invalid number), 21610 (unsubscribed) and 21614 (not a mobile number)

use std::time::Duration;

use async_trait::async_trait;
use cadence_config::model::TwilioConfig;
use cadence_core::{AdapterType, CadenceError, HealthStatus, PluginAdapter, SmsGateway};
use reqwest::StatusCode;
use reqwest::header::CONTENT_TYPE;
use serde::Deserialize;
use tracing::{debug, warn};

const API_VERSION: &str = "2010-04-01";

/// Successful message creation response (fields we use).
#[derive(Debug, Deserialize)]
struct MessageResource {
    sid: String,
}

/// Twilio REST error body.
#[derive(Debug, Deserialize)]
struct ApiError {
    code: Option<u32>,
    message: Option<String>,
}

fn describe_code(code: u32) -> Option<&'static str> {
    match code {
        20003 => Some("authentication failed"),
        20005 => Some("account not active"),
        21211 => Some("invalid 'To' phone number"),
        21610 => Some("recipient has unsubscribed"),
        21614 => Some("'To' number is not a valid mobile number"),
        _ => None,
    }
}

/// Failures of the account or credentials rather than of the recipient.
fn is_account_failure(status: StatusCode, code: Option<u32>) -> bool {
    status == StatusCode::UNAUTHORIZED
        || status == StatusCode::FORBIDDEN
        || matches!(code, Some(20003 | 20005))
}

/// Sends SMS through Twilio.
#[derive(Debug, Clone)]
pub struct TwilioGateway {
    client: reqwest::Client,
    account_sid: String,
    auth_token: String,
    from_number: String,
    base_url: String,
}

impl TwilioGateway {
    /// Build a gateway from configuration. Credentials and the sender number
    /// are required.
    pub fn new(config: &TwilioConfig) -> Result<Self, CadenceError> {
        let required = |value: &Option<String>, key: &str| {
            value
                .as_deref()
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
                .ok_or_else(|| CadenceError::Config(format!("twilio.{key} is required")))
        };
        let account_sid = required(&config.account_sid, "account_sid")?;
        let auth_token = required(&config.auth_token, "auth_token")?;
        let from_number = required(&config.from_number, "from_number")?;

        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| CadenceError::Gateway {
                message: format!("failed to build HTTP client: {e}"),
            })?;

        Ok(Self {
            client,
            account_sid,
            auth_token,
            from_number,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    fn account_url(&self) -> String {
        format!(
            "{}/{API_VERSION}/Accounts/{}",
            self.base_url, self.account_sid
        )
    }

    async fn error_for(&self, status: StatusCode, response: reqwest::Response) -> CadenceError {
        let body = response.text().await.unwrap_or_default();
        let api = serde_json::from_str::<ApiError>(&body).ok();
        let code = api.as_ref().and_then(|e| e.code);
        let detail = api
            .and_then(|e| e.message)
            .unwrap_or_else(|| body.chars().take(200).collect());

        let message = match code {
            Some(code) => {
                let known = describe_code(code).map(|d| format!(" ({d})")).unwrap_or_default();
                format!("twilio {status} code {code}{known}: {detail}")
            }
            None => format!("twilio {status}: {detail}"),
        };

        if is_account_failure(status, code) {
            CadenceError::Gateway { message }
        } else if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
            CadenceError::TransientDelivery {
                message,
                source: None,
            }
        } else if status.is_client_error() {
            CadenceError::TerminalDelivery { message }
        } else {
            // Redirects and other surprises: let the retry policy decide.
            CadenceError::TransientDelivery {
                message,
                source: None,
            }
        }
    }
}

#[async_trait]
impl PluginAdapter for TwilioGateway {
    fn name(&self) -> &str {
        "twilio"
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Gateway
    }

    async fn health_check(&self) -> Result<HealthStatus, CadenceError> {
        let response = self
            .client
            .get(format!("{}.json", self.account_url()))
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .send()
            .await;

        Ok(match response {
            Ok(r) if r.status().is_success() => HealthStatus::Healthy,
            Ok(r) if r.status() == StatusCode::UNAUTHORIZED => {
                HealthStatus::Unhealthy("twilio rejected the account credentials".into())
            }
            Ok(r) => HealthStatus::Degraded(format!("twilio returned {}", r.status())),
            Err(e) => HealthStatus::Unhealthy(format!("twilio unreachable: {e}")),
        })
    }
}

#[async_trait]
impl SmsGateway for TwilioGateway {
    async fn send(&self, to: &str, body: &str) -> Result<String, CadenceError> {
        let form = serde_urlencoded::to_string([
            ("To", to),
            ("From", self.from_number.as_str()),
            ("Body", body),
        ])
        .map_err(|e| CadenceError::Internal(format!("failed to encode message form: {e}")))?;

        let response = self
            .client
            .post(format!("{}/Messages.json", self.account_url()))
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(form)
            .send()
            .await
            .map_err(|e| CadenceError::TransientDelivery {
                message: format!("twilio request failed: {e}"),
                source: Some(Box::new(e)),
            })?;

        let status = response.status();
        debug!(status = %status, to, "twilio response received");

        if !status.is_success() {
            let err = self.error_for(status, response).await;
            warn!(to, error = %err, "twilio send failed");
            return Err(err);
        }

        let resource: MessageResource =
            response
                .json()
                .await
                .map_err(|e| CadenceError::TransientDelivery {
                    message: format!("unreadable twilio response: {e}"),
                    source: Some(Box::new(e)),
                })?;
        Ok(resource.sid)
    }
}
