// SPDX-FileCopyrightText: 2026 Cadence Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Twilio gateway behaviour against a mock HTTP server.

use cadence_config::model::TwilioConfig;
use cadence_core::{CadenceError, HealthStatus, PluginAdapter, SmsGateway};
use cadence_sms::TwilioGateway;
use wiremock::matchers::{body_string_contains, header, header_exists, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const MESSAGES_PATH: &str = "/2010-04-01/Accounts/AC123/Messages.json";

fn gateway(server: &MockServer) -> TwilioGateway {
    TwilioGateway::new(&TwilioConfig {
        account_sid: Some("AC123".into()),
        auth_token: Some("token".into()),
        from_number: Some("+15550000".into()),
        base_url: server.uri(),
        ..TwilioConfig::default()
    })
    .unwrap()
}

#[tokio::test]
async fn send_posts_form_and_returns_sid() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(MESSAGES_PATH))
        .and(header("content-type", "application/x-www-form-urlencoded"))
        .and(header_exists("authorization"))
        .and(body_string_contains("To=%2B15551234"))
        .and(body_string_contains("From=%2B15550000"))
        .and(body_string_contains("Body=Hi+there"))
        .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({
            "sid": "SM0001",
            "status": "queued"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let sid = gateway(&server).send("+15551234", "Hi there").await.unwrap();
    assert_eq!(sid, "SM0001");
}

#[tokio::test]
async fn server_errors_are_transient() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(MESSAGES_PATH))
        .respond_with(ResponseTemplate::new(503).set_body_string("unavailable"))
        .mount(&server)
        .await;

    let err = gateway(&server).send("+15551234", "hi").await.unwrap_err();
    assert!(err.is_retryable(), "{err}");
}

#[tokio::test]
async fn rate_limit_is_transient() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(MESSAGES_PATH))
        .respond_with(ResponseTemplate::new(429).set_body_json(serde_json::json!({
            "code": 20429,
            "message": "Too Many Requests",
            "status": 429
        })))
        .mount(&server)
        .await;

    let err = gateway(&server).send("+15551234", "hi").await.unwrap_err();
    assert!(matches!(err, CadenceError::TransientDelivery { .. }), "{err}");
}

#[tokio::test]
async fn invalid_number_is_terminal() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(MESSAGES_PATH))
        .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
            "code": 21211,
            "message": "The 'To' number +1555 is not a valid phone number.",
            "status": 400
        })))
        .mount(&server)
        .await;

    let err = gateway(&server).send("+1555", "hi").await.unwrap_err();
    let message = match err {
        CadenceError::TerminalDelivery { message } => message,
        other => panic!("expected terminal error, got {other:?}"),
    };
    assert!(message.contains("21211"));
    assert!(message.contains("invalid"));
}

#[tokio::test]
async fn unsubscribed_recipient_is_terminal() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(MESSAGES_PATH))
        .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
            "code": 21610,
            "message": "Attempt to send to unsubscribed recipient",
            "status": 400
        })))
        .mount(&server)
        .await;

    let err = gateway(&server).send("+15551234", "hi").await.unwrap_err();
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn rejected_credentials_are_a_gateway_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(MESSAGES_PATH))
        .respond_with(ResponseTemplate::new(401).set_body_json(serde_json::json!({
            "code": 20003,
            "message": "Authenticate",
            "status": 401
        })))
        .mount(&server)
        .await;

    let err = gateway(&server).send("+15551234", "hi").await.unwrap_err();
    let message = match err {
        CadenceError::Gateway { message } => message,
        other => panic!("expected gateway error, got {other:?}"),
    };
    assert!(message.contains("20003"), "{message}");
}

#[tokio::test]
async fn unreachable_host_is_transient() {
    let server = MockServer::start().await;
    let uri = server.uri();
    drop(server);

    let gateway = TwilioGateway::new(&TwilioConfig {
        account_sid: Some("AC123".into()),
        auth_token: Some("token".into()),
        from_number: Some("+15550000".into()),
        base_url: uri,
        ..TwilioConfig::default()
    })
    .unwrap();
    let err = gateway.send("+15551234", "hi").await.unwrap_err();
    assert!(err.is_retryable(), "{err}");
}

#[tokio::test]
async fn health_check_reports_bad_credentials() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/2010-04-01/Accounts/AC123.json"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let health = gateway(&server).health_check().await.unwrap();
    assert!(matches!(health, HealthStatus::Unhealthy(_)));
}

#[tokio::test]
async fn health_check_ok() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/2010-04-01/Accounts/AC123.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "sid": "AC123",
            "status": "active"
        })))
        .mount(&server)
        .await;

    assert_eq!(
        gateway(&server).health_check().await.unwrap(),
        HealthStatus::Healthy
    );
}
