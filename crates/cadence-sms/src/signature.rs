// SPDX-FileCopyrightText: 2026 Cadence Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `X-Twilio-Signature` computation and validation.
//!
//! The signature is base64(HMAC-SHA1(auth_token, url + k1 + v1 + k2 + v2 ...))
//! with the POST parameters sorted by key.

use base64::Engine as _;
use cadence_core::CadenceError;
use base64::engine::general_purpose::STANDARD;
use hmac::{Hmac, Mac};
use sha1::Sha1;

type HmacSha1 = Hmac<Sha1>;

fn mac_for(
    auth_token: &str,
    url: &str,
    params: &[(String, String)],
) -> Result<HmacSha1, CadenceError> {
    let mut sorted: Vec<&(String, String)> = params.iter().collect();
    sorted.sort();

    let mut mac =
        HmacSha1::new_from_slice(auth_token.as_bytes()).map_err(|e| CadenceError::Gateway {
            message: format!("invalid signing key: {e}"),
        })?;
    mac.update(url.as_bytes());
    for (key, value) in sorted {
        mac.update(key.as_bytes());
        mac.update(value.as_bytes());
    }
    Ok(mac)
}

/// Compute the signature Twilio would send for this request.
pub fn compute_signature(
    auth_token: &str,
    url: &str,
    params: &[(String, String)],
) -> Result<String, CadenceError> {
    let mac = mac_for(auth_token, url, params)?;
    Ok(STANDARD.encode(mac.finalize().into_bytes()))
}

/// Check a received signature in constant time.
pub fn validate_signature(
    auth_token: &str,
    url: &str,
    params: &[(String, String)],
    signature: &str,
) -> bool {
    let Ok(expected) = STANDARD.decode(signature.trim()) else {
        return false;
    };
    mac_for(auth_token, url, params)
        .is_ok_and(|mac| mac.verify_slice(&expected).is_ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    const URL: &str = "https://example.com/webhooks/sms";
    const TOKEN: &str = "secret-token";

    fn params() -> Vec<(String, String)> {
        vec![
            ("MessageSid".into(), "SM123".into()),
            ("From".into(), "+15550100".into()),
            ("Body".into(), "STOP".into()),
        ]
    }

    #[test]
    fn known_signature() {
        assert_eq!(
            compute_signature(TOKEN, URL, &params()).unwrap(),
            "+TeOF0K2zRbFpZS0KjSzk6zziHc="
        );
    }

    #[test]
    fn parameter_order_does_not_matter() {
        let mut reversed = params();
        reversed.reverse();
        assert_eq!(
            compute_signature(TOKEN, URL, &params()).unwrap(),
            compute_signature(TOKEN, URL, &reversed).unwrap()
        );
    }

    #[test]
    fn validates_good_and_rejects_tampered() {
        let signature = compute_signature(TOKEN, URL, &params()).unwrap();
        assert!(validate_signature(TOKEN, URL, &params(), &signature));

        let mut tampered = params();
        tampered[2].1 = "hello".into();
        assert!(!validate_signature(TOKEN, URL, &tampered, &signature));
        assert!(!validate_signature("other-token", URL, &params(), &signature));
        assert!(!validate_signature(
            TOKEN,
            "https://example.com/other",
            &params(),
            &signature
        ));
    }

    #[test]
    fn garbage_signature_is_rejected() {
        assert!(!validate_signature(TOKEN, URL, &params(), "not base64!"));
        assert!(!validate_signature(TOKEN, URL, &params(), ""));
    }
}
