//! Helpers for calling the webhook endpoints

use chrono::{DateTime, Utc};

use leadgate::services::signature::compute_signature;

pub const LEADS_URI: &str = "/api/v1/webhooks/leads";
pub const CONVERSATIONS_URI: &str = "/api/v1/webhooks/conversations";

/// Headers for an unsigned call
pub fn key_headers(api_key: &str) -> Vec<(&'static str, String)> {
    vec![("x-api-key", api_key.to_string())]
}

/// Headers for a call signed at `at`
pub fn signed_headers(
    api_key: &str,
    secret: &str,
    body: &[u8],
    at: DateTime<Utc>,
) -> Vec<(&'static str, String)> {
    signed_with_timestamp(api_key, secret, body, at.to_rfc3339())
}

/// Headers for a call whose `x-timestamp` is exactly `timestamp`
pub fn signed_with_timestamp(
    api_key: &str,
    secret: &str,
    body: &[u8],
    timestamp: String,
) -> Vec<(&'static str, String)> {
    let signature = compute_signature(secret, &timestamp, body);
    vec![
        ("x-api-key", api_key.to_string()),
        ("x-timestamp", timestamp),
        ("x-signature", signature),
    ]
}

/// Headers for a call signed now
pub fn signed_now(api_key: &str, secret: &str, body: &[u8]) -> Vec<(&'static str, String)> {
    signed_headers(api_key, secret, body, Utc::now())
}
