//! Webhook request signatures
//!
//! `x-signature = hex(HMAC-SHA256(secret, x-timestamp + "." + raw_body))`, where the
//! timestamp is the header value exactly as sent. The `sha256=` prefix is optional.
//!
//! `x-timestamp` is ISO-8601 date-time in extended (`2026-10-17T01:00:00Z`) or basic
//! (`20261017T010000Z`) form, with optional fractional seconds. A value without an
//! offset is read as UTC.

use chrono::{DateTime, NaiveDateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use thiserror::Error;

use super::crypto::constant_time_eq;
use crate::config::SigningConfig;

type HmacSha256 = Hmac<Sha256>;

pub const TIMESTAMP_HEADER: &str = "x-timestamp";
pub const SIGNATURE_HEADER: &str = "x-signature";

const SIGNATURE_PREFIX: &str = "sha256=";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SignatureError {
    #[error("missing x-timestamp header")]
    MissingTimestamp,
    #[error("missing x-signature header")]
    MissingSignature,
    #[error("unparseable timestamp")]
    InvalidTimestamp,
    #[error("timestamp outside the accepted window")]
    StaleTimestamp,
    #[error("signature mismatch")]
    Mismatch,
}

/// Hex HMAC-SHA256 over `timestamp.body`
pub fn compute_signature(secret: &str, timestamp: &str, body: &[u8]) -> String {
    // HMAC accepts keys of any length
    let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => return String::new(),
    };
    mac.update(timestamp.as_bytes());
    mac.update(b".");
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}

/// Verifies signed webhook requests against a per-key secret
#[derive(Debug, Clone)]
pub struct SignatureVerifier {
    time_window_secs: i64,
}

impl SignatureVerifier {
    pub fn new(config: &SigningConfig) -> Self {
        Self {
            time_window_secs: config.time_window_secs as i64,
        }
    }

    pub fn verify(
        &self,
        secret: &str,
        timestamp: Option<&str>,
        signature: Option<&str>,
        body: &[u8],
        now: DateTime<Utc>,
    ) -> Result<(), SignatureError> {
        let timestamp = timestamp.ok_or(SignatureError::MissingTimestamp)?;
        let signature = signature.ok_or(SignatureError::MissingSignature)?;

        let signed_at = parse_timestamp(timestamp).ok_or(SignatureError::InvalidTimestamp)?;

        let skew = (now - signed_at).num_seconds().abs();
        if skew > self.time_window_secs {
            return Err(SignatureError::StaleTimestamp);
        }

        let presented = signature.trim();
        let presented = presented
            .strip_prefix(SIGNATURE_PREFIX)
            .unwrap_or(presented)
            .to_ascii_lowercase();
        let expected = compute_signature(secret, timestamp, body);

        if expected.is_empty() || !constant_time_eq(expected.as_bytes(), presented.as_bytes()) {
            return Err(SignatureError::Mismatch);
        }

        Ok(())
    }
}

const EXTENDED: &str = "%Y-%m-%dT%H:%M:%S%.f";
const BASIC: &str = "%Y%m%dT%H%M%S%.f";

/// Parse an ISO-8601 date-time; no offset means UTC
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }

    if let Some(utc) = raw.strip_suffix(['Z', 'z']) {
        return NaiveDateTime::parse_from_str(utc, BASIC)
            .ok()
            .map(|naive| naive.and_utc());
    }

    for format in [EXTENDED, BASIC] {
        if let Ok(dt) = DateTime::parse_from_str(raw, &format!("{}%z", format)) {
            return Some(dt.with_timezone(&Utc));
        }
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(naive.and_utc());
        }
    }

    None
}
