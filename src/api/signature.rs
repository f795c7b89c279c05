//! Slack request signature verification
//!
//! Slack signs every request with `v0=HMAC-SHA256(secret, "v0:{ts}:{body}")`.
//! Requests whose timestamp is more than five minutes off are rejected.

use crate::api::AppState;
use axum::{
    body::{to_bytes, Body},
    extract::{Request, State},
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use chrono::Utc;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use thiserror::Error;
use tracing::warn;

type HmacSha256 = Hmac<Sha256>;

pub const TIMESTAMP_HEADER: &str = "x-slack-request-timestamp";
pub const SIGNATURE_HEADER: &str = "x-slack-signature";

const MAX_CLOCK_SKEW_SECS: u64 = 5 * 60;
const MAX_BODY_BYTES: usize = 64 * 1024;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SignatureError {
    #[error("missing {0} header")]
    MissingHeader(&'static str),
    #[error("invalid request timestamp")]
    InvalidTimestamp,
    #[error("request timestamp is too old")]
    Expired,
    #[error("signature mismatch")]
    Mismatch,
    #[error("invalid signing secret")]
    InvalidSecret,
}

/// Compute the `v0=` signature for a request body
pub fn sign(secret: &str, timestamp: &str, body: &[u8]) -> Result<String, SignatureError> {
    let mac = new_mac(secret, timestamp, body)?;
    Ok(format!("v0={}", hex::encode(mac.finalize().into_bytes())))
}

fn new_mac(secret: &str, timestamp: &str, body: &[u8]) -> Result<HmacSha256, SignatureError> {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| SignatureError::InvalidSecret)?;
    mac.update(b"v0:");
    mac.update(timestamp.as_bytes());
    mac.update(b":");
    mac.update(body);
    Ok(mac)
}

/// Check a signature against the body, at time `now` (unix seconds)
pub fn verify(
    secret: &str,
    timestamp: &str,
    body: &[u8],
    signature: &str,
    now: i64,
) -> Result<(), SignatureError> {
    let ts: i64 = timestamp.parse().map_err(|_| SignatureError::InvalidTimestamp)?;
    if now.abs_diff(ts) > MAX_CLOCK_SKEW_SECS {
        return Err(SignatureError::Expired);
    }

    let provided = signature
        .strip_prefix("v0=")
        .and_then(|h| hex::decode(h).ok())
        .ok_or(SignatureError::Mismatch)?;

    new_mac(secret, timestamp, body)?
        .verify_slice(&provided)
        .map_err(|_| SignatureError::Mismatch)
}

fn header<'a>(headers: &'a HeaderMap, name: &'static str) -> Result<&'a str, SignatureError> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .ok_or(SignatureError::MissingHeader(name))
}

/// Middleware rejecting unsigned or badly signed requests with 401.
/// Passes everything through when no signing secret is configured.
pub async fn verify_slack_signature(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let Some(secret) = state.config.slack.signing_secret.as_deref() else {
        return next.run(request).await;
    };

    let (parts, body) = request.into_parts();
    let bytes = match to_bytes(body, MAX_BODY_BYTES).await {
        Ok(b) => b,
        Err(e) => {
            warn!("Failed to read request body: {}", e);
            return StatusCode::BAD_REQUEST.into_response();
        }
    };

    let checked = header(&parts.headers, TIMESTAMP_HEADER).and_then(|ts| {
        let signature = header(&parts.headers, SIGNATURE_HEADER)?;
        verify(secret, ts, &bytes, signature, Utc::now().timestamp())
    });

    if let Err(e) = checked {
        warn!("Rejected slash command: {}", e);
        return (StatusCode::UNAUTHORIZED, e.to_string()).into_response();
    }

    next.run(Request::from_parts(parts, Body::from(bytes))).await
}
