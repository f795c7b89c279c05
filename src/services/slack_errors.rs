//! Slack Web API error classification
//!
//! Slack answers most failures with HTTP 200 and `{"ok": false, "error": "<code>"}`.
//! Both that envelope and raw HTTP failures are folded into [`SlackError`]
//! so callers can decide whether a retry makes sense.

use serde::Deserialize;
use std::fmt;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlackError {
    /// HTTP 429 or `ratelimited`, with Slack's `Retry-After` if it sent one
    RateLimited { retry_after: Option<Duration> },
    /// Token missing, revoked or lacking scopes
    AuthenticationFailed(String),
    /// Channel id/name is wrong or the bot is not a member
    ChannelNotFound,
    /// Timeout, DNS, connection reset
    NetworkError(String),
    /// Slack reported a transient server-side problem
    ServiceUnavailable,
    /// Anything else
    Api { status: u16, code: String },
}

/// Common envelope of every Slack Web API response
#[derive(Debug, Deserialize)]
pub struct SlackEnvelope {
    pub ok: bool,
    #[serde(default)]
    pub error: Option<String>,
}

impl SlackError {
    /// Classify an error code returned in the response envelope
    pub fn from_code(status: u16, code: &str) -> Self {
        match code {
            "ratelimited" | "rate_limited" => SlackError::RateLimited { retry_after: None },
            "not_authed" | "invalid_auth" | "account_inactive" | "token_revoked"
            | "token_expired" | "missing_scope" | "not_allowed_token_type" => {
                SlackError::AuthenticationFailed(code.to_string())
            }
            "channel_not_found" | "not_in_channel" | "is_archived" => SlackError::ChannelNotFound,
            "internal_error" | "fatal_error" | "service_unavailable" | "request_timeout" => {
                SlackError::ServiceUnavailable
            }
            _ => SlackError::Api {
                status,
                code: code.to_string(),
            },
        }
    }

    /// Classify a raw HTTP response body
    pub fn from_response(status: u16, body: &str) -> Self {
        if status == 429 {
            return SlackError::RateLimited { retry_after: None };
        }
        if status >= 500 {
            return SlackError::ServiceUnavailable;
        }
        match serde_json::from_str::<SlackEnvelope>(body) {
            Ok(SlackEnvelope { error: Some(code), .. }) => SlackError::from_code(status, &code),
            _ => SlackError::Api {
                status,
                code: body.chars().take(200).collect(),
            },
        }
    }

    /// Parse a network/reqwest error
    pub fn from_network_error(err: &reqwest::Error) -> Self {
        if err.is_timeout() {
            SlackError::NetworkError("Request timed out".to_string())
        } else if err.is_connect() {
            SlackError::NetworkError("Connection failed".to_string())
        } else {
            SlackError::NetworkError(err.to_string())
        }
    }

    /// Attach the wait Slack asked for. Only rate-limit errors keep it.
    pub fn with_retry_after(self, wait: Option<Duration>) -> Self {
        match self {
            SlackError::RateLimited { .. } => SlackError::RateLimited { retry_after: wait },
            other => other,
        }
    }

    /// How long Slack asked us to back off, if it said
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            SlackError::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }

    /// Whether this error is worth retrying with backoff
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SlackError::RateLimited { .. }
                | SlackError::NetworkError(_)
                | SlackError::ServiceUnavailable
        )
    }
}

impl fmt::Display for SlackError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SlackError::RateLimited { retry_after: Some(wait) } => {
                write!(f, "Slack rate limit hit, retry after {}s", wait.as_secs())
            }
            SlackError::RateLimited { retry_after: None } => write!(f, "Slack rate limit hit"),
            SlackError::AuthenticationFailed(code) => write!(f, "Slack rejected the token ({})", code),
            SlackError::ChannelNotFound => write!(f, "Slack channel not found or bot not a member"),
            SlackError::NetworkError(msg) => write!(f, "Network error talking to Slack: {}", msg),
            SlackError::ServiceUnavailable => write!(f, "Slack is temporarily unavailable"),
            SlackError::Api { status, code } => write!(f, "Slack API error {}: {}", status, code),
        }
    }
}

impl std::error::Error for SlackError {}
