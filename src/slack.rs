//! Slack Web API client for channel broadcasts and membership lookups

use crate::config::{SlackApi, SlackConfig};
use crate::services::{with_retry, Notifier, RetryConfig, SlackError};
use anyhow::Result;
use async_trait::async_trait;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::{debug, info};

/// Page size for `conversations.members`
const MEMBERS_PAGE_SIZE: &str = "200";

/// Slack client posting to the configured bet channel
#[derive(Clone)]
pub struct SlackClient {
    client: Client,
    token: String,
    channel: String,
    channel_id: String,
    base_url: String,
    retry: RetryConfig,
}

#[derive(Debug, Deserialize)]
struct MembersResponse {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    members: Vec<String>,
    #[serde(default)]
    response_metadata: Option<ResponseMetadata>,
}

#[derive(Debug, Deserialize)]
struct ResponseMetadata {
    #[serde(default)]
    next_cursor: String,
}

#[derive(Debug, Deserialize)]
struct UserInfoResponse {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
    user: Option<SlackUser>,
}

#[derive(Debug, Deserialize)]
struct SlackUser {
    name: String,
    #[serde(default)]
    deleted: bool,
    #[serde(default)]
    is_bot: bool,
}

impl SlackUser {
    fn is_person(&self) -> bool {
        !self.deleted && !self.is_bot
    }
}

/// Response types that carry Slack's `ok`/`error` envelope
trait Envelope {
    fn into_result(self, status: u16) -> Result<Self, SlackError>
    where
        Self: Sized;
}

macro_rules! impl_envelope {
    ($ty:ty) => {
        impl Envelope for $ty {
            fn into_result(self, status: u16) -> Result<Self, SlackError> {
                if self.ok {
                    Ok(self)
                } else {
                    Err(SlackError::from_code(status, self.error.as_deref().unwrap_or("unknown_error")))
                }
            }
        }
    };
}

impl_envelope!(MembersResponse);
impl_envelope!(UserInfoResponse);

#[derive(Debug, Deserialize)]
struct PostMessageResponse {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
}

impl_envelope!(PostMessageResponse);

impl SlackClient {
    /// Create a client from config. Returns `None` without a bot token.
    pub fn from_config(config: &SlackConfig) -> Option<Self> {
        let token = config.post_token.clone()?;
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_default();
        Some(Self {
            client,
            token,
            channel: config.channel.clone(),
            channel_id: config.channel_id.clone(),
            base_url: config.api_base_url.clone(),
            retry: RetryConfig::default(),
        })
    }

    /// Post a message to the bet channel
    pub async fn post_message(&self, text: &str) -> Result<(), SlackError> {
        let url = SlackApi::post_message_url(&self.base_url);
        let body = json!({
            "channel": self.channel,
            "text": text,
        });

        with_retry(&self.retry, "chat.postMessage", || async {
            let response = self
                .client
                .post(&url)
                .bearer_auth(&self.token)
                .json(&body)
                .send()
                .await
                .map_err(|e| SlackError::from_network_error(&e))?;
            read_envelope::<PostMessageResponse>(response).await
        })
        .await?;

        info!("Slack message posted to {}", self.channel);
        Ok(())
    }

    /// User names of all active, non-bot members of the bet channel
    pub async fn channel_members(&self) -> Result<Vec<String>, SlackError> {
        let member_ids = self.channel_member_ids().await?;
        let url = SlackApi::user_info_url(&self.base_url);

        let mut names = Vec::with_capacity(member_ids.len());
        for user_id in &member_ids {
            let info: UserInfoResponse = with_retry(&self.retry, "users.info", || async {
                let response = self
                    .client
                    .get(&url)
                    .bearer_auth(&self.token)
                    .query(&[("user", user_id.as_str())])
                    .send()
                    .await
                    .map_err(|e| SlackError::from_network_error(&e))?;
                read_envelope::<UserInfoResponse>(response).await
            })
            .await?;

            match info.user {
                Some(user) if user.is_person() => names.push(user.name),
                _ => debug!("Skipping Slack member {}", user_id),
            }
        }

        Ok(names)
    }

    async fn channel_member_ids(&self) -> Result<Vec<String>, SlackError> {
        let url = SlackApi::conversation_members_url(&self.base_url);
        let mut ids = Vec::new();
        let mut cursor = String::new();

        loop {
            let page: MembersResponse = with_retry(&self.retry, "conversations.members", || async {
                let mut query = vec![
                    ("channel", self.channel_id.as_str()),
                    ("limit", MEMBERS_PAGE_SIZE),
                ];
                if !cursor.is_empty() {
                    query.push(("cursor", cursor.as_str()));
                }
                let response = self
                    .client
                    .get(&url)
                    .bearer_auth(&self.token)
                    .query(&query)
                    .send()
                    .await
                    .map_err(|e| SlackError::from_network_error(&e))?;
                read_envelope::<MembersResponse>(response).await
            })
            .await?;

            ids.extend(page.members);
            cursor = page
                .response_metadata
                .map(|m| m.next_cursor)
                .unwrap_or_default();
            if cursor.is_empty() {
                break;
            }
        }

        Ok(ids)
    }
}

async fn read_envelope<T>(response: reqwest::Response) -> Result<T, SlackError>
where
    T: DeserializeOwned + Envelope,
{
    let status = response.status().as_u16();
    let retry_after = retry_after(response.headers());
    let body = response
        .text()
        .await
        .map_err(|e| SlackError::from_network_error(&e))?;
    if !(200..300).contains(&status) {
        return Err(SlackError::from_response(status, &body).with_retry_after(retry_after));
    }
    parse_envelope(status, &body)
}

/// `Retry-After` in whole seconds, as Slack sends it with a 429
fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

fn parse_envelope<T>(status: u16, body: &str) -> Result<T, SlackError>
where
    T: DeserializeOwned + Envelope,
{
    let parsed: T = serde_json::from_str(body).map_err(|_| SlackError::from_response(status, body))?;
    parsed.into_result(status)
}

#[async_trait]
impl Notifier for SlackClient {
    async fn send_broadcast(&self, text: &str) -> Result<()> {
        self.post_message(text).await?;
        Ok(())
    }

    async fn list_members(&self) -> Result<Vec<String>> {
        Ok(self.channel_members().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    #[test]
    fn test_from_config_needs_token() {
        assert!(SlackClient::from_config(&SlackConfig::default()).is_none());

        let config = SlackConfig {
            post_token: Some("xoxb-test".to_string()),
            ..SlackConfig::default()
        };
        assert!(SlackClient::from_config(&config).is_some());
    }

    #[test]
    fn test_parse_members_page() {
        let body = r#"{"ok":true,"members":["U1","U2"],"response_metadata":{"next_cursor":"abc"}}"#;
        let page: MembersResponse = parse_envelope(200, body).unwrap();
        assert_eq!(page.members, vec!["U1", "U2"]);
        assert_eq!(page.response_metadata.unwrap().next_cursor, "abc");
    }

    #[test]
    fn test_parse_error_envelope() {
        let body = r#"{"ok":false,"error":"channel_not_found"}"#;
        let err = parse_envelope::<MembersResponse>(200, body).unwrap_err();
        assert_eq!(err, SlackError::ChannelNotFound);
    }

    #[test]
    fn test_retry_after_header() {
        let mut headers = HeaderMap::new();
        assert_eq!(retry_after(&headers), None);

        headers.insert(RETRY_AFTER, HeaderValue::from_static("12"));
        assert_eq!(retry_after(&headers), Some(Duration::from_secs(12)));

        headers.insert(RETRY_AFTER, HeaderValue::from_static("Wed, 21 Oct 2015 07:28:00 GMT"));
        assert_eq!(retry_after(&headers), None);
    }

    #[test]
    fn test_bots_and_deleted_users_skipped() {
        let body = r#"{"ok":true,"user":{"name":"helperbot","deleted":false,"is_bot":true}}"#;
        let info: UserInfoResponse = parse_envelope(200, body).unwrap();
        assert!(!info.user.unwrap().is_person());

        let body = r#"{"ok":true,"user":{"name":"ayse"}}"#;
        let info: UserInfoResponse = parse_envelope(200, body).unwrap();
        assert!(info.user.unwrap().is_person());
    }
}
