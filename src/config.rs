//! Configuration management for the betting bot

use crate::codec::GuessCipher;
use anyhow::{Context, Result};
use std::env;

/// Bot configuration loaded from environment
#[derive(Debug, Clone)]
pub struct Config {
    /// Users allowed to start/end bets and record winner scores (matched case-insensitively)
    pub admins: Vec<String>,

    /// SQLite connection string for the bet store
    pub database_path: String,

    /// Key for encrypting stored guesses (optional, 16/24/32 bytes)
    pub encryption_key: Option<String>,

    /// Address the webhook server binds to
    pub bind_addr: String,

    /// Port the webhook server listens on
    pub port: u16,

    /// How many recent bets `list` shows
    pub list_count: usize,

    /// How many recent bets `info <month>` searches
    pub month_scan_depth: usize,

    /// Slack settings
    pub slack: SlackConfig,
}

#[derive(Debug, Clone)]
pub struct SlackConfig {
    /// Bot token used to post messages and read channel membership
    pub post_token: Option<String>,
    /// Channel name broadcasts are posted to
    pub channel: String,
    /// Channel ID used for membership lookups
    pub channel_id: String,
    /// Legacy verification token sent with every slash command
    pub command_token: Option<String>,
    /// Signing secret for `X-Slack-Signature` verification
    pub signing_secret: Option<String>,
    /// Web API base URL
    pub api_base_url: String,
}

impl Default for SlackConfig {
    fn default() -> Self {
        Self {
            post_token: None,
            channel: "#general".to_string(),
            channel_id: String::new(),
            command_token: None,
            signing_secret: None,
            api_base_url: SlackApi::BASE_URL.to_string(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if present
        dotenvy::dotenv().ok();

        let admins = env::var("BET_ADMINS")
            .map(|v| parse_admins(&v))
            .unwrap_or_default();

        let database_path = env::var("DATABASE_PATH")
            .unwrap_or_else(|_| "sqlite://slackbet.db".to_string());

        let encryption_key = optional_var("BET_ENCRYPTION_KEY");

        let bind_addr = env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0".to_string());

        let port = match env::var("PORT") {
            Ok(v) => v.parse().with_context(|| format!("PORT is not a valid port: {}", v))?,
            Err(_) => 8080,
        };

        let list_count = env::var("BET_LIST_COUNT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(5);

        let month_scan_depth = env::var("BET_MONTH_SCAN_DEPTH")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(12);

        let defaults = SlackConfig::default();
        let slack = SlackConfig {
            post_token: optional_var("SLACK_POST_TOKEN"),
            channel: optional_var("SLACK_CHANNEL").unwrap_or(defaults.channel),
            channel_id: optional_var("SLACK_CHANNEL_ID").unwrap_or(defaults.channel_id),
            command_token: optional_var("SLACK_COMMAND_TOKEN"),
            signing_secret: optional_var("SLACK_SIGNING_SECRET"),
            api_base_url: optional_var("SLACK_API_BASE_URL").unwrap_or(defaults.api_base_url),
        };

        let config = Self {
            admins,
            database_path,
            encryption_key,
            bind_addr,
            port,
            list_count,
            month_scan_depth,
            slack,
        };

        // Validate configuration
        config.cipher()?;

        Ok(config)
    }

    /// Cipher for stored guesses, if an encryption key is configured
    pub fn cipher(&self) -> Result<Option<GuessCipher>> {
        self.encryption_key
            .as_deref()
            .map(GuessCipher::new)
            .transpose()
            .context("BET_ENCRYPTION_KEY is invalid")
    }

    /// Check if incoming slash commands can be verified at all
    pub fn can_verify_commands(&self) -> bool {
        self.slack.command_token.is_some() || self.slack.signing_secret.is_some()
    }
}

fn optional_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|s| !s.is_empty())
}

fn parse_admins(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Slack Web API endpoints
pub struct SlackApi;

impl SlackApi {
    pub const BASE_URL: &'static str = "https://slack.com/api";

    pub fn post_message_url(base: &str) -> String {
        format!("{}/chat.postMessage", base.trim_end_matches('/'))
    }

    pub fn conversation_members_url(base: &str) -> String {
        format!("{}/conversations.members", base.trim_end_matches('/'))
    }

    pub fn user_info_url(base: &str) -> String {
        format!("{}/users.info", base.trim_end_matches('/'))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_admins() {
        assert_eq!(parse_admins(" alice, Bob ,,carol"), vec!["alice", "Bob", "carol"]);
        assert!(parse_admins("").is_empty());
    }

    #[test]
    fn test_api_urls() {
        assert_eq!(
            SlackApi::post_message_url("https://slack.com/api/"),
            "https://slack.com/api/chat.postMessage"
        );
        assert_eq!(
            SlackApi::user_info_url(SlackApi::BASE_URL),
            "https://slack.com/api/users.info"
        );
    }

    #[test]
    fn test_cipher_validation() {
        let mut config = Config {
            admins: vec![],
            database_path: "sqlite::memory:".to_string(),
            encryption_key: None,
            bind_addr: "127.0.0.1".to_string(),
            port: 8080,
            list_count: 5,
            month_scan_depth: 12,
            slack: SlackConfig::default(),
        };
        assert!(config.cipher().unwrap().is_none());
        assert!(!config.can_verify_commands());

        config.encryption_key = Some("too-short".to_string());
        assert!(config.cipher().is_err());

        config.encryption_key = Some("0123456789abcdef".to_string());
        assert!(config.cipher().unwrap().is_some());
    }
}
