//! Outbound notification seam
//!
//! The lifecycle service only ever talks to the chat platform through this
//! trait: broadcast a line of text, or list the channel's members.

use anyhow::Result;
use async_trait::async_trait;
use colored::Colorize;

#[async_trait]
pub trait Notifier: Send + Sync {
    /// Post `text` to the bet channel
    async fn send_broadcast(&self, text: &str) -> Result<()>;

    /// User names of everyone in the bet channel
    async fn list_members(&self) -> Result<Vec<String>>;
}

/// Prints broadcasts to stdout. Used by the CLI when no Slack token is set.
#[derive(Debug, Clone, Default)]
pub struct ConsoleNotifier;

#[async_trait]
impl Notifier for ConsoleNotifier {
    async fn send_broadcast(&self, text: &str) -> Result<()> {
        println!("{} {}", "[broadcast]".yellow().bold(), text);
        Ok(())
    }

    async fn list_members(&self) -> Result<Vec<String>> {
        anyhow::bail!("channel membership needs SLACK_POST_TOKEN and SLACK_CHANNEL_ID")
    }
}
