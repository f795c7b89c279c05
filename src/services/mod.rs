//! Bet lifecycle and its background collaborators

pub mod bet_service;
pub mod broadcast;
pub mod notifier;
pub mod retry;
pub mod slack_errors;

pub use bet_service::{BetService, BetSettings};
pub use broadcast::Broadcaster;
pub use notifier::{ConsoleNotifier, Notifier};
pub use retry::{with_retry, RetryConfig};
pub use slack_errors::SlackError;
