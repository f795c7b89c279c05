//! Slack Betting Pool Library
//!
//! Runs a closest-guess betting pool from a Slack channel:
//!
//! 1. **Lifecycle**: an admin opens a bet, players save numeric guesses,
//!    an admin closes it and later records the real outcome.
//!
//! 2. **Scoring**: the half of the players whose guesses sit closest to the
//!    outcome win. Ties go to whoever guessed first.

pub mod api;
pub mod codec;
pub mod command;
pub mod config;
pub mod db;
pub mod error;
pub mod scoring;
pub mod services;
pub mod slack;
pub mod types;

pub use command::{Command, CommandError, DispatchError};
pub use config::{Config, SlackConfig};
pub use db::Database;
pub use error::{BetError, BetResult};
pub use services::{BetService, BetSettings, Broadcaster, ConsoleNotifier, Notifier};
pub use slack::SlackClient;
pub use types::{BetRef, BetStatus, BetSummary, Guess};
