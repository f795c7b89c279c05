//! Web API module for the betting bot
//!
//! Receives Slack slash commands over HTTP.

pub mod routes;
pub mod server;
pub mod signature;

pub use server::{create_app, AppState};
