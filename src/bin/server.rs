//! Slack Betting Pool Web Server
//!
//! Receives `/bet` slash commands from Slack.

use anyhow::{bail, Result};
use slackbet::api::{create_app, AppState};
use slackbet::{Config, ConsoleNotifier, Notifier, SlackClient};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // Default to info for this crate; override with RUST_LOG
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn,slackbet=info,tower_http=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();

    // Load configuration
    let config = Config::from_env()?;

    if !config.can_verify_commands() {
        bail!("Set SLACK_COMMAND_TOKEN or SLACK_SIGNING_SECRET before exposing the /bet endpoint");
    }

    let notifier: Arc<dyn Notifier> = match SlackClient::from_config(&config.slack) {
        Some(client) => Arc::new(client),
        None => {
            warn!("SLACK_POST_TOKEN not set, broadcasts go to stdout");
            Arc::new(ConsoleNotifier)
        }
    };

    println!();
    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║       SLACK BETTING POOL - WEB SERVER                        ║");
    println!("╠══════════════════════════════════════════════════════════════╣");
    println!("║  Channel: {:<50} ║", config.slack.channel);
    println!("║  Admins: {:<51} ║", config.admins.len());
    println!("║  Guess Encryption: {:<41} ║", if config.encryption_key.is_some() { "ENABLED" } else { "DISABLED" });
    println!("║  Request Signing: {:<42} ║", if config.slack.signing_secret.is_some() { "ENABLED" } else { "TOKEN ONLY" });
    println!("╚══════════════════════════════════════════════════════════════╝");
    println!();

    info!("Initializing application state...");
    let addr = format!("{}:{}", config.bind_addr, config.port);
    let state = AppState::new(config, notifier).await?;
    let service = state.service.clone();

    let app = create_app(state);
    let listener = TcpListener::bind(&addr).await?;

    println!("  Slash command: http://{}/bet", addr);
    println!("  Health:        http://{}/health", addr);
    println!();

    info!("Server listening on {}", addr);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Shutting down, waiting for pending broadcasts...");
    service.flush_broadcasts().await;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
}
