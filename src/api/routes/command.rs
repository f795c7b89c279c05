//! Slash command route

use axum::{extract::State, http::StatusCode, Form};
use serde::Deserialize;
use tracing::{info, warn};

use crate::api::AppState;
use crate::command::handle_text;

/// Form body Slack posts for `/bet <text>`
#[derive(Debug, Deserialize)]
pub struct SlashCommand {
    #[serde(default)]
    pub token: String,
    pub user_name: String,
    #[serde(default)]
    pub text: String,
}

/// POST /bet - Run a slash command and reply with its result
pub async fn handle_command(
    State(state): State<AppState>,
    Form(request): Form<SlashCommand>,
) -> (StatusCode, String) {
    if let Some(expected) = &state.config.slack.command_token {
        if &request.token != expected {
            warn!("Slash command from {} carried an invalid token", request.user_name);
            return (
                StatusCode::BAD_REQUEST,
                "Token invalid, contact an admin".to_string(),
            );
        }
    }

    info!("/bet {} (from {})", request.text.trim(), request.user_name);

    match handle_text(
        &state.service,
        &request.user_name,
        &request.text,
        state.config.list_count,
    )
    .await
    {
        Ok(reply) => (StatusCode::OK, reply),
        Err(e) => {
            warn!("Command '{}' from {} failed: {}", request.text.trim(), request.user_name, e);
            (StatusCode::BAD_REQUEST, e.to_string())
        }
    }
}
