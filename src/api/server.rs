//! Axum server setup and configuration

use crate::api::{routes, signature};
use crate::services::{BetService, BetSettings, Broadcaster, Notifier};
use crate::{Config, Database};
use anyhow::Result;
use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub service: BetService,
    pub config: Arc<Config>,
}

impl AppState {
    pub async fn new(config: Config, notifier: Arc<dyn Notifier>) -> Result<Self> {
        let db = Database::new(&config.database_path, config.cipher()?).await?;
        Ok(Self::with_database(config, Arc::new(db), notifier))
    }

    pub fn with_database(config: Config, db: Arc<Database>, notifier: Arc<dyn Notifier>) -> Self {
        let settings = BetSettings {
            admins: config.admins.clone(),
            month_scan_depth: config.month_scan_depth,
        };
        let service = BetService::new(db, Broadcaster::new(notifier), settings);

        Self {
            service,
            config: Arc::new(config),
        }
    }
}

/// Create the Axum application with all routes
pub fn create_app(state: AppState) -> Router {
    let bet_routes = Router::new()
        .route("/bet", post(routes::command::handle_command))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            signature::verify_slack_signature,
        ));

    Router::new()
        .merge(bet_routes)
        .route("/health", get(health_check))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Health check endpoint
async fn health_check() -> &'static str {
    "OK"
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::signature::{sign, SIGNATURE_HEADER, TIMESTAMP_HEADER};
    use crate::config::SlackConfig;
    use crate::services::notifier::testing::RecordingNotifier;
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Request, StatusCode};
    use chrono::Utc;
    use tower::ServiceExt;

    fn config(slack: SlackConfig) -> Config {
        Config {
            admins: vec!["admin".to_string()],
            database_path: "sqlite::memory:".to_string(),
            encryption_key: None,
            bind_addr: "127.0.0.1".to_string(),
            port: 0,
            list_count: 5,
            month_scan_depth: 12,
            slack,
        }
    }

    async fn app(slack: SlackConfig) -> Router {
        let db = Arc::new(Database::in_memory(None).await.unwrap());
        let state = AppState::with_database(config(slack), db, Arc::new(RecordingNotifier::default()));
        create_app(state)
    }

    fn token_config() -> SlackConfig {
        SlackConfig {
            command_token: Some("tok".to_string()),
            ..SlackConfig::default()
        }
    }

    fn form(body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/bet")
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn reply(app: &Router, request: Request<Body>) -> (StatusCode, String) {
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, String::from_utf8(bytes.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn test_health() {
        let app = app(token_config()).await;
        let request = Request::builder().uri("/health").body(Body::empty()).unwrap();
        assert_eq!(reply(&app, request).await, (StatusCode::OK, "OK".to_string()));
    }

    #[tokio::test]
    async fn test_command_round_trip() {
        let app = app(token_config()).await;

        let (status, text) = reply(&app, form("token=tok&user_name=admin&text=start")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(text, "started bet[1] successfully");

        let (status, text) = reply(&app, form("token=tok&user_name=ayse&text=save+42+sunny")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(text, "saved successfully");

        let (status, text) = reply(&app, form("token=tok&user_name=ayse&text=end")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(text, "You are not authorized to end a bet.");

        let (status, text) = reply(&app, form("token=tok&user_name=ayse&text=save+lots")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(text, "number is not a valid integer lots");

        let (_, text) = reply(&app, form("token=tok&user_name=ayse&text=info")).await;
        assert!(text.ends_with("(still open)"));

        reply(&app, form("token=tok&user_name=Admin&text=end")).await;
        let (_, text) = reply(&app, form("token=tok&user_name=ayse&text=info")).await;
        assert!(text.contains("1.\tayse\t42\tsunny\n"));
    }

    #[tokio::test]
    async fn test_bad_token_rejected() {
        let app = app(token_config()).await;
        let (status, text) = reply(&app, form("token=nope&user_name=admin&text=start")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(text, "Token invalid, contact an admin");

        let (_, text) = reply(&app, form("token=tok&user_name=admin&text=list")).await;
        assert_eq!(text, "no bets yet");
    }

    #[tokio::test]
    async fn test_signed_requests() {
        let slack = SlackConfig {
            signing_secret: Some("shh".to_string()),
            ..SlackConfig::default()
        };
        let app = app(slack).await;
        let body = "user_name=admin&text=list";

        let (status, _) = reply(&app, form(body)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let ts = Utc::now().timestamp().to_string();
        let mut request = form(body);
        let headers = request.headers_mut();
        headers.insert(TIMESTAMP_HEADER, ts.parse().unwrap());
        headers.insert(
            SIGNATURE_HEADER,
            sign("shh", &ts, body.as_bytes()).unwrap().parse().unwrap(),
        );
        assert_eq!(
            reply(&app, request).await,
            (StatusCode::OK, "no bets yet".to_string())
        );

        let mut request = form(body);
        let headers = request.headers_mut();
        headers.insert(TIMESTAMP_HEADER, ts.parse().unwrap());
        headers.insert(
            SIGNATURE_HEADER,
            sign("wrong", &ts, body.as_bytes()).unwrap().parse().unwrap(),
        );
        assert_eq!(reply(&app, request).await.0, StatusCode::UNAUTHORIZED);
    }
}
