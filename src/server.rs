use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use tower_http::trace::TraceLayer;

use crate::agent::claude::ClaudeClient;
use crate::audit::{self, AuditTrail};
use crate::commands::{CommandRegistry, Envelope};
use crate::config::AppConfig;
use crate::deploy::{DeploymentGate, WebhookNotifier};
use crate::error::{AppError, Result};
use crate::platform::github::GitHubPlatform;
use crate::quality::{HeuristicValidator, QualityGate};
use crate::storage;
use crate::workflow::{Orchestrator, WorkflowRepository};

/// Long-lived services built once from configuration.
pub struct Services {
    pub orchestrator: Arc<Orchestrator>,
    pub audit: Arc<dyn AuditTrail>,
    pub deploy: Option<Arc<DeploymentGate>>,
}

impl Services {
    pub async fn from_config(config: &AppConfig) -> Result<Self> {
        let store = storage::from_config(&config.storage).await?;
        let audit = audit::from_config(&config.audit, store.clone())?;

        if config.claude_api_key().is_empty() {
            tracing::warn!("claude.api_key is not set; workflow runs will fail at the first role");
        }
        let executor = Arc::new(ClaudeClient::new(&config.claude));
        let gate = QualityGate::new(Arc::new(HeuristicValidator::new()));

        let mut orchestrator = Orchestrator::new(
            executor,
            audit.clone(),
            WorkflowRepository::new(store).with_max_history(config.storage.max_history),
            gate,
            config.pipeline.clone(),
        );

        let deploy = match &config.github {
            Some(github) => {
                let platform = Arc::new(GitHubPlatform::new(github)?);
                tracing::info!(repo = %platform.repository(), "GitHub integration enabled");
                if config.pipeline.publish {
                    orchestrator = orchestrator.with_publisher(platform.clone());
                }
                let notifier = Arc::new(WebhookNotifier::new(config.deploy.webhook_secret.clone()));
                Some(Arc::new(DeploymentGate::new(
                    platform,
                    notifier,
                    audit.clone(),
                    config.deploy.clone(),
                )))
            }
            None => {
                tracing::info!("No [github] section; publishing and deployment are disabled");
                None
            }
        };

        Ok(Self {
            orchestrator: Arc::new(orchestrator),
            audit,
            deploy,
        })
    }
}

pub struct AppState {
    pub commands: CommandRegistry,
}

impl AppState {
    pub async fn new(config: &AppConfig) -> Result<Self> {
        let services = Services::from_config(config).await?;
        Ok(Self::from_services(services))
    }

    pub fn from_services(services: Services) -> Self {
        Self {
            commands: CommandRegistry::standard(
                services.orchestrator,
                services.audit,
                services.deploy,
            ),
        }
    }
}

pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/commands/:action", post(handle_command))
        .route("/health", get(health_check))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// HTTP status for a failed command.
pub fn status_for(error: &AppError) -> StatusCode {
    match error.kind() {
        "input_validation" => StatusCode::BAD_REQUEST,
        "precondition" => StatusCode::PRECONDITION_FAILED,
        "external_service" => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

async fn handle_command(
    State(state): State<Arc<AppState>>,
    Path(action): Path<String>,
    body: Bytes,
) -> (StatusCode, Json<Envelope>) {
    let result = match parse_body(&body) {
        Ok(payload) => state.commands.dispatch(&action, payload).await,
        Err(e) => Err(e),
    };

    match result {
        Ok(value) => (StatusCode::OK, Json(Envelope::success(value))),
        Err(e) => {
            let status = status_for(&e);
            if status.is_server_error() {
                tracing::error!(action = %action, error = %e, "Command failed");
            } else {
                tracing::info!(action = %action, error = %e, "Command rejected");
            }
            (status, Json(Envelope::failure(&e)))
        }
    }
}

/// An empty body is an empty payload.
fn parse_body(body: &[u8]) -> Result<serde_json::Value> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(serde_json::Value::Object(Default::default()));
    }
    serde_json::from_slice(body)
        .map_err(|e| AppError::InputValidation(format!("Request body is not valid JSON: {e}")))
}

async fn health_check() -> &'static str {
    "ok"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            status_for(&AppError::InputValidation(String::new())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_for(&AppError::Precondition(String::new())),
            StatusCode::PRECONDITION_FAILED
        );
        assert_eq!(
            status_for(&AppError::ExternalService(String::new())),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            status_for(&AppError::Persistence(String::new())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_parse_body() {
        assert_eq!(parse_body(b"").unwrap(), serde_json::json!({}));
        assert_eq!(parse_body(b" \n").unwrap(), serde_json::json!({}));
        assert_eq!(parse_body(b"{\"id\":\"x\"}").unwrap()["id"], "x");
        assert!(matches!(
            parse_body(b"{nope").unwrap_err(),
            AppError::InputValidation(_)
        ));
    }
}
