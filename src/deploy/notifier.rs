use async_trait::async_trait;
use reqwest::Client;

use crate::deploy::signature::{sign_payload, SIGNATURE_HEADER};
use crate::error::{AppError, Result};

/// Delivers deployment notifications. Callers treat failures as best-effort.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn post(&self, url: &str, payload: &serde_json::Value) -> Result<()>;
}

/// JSON POST, signed with HMAC-SHA256 when a secret is configured.
pub struct WebhookNotifier {
    client: Client,
    secret: Option<String>,
}

impl WebhookNotifier {
    pub fn new(secret: Option<String>) -> Self {
        Self {
            client: Client::new(),
            secret,
        }
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn post(&self, url: &str, payload: &serde_json::Value) -> Result<()> {
        let body = serde_json::to_vec(payload)?;

        let mut request = self
            .client
            .post(url)
            .header("content-type", "application/json");
        if let Some(secret) = &self.secret {
            request = request.header(SIGNATURE_HEADER, sign_payload(secret, &body)?);
        }

        let response = request
            .body(body)
            .send()
            .await
            .map_err(|e| AppError::ExternalService(format!("Webhook POST to {url} failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::ExternalService(format!(
                "Webhook POST to {url} returned {status}"
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deploy::signature::verify_signature;
    use axum::{extract::State, http::HeaderMap, http::StatusCode, routing::post, Router};
    use serde_json::json;
    use std::sync::{Arc, Mutex};

    type Captured = Arc<Mutex<Vec<(Option<String>, Vec<u8>)>>>;

    async fn spawn_receiver(status: StatusCode) -> (String, Captured) {
        let captured: Captured = Arc::new(Mutex::new(Vec::new()));
        let app = Router::new()
            .route(
                "/hook",
                post(
                    move |State(seen): State<Captured>, headers: HeaderMap, body: axum::body::Bytes| async move {
                        let signature = headers
                            .get(SIGNATURE_HEADER)
                            .and_then(|v| v.to_str().ok())
                            .map(str::to_string);
                        seen.lock().unwrap().push((signature, body.to_vec()));
                        status
                    },
                ),
            )
            .with_state(captured.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{addr}/hook"), captured)
    }

    #[tokio::test]
    async fn test_signed_post_is_verifiable() {
        let (url, captured) = spawn_receiver(StatusCode::OK).await;
        let notifier = WebhookNotifier::new(Some("s3cret".to_string()));
        notifier.post(&url, &json!({ "prNumber": 7 })).await.unwrap();

        let seen = captured.lock().unwrap();
        let (signature, body) = &seen[0];
        let signature = signature.as_deref().unwrap();
        assert!(verify_signature("s3cret", body, signature).is_ok());
    }

    #[tokio::test]
    async fn test_unsigned_without_secret() {
        let (url, captured) = spawn_receiver(StatusCode::OK).await;
        WebhookNotifier::new(None)
            .post(&url, &json!({}))
            .await
            .unwrap();
        assert!(captured.lock().unwrap()[0].0.is_none());
    }

    #[tokio::test]
    async fn test_non_success_status_is_error() {
        let (url, _) = spawn_receiver(StatusCode::INTERNAL_SERVER_ERROR).await;
        let err = WebhookNotifier::new(None)
            .post(&url, &json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::ExternalService(_)));
    }
}
