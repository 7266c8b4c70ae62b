use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};

use crate::agent::prompt;
use crate::agent::AgentExecutor;
use crate::config::ClaudeConfig;
use crate::error::{AppError, Result};
use crate::workflow::roles::Role;

const CLAUDE_API_URL: &str = "https://api.anthropic.com/v1/messages";
const API_VERSION: &str = "2023-06-01";

/// Backoff policy for throttled or overloaded responses.
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub enabled: bool,
    pub max_retries: u32,
    pub initial_backoff: Duration,
}

impl RateLimitConfig {
    fn backoff_for(&self, attempt: u32) -> Duration {
        self.initial_backoff.saturating_mul(2u32.saturating_pow(attempt))
    }
}

pub struct ClaudeClient {
    client: Client,
    api_url: String,
    api_key: String,
    model: String,
    max_tokens: u32,
    rate_limit: RateLimitConfig,
}

impl ClaudeClient {
    pub fn new(config: &ClaudeConfig) -> Self {
        Self {
            client: Client::new(),
            api_url: CLAUDE_API_URL.to_string(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            rate_limit: RateLimitConfig {
                enabled: config.rate_limit_retry,
                max_retries: config.rate_limit_max_retries,
                initial_backoff: Duration::from_secs(config.rate_limit_backoff_secs),
            },
        }
    }

    /// Point the client at a different endpoint (proxies, tests).
    pub fn with_api_url(mut self, api_url: &str) -> Self {
        self.api_url = api_url.to_string();
        self
    }

    pub async fn send_message(&self, request: &MessagesRequest) -> Result<MessagesResponse> {
        let mut attempt = 0;
        loop {
            let response = self
                .client
                .post(&self.api_url)
                .header("x-api-key", &self.api_key)
                .header("anthropic-version", API_VERSION)
                .header("content-type", "application/json")
                .json(request)
                .send()
                .await
                .map_err(|e| AppError::ExternalService(format!("Claude API request failed: {e}")))?;

            let status = response.status();
            if status.is_success() {
                return response.json::<MessagesResponse>().await.map_err(|e| {
                    AppError::ExternalService(format!("Claude API returned malformed body: {e}"))
                });
            }

            let body = response.text().await.unwrap_or_default();
            if is_retryable(status) && self.rate_limit.enabled && attempt < self.rate_limit.max_retries {
                let backoff = self.rate_limit.backoff_for(attempt);
                tracing::warn!(
                    status = %status,
                    attempt = attempt + 1,
                    backoff_ms = backoff.as_millis() as u64,
                    "Claude API throttled, backing off"
                );
                tokio::time::sleep(backoff).await;
                attempt += 1;
                continue;
            }

            return Err(AppError::ExternalService(format!(
                "Claude API returned {status}: {body}"
            )));
        }
    }
}

fn is_retryable(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS
        || status.is_server_error()
        // Anthropic's "overloaded" status.
        || status.as_u16() == 529
}

#[async_trait]
impl AgentExecutor for ClaudeClient {
    async fn execute(&self, role: Role, prompt: &str) -> Result<String> {
        let request = MessagesRequest {
            model: self.model.clone(),
            max_tokens: self.max_tokens,
            system: prompt::system_prompt_for_role(role),
            messages: vec![Message {
                role: "user".to_string(),
                content: prompt.to_string(),
            }],
        };

        let response = self.send_message(&request).await?;

        tracing::info!(
            role = %role,
            input_tokens = response.usage.input_tokens,
            output_tokens = response.usage.output_tokens,
            stop_reason = ?response.stop_reason,
            "Claude response"
        );

        if response.stop_reason.as_deref() == Some("max_tokens") {
            tracing::warn!(role = %role, "Claude response hit max_tokens limit");
        }

        Ok(extract_text(&response.content))
    }
}

fn extract_text(content: &[ContentBlock]) -> String {
    content
        .iter()
        .filter_map(|block| match block {
            ContentBlock::Text { text } => Some(text.as_str()),
            ContentBlock::Other => None,
        })
        .collect::<Vec<_>>()
        .join("\n")
}

// --- Request types ---

#[derive(Debug, Serialize)]
pub struct MessagesRequest {
    pub model: String,
    pub max_tokens: u32,
    pub system: String,
    pub messages: Vec<Message>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: String,
    pub content: String,
}

// --- Response types ---

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
pub enum ContentBlock {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
pub struct MessagesResponse {
    pub id: String,
    pub content: Vec<ContentBlock>,
    pub stop_reason: Option<String>,
    pub usage: Usage,
}

#[derive(Debug, Deserialize)]
pub struct Usage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}
