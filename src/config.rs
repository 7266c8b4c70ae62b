use serde::Deserialize;
use std::path::PathBuf;

use crate::error::{AppError, Result};

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub audit: AuditConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub claude: ClaudeConfig,
    pub github: Option<GitHubConfig>,
    #[serde(default)]
    pub deploy: DeployConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Memory,
    File,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackend,
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    /// Entries kept in the workflow history index.
    #[serde(default = "default_max_history")]
    pub max_history: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::default(),
            data_dir: default_data_dir(),
            max_history: default_max_history(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum AuditBackend {
    #[default]
    Memory,
    Durable,
    Remote,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AuditConfig {
    #[serde(default)]
    pub backend: AuditBackend,
    #[serde(default = "default_max_events")]
    pub max_events: usize,
    /// Base URL of another forgeline instance, used by the remote backend.
    pub remote_url: Option<String>,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            backend: AuditBackend::default(),
            max_events: default_max_events(),
            remote_url: None,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum PipelineMode {
    #[default]
    Sequential,
    Parallel,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PipelineConfig {
    #[serde(default)]
    pub mode: PipelineMode,
    #[serde(default = "default_max_output_chars")]
    pub max_output_chars: usize,
    #[serde(default = "default_max_context_chars")]
    pub max_context_chars: usize,
    #[serde(default)]
    pub feedback_loop: bool,
    #[serde(default = "default_max_feedback_rounds")]
    pub max_feedback_rounds: u32,
    #[serde(default = "default_max_roles_per_round")]
    pub max_roles_per_round: usize,
    #[serde(default = "default_true")]
    pub publish: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            mode: PipelineMode::default(),
            max_output_chars: default_max_output_chars(),
            max_context_chars: default_max_context_chars(),
            feedback_loop: false,
            max_feedback_rounds: default_max_feedback_rounds(),
            max_roles_per_round: default_max_roles_per_round(),
            publish: true,
        }
    }
}

#[derive(Deserialize, Clone)]
pub struct ClaudeConfig {
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_true")]
    pub rate_limit_retry: bool,
    #[serde(default = "default_rate_limit_max_retries")]
    pub rate_limit_max_retries: u32,
    #[serde(default = "default_rate_limit_backoff_secs")]
    pub rate_limit_backoff_secs: u64,
}

impl Default for ClaudeConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            model: default_model(),
            max_tokens: default_max_tokens(),
            rate_limit_retry: true,
            rate_limit_max_retries: default_rate_limit_max_retries(),
            rate_limit_backoff_secs: default_rate_limit_backoff_secs(),
        }
    }
}

// Manual Debug impl to avoid leaking the API key
impl std::fmt::Debug for ClaudeConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClaudeConfig")
            .field("api_key", &"[REDACTED]")
            .field("model", &self.model)
            .field("max_tokens", &self.max_tokens)
            .field("rate_limit_retry", &self.rate_limit_retry)
            .field("rate_limit_max_retries", &self.rate_limit_max_retries)
            .field("rate_limit_backoff_secs", &self.rate_limit_backoff_secs)
            .finish()
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct GitHubConfig {
    pub app_id: u64,
    pub private_key_path: PathBuf,
    pub installation_id: u64,
    /// Target repository as `owner/name`.
    pub repository: String,
}

#[derive(Deserialize, Clone)]
pub struct DeployConfig {
    #[serde(default = "default_workflow_file")]
    pub workflow_file: String,
    pub environment: Option<String>,
    #[serde(default = "default_required_approvals")]
    pub required_approvals: u32,
    #[serde(default)]
    pub required_reviewers: Vec<String>,
    pub notify_webhook_url: Option<String>,
    pub rollback_webhook_url: Option<String>,
    pub webhook_secret: Option<String>,
}

impl Default for DeployConfig {
    fn default() -> Self {
        Self {
            workflow_file: default_workflow_file(),
            environment: None,
            required_approvals: default_required_approvals(),
            required_reviewers: Vec::new(),
            notify_webhook_url: None,
            rollback_webhook_url: None,
            webhook_secret: None,
        }
    }
}

// Manual Debug impl to avoid leaking the webhook secret
impl std::fmt::Debug for DeployConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeployConfig")
            .field("workflow_file", &self.workflow_file)
            .field("environment", &self.environment)
            .field("required_approvals", &self.required_approvals)
            .field("required_reviewers", &self.required_reviewers)
            .field("notify_webhook_url", &self.notify_webhook_url)
            .field("rollback_webhook_url", &self.rollback_webhook_url)
            .field(
                "webhook_secret",
                &self.webhook_secret.as_ref().map(|_| "[REDACTED]"),
            )
            .finish()
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("/var/lib/forgeline")
}

fn default_max_history() -> usize {
    200
}

fn default_max_events() -> usize {
    1000
}

fn default_max_output_chars() -> usize {
    32 * 1024
}

fn default_max_context_chars() -> usize {
    192 * 1024
}

fn default_max_feedback_rounds() -> u32 {
    3
}

fn default_max_roles_per_round() -> usize {
    2
}

fn default_true() -> bool {
    true
}

fn default_model() -> String {
    "claude-sonnet-4-20250514".to_string()
}

fn default_max_tokens() -> u32 {
    16384
}

fn default_rate_limit_max_retries() -> u32 {
    3
}

fn default_rate_limit_backoff_secs() -> u64 {
    2
}

fn default_workflow_file() -> String {
    "deploy.yml".to_string()
}

fn default_required_approvals() -> u32 {
    1
}

impl AppConfig {
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let mut builder = config::Config::builder();

        // Load from file if specified
        if let Some(path) = config_path {
            builder = builder.add_source(config::File::with_name(path));
        } else {
            // Try default paths
            builder = builder.add_source(config::File::with_name("forgeline").required(false));
        }

        // Environment variable overrides with FORGELINE_ prefix
        builder = builder.add_source(
            config::Environment::with_prefix("FORGELINE")
                .separator("__")
                .try_parsing(true),
        );

        let config: AppConfig = builder
            .build()
            .map_err(|e| AppError::Config(e.to_string()))?
            .try_deserialize()
            .map_err(|e| AppError::Config(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    /// Reject settings that would only fail later, mid-run.
    pub fn validate(&self) -> Result<()> {
        let p = &self.pipeline;
        if p.max_output_chars == 0 {
            return Err(AppError::InputValidation(
                "pipeline.max_output_chars must be greater than zero".to_string(),
            ));
        }
        if p.max_context_chars < p.max_output_chars {
            return Err(AppError::InputValidation(format!(
                "pipeline.max_context_chars ({}) must be at least pipeline.max_output_chars ({})",
                p.max_context_chars, p.max_output_chars
            )));
        }
        if p.max_feedback_rounds == 0 || p.max_feedback_rounds > 3 {
            return Err(AppError::InputValidation(
                "pipeline.max_feedback_rounds must be between 1 and 3".to_string(),
            ));
        }
        if p.max_roles_per_round == 0 {
            return Err(AppError::InputValidation(
                "pipeline.max_roles_per_round must be greater than zero".to_string(),
            ));
        }
        if self.storage.max_history == 0 {
            return Err(AppError::InputValidation(
                "storage.max_history must be greater than zero".to_string(),
            ));
        }
        if self.audit.max_events == 0 {
            return Err(AppError::InputValidation(
                "audit.max_events must be greater than zero".to_string(),
            ));
        }
        if self.audit.backend == AuditBackend::Remote && self.audit.remote_url.is_none() {
            return Err(AppError::InputValidation(
                "audit.remote_url is required when audit.backend = \"remote\"".to_string(),
            ));
        }
        if self.deploy.workflow_file.trim().is_empty() {
            return Err(AppError::InputValidation(
                "deploy.workflow_file must not be empty".to_string(),
            ));
        }
        if let Some(github) = &self.github {
            if github.repository.split_once('/').is_none() {
                return Err(AppError::InputValidation(format!(
                    "github.repository must be `owner/name`, got `{}`",
                    github.repository
                )));
            }
        }
        Ok(())
    }

    pub fn claude_api_key(&self) -> &str {
        &self.claude.api_key
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(toml_src: &str) -> AppConfig {
        toml::from_str(toml_src).unwrap()
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = parse("");
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.audit.max_events, 1000);
        assert_eq!(config.storage.max_history, 200);
        assert_eq!(config.pipeline.max_output_chars, 32768);
        assert_eq!(config.pipeline.max_feedback_rounds, 3);
        assert_eq!(config.pipeline.max_roles_per_round, 2);
        assert!(!config.pipeline.feedback_loop);
        assert_eq!(config.deploy.required_approvals, 1);
        assert_eq!(config.deploy.workflow_file, "deploy.yml");
        assert!(config.github.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_sections_parse() {
        let config = parse(
            r#"
            [pipeline]
            mode = "parallel"
            feedback_loop = true

            [audit]
            backend = "remote"
            remote_url = "http://audit:3000"

            [logging]
            format = "json"
            "#,
        );
        assert_eq!(config.pipeline.mode, PipelineMode::Parallel);
        assert!(config.pipeline.feedback_loop);
        assert_eq!(config.audit.backend, AuditBackend::Remote);
        assert_eq!(config.logging.format, LogFormat::Json);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_history_cap_is_configurable() {
        let config = parse("[storage]\nmax_history = 50\n");
        assert_eq!(config.storage.max_history, 50);
        assert!(config.validate().is_ok());

        let config = parse("[storage]\nmax_history = 0\n");
        assert!(matches!(
            config.validate().unwrap_err(),
            AppError::InputValidation(_)
        ));
    }

    #[test]
    fn test_remote_audit_requires_url() {
        let config = parse("[audit]\nbackend = \"remote\"\n");
        let err = config.validate().unwrap_err();
        assert!(matches!(err, AppError::InputValidation(_)));
    }

    #[test]
    fn test_rejects_too_many_feedback_rounds() {
        let config = parse("[pipeline]\nmax_feedback_rounds = 5\n");
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_malformed_repository() {
        let config = parse(
            r#"
            [github]
            app_id = 1
            private_key_path = "/tmp/key.pem"
            installation_id = 2
            repository = "no-slash"
            "#,
        );
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let mut config = parse("");
        config.claude.api_key = "sk-secret".to_string();
        config.deploy.webhook_secret = Some("hunter2".to_string());
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("sk-secret"));
        assert!(!rendered.contains("hunter2"));
    }
}
