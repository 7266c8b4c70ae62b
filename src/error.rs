use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Invalid input: {0}")]
    InputValidation(String),

    #[error("Precondition failed: {0}")]
    Precondition(String),

    #[error("External service error: {0}")]
    ExternalService(String),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),
}

impl AppError {
    /// Stable machine-readable name used on the command wire format.
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::InputValidation(_) | AppError::Config(_) => "input_validation",
            AppError::Precondition(_) => "precondition",
            AppError::ExternalService(_) | AppError::Http(_) => "external_service",
            AppError::Persistence(_) | AppError::Serialization(_) => "persistence",
        }
    }

    /// Rebuild an error from a wire `kind` and message.
    ///
    /// Unknown kinds map to `ExternalService`, since they can only come from a
    /// peer we do not understand.
    pub fn from_kind(kind: &str, message: String) -> Self {
        match kind {
            "input_validation" => AppError::InputValidation(message),
            "precondition" => AppError::Precondition(message),
            "persistence" => AppError::Persistence(message),
            _ => AppError::ExternalService(message),
        }
    }

    /// The bare message, without the category prefix added by `Display`.
    pub fn message(&self) -> String {
        match self {
            AppError::InputValidation(m)
            | AppError::Precondition(m)
            | AppError::ExternalService(m)
            | AppError::Persistence(m)
            | AppError::Config(m) => m.clone(),
            other => other.to_string(),
        }
    }
}

impl From<octocrab::Error> for AppError {
    fn from(e: octocrab::Error) -> Self {
        AppError::ExternalService(format!("GitHub API error: {e}"))
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
