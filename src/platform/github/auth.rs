use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde::Serialize;
use std::path::Path;

use crate::error::{AppError, Result};

/// Installation tokens are refreshed this long before GitHub expires them.
const TOKEN_REFRESH_MARGIN_MINUTES: i64 = 5;

#[derive(Debug, Serialize)]
struct JwtClaims {
    iat: i64,
    exp: i64,
    iss: String,
}

/// Read and parse the App's RSA key once, at startup.
pub fn load_signing_key(private_key_path: &Path) -> Result<EncodingKey> {
    let key_pem = std::fs::read(private_key_path).map_err(|e| {
        AppError::Config(format!(
            "Failed to read GitHub App private key at {}: {e}",
            private_key_path.display()
        ))
    })?;
    EncodingKey::from_rsa_pem(&key_pem)
        .map_err(|e| AppError::Config(format!("Invalid RSA private key: {e}")))
}

/// Short-lived JWT identifying the App itself.
pub fn generate_app_jwt(app_id: u64, key: &EncodingKey) -> Result<String> {
    let now = Utc::now().timestamp();
    let claims = JwtClaims {
        // Backdated for clock drift; GitHub caps lifetime at 10 minutes.
        iat: now - 60,
        exp: now + 10 * 60,
        iss: app_id.to_string(),
    };

    encode(&Header::new(Algorithm::RS256), &claims, key)
        .map_err(|e| AppError::ExternalService(format!("Failed to sign GitHub App JWT: {e}")))
}

/// A cached installation token.
#[derive(Debug, Clone)]
pub struct InstallationToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

impl InstallationToken {
    pub fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        self.expires_at > now + Duration::minutes(TOKEN_REFRESH_MARGIN_MINUTES)
    }

    /// Parse the `access_tokens` response. A missing expiry means one hour.
    pub fn from_response(response: &serde_json::Value) -> Result<Self> {
        let token = response["token"]
            .as_str()
            .ok_or_else(|| {
                AppError::ExternalService("GitHub returned no installation token".to_string())
            })?
            .to_string();
        let expires_at = response["expires_at"]
            .as_str()
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|| Utc::now() + Duration::hours(1));
        Ok(Self { token, expires_at })
    }
}
