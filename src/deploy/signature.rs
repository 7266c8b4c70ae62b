use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::error::{AppError, Result};

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the payload signature on outgoing webhooks.
pub const SIGNATURE_HEADER: &str = "X-Forgeline-Signature-256";

fn mac_for(secret: &str) -> Result<HmacSha256> {
    HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| AppError::Config(format!("Invalid HMAC key: {e}")))
}

/// Sign `payload` as `sha256=<hex>`, the same scheme GitHub uses.
pub fn sign_payload(secret: &str, payload: &[u8]) -> Result<String> {
    let mut mac = mac_for(secret)?;
    mac.update(payload);
    Ok(format!("sha256={}", hex::encode(mac.finalize().into_bytes())))
}

/// Check a `sha256=<hex>` header against `payload`, for webhook receivers.
pub fn verify_signature(secret: &str, payload: &[u8], signature_header: &str) -> Result<()> {
    let signature_hex = signature_header
        .strip_prefix("sha256=")
        .ok_or_else(|| AppError::InputValidation("Missing sha256= prefix".to_string()))?;

    let signature_bytes = hex::decode(signature_hex)
        .map_err(|e| AppError::InputValidation(format!("Invalid hex in signature: {e}")))?;

    let mut mac = mac_for(secret)?;
    mac.update(payload);
    mac.verify_slice(&signature_bytes)
        .map_err(|_| AppError::InputValidation("Signature mismatch".to_string()))
}
