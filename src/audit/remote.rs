use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde_json::json;

use crate::audit::{seal, AuditEvent, AuditTrail, NewAuditEvent};
use crate::commands::Envelope;
use crate::error::{AppError, Result};

/// Proxy to the `audit.append` / `audit.list` commands of another instance.
///
/// Remote errors come back with their original kind. Anything that goes wrong
/// on the wire (connect, timeout, undecodable body) is reported as a
/// persistence failure, the same as a local store that cannot be reached.
pub struct RemoteAuditTrail {
    client: Client,
    base_url: String,
}

impl RemoteAuditTrail {
    pub fn new(base_url: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    async fn call<T: DeserializeOwned>(&self, action: &str, payload: serde_json::Value) -> Result<T> {
        let url = format!("{}/commands/{action}", self.base_url);

        let response = self
            .client
            .post(&url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| AppError::Persistence(format!("Remote audit store unreachable: {e}")))?;

        let status = response.status();
        let envelope: Envelope = response.json().await.map_err(|e| {
            AppError::Persistence(format!(
                "Unreadable response from remote audit store ({status}): {e}"
            ))
        })?;

        let result = envelope.into_result()?;
        serde_json::from_value(result).map_err(|e| {
            AppError::Persistence(format!("Unexpected payload from remote audit store: {e}"))
        })
    }
}

#[async_trait]
impl AuditTrail for RemoteAuditTrail {
    async fn append(&self, id: &str, event: NewAuditEvent) -> Result<AuditEvent> {
        // Reject bad input before paying for a round trip.
        let sealed = seal(id, event)?;

        tracing::debug!(audit_id = id, event_type = %sealed.event_type, "Forwarding audit event");

        self.call(
            "audit.append",
            json!({
                "id": id,
                "event": {
                    "type": sealed.event_type,
                    "ts": sealed.ts,
                    "data": sealed.data,
                }
            }),
        )
        .await
    }

    async fn list(&self, id: &str) -> Result<Vec<AuditEvent>> {
        self.call("audit.list", json!({ "id": id })).await
    }
}
