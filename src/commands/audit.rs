use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;

use crate::audit::{AuditTrail, NewAuditEvent};
use crate::commands::{parse_payload, to_result, Command};
use crate::error::Result;

#[derive(Debug, Deserialize)]
struct AppendPayload {
    id: String,
    event: NewAuditEvent,
}

#[derive(Debug, Deserialize)]
struct ListPayload {
    id: String,
}

/// `audit.append`: `{id, event: {type, ts?, data?}}`.
pub struct AppendAuditEvent {
    audit: Arc<dyn AuditTrail>,
}

impl AppendAuditEvent {
    pub fn new(audit: Arc<dyn AuditTrail>) -> Self {
        Self { audit }
    }
}

#[async_trait]
impl Command for AppendAuditEvent {
    fn name(&self) -> &str {
        "audit.append"
    }

    async fn execute(&self, payload: serde_json::Value) -> Result<serde_json::Value> {
        let payload: AppendPayload = parse_payload(self.name(), payload)?;
        to_result(&self.audit.append(&payload.id, payload.event).await?)
    }
}

/// `audit.list`: `{id}`, oldest first.
pub struct ListAuditEvents {
    audit: Arc<dyn AuditTrail>,
}

impl ListAuditEvents {
    pub fn new(audit: Arc<dyn AuditTrail>) -> Self {
        Self { audit }
    }
}

#[async_trait]
impl Command for ListAuditEvents {
    fn name(&self) -> &str {
        "audit.list"
    }

    async fn execute(&self, payload: serde_json::Value) -> Result<serde_json::Value> {
        let payload: ListPayload = parse_payload(self.name(), payload)?;
        to_result(&self.audit.list(&payload.id).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::MemoryAuditTrail;
    use crate::error::AppError;
    use serde_json::json;

    #[tokio::test]
    async fn test_append_then_list() {
        let audit: Arc<dyn AuditTrail> = Arc::new(MemoryAuditTrail::new(10));
        let appended = AppendAuditEvent::new(audit.clone())
            .execute(json!({
                "id": "deploy:pr:3",
                "event": { "type": "deploy.triggered", "data": { "runId": 1 } }
            }))
            .await
            .unwrap();
        assert_eq!(appended["id"], "deploy:pr:3");
        assert_eq!(appended["type"], "deploy.triggered");

        let listed = ListAuditEvents::new(audit)
            .execute(json!({ "id": "deploy:pr:3" }))
            .await
            .unwrap();
        assert_eq!(listed, json!([appended]));
    }

    #[tokio::test]
    async fn test_unknown_event_type() {
        let audit: Arc<dyn AuditTrail> = Arc::new(MemoryAuditTrail::new(10));
        let err = AppendAuditEvent::new(audit)
            .execute(json!({ "id": "x", "event": { "type": "workflow.paused" } }))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InputValidation(_)));
    }
}
