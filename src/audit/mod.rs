//! Append-only, per-id audit ledger.
//!
//! Three backends satisfy the same [`AuditTrail`] contract:
//! - [`MemoryAuditTrail`]: in-process map, for tests and single instances.
//! - [`DurableAuditTrail`]: persisted through a [`Store`], survives restarts.
//! - [`RemoteAuditTrail`]: forwards to another instance's command surface.
//!
//! Events are ordered by append call, never by timestamp. Each ledger keeps
//! only the newest `max_events` entries.

pub mod durable;
pub mod memory;
pub mod remote;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::{AuditBackend, AuditConfig};
use crate::error::{AppError, Result};
use crate::storage::Store;

pub use durable::DurableAuditTrail;
pub use memory::MemoryAuditTrail;
pub use remote::RemoteAuditTrail;

/// The closed set of event types a ledger accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AuditEventType {
    #[serde(rename = "workflow.started")]
    WorkflowStarted,
    #[serde(rename = "workflow.completed")]
    WorkflowCompleted,
    #[serde(rename = "workflow.failed")]
    WorkflowFailed,
    #[serde(rename = "step.started")]
    StepStarted,
    #[serde(rename = "step.completed")]
    StepCompleted,
    #[serde(rename = "step.failed")]
    StepFailed,
    #[serde(rename = "quality.completed")]
    QualityCompleted,
    #[serde(rename = "artifacts.publish.started")]
    PublishStarted,
    #[serde(rename = "artifacts.publish.completed")]
    PublishCompleted,
    #[serde(rename = "artifacts.publish.failed")]
    PublishFailed,
    #[serde(rename = "deploy.triggered")]
    DeployTriggered,
    #[serde(rename = "deploy.status")]
    DeployStatus,
    #[serde(rename = "deploy.notified")]
    DeployNotified,
    #[serde(rename = "deploy.rollback")]
    DeployRollback,
}

impl AuditEventType {
    pub const ALL: [AuditEventType; 14] = [
        AuditEventType::WorkflowStarted,
        AuditEventType::WorkflowCompleted,
        AuditEventType::WorkflowFailed,
        AuditEventType::StepStarted,
        AuditEventType::StepCompleted,
        AuditEventType::StepFailed,
        AuditEventType::QualityCompleted,
        AuditEventType::PublishStarted,
        AuditEventType::PublishCompleted,
        AuditEventType::PublishFailed,
        AuditEventType::DeployTriggered,
        AuditEventType::DeployStatus,
        AuditEventType::DeployNotified,
        AuditEventType::DeployRollback,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AuditEventType::WorkflowStarted => "workflow.started",
            AuditEventType::WorkflowCompleted => "workflow.completed",
            AuditEventType::WorkflowFailed => "workflow.failed",
            AuditEventType::StepStarted => "step.started",
            AuditEventType::StepCompleted => "step.completed",
            AuditEventType::StepFailed => "step.failed",
            AuditEventType::QualityCompleted => "quality.completed",
            AuditEventType::PublishStarted => "artifacts.publish.started",
            AuditEventType::PublishCompleted => "artifacts.publish.completed",
            AuditEventType::PublishFailed => "artifacts.publish.failed",
            AuditEventType::DeployTriggered => "deploy.triggered",
            AuditEventType::DeployStatus => "deploy.status",
            AuditEventType::DeployNotified => "deploy.notified",
            AuditEventType::DeployRollback => "deploy.rollback",
        }
    }
}

impl fmt::Display for AuditEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AuditEventType {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| AppError::InputValidation(format!("Unknown audit event type: {s}")))
    }
}

/// A stored, immutable ledger entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    /// The ledger id this event was appended to.
    pub id: String,
    pub ts: DateTime<Utc>,
    #[serde(rename = "type")]
    pub event_type: AuditEventType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

/// An event as submitted by a caller, before validation.
///
/// The type stays a raw string so that unknown types coming from outside the
/// process are rejected by the ledger rather than by deserialization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewAuditEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ts: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl NewAuditEvent {
    pub fn new(event_type: AuditEventType) -> Self {
        Self {
            event_type: event_type.as_str().to_string(),
            ts: None,
            data: None,
        }
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn at(mut self, ts: DateTime<Utc>) -> Self {
        self.ts = Some(ts);
        self
    }
}

#[async_trait]
pub trait AuditTrail: Send + Sync {
    /// Validate and append an event to the ledger for `id`.
    async fn append(&self, id: &str, event: NewAuditEvent) -> Result<AuditEvent>;

    /// All retained events for `id`, oldest first.
    async fn list(&self, id: &str) -> Result<Vec<AuditEvent>>;
}

/// Turn a submitted event into its stored form.
pub(crate) fn seal(id: &str, event: NewAuditEvent) -> Result<AuditEvent> {
    if id.trim().is_empty() {
        return Err(AppError::InputValidation(
            "Audit id must not be empty".to_string(),
        ));
    }
    let event_type = event.event_type.parse::<AuditEventType>()?;
    Ok(AuditEvent {
        id: id.to_string(),
        ts: event.ts.unwrap_or_else(Utc::now),
        event_type,
        data: event.data,
    })
}

/// Drop the oldest entries so that at most `max_events` remain.
pub(crate) fn retain_newest(events: &mut Vec<AuditEvent>, max_events: usize) {
    if events.len() > max_events {
        let excess = events.len() - max_events;
        events.drain(..excess);
    }
}

/// Ledger id for deployment activity on a pull request.
pub fn deploy_audit_id(pr_number: u64) -> String {
    format!("deploy:pr:{pr_number}")
}

/// Append without letting an audit failure disturb the caller.
pub async fn record(trail: &dyn AuditTrail, id: &str, event: NewAuditEvent) {
    let event_type = event.event_type.clone();
    if let Err(e) = trail.append(id, event).await {
        tracing::warn!(audit_id = id, event_type = %event_type, error = %e, "Failed to append audit event");
    }
}

/// Build the audit backend selected by configuration.
pub fn from_config(config: &AuditConfig, store: Arc<dyn Store>) -> Result<Arc<dyn AuditTrail>> {
    match config.backend {
        AuditBackend::Memory => Ok(Arc::new(MemoryAuditTrail::new(config.max_events))),
        AuditBackend::Durable => Ok(Arc::new(DurableAuditTrail::new(store, config.max_events))),
        AuditBackend::Remote => {
            let url = config.remote_url.as_deref().ok_or_else(|| {
                AppError::InputValidation("audit.remote_url is not configured".to_string())
            })?;
            Ok(Arc::new(RemoteAuditTrail::new(url)))
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_type_parse_round_trip() {
        for t in AuditEventType::ALL {
            assert_eq!(t.as_str().parse::<AuditEventType>().unwrap(), t);
            let json = serde_json::to_string(&t).unwrap();
            assert_eq!(json, format!("\"{}\"", t.as_str()));
        }
    }

    #[test]
    fn test_seal_defaults_timestamp() {
        let before = Utc::now();
        let sealed = seal("abc", NewAuditEvent::new(AuditEventType::QualityCompleted)).unwrap();
        assert!(sealed.ts >= before);
        assert!(sealed.data.is_none());
    }

    #[test]
    fn test_seal_rejects_empty_id() {
        let err = seal(" ", NewAuditEvent::new(AuditEventType::StepStarted)).unwrap_err();
        assert!(matches!(err, AppError::InputValidation(_)));
    }

    #[test]
    fn test_retain_newest_noop_under_cap() {
        let mut events = vec![seal("a", NewAuditEvent::new(AuditEventType::StepStarted)).unwrap()];
        retain_newest(&mut events, 5);
        assert_eq!(events.len(), 1);
    }

    #[test]
    fn test_deploy_audit_id_is_namespaced() {
        assert_eq!(deploy_audit_id(42), "deploy:pr:42");
    }
}
