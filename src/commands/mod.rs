//! Transport-independent command surface: `action -> handler(payload)`.
//!
//! The HTTP server and the remote audit proxy both speak [`Envelope`].

pub mod audit;
pub mod deploy;
pub mod workflow;

use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::audit::AuditTrail;
use crate::deploy::DeploymentGate;
use crate::error::{AppError, Result};
use crate::workflow::Orchestrator;

#[async_trait]
pub trait Command: Send + Sync {
    fn name(&self) -> &str;
    async fn execute(&self, payload: serde_json::Value) -> Result<serde_json::Value>;
}

pub struct CommandRegistry {
    commands: Vec<Box<dyn Command>>,
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self {
            commands: Vec::new(),
        }
    }

    /// Every built-in command, wired to the given services.
    pub fn standard(
        orchestrator: Arc<Orchestrator>,
        audit: Arc<dyn AuditTrail>,
        deploy: Option<Arc<DeploymentGate>>,
    ) -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(workflow::RunWorkflow::new(orchestrator.clone())));
        registry.register(Box::new(workflow::GetWorkflow::new(orchestrator.clone())));
        registry.register(Box::new(workflow::WorkflowHistory::new(orchestrator)));
        registry.register(Box::new(audit::AppendAuditEvent::new(audit.clone())));
        registry.register(Box::new(audit::ListAuditEvents::new(audit)));
        registry.register(Box::new(deploy::TriggerDeployment::new(deploy.clone())));
        registry.register(Box::new(deploy::DeploymentStatus::new(deploy)));
        registry
    }

    /// Add a command, replacing any existing one with the same name.
    pub fn register(&mut self, command: Box<dyn Command>) {
        self.commands.retain(|c| c.name() != command.name());
        self.commands.push(command);
    }

    pub fn names(&self) -> Vec<&str> {
        self.commands.iter().map(|c| c.name()).collect()
    }

    pub fn get(&self, name: &str) -> Option<&dyn Command> {
        self.commands
            .iter()
            .find(|c| c.name() == name)
            .map(|c| c.as_ref())
    }

    pub async fn dispatch(
        &self,
        action: &str,
        payload: serde_json::Value,
    ) -> Result<serde_json::Value> {
        let command = self
            .get(action)
            .ok_or_else(|| AppError::InputValidation(format!("Unknown action: {action}")))?;
        command.execute(payload).await
    }
}

impl Default for CommandRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Decode a command payload, reporting shape errors as bad input.
pub fn parse_payload<T: DeserializeOwned>(action: &str, payload: serde_json::Value) -> Result<T> {
    serde_json::from_value(payload)
        .map_err(|e| AppError::InputValidation(format!("Invalid payload for {action}: {e}")))
}

/// Encode a command result.
pub fn to_result<T: Serialize>(value: &T) -> Result<serde_json::Value> {
    Ok(serde_json::to_value(value)?)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub kind: String,
    pub message: String,
}

/// Wire format of a command response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
}

impl Envelope {
    pub fn success(result: serde_json::Value) -> Self {
        Self {
            ok: true,
            result: Some(result),
            error: None,
        }
    }

    pub fn failure(error: &AppError) -> Self {
        Self {
            ok: false,
            result: None,
            error: Some(ErrorBody {
                kind: error.kind().to_string(),
                message: error.message(),
            }),
        }
    }

    /// Back to a local result, restoring the error kind.
    pub fn into_result(self) -> Result<serde_json::Value> {
        match (self.ok, self.error) {
            (true, _) => Ok(self.result.unwrap_or(serde_json::Value::Null)),
            (false, Some(error)) => Err(AppError::from_kind(&error.kind, error.message)),
            (false, None) => Err(AppError::ExternalService(
                "Command failed without an error body".to_string(),
            )),
        }
    }
}

impl From<Result<serde_json::Value>> for Envelope {
    fn from(result: Result<serde_json::Value>) -> Self {
        match result {
            Ok(value) => Envelope::success(value),
            Err(e) => Envelope::failure(&e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Echo;

    #[async_trait]
    impl Command for Echo {
        fn name(&self) -> &str {
            "test.echo"
        }

        async fn execute(&self, payload: serde_json::Value) -> Result<serde_json::Value> {
            Ok(payload)
        }
    }

    #[tokio::test]
    async fn test_dispatch_known_and_unknown() {
        let mut registry = CommandRegistry::new();
        registry.register(Box::new(Echo));
        assert_eq!(
            registry.dispatch("test.echo", json!({"a": 1})).await.unwrap(),
            json!({"a": 1})
        );

        let err = registry.dispatch("test.missing", json!({})).await.unwrap_err();
        assert!(matches!(err, AppError::InputValidation(_)));
        assert!(err.to_string().contains("test.missing"));
    }

    #[test]
    fn test_register_replaces_same_name() {
        let mut registry = CommandRegistry::new();
        registry.register(Box::new(Echo));
        registry.register(Box::new(Echo));
        assert_eq!(registry.names(), ["test.echo"]);
    }

    #[test]
    fn test_envelope_wire_shape() {
        let ok = serde_json::to_value(Envelope::success(json!([1]))).unwrap();
        assert_eq!(ok, json!({ "ok": true, "result": [1] }));

        let err = Envelope::failure(&AppError::Precondition("requires 1 approval".to_string()));
        assert_eq!(
            serde_json::to_value(&err).unwrap(),
            json!({ "ok": false, "error": { "kind": "precondition", "message": "requires 1 approval" } })
        );
        let restored = err.into_result().unwrap_err();
        assert!(matches!(restored, AppError::Precondition(m) if m == "requires 1 approval"));
    }

    #[test]
    fn test_parse_payload_error_is_input_validation() {
        #[derive(Debug, Deserialize)]
        struct Needs {
            #[allow(dead_code)]
            id: String,
        }
        let err = parse_payload::<Needs>("x.y", json!({})).unwrap_err();
        assert!(matches!(err, AppError::InputValidation(_)));
    }
}
