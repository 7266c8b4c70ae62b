use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;

use crate::commands::{parse_payload, to_result, Command};
use crate::deploy::{DeploymentGate, StatusOptions};
use crate::error::{AppError, Result};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TriggerPayload {
    pr_number: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StatusPayload {
    pr_number: u64,
    #[serde(flatten)]
    options: StatusOptions,
}

fn gate(gate: &Option<Arc<DeploymentGate>>) -> Result<&DeploymentGate> {
    gate.as_deref().ok_or_else(|| {
        AppError::Precondition(
            "Deployment is unavailable: no [github] section is configured".to_string(),
        )
    })
}

/// `deploy.trigger`: `{prNumber}`.
pub struct TriggerDeployment {
    gate: Option<Arc<DeploymentGate>>,
}

impl TriggerDeployment {
    pub fn new(gate: Option<Arc<DeploymentGate>>) -> Self {
        Self { gate }
    }
}

#[async_trait]
impl Command for TriggerDeployment {
    fn name(&self) -> &str {
        "deploy.trigger"
    }

    async fn execute(&self, payload: serde_json::Value) -> Result<serde_json::Value> {
        let payload: TriggerPayload = parse_payload(self.name(), payload)?;
        let result = gate(&self.gate)?
            .trigger_deployment_for_pull_request(payload.pr_number)
            .await?;
        to_result(&result)
    }
}

/// `deploy.status`: `{prNumber, notify?, rollbackOnFailure?}`.
pub struct DeploymentStatus {
    gate: Option<Arc<DeploymentGate>>,
}

impl DeploymentStatus {
    pub fn new(gate: Option<Arc<DeploymentGate>>) -> Self {
        Self { gate }
    }
}

#[async_trait]
impl Command for DeploymentStatus {
    fn name(&self) -> &str {
        "deploy.status"
    }

    async fn execute(&self, payload: serde_json::Value) -> Result<serde_json::Value> {
        let payload: StatusPayload = parse_payload(self.name(), payload)?;
        let result = gate(&self.gate)?
            .get_deployment_status_for_pull_request(payload.pr_number, payload.options)
            .await?;
        to_result(&result)
    }
}
