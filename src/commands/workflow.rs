use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;

use crate::commands::{parse_payload, to_result, Command};
use crate::error::{AppError, Result};
use crate::workflow::Orchestrator;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RunPayload {
    feature_request: String,
}

#[derive(Debug, Deserialize)]
struct IdPayload {
    id: String,
}

/// `workflow.run`: execute the whole pipeline and return the finished run.
pub struct RunWorkflow {
    orchestrator: Arc<Orchestrator>,
}

impl RunWorkflow {
    pub fn new(orchestrator: Arc<Orchestrator>) -> Self {
        Self { orchestrator }
    }
}

#[async_trait]
impl Command for RunWorkflow {
    fn name(&self) -> &str {
        "workflow.run"
    }

    async fn execute(&self, payload: serde_json::Value) -> Result<serde_json::Value> {
        let payload: RunPayload = parse_payload(self.name(), payload)?;
        let run = self.orchestrator.run_workflow(&payload.feature_request).await?;
        to_result(&run)
    }
}

pub struct GetWorkflow {
    orchestrator: Arc<Orchestrator>,
}

impl GetWorkflow {
    pub fn new(orchestrator: Arc<Orchestrator>) -> Self {
        Self { orchestrator }
    }
}

#[async_trait]
impl Command for GetWorkflow {
    fn name(&self) -> &str {
        "workflow.get"
    }

    async fn execute(&self, payload: serde_json::Value) -> Result<serde_json::Value> {
        let payload: IdPayload = parse_payload(self.name(), payload)?;
        let run = self
            .orchestrator
            .repository()
            .get(&payload.id)
            .await?
            .ok_or_else(|| {
                AppError::InputValidation(format!("No workflow with id {}", payload.id))
            })?;
        to_result(&run)
    }
}

pub struct WorkflowHistory {
    orchestrator: Arc<Orchestrator>,
}

impl WorkflowHistory {
    pub fn new(orchestrator: Arc<Orchestrator>) -> Self {
        Self { orchestrator }
    }
}

#[async_trait]
impl Command for WorkflowHistory {
    fn name(&self) -> &str {
        "workflow.history"
    }

    async fn execute(&self, _payload: serde_json::Value) -> Result<serde_json::Value> {
        to_result(&self.orchestrator.repository().history().await?)
    }
}
