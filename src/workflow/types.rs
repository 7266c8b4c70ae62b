use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::quality::CodeQualitySummary;
use crate::workflow::roles::Role;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl Status {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Status::Completed | Status::Failed)
    }
}

/// The record of one role's execution within a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentStep {
    pub role_id: Role,
    pub status: Status,
    pub input: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

impl AgentStep {
    /// A step whose role has just been handed its prompt.
    pub fn start(role_id: Role, input: String) -> Self {
        Self {
            role_id,
            status: Status::InProgress,
            input,
            output: None,
            error: None,
            started_at: Some(Utc::now()),
            finished_at: None,
        }
    }

    pub fn complete(&mut self, output: String) {
        self.status = Status::Completed;
        self.output = Some(output);
        self.error = None;
        self.finished_at = Some(Utc::now());
    }

    pub fn fail(&mut self, error: String) {
        self.status = Status::Failed;
        self.output = None;
        self.error = Some(error);
        self.finished_at = Some(Utc::now());
    }
}

/// One end-to-end execution of the role sequence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowRun {
    pub id: String,
    pub feature_request: String,
    pub status: Status,
    pub steps: Vec<AgentStep>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pr_number: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quality: Option<CodeQualitySummary>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quality_gate_passed: Option<bool>,
}

impl WorkflowRun {
    pub fn new(feature_request: &str) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            feature_request: feature_request.to_string(),
            status: Status::Pending,
            steps: Vec::new(),
            created_at: now,
            updated_at: now,
            artifact_url: None,
            pr_number: None,
            branch: None,
            quality: None,
            quality_gate_passed: None,
        }
    }

    /// Move to `next` unless the run already reached a terminal status.
    ///
    /// Returns whether the transition was applied.
    pub fn transition(&mut self, next: Status) -> bool {
        if self.status.is_terminal() {
            tracing::warn!(
                workflow_id = %self.id,
                from = ?self.status,
                to = ?next,
                "Ignoring status change on finished workflow"
            );
            return false;
        }
        self.status = next;
        self.touch();
        true
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// Completed outputs so far, in step order.
    pub fn completed_outputs(&self) -> Vec<(Role, &str)> {
        self.steps
            .iter()
            .filter(|s| s.status == Status::Completed)
            .filter_map(|s| s.output.as_deref().map(|o| (s.role_id, o)))
            .collect()
    }

    /// Whether any step produced non-empty output.
    pub fn has_output(&self) -> bool {
        self.completed_outputs()
            .iter()
            .any(|(_, output)| !output.trim().is_empty())
    }

    pub fn failed_step(&self) -> Option<&AgentStep> {
        self.steps.iter().find(|s| s.status == Status::Failed)
    }

    pub fn attach_quality(&mut self, quality: CodeQualitySummary) {
        self.quality_gate_passed = Some(quality.passed());
        self.quality = Some(quality);
        self.touch();
    }
}

/// Per-step timing and size, for diagnostics only.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StepMetric {
    pub role_id: Role,
    pub duration_ms: u64,
    pub output_chars: usize,
}

/// Diagnostics collected while a run executes. Not persisted.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowMetrics {
    pub total_duration_ms: u64,
    pub steps: Vec<StepMetric>,
    pub truncated_roles: Vec<Role>,
}

/// A finished run together with the metrics gathered while running it.
#[derive(Debug, Clone)]
pub struct WorkflowReport {
    pub run: WorkflowRun,
    pub metrics: WorkflowMetrics,
}
