use serde::{Deserialize, Serialize};

use crate::quality::FileSet;
use crate::workflow::types::WorkflowRun;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrState {
    Open,
    Closed,
}

/// What the deployment gate needs to know about a pull request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrStatus {
    pub number: u64,
    pub state: PrState,
    pub merged: bool,
    pub approvals: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PullRequestInfo {
    pub number: u64,
    pub head_branch: String,
    pub head_sha: String,
}

/// Reviewers whose latest review approves the pull request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalDetails {
    pub approvers: Vec<String>,
}

/// A CI workflow run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CiRun {
    pub id: u64,
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conclusion: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub html_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub head_branch: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event: Option<String>,
}

impl CiRun {
    pub fn is_completed(&self) -> bool {
        self.status == "completed"
    }

    pub fn succeeded(&self) -> bool {
        self.conclusion.as_deref() == Some("success")
    }
}

/// Where published artifacts ended up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishedArtifact {
    pub url: String,
    pub number: u64,
    pub branch: String,
}

/// Everything a publisher gets for one run.
#[derive(Debug, Clone, Copy)]
pub struct PublishRequest<'a> {
    pub run: &'a WorkflowRun,
    /// Quality-reviewed files. `None` means the publisher builds its own.
    pub files: Option<&'a FileSet>,
    /// Human-readable warning attached when the quality gate failed.
    pub quality_notice: Option<&'a str>,
}
