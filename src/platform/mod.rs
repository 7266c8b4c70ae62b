pub mod github;
pub mod types;

use async_trait::async_trait;

use crate::error::Result;
use crate::workflow::types::WorkflowRun;
use types::*;

/// Pull-request and CI operations on the hosting service.
///
/// Errors are returned as the adapter produced them; callers do not remap.
#[async_trait]
pub trait CodeHost: Send + Sync {
    /// State, merge flag and approval count of a pull request.
    async fn get_pr_status(&self, pr_number: u64) -> Result<PrStatus>;

    /// Branch and head commit of a pull request.
    async fn get_pull_request(&self, pr_number: u64) -> Result<PullRequestInfo>;

    /// Start a `workflow_dispatch` run of `workflow_file` on `git_ref`.
    async fn dispatch_workflow(
        &self,
        workflow_file: &str,
        git_ref: &str,
        inputs: serde_json::Value,
    ) -> Result<()>;

    /// Most recent run of `workflow_file` on `branch`, optionally filtered by
    /// triggering event.
    async fn get_latest_workflow_run(
        &self,
        workflow_file: &str,
        branch: &str,
        event: Option<&str>,
    ) -> Result<Option<CiRun>>;

    /// Who currently approves the pull request.
    async fn get_pr_approval_details(&self, pr_number: u64) -> Result<ApprovalDetails>;
}

/// Turns a finished run's files into a reviewable change.
#[async_trait]
pub trait ArtifactPublisher: Send + Sync {
    /// Whether the run produced anything worth publishing.
    fn has_artifacts(&self, run: &WorkflowRun) -> bool;

    async fn generate_and_publish(&self, request: PublishRequest<'_>) -> Result<PublishedArtifact>;
}
