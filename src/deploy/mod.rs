//! Release gating: approvals before CI dispatch, and post-run follow-up.

pub mod notifier;
pub mod signature;

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::audit::{self, deploy_audit_id, AuditEventType, AuditTrail, NewAuditEvent};
use crate::config::DeployConfig;
use crate::error::{AppError, Result};
use crate::platform::types::{CiRun, PrState};
use crate::platform::CodeHost;

pub use notifier::{Notifier, WebhookNotifier};

const DISPATCH_EVENT: &str = "workflow_dispatch";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentTriggerResult {
    pub pr_number: u64,
    pub branch: String,
    pub dispatched: bool,
    pub workflow_file: String,
    /// The dispatched run, when GitHub already lists it.
    pub run: Option<CiRun>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentStatusResult {
    pub pr_number: u64,
    pub branch: String,
    pub workflow_file: String,
    pub run: Option<CiRun>,
    pub notified: bool,
    pub rolled_back: bool,
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusOptions {
    #[serde(default)]
    pub notify: bool,
    #[serde(default)]
    pub rollback_on_failure: bool,
}

pub struct DeploymentGate {
    host: Arc<dyn CodeHost>,
    notifier: Arc<dyn Notifier>,
    audit: Arc<dyn AuditTrail>,
    config: DeployConfig,
}

impl DeploymentGate {
    pub fn new(
        host: Arc<dyn CodeHost>,
        notifier: Arc<dyn Notifier>,
        audit: Arc<dyn AuditTrail>,
        config: DeployConfig,
    ) -> Self {
        Self {
            host,
            notifier,
            audit,
            config,
        }
    }

    /// Dispatch the deploy workflow for an open, sufficiently approved PR.
    pub async fn trigger_deployment_for_pull_request(
        &self,
        pr_number: u64,
    ) -> Result<DeploymentTriggerResult> {
        let status = self.host.get_pr_status(pr_number).await?;
        if status.merged {
            return Err(AppError::Precondition(format!(
                "Pull request #{pr_number} is already merged"
            )));
        }
        if status.state != PrState::Open {
            return Err(AppError::Precondition(format!(
                "Pull request #{pr_number} is not open"
            )));
        }
        let required = self.config.required_approvals;
        if status.approvals < required {
            return Err(AppError::Precondition(format!(
                "Pull request #{pr_number} requires {required} approval(s) before deployment (has {})",
                status.approvals
            )));
        }
        if !self.config.required_reviewers.is_empty() {
            let details = self.host.get_pr_approval_details(pr_number).await?;
            let missing: Vec<&str> = self
                .config
                .required_reviewers
                .iter()
                .filter(|r| !details.approvers.iter().any(|a| a.eq_ignore_ascii_case(r)))
                .map(String::as_str)
                .collect();
            if !missing.is_empty() {
                return Err(AppError::Precondition(format!(
                    "Pull request #{pr_number} is missing approval from required reviewer(s): {}",
                    missing.join(", ")
                )));
            }
        }

        let pr = self.host.get_pull_request(pr_number).await?;
        let workflow_file = self.config.workflow_file.clone();

        let mut inputs = json!({
            "pr": pr_number.to_string(),
            "sha": pr.head_sha,
        });
        if let Some(environment) = &self.config.environment {
            inputs["environment"] = json!(environment);
        }

        self.host
            .dispatch_workflow(&workflow_file, &pr.head_branch, inputs)
            .await?;
        let run = self
            .host
            .get_latest_workflow_run(&workflow_file, &pr.head_branch, Some(DISPATCH_EVENT))
            .await?;

        tracing::info!(
            pr_number,
            branch = %pr.head_branch,
            workflow_file = %workflow_file,
            run_id = ?run.as_ref().map(|r| r.id),
            "Deployment dispatched"
        );
        audit::record(
            self.audit.as_ref(),
            &deploy_audit_id(pr_number),
            NewAuditEvent::new(AuditEventType::DeployTriggered).with_data(json!({
                "prNumber": pr_number,
                "branch": pr.head_branch,
                "sha": pr.head_sha,
                "workflowFile": workflow_file,
                "runId": run.as_ref().map(|r| r.id),
            })),
        )
        .await;

        Ok(DeploymentTriggerResult {
            pr_number,
            branch: pr.head_branch,
            dispatched: true,
            workflow_file,
            run,
        })
    }

    /// Latest deploy run for the PR branch, with optional notify/rollback
    /// once it has completed.
    pub async fn get_deployment_status_for_pull_request(
        &self,
        pr_number: u64,
        options: StatusOptions,
    ) -> Result<DeploymentStatusResult> {
        let pr = self.host.get_pull_request(pr_number).await?;
        let workflow_file = self.config.workflow_file.clone();
        let run = self
            .host
            .get_latest_workflow_run(&workflow_file, &pr.head_branch, None)
            .await?;
        let audit_id = deploy_audit_id(pr_number);

        audit::record(
            self.audit.as_ref(),
            &audit_id,
            NewAuditEvent::new(AuditEventType::DeployStatus).with_data(json!({
                "prNumber": pr_number,
                "branch": pr.head_branch,
                "runId": run.as_ref().map(|r| r.id),
                "status": run.as_ref().map(|r| r.status.clone()),
                "conclusion": run.as_ref().and_then(|r| r.conclusion.clone()),
            })),
        )
        .await;

        let mut notified = false;
        let mut rolled_back = false;

        if let Some(run) = run.as_ref().filter(|r| r.is_completed()) {
            let payload = json!({
                "prNumber": pr_number,
                "branch": pr.head_branch,
                "workflowFile": workflow_file,
                "run": run,
            });

            if options.notify {
                if let Some(url) = &self.config.notify_webhook_url {
                    notified = self.deliver(url, &payload, "notify").await;
                    if notified {
                        audit::record(
                            self.audit.as_ref(),
                            &audit_id,
                            NewAuditEvent::new(AuditEventType::DeployNotified)
                                .with_data(payload.clone()),
                        )
                        .await;
                    }
                }
            }

            if !run.succeeded() && options.rollback_on_failure {
                if let Some(url) = &self.config.rollback_webhook_url {
                    rolled_back = self.deliver(url, &payload, "rollback").await;
                    if rolled_back {
                        audit::record(
                            self.audit.as_ref(),
                            &audit_id,
                            NewAuditEvent::new(AuditEventType::DeployRollback)
                                .with_data(payload.clone()),
                        )
                        .await;
                    }
                }
            }
        }

        Ok(DeploymentStatusResult {
            pr_number,
            branch: pr.head_branch,
            workflow_file,
            run,
            notified,
            rolled_back,
        })
    }

    async fn deliver(&self, url: &str, payload: &serde_json::Value, purpose: &str) -> bool {
        match self.notifier.post(url, payload).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(url, purpose, error = %e, "Deployment webhook failed");
                false
            }
        }
    }
}
