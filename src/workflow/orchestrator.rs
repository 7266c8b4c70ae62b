//! Drives one workflow run from feature request to terminal status.
//!
//! A run moves through an explicit phase machine:
//!
//! ```text
//! Pending -> RunningStep(0) -> ... -> RunningStep(n) -> QualityReview -> Publishing -> Done
//!                 \___________________________/
//!                               \-> Failed
//! ```
//!
//! Step failures never escape as `Err`; they end the run in `Failed` and are
//! visible on the returned [`WorkflowRun`]. Quality review and publishing are
//! best-effort and only log on failure.

use std::sync::Arc;
use std::time::Instant;

use futures::future::join_all;
use serde_json::json;

use crate::agent::AgentExecutor;
use crate::audit::{self, AuditEventType, AuditTrail, NewAuditEvent};
use crate::config::PipelineConfig;
use crate::error::{AppError, Result};
use crate::platform::types::PublishRequest;
use crate::platform::ArtifactPublisher;
use crate::quality::{CodeQualitySummary, FeedbackLoop, FileSet, QualityGate};
use crate::workflow::artifacts::build_file_set;
use crate::workflow::history::WorkflowRepository;
use crate::workflow::roles::{plan, Role, Stage};
use crate::workflow::types::{
    AgentStep, Status, StepMetric, WorkflowMetrics, WorkflowReport, WorkflowRun,
};

const MAX_NOTICE_ISSUES: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Pending,
    /// Index into the stage plan.
    RunningStep(usize),
    QualityReview,
    Publishing,
    Done,
    Failed,
}

/// Mutable state threaded through the phases of one run.
struct RunContext {
    run: WorkflowRun,
    metrics: WorkflowMetrics,
    started: Instant,
    /// Quality-reviewed files, when the review succeeded.
    files: Option<FileSet>,
    quality_notice: Option<String>,
}

pub struct Orchestrator {
    executor: Arc<dyn AgentExecutor>,
    audit: Arc<dyn AuditTrail>,
    repository: WorkflowRepository,
    gate: QualityGate,
    publisher: Option<Arc<dyn ArtifactPublisher>>,
    settings: PipelineConfig,
}

impl Orchestrator {
    pub fn new(
        executor: Arc<dyn AgentExecutor>,
        audit: Arc<dyn AuditTrail>,
        repository: WorkflowRepository,
        gate: QualityGate,
        settings: PipelineConfig,
    ) -> Self {
        Self {
            executor,
            audit,
            repository,
            gate,
            publisher: None,
            settings,
        }
    }

    pub fn with_publisher(mut self, publisher: Arc<dyn ArtifactPublisher>) -> Self {
        self.publisher = Some(publisher);
        self
    }

    pub fn repository(&self) -> &WorkflowRepository {
        &self.repository
    }

    pub async fn run_workflow(&self, feature_request: &str) -> Result<WorkflowRun> {
        Ok(self.run_workflow_with_metrics(feature_request).await?.run)
    }

    /// Run the full pipeline and return the run along with its diagnostics.
    pub async fn run_workflow_with_metrics(&self, feature_request: &str) -> Result<WorkflowReport> {
        if feature_request.trim().is_empty() {
            return Err(AppError::InputValidation(
                "Feature request must not be empty".to_string(),
            ));
        }

        let stages = plan(self.settings.mode);
        let mut ctx = RunContext {
            run: WorkflowRun::new(feature_request),
            metrics: WorkflowMetrics::default(),
            started: Instant::now(),
            files: None,
            quality_notice: None,
        };
        let mut phase = Phase::Pending;

        loop {
            tracing::debug!(workflow_id = %ctx.run.id, ?phase, "Entering phase");
            phase = match phase {
                Phase::Pending => {
                    ctx.run.transition(Status::InProgress);
                    tracing::info!(
                        workflow_id = %ctx.run.id,
                        mode = ?self.settings.mode,
                        "Workflow started"
                    );
                    self.emit(
                        &ctx.run.id,
                        AuditEventType::WorkflowStarted,
                        json!({ "featureRequest": ctx.run.feature_request, "mode": format!("{:?}", self.settings.mode).to_lowercase() }),
                    )
                    .await;
                    self.persist(&ctx.run).await;
                    Phase::RunningStep(0)
                }
                Phase::RunningStep(index) => match stages.get(index) {
                    Some(stage) => {
                        if self.run_stage(stage, &mut ctx).await {
                            Phase::RunningStep(index + 1)
                        } else {
                            Phase::Failed
                        }
                    }
                    None => {
                        ctx.run.transition(Status::Completed);
                        self.persist(&ctx.run).await;
                        Phase::QualityReview
                    }
                },
                Phase::QualityReview => {
                    if ctx.run.has_output() {
                        self.review_quality(&mut ctx).await;
                    }
                    Phase::Publishing
                }
                Phase::Publishing => {
                    self.publish(&mut ctx).await;
                    Phase::Done
                }
                Phase::Done => {
                    self.emit(
                        &ctx.run.id,
                        AuditEventType::WorkflowCompleted,
                        json!({
                            "steps": ctx.run.steps.len(),
                            "qualityGatePassed": ctx.run.quality_gate_passed,
                            "artifactUrl": ctx.run.artifact_url,
                        }),
                    )
                    .await;
                    self.persist(&ctx.run).await;
                    break;
                }
                Phase::Failed => {
                    ctx.run.transition(Status::Failed);
                    let (role, error) = ctx
                        .run
                        .failed_step()
                        .map(|s| (Some(s.role_id), s.error.clone()))
                        .unwrap_or((None, None));
                    self.emit(
                        &ctx.run.id,
                        AuditEventType::WorkflowFailed,
                        json!({ "roleId": role, "error": error }),
                    )
                    .await;
                    self.persist(&ctx.run).await;
                    break;
                }
            };
        }

        ctx.metrics.total_duration_ms = ctx.started.elapsed().as_millis() as u64;
        tracing::info!(
            workflow_id = %ctx.run.id,
            status = ?ctx.run.status,
            steps = ctx.run.steps.len(),
            total_duration_ms = ctx.metrics.total_duration_ms,
            truncated_roles = ?ctx.metrics.truncated_roles,
            "Workflow finished"
        );

        Ok(WorkflowReport {
            run: ctx.run,
            metrics: ctx.metrics,
        })
    }

    /// Returns whether every role in the stage completed.
    async fn run_stage(&self, stage: &Stage, ctx: &mut RunContext) -> bool {
        match stage {
            Stage::Single(role) => self.run_single(*role, ctx).await,
            Stage::Parallel(roles) => self.run_parallel(roles, ctx).await,
        }
    }

    fn prompt_for(&self, run: &WorkflowRun) -> String {
        build_prompt(
            &run.feature_request,
            &run.completed_outputs(),
            self.settings.max_context_chars,
        )
    }

    async fn run_single(&self, role: Role, ctx: &mut RunContext) -> bool {
        let prompt = self.prompt_for(&ctx.run);
        let mut step = AgentStep::start(role, prompt.clone());
        ctx.run.touch();
        self.emit_step_started(&ctx.run.id, role).await;

        tracing::info!(workflow_id = %ctx.run.id, role = %role, prompt_chars = prompt.chars().count(), "Running role");
        let started = Instant::now();
        let result = self.executor.execute(role, &prompt).await;
        let duration_ms = started.elapsed().as_millis() as u64;

        let ok = match result {
            Ok(output) => {
                self.complete_step(&mut step, output, duration_ms, ctx).await;
                true
            }
            Err(e) => {
                self.fail_step(&mut step, &e, duration_ms, &ctx.run.id).await;
                false
            }
        };
        ctx.run.steps.push(step);
        ctx.run.touch();
        self.persist(&ctx.run).await;
        ok
    }

    /// Run independent roles concurrently and join all-or-nothing.
    ///
    /// On failure only the first failing role (in role order) is recorded as
    /// a step; sibling outputs are discarded and audited as such.
    async fn run_parallel(&self, roles: &[Role], ctx: &mut RunContext) -> bool {
        let prompt = self.prompt_for(&ctx.run);
        let mut steps: Vec<AgentStep> = roles
            .iter()
            .map(|role| AgentStep::start(*role, prompt.clone()))
            .collect();
        for role in roles {
            self.emit_step_started(&ctx.run.id, *role).await;
        }

        tracing::info!(workflow_id = %ctx.run.id, roles = ?roles, "Running parallel stage");
        let prompt = prompt.as_str();
        let results = join_all(roles.iter().map(|role| async move {
            let started = Instant::now();
            let result = self.executor.execute(*role, prompt).await;
            (result, started.elapsed().as_millis() as u64)
        }))
        .await;

        let first_failure = results.iter().position(|(result, _)| result.is_err());

        let ok = match first_failure {
            None => {
                for (mut step, (result, duration_ms)) in steps.into_iter().zip(results) {
                    // All succeeded, so every result is Ok.
                    if let Ok(output) = result {
                        self.complete_step(&mut step, output, duration_ms, ctx).await;
                    }
                    ctx.run.steps.push(step);
                }
                true
            }
            Some(failed_index) => {
                let failed_role = roles[failed_index];
                for (index, (step, (result, duration_ms))) in
                    steps.iter_mut().zip(results).enumerate()
                {
                    if index == failed_index {
                        if let Err(e) = result {
                            self.fail_step(step, &e, duration_ms, &ctx.run.id).await;
                        }
                    } else {
                        self.emit(
                            &ctx.run.id,
                            AuditEventType::StepFailed,
                            json!({
                                "roleId": step.role_id,
                                "discarded": true,
                                "error": format!("discarded: sibling role {failed_role} failed in the same parallel stage"),
                            }),
                        )
                        .await;
                    }
                }
                ctx.run.steps.push(steps.swap_remove(failed_index));
                false
            }
        };

        ctx.run.touch();
        self.persist(&ctx.run).await;
        ok
    }

    async fn complete_step(
        &self,
        step: &mut AgentStep,
        output: String,
        duration_ms: u64,
        ctx: &mut RunContext,
    ) {
        let role = step.role_id;
        let (output, truncated) = truncate_output(output, self.settings.max_output_chars);
        let output_chars = output.chars().count();
        if truncated {
            tracing::warn!(
                workflow_id = %ctx.run.id,
                role = %role,
                max_output_chars = self.settings.max_output_chars,
                "Role output truncated"
            );
            ctx.metrics.truncated_roles.push(role);
        }
        ctx.metrics.steps.push(StepMetric {
            role_id: role,
            duration_ms,
            output_chars,
        });
        step.complete(output);

        tracing::info!(workflow_id = %ctx.run.id, role = %role, duration_ms, output_chars, "Role completed");
        self.emit(
            &ctx.run.id,
            AuditEventType::StepCompleted,
            json!({
                "roleId": role,
                "durationMs": duration_ms,
                "outputChars": output_chars,
                "truncated": truncated,
            }),
        )
        .await;
    }

    async fn fail_step(&self, step: &mut AgentStep, error: &AppError, duration_ms: u64, run_id: &str) {
        let role = step.role_id;
        step.fail(error.message());
        tracing::warn!(workflow_id = %run_id, role = %role, duration_ms, error = %error, "Role failed");
        self.emit(
            run_id,
            AuditEventType::StepFailed,
            json!({ "roleId": role, "durationMs": duration_ms, "error": error.message() }),
        )
        .await;
    }

    async fn review_quality(&self, ctx: &mut RunContext) {
        let files = build_file_set(&ctx.run);
        let (mut files, mut summary) = match self.gate.evaluate(&files).await {
            Ok(evaluated) => evaluated,
            Err(e) => {
                tracing::warn!(workflow_id = %ctx.run.id, error = %e, "Quality review failed");
                return;
            }
        };

        let mut rounds = 0;
        let mut repaired_files = Vec::new();
        if self.settings.feedback_loop && !summary.passed() {
            let feedback = FeedbackLoop::new(self.executor.clone(), self.gate.clone()).with_limits(
                self.settings.max_feedback_rounds,
                self.settings.max_roles_per_round,
            );
            match feedback.run(files.clone(), summary.clone()).await {
                Ok(outcome) => {
                    files = outcome.files;
                    summary = outcome.quality;
                    rounds = outcome.rounds;
                    repaired_files = outcome.applied_files;
                }
                Err(e) => {
                    tracing::warn!(workflow_id = %ctx.run.id, error = %e, "Feedback loop failed");
                }
            }
        }

        tracing::info!(
            workflow_id = %ctx.run.id,
            score = summary.score,
            errors = summary.errors,
            warnings = summary.warnings,
            files = files.len(),
            feedback_rounds = rounds,
            "Quality review completed"
        );
        self.emit(
            &ctx.run.id,
            AuditEventType::QualityCompleted,
            json!({
                "score": summary.score,
                "errors": summary.errors,
                "warnings": summary.warnings,
                "formattedFiles": summary.formatted_files,
                "coverageEstimate": summary.coverage_estimate,
                "passed": summary.passed(),
                "feedbackRounds": rounds,
                "repairedFiles": repaired_files,
            }),
        )
        .await;

        if !summary.passed() {
            ctx.quality_notice = Some(quality_notice(&summary));
        }
        ctx.run.attach_quality(summary);
        ctx.files = Some(files);
        self.persist(&ctx.run).await;
    }

    async fn publish(&self, ctx: &mut RunContext) {
        if !self.settings.publish {
            return;
        }
        let Some(publisher) = &self.publisher else {
            return;
        };
        let has_files = match &ctx.files {
            Some(files) => !files.is_empty(),
            None => publisher.has_artifacts(&ctx.run),
        };
        if !has_files {
            tracing::info!(workflow_id = %ctx.run.id, "No artifacts to publish");
            return;
        }

        self.emit(&ctx.run.id, AuditEventType::PublishStarted, json!({})).await;

        let request = PublishRequest {
            run: &ctx.run,
            files: ctx.files.as_ref(),
            quality_notice: ctx.quality_notice.as_deref(),
        };
        let published = publisher.generate_and_publish(request).await;
        match published {
            Ok(artifact) => {
                tracing::info!(
                    workflow_id = %ctx.run.id,
                    url = %artifact.url,
                    pr_number = artifact.number,
                    "Artifacts published"
                );
                self.emit(
                    &ctx.run.id,
                    AuditEventType::PublishCompleted,
                    json!({ "url": artifact.url, "number": artifact.number, "branch": artifact.branch }),
                )
                .await;
                ctx.run.artifact_url = Some(artifact.url);
                ctx.run.pr_number = Some(artifact.number);
                ctx.run.branch = Some(artifact.branch);
                ctx.run.touch();
                self.persist(&ctx.run).await;
            }
            Err(e) => {
                tracing::warn!(workflow_id = %ctx.run.id, error = %e, "Publishing failed");
                self.emit(
                    &ctx.run.id,
                    AuditEventType::PublishFailed,
                    json!({ "error": e.message() }),
                )
                .await;
            }
        }
    }

    async fn emit_step_started(&self, run_id: &str, role: Role) {
        self.emit(
            run_id,
            AuditEventType::StepStarted,
            json!({ "roleId": role, "index": role.position() }),
        )
        .await;
    }

    async fn emit(&self, run_id: &str, event_type: AuditEventType, data: serde_json::Value) {
        audit::record(
            self.audit.as_ref(),
            run_id,
            NewAuditEvent::new(event_type).with_data(data),
        )
        .await;
    }

    async fn persist(&self, run: &WorkflowRun) {
        if let Err(e) = self.repository.save(run).await {
            tracing::warn!(workflow_id = %run.id, error = %e, "Failed to persist workflow");
        }
    }
}

/// Feature request followed by every prior output, labelled by role.
///
/// When the labelled outputs exceed `max_context_chars`, the oldest are
/// replaced by an omission note until the rest fits.
pub fn build_prompt(
    feature_request: &str,
    outputs: &[(Role, &str)],
    max_context_chars: usize,
) -> String {
    let mut sections: Vec<String> = outputs
        .iter()
        .map(|(role, output)| format!("### {role} Output:\n{output}"))
        .collect();
    let mut total: usize = sections.iter().map(|s| s.chars().count()).sum();

    for (section, (role, output)) in sections.iter_mut().zip(outputs) {
        if total <= max_context_chars {
            break;
        }
        let note = format!(
            "### {role} Output:\n[omitted: {} characters to stay within the context limit]",
            output.chars().count()
        );
        total = total - section.chars().count() + note.chars().count();
        *section = note;
    }

    let mut prompt = format!("## Feature Request\n{feature_request}");
    if !sections.is_empty() {
        prompt.push_str("\n\n## Prior Outputs\n\n");
        prompt.push_str(&sections.join("\n\n"));
    }
    prompt
}

/// Cap `output` at `max_chars`, appending a marker with the original size.
pub fn truncate_output(output: String, max_chars: usize) -> (String, bool) {
    let original = output.chars().count();
    if original <= max_chars {
        return (output, false);
    }
    let mut truncated: String = output.chars().take(max_chars).collect();
    truncated.push_str(&format!(
        "\n\n[truncated: original output was {original} characters]"
    ));
    (truncated, true)
}

/// Warning attached to published artifacts when the gate failed.
pub fn quality_notice(summary: &CodeQualitySummary) -> String {
    let mut notice = format!(
        "⚠️ Quality gate failed: {} error(s), {} warning(s), score {}/100. Review these before merging:",
        summary.errors, summary.warnings, summary.score
    );
    let errors: Vec<_> = summary.issues.iter().filter(|i| i.is_error()).collect();
    for issue in errors.iter().take(MAX_NOTICE_ISSUES) {
        notice.push_str(&format!(
            "\n- [{}] {}: {}",
            issue.tool, issue.file_path, issue.message
        ));
    }
    if errors.len() > MAX_NOTICE_ISSUES {
        notice.push_str(&format!("\n- ... and {} more", errors.len() - MAX_NOTICE_ISSUES));
    }
    notice
}
