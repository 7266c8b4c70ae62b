//! Bounded repair loop: route validation errors back to the roles that own
//! the offending files and revalidate whatever they send back.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::agent::prompt::repair_prompt;
use crate::agent::AgentExecutor;
use crate::error::Result;
use crate::quality::{CodeQualitySummary, FileSet, QualityGate, ValidationIssue};
use crate::workflow::artifacts::extract_file_blocks;
use crate::workflow::roles::Role;

/// Hard upper bound on repair rounds, whatever the configuration says.
pub const MAX_ROUNDS: u32 = 3;
const MAX_ISSUES_PER_REQUEST: usize = 25;
const MAX_FILES_PER_PROMPT: usize = 5;
const MAX_FILE_CHARS: usize = 4000;

/// Which role owns a path.
pub fn route_path(path: &str) -> Role {
    let name = path.rsplit('/').next().unwrap_or(path);
    if path.starts_with("src/") {
        Role::Frontend
    } else if path.starts_with("backend/") {
        Role::Backend
    } else if path.starts_with("db/") {
        Role::Database
    } else if path.starts_with("docs/") {
        Role::TechWriter
    } else if path.starts_with("tests/") {
        Role::Qa
    } else if name == "Dockerfile" || name.ends_with(".yml") || name.ends_with(".yaml") {
        Role::Devops
    } else {
        Role::Backend
    }
}

/// The error-severity issues one role is asked to fix.
#[derive(Debug, Clone)]
pub struct FixRequest<'a> {
    pub role: Role,
    pub issues: Vec<&'a ValidationIssue>,
}

impl FixRequest<'_> {
    pub fn describe(&self) -> String {
        let mut lines: Vec<String> = self
            .issues
            .iter()
            .take(MAX_ISSUES_PER_REQUEST)
            .map(|i| format!("- [{}] {}: {}", i.tool, i.file_path, i.message))
            .collect();
        if self.issues.len() > MAX_ISSUES_PER_REQUEST {
            lines.push(format!(
                "- ... and {} more",
                self.issues.len() - MAX_ISSUES_PER_REQUEST
            ));
        }
        lines.join("\n")
    }

    /// Distinct affected paths, in the order their issues were reported.
    fn affected_paths(&self) -> Vec<&str> {
        let mut paths: Vec<&str> = Vec::new();
        for issue in &self.issues {
            if !paths.contains(&issue.file_path.as_str()) {
                paths.push(&issue.file_path);
            }
        }
        paths
    }
}

/// Group error issues by owning role, most issues first.
pub fn fix_requests(issues: &[ValidationIssue]) -> Vec<FixRequest<'_>> {
    let mut by_role: BTreeMap<Role, Vec<&ValidationIssue>> = BTreeMap::new();
    for issue in issues.iter().filter(|i| i.is_error()) {
        by_role.entry(route_path(&issue.file_path)).or_default().push(issue);
    }
    let mut requests: Vec<FixRequest<'_>> = by_role
        .into_iter()
        .map(|(role, issues)| FixRequest { role, issues })
        .collect();
    // Stable sort keeps role order among equal counts.
    requests.sort_by(|a, b| b.issues.len().cmp(&a.issues.len()));
    requests
}

fn affected_files_section(files: &FileSet, request: &FixRequest<'_>) -> String {
    request
        .affected_paths()
        .into_iter()
        .filter_map(|path| files.get(path).map(|content| (path, content)))
        .take(MAX_FILES_PER_PROMPT)
        .map(|(path, content)| {
            let shown: String = content.chars().take(MAX_FILE_CHARS).collect();
            let note = if content.chars().count() > MAX_FILE_CHARS {
                "\n[file truncated]"
            } else {
                ""
            };
            format!("### {path}\n```\n{shown}\n```{note}")
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[derive(Debug, Clone)]
pub struct FeedbackOutcome {
    pub files: FileSet,
    pub quality: CodeQualitySummary,
    pub rounds: u32,
    /// Paths overwritten by repairs, in first-applied order.
    pub applied_files: Vec<String>,
}

pub struct FeedbackLoop {
    executor: Arc<dyn AgentExecutor>,
    gate: QualityGate,
    max_rounds: u32,
    max_roles_per_round: usize,
}

impl FeedbackLoop {
    pub fn new(executor: Arc<dyn AgentExecutor>, gate: QualityGate) -> Self {
        Self {
            executor,
            gate,
            max_rounds: MAX_ROUNDS,
            max_roles_per_round: 2,
        }
    }

    pub fn with_limits(mut self, max_rounds: u32, max_roles_per_round: usize) -> Self {
        self.max_rounds = max_rounds.min(MAX_ROUNDS);
        self.max_roles_per_round = max_roles_per_round.max(1);
        self
    }

    /// Repair `files` until the gate passes or the round budget runs out.
    pub async fn run(&self, files: FileSet, quality: CodeQualitySummary) -> Result<FeedbackOutcome> {
        let mut files = files;
        let mut quality = quality;
        let mut rounds = 0;
        let mut applied_files: Vec<String> = Vec::new();

        while rounds < self.max_rounds && quality.errors > 0 {
            let requests = fix_requests(&quality.issues);
            if requests.is_empty() {
                break;
            }
            rounds += 1;

            let mut repairs = Vec::new();
            for request in requests.iter().take(self.max_roles_per_round) {
                let prompt =
                    repair_prompt(&request.describe(), &affected_files_section(&files, request));
                match self.executor.execute(request.role, &prompt).await {
                    Ok(response) => {
                        let blocks = extract_file_blocks(&response);
                        tracing::info!(
                            round = rounds,
                            role = %request.role,
                            issues = request.issues.len(),
                            files = blocks.len(),
                            "Repair response received"
                        );
                        repairs.extend(blocks);
                    }
                    Err(e) => {
                        tracing::warn!(
                            round = rounds,
                            role = %request.role,
                            error = %e,
                            "Repair request failed, skipping role this round"
                        );
                    }
                }
            }

            for block in repairs {
                if !applied_files.contains(&block.path) {
                    applied_files.push(block.path.clone());
                }
                files.insert(block.path, block.content);
            }

            let (formatted, summary) = self.gate.evaluate(&files).await?;
            files = formatted;
            quality = summary;

            tracing::info!(
                round = rounds,
                errors = quality.errors,
                warnings = quality.warnings,
                score = quality.score,
                "Feedback round revalidated"
            );
        }

        Ok(FeedbackOutcome {
            files,
            quality,
            rounds,
            applied_files,
        })
    }
}
