//! Quality scoring over a generated file-set.

pub mod feedback;
pub mod heuristic;
pub mod validator;

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::Result;

pub use feedback::{FeedbackLoop, FeedbackOutcome};
pub use heuristic::HeuristicValidator;
pub use validator::{LintReport, TestReport, Validator};

/// Generated files keyed by repository-relative path.
pub type FileSet = BTreeMap<String, String>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationIssue {
    pub tool: String,
    pub severity: Severity,
    pub file_path: String,
    pub message: String,
}

impl ValidationIssue {
    pub fn error(tool: &str, file_path: &str, message: impl Into<String>) -> Self {
        Self {
            tool: tool.to_string(),
            severity: Severity::Error,
            file_path: file_path.to_string(),
            message: message.into(),
        }
    }

    pub fn warning(tool: &str, file_path: &str, message: impl Into<String>) -> Self {
        Self {
            tool: tool.to_string(),
            severity: Severity::Warning,
            file_path: file_path.to_string(),
            message: message.into(),
        }
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CodeQualitySummary {
    pub score: u32,
    pub errors: u32,
    pub warnings: u32,
    pub formatted_files: u32,
    pub coverage_estimate: u32,
    pub issues: Vec<ValidationIssue>,
}

impl CodeQualitySummary {
    pub fn from_issues(issues: Vec<ValidationIssue>, formatted_files: u32, coverage_estimate: u32) -> Self {
        let errors = issues.iter().filter(|i| i.is_error()).count() as u32;
        let warnings = issues.len() as u32 - errors;
        Self {
            score: score(errors, warnings),
            errors,
            warnings,
            formatted_files,
            coverage_estimate: coverage_estimate.min(100),
            issues,
        }
    }

    /// The gate passes only with zero error-severity issues.
    pub fn passed(&self) -> bool {
        self.errors == 0
    }
}

/// `clamp(100 - errors*12 - warnings*3, 0, 100)`.
pub fn score(errors: u32, warnings: u32) -> u32 {
    let penalty = u64::from(errors) * 12 + u64::from(warnings) * 3;
    100u64.saturating_sub(penalty) as u32
}

/// Runs both validation passes and folds them into one summary.
#[derive(Clone)]
pub struct QualityGate {
    validator: Arc<dyn Validator>,
}

impl QualityGate {
    pub fn new(validator: Arc<dyn Validator>) -> Self {
        Self { validator }
    }

    /// Lint/format `files`, then check tests and syntax on the formatted
    /// output. Returns the formatted file-set with its summary.
    pub async fn evaluate(&self, files: &FileSet) -> Result<(FileSet, CodeQualitySummary)> {
        let lint = self.validator.lint_and_format(files).await?;
        let tests = self.validator.validate_tests_and_syntax(&lint.files).await?;

        let mut issues = lint.issues;
        issues.extend(tests.issues);

        let summary =
            CodeQualitySummary::from_issues(issues, lint.formatted_files, tests.coverage_estimate);
        Ok((lint.files, summary))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_score_examples() {
        assert_eq!(score(0, 0), 100);
        assert_eq!(score(5, 0), 40);
        assert_eq!(score(10, 0), 0);
        assert_eq!(score(0, 4), 88);
        assert_eq!(score(1, 1), 85);
    }

    #[test]
    fn test_score_never_negative() {
        assert_eq!(score(1000, 1000), 0);
        assert_eq!(score(u32::MAX, u32::MAX), 0);
    }

    #[test]
    fn test_summary_counts_severities() {
        let summary = CodeQualitySummary::from_issues(
            vec![
                ValidationIssue::error("comments", "src/a.ts", "TODO left behind"),
                ValidationIssue::warning("format", "src/a.ts", "trailing whitespace"),
                ValidationIssue::warning("format", "src/b.ts", "trailing whitespace"),
            ],
            2,
            150,
        );
        assert_eq!(summary.errors, 1);
        assert_eq!(summary.warnings, 2);
        assert_eq!(summary.score, 82);
        assert_eq!(summary.coverage_estimate, 100);
        assert!(!summary.passed());
    }

    #[test]
    fn test_issue_serializes_camel_case() {
        let issue = ValidationIssue::error("syntax", "db/schema.sql", "unbalanced (");
        let json = serde_json::to_value(&issue).unwrap();
        assert_eq!(json["filePath"], "db/schema.sql");
        assert_eq!(json["severity"], "error");
    }
}
