use async_trait::async_trait;

use crate::error::Result;
use crate::quality::{FileSet, ValidationIssue};

/// Output of the lint/format pass.
#[derive(Debug, Clone, Default)]
pub struct LintReport {
    /// The file-set after formatting.
    pub files: FileSet,
    pub issues: Vec<ValidationIssue>,
    /// How many files the formatter changed.
    pub formatted_files: u32,
}

/// Output of the test/syntax pass.
#[derive(Debug, Clone, Default)]
pub struct TestReport {
    pub issues: Vec<ValidationIssue>,
    /// Rough test coverage, 0..=100.
    pub coverage_estimate: u32,
}

/// Linting and syntax checking of a generated file-set.
#[async_trait]
pub trait Validator: Send + Sync {
    async fn lint_and_format(&self, files: &FileSet) -> Result<LintReport>;

    async fn validate_tests_and_syntax(&self, files: &FileSet) -> Result<TestReport>;
}
