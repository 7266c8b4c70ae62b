use async_trait::async_trait;
use base64::Engine;
use serde_json::json;

use crate::error::{AppError, Result};
use crate::platform::types::{PublishRequest, PublishedArtifact};
use crate::platform::ArtifactPublisher;
use crate::workflow::artifacts::{build_file_set, has_file_blocks};
use crate::workflow::types::WorkflowRun;

use super::client::{create_ref_body, GitHubPlatform};

const BRANCH_PREFIX: &str = "forgeline/";
const TITLE_MAX_CHARS: usize = 72;

pub fn branch_name(run: &WorkflowRun) -> String {
    let short: String = run.id.chars().filter(|c| *c != '-').take(8).collect();
    format!("{BRANCH_PREFIX}{short}")
}

fn pr_title(feature_request: &str) -> String {
    let first_line = feature_request.lines().next().unwrap_or_default().trim();
    let mut title: String = first_line.chars().take(TITLE_MAX_CHARS).collect();
    if first_line.chars().count() > TITLE_MAX_CHARS {
        title.push_str("...");
    }
    format!("forgeline: {title}")
}

pub fn pr_body(request: &PublishRequest<'_>, file_count: usize) -> String {
    let run = request.run;
    let mut body = String::new();

    if let Some(notice) = request.quality_notice {
        body.push_str(notice);
        body.push_str("\n\n");
    }

    body.push_str("## Feature request\n\n");
    body.push_str(&run.feature_request);
    body.push_str("\n\n");

    if let Some(q) = &run.quality {
        body.push_str(&format!(
            "## Quality\n\n| score | errors | warnings | formatted | coverage |\n|---|---|---|---|---|\n| {}/100 | {} | {} | {} | {}% |\n\n",
            q.score, q.errors, q.warnings, q.formatted_files, q.coverage_estimate
        ));
    }

    let roles: Vec<&str> = run.steps.iter().map(|s| s.role_id.as_str()).collect();
    body.push_str(&format!(
        "Generated by workflow `{}` ({} files, roles: {}).\n",
        run.id,
        file_count,
        roles.join(", ")
    ));
    body
}

fn contents_path(path: &str) -> String {
    path.split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

#[async_trait]
impl ArtifactPublisher for GitHubPlatform {
    fn has_artifacts(&self, run: &WorkflowRun) -> bool {
        has_file_blocks(run)
    }

    async fn generate_and_publish(&self, request: PublishRequest<'_>) -> Result<PublishedArtifact> {
        let run = request.run;
        let files = match request.files {
            Some(files) => files.clone(),
            None => build_file_set(run),
        };
        if files.is_empty() {
            return Err(AppError::Precondition(format!(
                "Workflow {} produced no files to publish",
                run.id
            )));
        }

        let client = self.client().await?;
        let repository = client.repos(self.owner(), self.repo()).get().await?;
        let base = repository
            .default_branch
            .unwrap_or_else(|| "main".to_string());

        let base_ref: serde_json::Value = client
            .get(&self.repo_path(&format!("/git/ref/heads/{base}")), None::<&()>)
            .await?;
        let base_sha = base_ref["object"]["sha"].as_str().ok_or_else(|| {
            AppError::ExternalService(format!("No head commit for branch {base}"))
        })?;

        let branch = branch_name(run);
        let _: serde_json::Value = client
            .post(
                &self.repo_path("/git/refs"),
                Some(&create_ref_body(&branch, base_sha)),
            )
            .await?;

        for (path, content) in &files {
            let url = self.repo_path(&format!("/contents/{}", contents_path(path)));
            // Files inherited from the base branch need their blob sha to be replaced.
            let existing: Option<serde_json::Value> = client
                .get(&format!("{url}?ref={}", urlencoding::encode(&branch)), None::<&()>)
                .await
                .ok();
            let mut body = json!({
                "message": format!("Add {path}"),
                "content": base64::engine::general_purpose::STANDARD.encode(content),
                "branch": branch,
            });
            if let Some(sha) = existing.as_ref().and_then(|e| e["sha"].as_str()) {
                body["sha"] = json!(sha);
            }
            let _: serde_json::Value = client.put(&url, Some(&body)).await?;
        }

        let pr = client
            .pulls(self.owner(), self.repo())
            .create(pr_title(&run.feature_request), &branch, &base)
            .body(pr_body(&request, files.len()))
            .send()
            .await?;

        let url = pr.html_url.map(|u| u.to_string()).unwrap_or_default();
        tracing::info!(
            workflow_id = %run.id,
            repo = %self.repository(),
            pr_number = pr.number,
            branch = %branch,
            files = files.len(),
            "Published artifacts"
        );

        Ok(PublishedArtifact {
            url,
            number: pr.number,
            branch,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quality::CodeQualitySummary;

    #[test]
    fn test_branch_name_uses_run_id_prefix() {
        let run = WorkflowRun::new("x");
        let branch = branch_name(&run);
        assert!(branch.starts_with("forgeline/"));
        assert_eq!(branch.len(), "forgeline/".len() + 8);
    }

    #[test]
    fn test_title_is_first_line_and_capped() {
        assert_eq!(pr_title("Build a todo list app\nwith tags"), "forgeline: Build a todo list app");
        let long = "a".repeat(100);
        assert!(pr_title(&long).ends_with("..."));
    }

    #[test]
    fn test_body_leads_with_quality_notice() {
        let mut run = WorkflowRun::new("Build a todo list app");
        run.attach_quality(CodeQualitySummary::from_issues(Vec::new(), 1, 50));
        let request = PublishRequest {
            run: &run,
            files: None,
            quality_notice: Some("Quality gate failed"),
        };
        let body = pr_body(&request, 3);
        assert!(body.starts_with("Quality gate failed"));
        assert!(body.contains("Build a todo list app"));
        assert!(body.contains("| 100/100 | 0 | 0 | 1 | 50% |"));
        assert!(body.contains("3 files"));
    }

    #[test]
    fn test_contents_path_encodes_segments() {
        assert_eq!(contents_path("src/App.tsx"), "src/App.tsx");
        assert_eq!(contents_path("docs/a b.md"), "docs/a%20b.md");
    }
}
