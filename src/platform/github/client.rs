use async_trait::async_trait;
use jsonwebtoken::EncodingKey;
use octocrab::Octocrab;
use serde_json::json;
use tokio::sync::RwLock;

use crate::config::GitHubConfig;
use crate::error::{AppError, Result};
use crate::platform::types::*;
use crate::platform::CodeHost;

use super::auth::{generate_app_jwt, load_signing_key, InstallationToken};
use super::mapper;

/// GitHub App installation scoped to one repository.
pub struct GitHubPlatform {
    app_id: u64,
    installation_id: u64,
    owner: String,
    repo: String,
    signing_key: EncodingKey,
    token: RwLock<Option<InstallationToken>>,
}

impl GitHubPlatform {
    pub fn new(config: &GitHubConfig) -> Result<Self> {
        let (owner, repo) = parse_repo(&config.repository)?;
        Ok(Self {
            app_id: config.app_id,
            installation_id: config.installation_id,
            owner: owner.to_string(),
            repo: repo.to_string(),
            signing_key: load_signing_key(&config.private_key_path)?,
            token: RwLock::new(None),
        })
    }

    pub fn repository(&self) -> String {
        format!("{}/{}", self.owner, self.repo)
    }

    pub(super) fn repo_path(&self, suffix: &str) -> String {
        format!("/repos/{}/{}{suffix}", self.owner, self.repo)
    }

    pub(super) fn owner(&self) -> &str {
        &self.owner
    }

    pub(super) fn repo(&self) -> &str {
        &self.repo
    }

    /// Installation token, refreshed shortly before expiry.
    async fn access_token(&self) -> Result<String> {
        {
            let cached = self.token.read().await;
            if let Some(token) = cached.as_ref().filter(|t| t.is_fresh(chrono::Utc::now())) {
                return Ok(token.token.clone());
            }
        }

        let jwt = generate_app_jwt(self.app_id, &self.signing_key)?;
        let app_client = Octocrab::builder()
            .personal_token(jwt)
            .build()
            .map_err(|e| AppError::ExternalService(format!("Failed to build JWT client: {e}")))?;

        let url = format!("/app/installations/{}/access_tokens", self.installation_id);
        let response: serde_json::Value = app_client.post(&url, None::<&()>).await.map_err(|e| {
            AppError::ExternalService(format!("Failed to create installation token: {e}"))
        })?;
        let token = InstallationToken::from_response(&response)?;

        tracing::debug!(
            installation_id = self.installation_id,
            expires_at = %token.expires_at,
            "Refreshed installation token"
        );

        let value = token.token.clone();
        *self.token.write().await = Some(token);
        Ok(value)
    }

    /// An octocrab instance authenticated as the installation.
    pub(super) async fn client(&self) -> Result<Octocrab> {
        let token = self.access_token().await?;
        Octocrab::builder()
            .personal_token(token)
            .build()
            .map_err(|e| AppError::ExternalService(format!("Failed to build octocrab client: {e}")))
    }
}

pub fn parse_repo(repo_full_name: &str) -> Result<(&str, &str)> {
    match repo_full_name.split_once('/') {
        Some((owner, repo)) if !owner.is_empty() && !repo.is_empty() && !repo.contains('/') => {
            Ok((owner, repo))
        }
        _ => Err(AppError::InputValidation(format!(
            "Invalid repository name: {repo_full_name}"
        ))),
    }
}

#[async_trait]
impl CodeHost for GitHubPlatform {
    async fn get_pr_status(&self, pr_number: u64) -> Result<PrStatus> {
        let client = self.client().await?;
        let pr = client.pulls(&self.owner, &self.repo).get(pr_number).await?;
        let approvals = self.get_pr_approval_details(pr_number).await?.approvers.len() as u32;

        Ok(PrStatus {
            number: pr.number,
            state: mapper::map_pr_state(&pr),
            merged: mapper::is_merged(&pr),
            approvals,
        })
    }

    async fn get_pull_request(&self, pr_number: u64) -> Result<PullRequestInfo> {
        let client = self.client().await?;
        let pr = client.pulls(&self.owner, &self.repo).get(pr_number).await?;
        Ok(mapper::map_pull_request(&pr))
    }

    async fn dispatch_workflow(
        &self,
        workflow_file: &str,
        git_ref: &str,
        inputs: serde_json::Value,
    ) -> Result<()> {
        let client = self.client().await?;
        client
            .actions()
            .create_workflow_dispatch(&self.owner, &self.repo, workflow_file, git_ref)
            .inputs(inputs)
            .send()
            .await?;

        tracing::info!(
            repo = %self.repository(),
            workflow_file,
            git_ref,
            "Dispatched workflow"
        );
        Ok(())
    }

    async fn get_latest_workflow_run(
        &self,
        workflow_file: &str,
        branch: &str,
        event: Option<&str>,
    ) -> Result<Option<CiRun>> {
        let client = self.client().await?;
        let mut url = self.repo_path(&format!(
            "/actions/workflows/{}/runs?branch={}&per_page=1",
            urlencoding::encode(workflow_file),
            urlencoding::encode(branch)
        ));
        if let Some(event) = event {
            url.push_str(&format!("&event={}", urlencoding::encode(event)));
        }

        let listing: serde_json::Value = client.get(&url, None::<&()>).await?;
        Ok(mapper::first_workflow_run(&listing))
    }

    async fn get_pr_approval_details(&self, pr_number: u64) -> Result<ApprovalDetails> {
        let client = self.client().await?;
        let url = self.repo_path(&format!("/pulls/{pr_number}/reviews?per_page=100"));
        let reviews: Vec<serde_json::Value> = client.get(&url, None::<&()>).await?;
        Ok(ApprovalDetails {
            approvers: mapper::approvers(&reviews),
        })
    }
}

/// Body for `POST /git/refs`.
pub(super) fn create_ref_body(branch: &str, sha: &str) -> serde_json::Value {
    json!({ "ref": format!("refs/heads/{branch}"), "sha": sha })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_repo() {
        assert_eq!(parse_repo("acme/widgets").unwrap(), ("acme", "widgets"));
        assert!(parse_repo("acme").is_err());
        assert!(parse_repo("/widgets").is_err());
        assert!(parse_repo("acme/widgets/extra").is_err());
    }

    #[test]
    fn test_create_ref_body() {
        let body = create_ref_body("forgeline/abcd1234", "deadbeef");
        assert_eq!(body["ref"], "refs/heads/forgeline/abcd1234");
        assert_eq!(body["sha"], "deadbeef");
    }
}
