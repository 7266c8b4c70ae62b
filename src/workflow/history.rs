use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};
use crate::storage::{get_json, put_json, Store};
use crate::workflow::types::{Status, WorkflowRun};

const HISTORY_KEY: &str = "workflow:history";
const DEFAULT_MAX_HISTORY: usize = 200;

/// The slice of a run kept in the history index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowSummary {
    pub id: String,
    pub feature_request: String,
    pub status: Status,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pr_number: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quality_score: Option<u32>,
}

impl From<&WorkflowRun> for WorkflowSummary {
    fn from(run: &WorkflowRun) -> Self {
        Self {
            id: run.id.clone(),
            feature_request: run.feature_request.clone(),
            status: run.status,
            created_at: run.created_at,
            updated_at: run.updated_at,
            artifact_url: run.artifact_url.clone(),
            pr_number: run.pr_number,
            quality_score: run.quality.as_ref().map(|q| q.score),
        }
    }
}

/// Workflow records plus the capped, recency-ordered history index.
///
/// The index update is an unlocked read-modify-write: concurrent saves of
/// different runs may drop one summary until that run is saved again.
#[derive(Clone)]
pub struct WorkflowRepository {
    store: Arc<dyn Store>,
    max_history: usize,
}

impl WorkflowRepository {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            store,
            max_history: DEFAULT_MAX_HISTORY,
        }
    }

    pub fn with_max_history(mut self, max_history: usize) -> Self {
        self.max_history = max_history;
        self
    }

    fn key(id: &str) -> String {
        format!("workflow:{id}")
    }

    pub async fn save(&self, run: &WorkflowRun) -> Result<()> {
        put_json(self.store.as_ref(), &Self::key(&run.id), run).await?;

        let mut index: Vec<WorkflowSummary> = get_json(self.store.as_ref(), HISTORY_KEY)
            .await?
            .unwrap_or_default();
        index.retain(|s| s.id != run.id);
        index.push(WorkflowSummary::from(run));
        index.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        index.truncate(self.max_history);
        put_json(self.store.as_ref(), HISTORY_KEY, &index).await
    }

    pub async fn get(&self, id: &str) -> Result<Option<WorkflowRun>> {
        if id.trim().is_empty() {
            return Err(AppError::InputValidation(
                "Workflow id must not be empty".to_string(),
            ));
        }
        get_json(self.store.as_ref(), &Self::key(id)).await
    }

    /// Most recently updated first.
    pub async fn history(&self) -> Result<Vec<WorkflowSummary>> {
        let mut index: Vec<WorkflowSummary> = get_json(self.store.as_ref(), HISTORY_KEY)
            .await?
            .unwrap_or_default();
        index.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use chrono::Duration;

    fn repo() -> WorkflowRepository {
        WorkflowRepository::new(Arc::new(MemoryStore::new()))
    }

    #[tokio::test]
    async fn test_save_and_get() {
        let repo = repo();
        let run = WorkflowRun::new("Build a todo list app");
        repo.save(&run).await.unwrap();

        let loaded = repo.get(&run.id).await.unwrap().unwrap();
        assert_eq!(loaded, run);
        assert!(repo.get("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_history_upserts_by_id() {
        let repo = repo();
        let mut run = WorkflowRun::new("a");
        repo.save(&run).await.unwrap();
        run.transition(Status::InProgress);
        repo.save(&run).await.unwrap();

        let history = repo.history().await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].status, Status::InProgress);
    }

    #[tokio::test]
    async fn test_history_is_capped_and_newest_first() {
        let repo = repo().with_max_history(2);
        let base = Utc::now();
        for (i, name) in ["old", "mid", "new"].iter().enumerate() {
            let mut run = WorkflowRun::new(name);
            run.updated_at = base + Duration::seconds(i as i64);
            repo.save(&run).await.unwrap();
        }

        let names: Vec<_> = repo
            .history()
            .await
            .unwrap()
            .into_iter()
            .map(|s| s.feature_request)
            .collect();
        assert_eq!(names, ["new", "mid"]);
    }

    #[tokio::test]
    async fn test_empty_id_is_rejected() {
        let err = repo().get("").await.unwrap_err();
        assert!(matches!(err, AppError::InputValidation(_)));
    }
}
