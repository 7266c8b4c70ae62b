use std::collections::BTreeMap;

use octocrab::models::IssueState;

use crate::platform::types::{CiRun, PrState, PullRequestInfo};

pub fn map_pr_state(pr: &octocrab::models::pulls::PullRequest) -> PrState {
    match pr.state {
        Some(IssueState::Open) => PrState::Open,
        _ => PrState::Closed,
    }
}

pub fn is_merged(pr: &octocrab::models::pulls::PullRequest) -> bool {
    pr.merged_at.is_some()
}

pub fn map_pull_request(pr: &octocrab::models::pulls::PullRequest) -> PullRequestInfo {
    PullRequestInfo {
        number: pr.number,
        head_branch: pr.head.ref_field.clone(),
        head_sha: pr.head.sha.clone(),
    }
}

/// Reviewers whose most recent decisive review is `APPROVED`.
///
/// `reviews` must be in submission order, as the reviews endpoint returns
/// them. Plain comments do not override an earlier approval or rejection.
pub fn approvers(reviews: &[serde_json::Value]) -> Vec<String> {
    let mut latest: BTreeMap<&str, &str> = BTreeMap::new();
    for review in reviews {
        let Some(login) = review["user"]["login"].as_str() else {
            continue;
        };
        match review["state"].as_str() {
            Some(state @ ("APPROVED" | "CHANGES_REQUESTED" | "DISMISSED")) => {
                latest.insert(login, state);
            }
            _ => {}
        }
    }
    latest
        .into_iter()
        .filter(|(_, state)| *state == "APPROVED")
        .map(|(login, _)| login.to_string())
        .collect()
}

/// First entry of a `GET .../runs` listing.
pub fn first_workflow_run(listing: &serde_json::Value) -> Option<CiRun> {
    let run = listing["workflow_runs"].as_array()?.first()?;
    Some(CiRun {
        id: run["id"].as_u64()?,
        status: run["status"].as_str().unwrap_or("unknown").to_string(),
        conclusion: run["conclusion"].as_str().map(str::to_string),
        html_url: run["html_url"].as_str().map(str::to_string),
        head_branch: run["head_branch"].as_str().map(str::to_string),
        event: run["event"].as_str().map(str::to_string),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn review(login: &str, state: &str) -> serde_json::Value {
        json!({ "user": { "login": login }, "state": state })
    }

    fn pull_request(state: &str, merged_at: Option<&str>) -> octocrab::models::pulls::PullRequest {
        serde_json::from_value(json!({
            "url": "https://api.github.com/repos/acme/todo/pulls/7",
            "id": 1007,
            "number": 7,
            "state": state,
            "merged_at": merged_at,
            "head": { "ref": "feature/login", "sha": "abc123" },
            "base": { "ref": "main", "sha": "def456" }
        }))
        .unwrap()
    }

    #[test]
    fn test_merge_state_comes_from_merged_at() {
        let open = pull_request("open", None);
        assert_eq!(map_pr_state(&open), PrState::Open);
        assert!(!is_merged(&open));

        let closed = pull_request("closed", None);
        assert_eq!(map_pr_state(&closed), PrState::Closed);
        assert!(!is_merged(&closed));

        let merged = pull_request("closed", Some("2024-05-01T12:00:00Z"));
        assert!(is_merged(&merged));
    }

    #[test]
    fn test_map_pull_request_uses_head() {
        let info = map_pull_request(&pull_request("open", None));
        assert_eq!(info.number, 7);
        assert_eq!(info.head_branch, "feature/login");
        assert_eq!(info.head_sha, "abc123");
    }

    #[test]
    fn test_latest_review_per_reviewer_wins() {
        let reviews = vec![
            review("alice", "APPROVED"),
            review("bob", "APPROVED"),
            review("bob", "CHANGES_REQUESTED"),
            review("carol", "CHANGES_REQUESTED"),
            review("carol", "APPROVED"),
            review("alice", "COMMENTED"),
            review("alice", "APPROVED"),
        ];
        assert_eq!(approvers(&reviews), ["alice", "carol"]);
    }

    #[test]
    fn test_comment_does_not_revoke_approval() {
        let reviews = vec![review("dave", "APPROVED"), review("dave", "COMMENTED")];
        assert_eq!(approvers(&reviews), ["dave"]);
    }

    #[test]
    fn test_dismissed_review_revokes_approval() {
        let reviews = vec![review("erin", "APPROVED"), review("erin", "DISMISSED")];
        assert!(approvers(&reviews).is_empty());
    }

    #[test]
    fn test_first_workflow_run() {
        let listing = json!({
            "total_count": 2,
            "workflow_runs": [
                {
                    "id": 99,
                    "status": "completed",
                    "conclusion": "failure",
                    "html_url": "https://github.com/o/r/actions/runs/99",
                    "head_branch": "feature",
                    "event": "workflow_dispatch"
                },
                { "id": 98, "status": "completed", "conclusion": "success" }
            ]
        });
        let run = first_workflow_run(&listing).unwrap();
        assert_eq!(run.id, 99);
        assert!(run.is_completed());
        assert!(!run.succeeded());
        assert_eq!(run.event.as_deref(), Some("workflow_dispatch"));

        assert!(first_workflow_run(&json!({ "workflow_runs": [] })).is_none());
    }
}
