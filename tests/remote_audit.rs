//! The remote audit backend against a real in-process command server.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use forgeline::agent::AgentExecutor;
use forgeline::audit::{AuditEventType, AuditTrail, MemoryAuditTrail, NewAuditEvent, RemoteAuditTrail};
use forgeline::config::PipelineConfig;
use forgeline::error::Result;
use forgeline::quality::{HeuristicValidator, QualityGate};
use forgeline::server::{create_router, AppState, Services};
use forgeline::storage::MemoryStore;
use forgeline::workflow::{Orchestrator, Role, WorkflowRepository};

struct Quiet;

#[async_trait]
impl AgentExecutor for Quiet {
    async fn execute(&self, role: Role, _prompt: &str) -> Result<String> {
        Ok(format!("{role} ok"))
    }
}

/// Serve a fresh instance on an ephemeral port and return its base URL.
async fn spawn_server(max_events: usize) -> String {
    let audit: Arc<dyn AuditTrail> = Arc::new(MemoryAuditTrail::new(max_events));
    let orchestrator = Orchestrator::new(
        Arc::new(Quiet),
        audit.clone(),
        WorkflowRepository::new(Arc::new(MemoryStore::new())),
        QualityGate::new(Arc::new(HeuristicValidator::new())),
        PipelineConfig::default(),
    );
    let state = AppState::from_services(Services {
        orchestrator: Arc::new(orchestrator),
        audit,
        deploy: None,
    });

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, create_router(Arc::new(state)))
            .await
            .unwrap();
    });
    format!("http://{addr}")
}

async fn post(base: &str, action: &str, body: Value) -> (u16, Value) {
    let response = reqwest::Client::new()
        .post(format!("{base}/commands/{action}"))
        .json(&body)
        .send()
        .await
        .unwrap();
    let status = response.status().as_u16();
    (status, response.json().await.unwrap())
}

#[tokio::test]
async fn remote_ledger_keeps_append_order_per_id() {
    let base = spawn_server(1000).await;
    let trail = RemoteAuditTrail::new(&base);

    for event_type in [
        AuditEventType::WorkflowStarted,
        AuditEventType::StepStarted,
        AuditEventType::StepCompleted,
    ] {
        trail.append("X", NewAuditEvent::new(event_type)).await.unwrap();
    }
    trail
        .append("Y", NewAuditEvent::new(AuditEventType::DeployTriggered))
        .await
        .unwrap();

    let x: Vec<_> = trail
        .list("X")
        .await
        .unwrap()
        .into_iter()
        .map(|e| e.event_type)
        .collect();
    assert_eq!(
        x,
        [
            AuditEventType::WorkflowStarted,
            AuditEventType::StepStarted,
            AuditEventType::StepCompleted
        ]
    );
    assert_eq!(trail.list("Y").await.unwrap().len(), 1);
}

#[tokio::test]
async fn remote_ledger_applies_server_retention() {
    let base = spawn_server(2).await;
    let trail = RemoteAuditTrail::new(&base);
    for n in 1..=3 {
        trail
            .append(
                "R",
                NewAuditEvent::new(AuditEventType::StepCompleted).with_data(json!({ "n": n })),
            )
            .await
            .unwrap();
    }
    let ns: Vec<_> = trail
        .list("R")
        .await
        .unwrap()
        .into_iter()
        .map(|e| e.data.unwrap()["n"].as_i64().unwrap())
        .collect();
    assert_eq!(ns, [2, 3]);
}

#[tokio::test]
async fn command_errors_map_to_http_status() {
    let base = spawn_server(10).await;

    let (status, body) = post(
        &base,
        "audit.append",
        json!({ "id": "X", "event": { "type": "workflow.paused" } }),
    )
    .await;
    assert_eq!(status, 400);
    assert_eq!(body["ok"], false);
    assert_eq!(body["error"]["kind"], "input_validation");

    let (status, body) = post(&base, "deploy.trigger", json!({ "prNumber": 1 })).await;
    assert_eq!(status, 412);
    assert_eq!(body["error"]["kind"], "precondition");

    let (status, _) = post(&base, "nope.nothing", json!({})).await;
    assert_eq!(status, 400);
}

#[tokio::test]
async fn workflow_run_over_http() {
    let base = spawn_server(1000).await;
    let (status, body) = post(
        &base,
        "workflow.run",
        json!({ "featureRequest": "Build a todo list app" }),
    )
    .await;
    assert_eq!(status, 200);
    assert_eq!(body["ok"], true);
    assert_eq!(body["result"]["status"], "completed");

    let id = body["result"]["id"].as_str().unwrap().to_string();
    let (_, listed) = post(&base, "audit.list", json!({ "id": id })).await;
    let events = listed["result"].as_array().unwrap();
    assert_eq!(events.first().unwrap()["type"], "workflow.started");
    assert_eq!(events.last().unwrap()["type"], "workflow.completed");

    let health = reqwest::get(format!("{base}/health"))
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert_eq!(health, "ok");
}
