use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::audit::{retain_newest, seal, AuditEvent, AuditTrail, NewAuditEvent};
use crate::error::Result;

/// Ephemeral ledger held in process memory.
pub struct MemoryAuditTrail {
    ledgers: RwLock<HashMap<String, Vec<AuditEvent>>>,
    max_events: usize,
}

impl MemoryAuditTrail {
    pub fn new(max_events: usize) -> Self {
        Self {
            ledgers: RwLock::new(HashMap::new()),
            max_events,
        }
    }
}

#[async_trait]
impl AuditTrail for MemoryAuditTrail {
    async fn append(&self, id: &str, event: NewAuditEvent) -> Result<AuditEvent> {
        let event = seal(id, event)?;
        let mut ledgers = self.ledgers.write().await;
        let ledger = ledgers.entry(id.to_string()).or_default();
        ledger.push(event.clone());
        retain_newest(ledger, self.max_events);
        Ok(event)
    }

    async fn list(&self, id: &str) -> Result<Vec<AuditEvent>> {
        Ok(self
            .ledgers
            .read()
            .await
            .get(id)
            .cloned()
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::contract;
    use crate::audit::AuditEventType;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_contract() {
        contract::preserves_append_order(&MemoryAuditTrail::new(1000)).await;
        contract::isolates_ids(&MemoryAuditTrail::new(1000)).await;
        contract::keeps_newest(&MemoryAuditTrail::new(2)).await;
        contract::rejects_unknown_type(&MemoryAuditTrail::new(1000)).await;
        contract::keeps_explicit_timestamp(&MemoryAuditTrail::new(1000)).await;
    }

    #[tokio::test]
    async fn test_concurrent_appends_to_other_id_do_not_interleave() {
        let trail = Arc::new(MemoryAuditTrail::new(1000));

        let noise = {
            let trail = Arc::clone(&trail);
            tokio::spawn(async move {
                for _ in 0..50 {
                    trail
                        .append("Y", NewAuditEvent::new(AuditEventType::DeployStatus))
                        .await
                        .unwrap();
                }
            })
        };

        for t in [
            AuditEventType::WorkflowStarted,
            AuditEventType::StepStarted,
            AuditEventType::StepCompleted,
        ] {
            trail.append("X", NewAuditEvent::new(t)).await.unwrap();
            tokio::task::yield_now().await;
        }
        noise.await.unwrap();

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
        assert_eq!(trail.list("Y").await.unwrap().len(), 50);
    }
}
