use std::sync::Arc;

use async_trait::async_trait;

use crate::audit::{retain_newest, seal, AuditEvent, AuditTrail, NewAuditEvent};
use crate::error::Result;
use crate::storage::{get_json, put_json, Store};

/// Ledger persisted through a keyed [`Store`], one record per audit id.
///
/// `append` reads the ledger, pushes, and writes it back without a lock.
/// Two writers racing on the same id can lose an event; this is a diagnostic
/// log, not a transactional one.
pub struct DurableAuditTrail {
    store: Arc<dyn Store>,
    max_events: usize,
}

impl DurableAuditTrail {
    pub fn new(store: Arc<dyn Store>, max_events: usize) -> Self {
        Self { store, max_events }
    }

    fn key(id: &str) -> String {
        format!("audit:{id}")
    }
}

#[async_trait]
impl AuditTrail for DurableAuditTrail {
    async fn append(&self, id: &str, event: NewAuditEvent) -> Result<AuditEvent> {
        let event = seal(id, event)?;
        let key = Self::key(id);

        let mut ledger: Vec<AuditEvent> = get_json(self.store.as_ref(), &key)
            .await?
            .unwrap_or_default();
        ledger.push(event.clone());
        retain_newest(&mut ledger, self.max_events);
        put_json(self.store.as_ref(), &key, &ledger).await?;

        Ok(event)
    }

    async fn list(&self, id: &str) -> Result<Vec<AuditEvent>> {
        Ok(get_json(self.store.as_ref(), &Self::key(id))
            .await?
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::{contract, AuditEventType};
    use crate::error::AppError;
    use crate::storage::{FileStore, MemoryStore};

    fn trail(max_events: usize) -> DurableAuditTrail {
        DurableAuditTrail::new(Arc::new(MemoryStore::new()), max_events)
    }

    struct BrokenStore;

    #[async_trait]
    impl Store for BrokenStore {
        async fn get(&self, _key: &str) -> Result<Option<serde_json::Value>> {
            Err(AppError::Persistence("disk on fire".to_string()))
        }

        async fn put(&self, _key: &str, _value: serde_json::Value) -> Result<()> {
            Err(AppError::Persistence("disk on fire".to_string()))
        }
    }

    #[tokio::test]
    async fn test_contract() {
        contract::preserves_append_order(&trail(1000)).await;
        contract::isolates_ids(&trail(1000)).await;
        contract::keeps_newest(&trail(2)).await;
        contract::rejects_unknown_type(&trail(1000)).await;
        contract::keeps_explicit_timestamp(&trail(1000)).await;
    }

    #[tokio::test]
    async fn test_survives_restart() {
        let tmp = tempfile::tempdir().unwrap();
        {
            let store = Arc::new(FileStore::open(tmp.path()).await.unwrap());
            let trail = DurableAuditTrail::new(store, 1000);
            trail
                .append("wf-1", NewAuditEvent::new(AuditEventType::WorkflowStarted))
                .await
                .unwrap();
            trail
                .append("wf-1", NewAuditEvent::new(AuditEventType::WorkflowFailed))
                .await
                .unwrap();
        }

        let store = Arc::new(FileStore::open(tmp.path()).await.unwrap());
        let trail = DurableAuditTrail::new(store, 1000);
        let events = trail.list("wf-1").await.unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[1].event_type, AuditEventType::WorkflowFailed);
    }

    #[tokio::test]
    async fn test_storage_failure_surfaces_as_persistence_error() {
        let trail = DurableAuditTrail::new(Arc::new(BrokenStore), 10);
        let err = trail
            .append("x", NewAuditEvent::new(AuditEventType::StepStarted))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Persistence(_)));
        assert!(matches!(
            trail.list("x").await.unwrap_err(),
            AppError::Persistence(_)
        ));
    }
}
