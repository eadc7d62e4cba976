use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::error::{AppError, Res};
use dashmap::{DashMap, mapref::entry::Entry};
use serde_json::Value;

use crate::history::{HistoryEvent, SignalRecord};

/// Append-only storage of workflow histories and signal inboxes.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Opens a new history whose first event is `started`.
    /// Fails with `Conflict` when the id was ever used before.
    async fn create(&self, id: &str, started: &HistoryEvent) -> Res<()>;

    async fn append(&self, id: &str, event: &HistoryEvent) -> Res<()>;

    /// Whole history in append order. `NotFound` for unknown ids.
    async fn load(&self, id: &str) -> Res<Vec<HistoryEvent>>;

    /// Marks the instance finished so `open_instances` skips it.
    async fn close(&self, id: &str) -> Res<()>;

    async fn open_instances(&self) -> Res<Vec<String>>;

    /// Stores a signal in the instance inbox and assigns its sequence number.
    async fn push_signal(
        &self,
        id: &str,
        name: &str,
        payload: Value,
        sent_at: DateTime<Utc>,
    ) -> Res<SignalRecord>;

    /// Every signal ever sent to the instance, in send order.
    async fn signals(&self, id: &str) -> Res<Vec<SignalRecord>>;
}

#[derive(Default)]
struct InstanceLog {
    events: Vec<HistoryEvent>,
    signals: Vec<SignalRecord>,
    open: bool,
}

/// Process-local history store. Histories live as long as the store.
#[derive(Default)]
pub struct MemoryHistoryStore {
    logs: DashMap<String, InstanceLog>,
}

impl MemoryHistoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn not_found(id: &str) -> AppError {
    AppError::NotFound(format!("workflow history {}", id))
}

#[async_trait]
impl HistoryStore for MemoryHistoryStore {
    async fn create(&self, id: &str, started: &HistoryEvent) -> Res<()> {
        match self.logs.entry(id.to_string()) {
            Entry::Occupied(_) => Err(AppError::Conflict(format!(
                "workflow already started: id={}",
                id
            ))),
            Entry::Vacant(entry) => {
                entry.insert(InstanceLog {
                    events: vec![started.clone()],
                    signals: Vec::new(),
                    open: true,
                });
                Ok(())
            }
        }
    }

    async fn append(&self, id: &str, event: &HistoryEvent) -> Res<()> {
        let mut log = self.logs.get_mut(id).ok_or_else(|| not_found(id))?;
        log.events.push(event.clone());
        Ok(())
    }

    async fn load(&self, id: &str) -> Res<Vec<HistoryEvent>> {
        self.logs
            .get(id)
            .map(|log| log.events.clone())
            .ok_or_else(|| not_found(id))
    }

    async fn close(&self, id: &str) -> Res<()> {
        let mut log = self.logs.get_mut(id).ok_or_else(|| not_found(id))?;
        log.open = false;
        Ok(())
    }

    async fn open_instances(&self) -> Res<Vec<String>> {
        let mut ids: Vec<String> = self
            .logs
            .iter()
            .filter(|entry| entry.open)
            .map(|entry| entry.key().clone())
            .collect();
        ids.sort();
        Ok(ids)
    }

    async fn push_signal(
        &self,
        id: &str,
        name: &str,
        payload: Value,
        sent_at: DateTime<Utc>,
    ) -> Res<SignalRecord> {
        let mut log = self.logs.get_mut(id).ok_or_else(|| not_found(id))?;
        let record = SignalRecord {
            seq: log.signals.len() as u64 + 1,
            name: name.to_string(),
            payload,
            sent_at,
        };
        log.signals.push(record.clone());
        Ok(record)
    }

    async fn signals(&self, id: &str) -> Res<Vec<SignalRecord>> {
        self.logs
            .get(id)
            .map(|log| log.signals.clone())
            .ok_or_else(|| not_found(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn started() -> HistoryEvent {
        let now = Utc::now();
        HistoryEvent::Started {
            workflow: "test".into(),
            input: json!(1),
            started_at: now,
            deadline: now,
        }
    }

    #[tokio::test]
    async fn ids_are_single_use() {
        let store = MemoryHistoryStore::new();
        store.create("a", &started()).await.unwrap();
        store.close("a").await.unwrap();

        let err = store.create("a", &started()).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn closed_instances_are_not_open() {
        let store = MemoryHistoryStore::new();
        store.create("a", &started()).await.unwrap();
        store.create("b", &started()).await.unwrap();
        store.close("a").await.unwrap();

        assert_eq!(store.open_instances().await.unwrap(), vec!["b".to_string()]);
    }

    #[tokio::test]
    async fn signals_are_numbered_in_send_order() {
        let store = MemoryHistoryStore::new();
        store.create("a", &started()).await.unwrap();

        let first = store.push_signal("a", "cancel", json!(null), Utc::now()).await.unwrap();
        let second = store.push_signal("a", "cancel", json!(null), Utc::now()).await.unwrap();

        assert_eq!((first.seq, second.seq), (1, 2));
        assert_eq!(store.signals("a").await.unwrap(), vec![first, second]);
    }

    #[tokio::test]
    async fn unknown_ids_are_not_found() {
        let store = MemoryHistoryStore::new();
        assert!(matches!(store.load("x").await, Err(AppError::NotFound(_))));
        assert!(matches!(
            store.append("x", &started()).await,
            Err(AppError::NotFound(_))
        ));
    }
}
