use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::db::{ProcessStore, TxAuditRecord};
use crate::error::DatabaseError;
use crate::task::{ProcessTask, Status};

/// A recorded status transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusChange {
    pub task_id: Uuid,
    pub before: Status,
    pub after: Status,
    pub error: Option<String>,
    pub at: DateTime<Utc>,
}

/// In-memory [`ProcessStore`].
#[derive(Debug, Default)]
pub struct MemoryStore {
    tasks: RwLock<HashMap<Uuid, ProcessTask>>,
    history: RwLock<Vec<StatusChange>>,
    transactions: RwLock<Vec<TxAuditRecord>>,
    writes: RwLock<usize>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a task, as the scheduler would on creation.
    pub async fn insert(&self, task: ProcessTask) {
        self.tasks.write().await.insert(task.id, task);
    }

    pub async fn status_history(&self, task_id: Uuid) -> Vec<StatusChange> {
        self.history
            .read()
            .await
            .iter()
            .filter(|change| change.task_id == task_id)
            .cloned()
            .collect()
    }

    pub async fn transactions(&self, task_id: Uuid) -> Vec<TxAuditRecord> {
        self.transactions
            .read()
            .await
            .iter()
            .filter(|record| record.task_id == task_id)
            .cloned()
            .collect()
    }

    /// Number of `update_process_task` calls so far.
    pub async fn write_count(&self) -> usize {
        *self.writes.read().await
    }
}

#[async_trait]
impl ProcessStore for MemoryStore {
    async fn get_process_task(&self, id: Uuid) -> Result<ProcessTask, DatabaseError> {
        self.tasks
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| DatabaseError::NotFound {
                entity: "process_task".to_string(),
                id: id.to_string(),
            })
    }

    async fn update_process_task(&self, task: &ProcessTask) -> Result<(), DatabaseError> {
        let mut tasks = self.tasks.write().await;
        let Some(slot) = tasks.get_mut(&task.id) else {
            return Err(DatabaseError::NotFound {
                entity: "process_task".to_string(),
                id: task.id.to_string(),
            });
        };
        *slot = task.clone();
        *self.writes.write().await += 1;
        Ok(())
    }

    async fn record_status_changed(
        &self,
        task_id: Uuid,
        before: Status,
        after: Status,
        error: Option<&str>,
    ) -> Result<(), DatabaseError> {
        self.history.write().await.push(StatusChange {
            task_id,
            before,
            after,
            error: error.map(str::to_string),
            at: Utc::now(),
        });
        Ok(())
    }

    async fn record_transaction(&self, record: &TxAuditRecord) -> Result<(), DatabaseError> {
        self.transactions.write().await.push(record.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::*;
    use crate::task::{MockParams, Task, TaskKind, TaskPayload};

    fn mock_task() -> ProcessTask {
        let task = Task::new(TaskKind::Mock, TaskPayload::Mock(MockParams {})).expect("task");
        ProcessTask::new(Uuid::new_v4(), Uuid::new_v4(), "user-1", task).expect("process task")
    }

    #[tokio::test]
    async fn update_requires_existing_task() {
        let store = MemoryStore::new();
        let task = mock_task();
        assert!(matches!(
            store.update_process_task(&task).await,
            Err(DatabaseError::NotFound { .. })
        ));

        store.insert(task.clone()).await;
        let mut updated = task.clone();
        updated.status = Status::Running;
        store.update_process_task(&updated).await.expect("update");

        let stored = store.get_process_task(task.id).await.expect("get");
        assert_eq!(stored.status, Status::Running);
        assert_eq!(store.write_count().await, 1);
    }

    #[tokio::test]
    async fn history_is_filtered_per_task() {
        let store = MemoryStore::new();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        store
            .record_status_changed(a, Status::Ready, Status::Running, None)
            .await
            .expect("record");
        store
            .record_status_changed(b, Status::Running, Status::Error, Some("boom"))
            .await
            .expect("record");

        let history = store.status_history(b).await;
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].error.as_deref(), Some("boom"));
    }
}
