//! Execution rows: the audit record of every operation attempt.

use crate::domain::LogRef;
use async_trait::async_trait;
use dashmap::DashMap;
use medqr_core::ScannedEntity;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
    Cancelled,
}

impl ExecutionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

/// One attempt to execute an operation. The row survives even when the
/// operation's own mutations roll back.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationExecution {
    pub id: Uuid,
    pub operation_code: String,
    pub session_id: Option<Uuid>,
    pub executed_by: String,
    pub status: ExecutionStatus,
    /// Snapshot of the scans at creation time; confirmation replays this,
    /// never live session state.
    pub scanned_entities: Vec<ScannedEntity>,
    #[serde(default)]
    pub result_data: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(default)]
    pub created_logs: Vec<LogRef>,
    #[serde(with = "time::serde::rfc3339")]
    pub started_at: OffsetDateTime,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub completed_at: Option<OffsetDateTime>,
}

impl OperationExecution {
    pub fn new(
        operation_code: impl Into<String>,
        session_id: Option<Uuid>,
        executed_by: impl Into<String>,
        scanned_entities: Vec<ScannedEntity>,
        status: ExecutionStatus,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            operation_code: operation_code.into(),
            session_id,
            executed_by: executed_by.into(),
            status,
            scanned_entities,
            result_data: Map::new(),
            error_message: None,
            created_logs: Vec::new(),
            started_at: OffsetDateTime::now_utc(),
            completed_at: None,
        }
    }
}

/// Storage for execution rows.
///
/// `begin_confirm` and `cancel_pending` are the concurrency-sensitive
/// operations: the Pending -> InProgress / Cancelled transition must be
/// atomic so two confirmers (or a confirmer racing a cancel) cannot both
/// win.
#[async_trait]
pub trait ExecutionStore: Send + Sync {
    async fn insert(&self, execution: OperationExecution);

    async fn get(&self, id: Uuid) -> Option<OperationExecution>;

    async fn update(&self, execution: OperationExecution);

    /// Atomically flip a Pending row to InProgress and return its snapshot.
    /// Returns `None` when the row is absent or not pending.
    async fn begin_confirm(&self, id: Uuid) -> Option<OperationExecution>;

    /// Atomically flip a Pending row to Cancelled with a completion stamp.
    async fn cancel_pending(&self, id: Uuid) -> Option<OperationExecution>;
}

#[derive(Debug, Default)]
pub struct InMemoryExecutionStore {
    rows: DashMap<Uuid, OperationExecution>,
}

impl InMemoryExecutionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ExecutionStore for InMemoryExecutionStore {
    async fn insert(&self, execution: OperationExecution) {
        self.rows.insert(execution.id, execution);
    }

    async fn get(&self, id: Uuid) -> Option<OperationExecution> {
        self.rows.get(&id).map(|row| row.clone())
    }

    async fn update(&self, execution: OperationExecution) {
        self.rows.insert(execution.id, execution);
    }

    async fn begin_confirm(&self, id: Uuid) -> Option<OperationExecution> {
        let mut row = self.rows.get_mut(&id)?;
        if row.status != ExecutionStatus::Pending {
            return None;
        }
        row.status = ExecutionStatus::InProgress;
        Some(row.clone())
    }

    async fn cancel_pending(&self, id: Uuid) -> Option<OperationExecution> {
        let mut row = self.rows.get_mut(&id)?;
        if row.status != ExecutionStatus::Pending {
            return None;
        }
        row.status = ExecutionStatus::Cancelled;
        row.completed_at = Some(OffsetDateTime::now_utc());
        Some(row.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pending_row() -> OperationExecution {
        OperationExecution::new(
            "DEVICE_TRANSFER",
            None,
            "u1",
            Vec::new(),
            ExecutionStatus::Pending,
        )
    }

    #[tokio::test]
    async fn test_begin_confirm_flips_pending_once() {
        let store = InMemoryExecutionStore::new();
        let row = pending_row();
        let id = row.id;
        store.insert(row).await;

        let first = store.begin_confirm(id).await;
        assert!(first.is_some());
        assert_eq!(first.unwrap().status, ExecutionStatus::InProgress);

        // Second confirmer loses
        assert!(store.begin_confirm(id).await.is_none());
    }

    #[tokio::test]
    async fn test_cancel_only_pending() {
        let store = InMemoryExecutionStore::new();
        let row = pending_row();
        let id = row.id;
        store.insert(row).await;

        let cancelled = store.cancel_pending(id).await.unwrap();
        assert_eq!(cancelled.status, ExecutionStatus::Cancelled);
        assert!(cancelled.completed_at.is_some());

        // Already cancelled; neither cancel nor confirm succeed now
        assert!(store.cancel_pending(id).await.is_none());
        assert!(store.begin_confirm(id).await.is_none());
    }

    #[tokio::test]
    async fn test_get_missing_row() {
        let store = InMemoryExecutionStore::new();
        assert!(store.get(Uuid::new_v4()).await.is_none());
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(!ExecutionStatus::Pending.is_terminal());
        assert!(!ExecutionStatus::InProgress.is_terminal());
        assert!(ExecutionStatus::Completed.is_terminal());
        assert!(ExecutionStatus::Failed.is_terminal());
        assert!(ExecutionStatus::Cancelled.is_terminal());
    }
}
