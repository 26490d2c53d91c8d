//! Workflow history
//!
//! Append-only log of successful workflow calls, read back newest first.

use serde_json::Value;
use uuid::Uuid;

use bizreport_shared::{DynStore, StoreResult, WorkflowHistoryEntry};

pub const DEFAULT_HISTORY_LIMIT: i64 = 20;
pub const MAX_HISTORY_LIMIT: i64 = 100;

/// Clamp a caller-supplied page size into `1..=MAX_HISTORY_LIMIT`
pub fn clamp_limit(limit: Option<i64>) -> i64 {
    limit
        .unwrap_or(DEFAULT_HISTORY_LIMIT)
        .clamp(1, MAX_HISTORY_LIMIT)
}

#[derive(Clone)]
pub struct HistoryRecorder {
    store: DynStore,
}

impl HistoryRecorder {
    pub fn new(store: DynStore) -> Self {
        Self { store }
    }

    pub async fn append(
        &self,
        team_id: Uuid,
        user_id: Uuid,
        input: Value,
        output: Value,
    ) -> StoreResult<WorkflowHistoryEntry> {
        let entry = WorkflowHistoryEntry::new(team_id, user_id, input, output);
        self.store.append_history(&entry).await?;
        Ok(entry)
    }

    /// Most recent entries first. Each call re-queries the store.
    pub async fn get(
        &self,
        team_id: Uuid,
        limit: Option<i64>,
    ) -> StoreResult<Vec<WorkflowHistoryEntry>> {
        self.store.list_history(team_id, clamp_limit(limit)).await
    }
}
