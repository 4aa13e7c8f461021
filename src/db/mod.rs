//! Persistence seam for process tasks.
//!
//! The SQL backends live in the service layer; the runtime only needs the
//! four operations on [`ProcessStore`]. [`MemoryStore`] backs tests and the
//! CLI.

mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::chain::{GasPlan, Network};
use crate::error::DatabaseError;
use crate::task::{ProcessTask, Status};

pub use self::memory::MemoryStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TxRole {
    Approve,
    Primary,
}

/// One on-chain transaction written for audit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxAuditRecord {
    pub task_id: Uuid,
    pub process_id: Uuid,
    pub profile_id: Uuid,
    pub network: Network,
    pub network_id: u64,
    pub tx_id: String,
    pub role: TxRole,
    pub gas: Option<GasPlan>,
    pub recorded_at: DateTime<Utc>,
}

#[async_trait]
pub trait ProcessStore: Send + Sync {
    async fn get_process_task(&self, id: Uuid) -> Result<ProcessTask, DatabaseError>;

    async fn update_process_task(&self, task: &ProcessTask) -> Result<(), DatabaseError>;

    async fn record_status_changed(
        &self,
        task_id: Uuid,
        before: Status,
        after: Status,
        error: Option<&str>,
    ) -> Result<(), DatabaseError>;

    async fn record_transaction(&self, record: &TxAuditRecord) -> Result<(), DatabaseError>;
}
