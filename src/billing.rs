//! Funds pre-check and completion charges.

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::RuntimeEnv;
use crate::error::BillingError;
use crate::task::{ProcessTask, Status, TaskKind};

/// The account a task runs on behalf of.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillingUser {
    pub id: String,
    pub login: String,
}

/// Charge sent to the funds service once a billable task settles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskCharge {
    /// The funds service dedups on this id.
    pub task_id: Uuid,
    pub process_id: Uuid,
    pub profile_id: Uuid,
    pub user_id: String,
    pub login: String,
    pub kind: TaskKind,
    pub status: Status,
}

impl TaskCharge {
    pub fn for_task(task: &ProcessTask, login: &str) -> Self {
        Self {
            task_id: task.id,
            process_id: task.process_id,
            profile_id: task.profile_id,
            user_id: task.user_id.clone(),
            login: login.to_string(),
            kind: task.task.kind(),
            status: task.status,
        }
    }
}

/// External funds/billing service.
#[async_trait]
pub trait FundsService: Send + Sync {
    /// Funds left on the user's account.
    async fn get_funds(&self, login: &str) -> Result<Decimal, BillingError>;

    async fn task_completed(&self, charge: &TaskCharge) -> Result<(), BillingError>;
}

/// Which kinds consume funds in the current runtime environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BillingPolicy {
    env: RuntimeEnv,
}

impl BillingPolicy {
    pub fn new(env: RuntimeEnv) -> Self {
        Self { env }
    }

    pub fn is_billable(&self, kind: TaskKind) -> bool {
        self.env == RuntimeEnv::Local || kind.is_billable()
    }

    /// A charge is owed when the status changed, did not land on `Done`, and
    /// the kind is billable.
    pub fn charge_owed(&self, before: Status, after: Status, kind: TaskKind) -> bool {
        before != after && after != Status::Done && self.is_billable(kind)
    }
}

impl Default for BillingPolicy {
    fn default() -> Self {
        Self::new(RuntimeEnv::Prod)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_env_bills_everything() {
        let local = BillingPolicy::new(RuntimeEnv::Local);
        let prod = BillingPolicy::new(RuntimeEnv::Prod);
        assert!(local.is_billable(TaskKind::Delay));
        assert!(!prod.is_billable(TaskKind::Delay));
        assert!(prod.is_billable(TaskKind::SyncSwap));
    }

    #[test]
    fn charge_requires_a_status_change() {
        let policy = BillingPolicy::default();
        assert!(policy.charge_owed(Status::Ready, Status::Running, TaskKind::SyncSwap));
        assert!(policy.charge_owed(Status::Running, Status::Error, TaskKind::SyncSwap));
        assert!(!policy.charge_owed(Status::Error, Status::Error, TaskKind::SyncSwap));
        assert!(!policy.charge_owed(Status::Running, Status::Done, TaskKind::SyncSwap));
        assert!(!policy.charge_owed(Status::Ready, Status::Running, TaskKind::Mock));
    }
}
