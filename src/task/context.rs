//! Per-invocation execution context and the shared collaborator set.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::billing::{BillingPolicy, BillingUser, FundsService, TaskCharge};
use crate::chain::ChainConnector;
use crate::config::RuntimeConfig;
use crate::db::{ProcessStore, TxAuditRecord};
use crate::error::TaskError;
use crate::profile::ProfileProvider;
use crate::task::registry::describe_task;
use crate::task::types::ProcessTask;

/// Collaborators every executor may reach.
pub struct TaskServices {
    pub store: Arc<dyn ProcessStore>,
    pub profiles: Arc<dyn ProfileProvider>,
    pub connector: Arc<dyn ChainConnector>,
    pub funds: Arc<dyn FundsService>,
    pub billing: BillingPolicy,
    pub config: RuntimeConfig,
}

impl TaskServices {
    /// Persist `task` and settle status history and billing against the
    /// previously stored copy.
    ///
    /// The description is re-rendered from the payload on every write. A
    /// charge is sent only when [`BillingPolicy::charge_owed`] holds for the
    /// stored and new status, so rewriting an unchanged status never charges.
    pub async fn reconcile(
        &self,
        user: &BillingUser,
        task: &mut ProcessTask,
    ) -> Result<(), TaskError> {
        let before = self.store.get_process_task(task.id).await?;

        if before.status != task.status {
            if let Err(e) = self
                .store
                .record_status_changed(task.id, before.status, task.status, task.error.as_deref())
                .await
            {
                tracing::warn!(task_id = %task.id, "Failed to record status change: {}", e);
            }
        }

        task.description = describe_task(&task.task)?;
        task.updated_at = Utc::now();
        self.store.update_process_task(task).await?;

        if self
            .billing
            .charge_owed(before.status, task.status, task.task.kind())
        {
            let charge = TaskCharge::for_task(task, &user.login);
            self.funds.task_completed(&charge).await?;
            tracing::debug!(task_id = %task.id, status = %task.status, "Charge sent");
        }
        Ok(())
    }
}

/// Cancellation token, deadline and collaborators for one task invocation.
pub struct ExecutionContext {
    cancel: CancellationToken,
    deadline: Instant,
    timeout: Duration,
    services: Arc<TaskServices>,
    user: BillingUser,
}

impl ExecutionContext {
    pub fn new(
        services: Arc<TaskServices>,
        user: BillingUser,
        timeout: Duration,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            cancel,
            deadline: Instant::now() + timeout,
            timeout,
            services,
            user,
        }
    }

    pub fn services(&self) -> &TaskServices {
        &self.services
    }

    pub fn user(&self) -> &BillingUser {
        &self.user
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Run `fut` unless the invocation is cancelled or its deadline passes
    /// first. Whichever fires first wins; the others are dropped.
    pub async fn guard<T, E, F>(&self, fut: F) -> Result<T, TaskError>
    where
        F: Future<Output = Result<T, E>>,
        E: Into<TaskError>,
    {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(TaskError::Cancelled),
            _ = tokio::time::sleep_until(self.deadline) => {
                Err(TaskError::DeadlineExceeded(self.timeout))
            }
            result = fut => result.map_err(Into::into),
        }
    }

    /// Sleep for `duration`, waking early on cancellation or deadline.
    pub async fn sleep(&self, duration: Duration) -> Result<(), TaskError> {
        self.guard(async {
            tokio::time::sleep(duration).await;
            Ok::<_, TaskError>(())
        })
        .await
    }

    /// Persist through [`TaskServices::reconcile`]. Not interruptible, so a
    /// write in progress always lands.
    pub async fn persist(&self, task: &mut ProcessTask) -> Result<(), TaskError> {
        self.services.reconcile(&self.user, task).await
    }

    /// Write an audit record. Failures are logged and never fail the task.
    pub async fn audit(&self, record: &TxAuditRecord) {
        if let Err(e) = self.services.store.record_transaction(record).await {
            tracing::warn!(
                task_id = %record.task_id,
                tx_id = %record.tx_id,
                "Failed to write transaction audit record: {}",
                e
            );
        }
    }
}
