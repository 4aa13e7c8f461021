//! Execution envelope: billing gate, deadline, panic containment and final
//! persistence around every executor.

use std::any::Any;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use futures::FutureExt;
use rust_decimal::Decimal;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use uuid::Uuid;

use crate::billing::BillingUser;
use crate::error::TaskError;
use crate::task::context::{ExecutionContext, TaskServices};
use crate::task::registry::TaskRegistry;
use crate::task::types::{ProcessTask, Status};

/// Slack past the task deadline before the runner drops a stuck executor.
const DEADLINE_GRACE: Duration = Duration::from_secs(1);

/// Runs tasks through their executors.
pub struct TaskRunner {
    registry: Arc<TaskRegistry>,
    services: Arc<TaskServices>,
    in_flight: Mutex<HashMap<Uuid, CancellationToken>>,
}

/// Exclusive hold on a task id for one invocation.
struct Lease<'a> {
    in_flight: &'a Mutex<HashMap<Uuid, CancellationToken>>,
    task_id: Uuid,
    token: CancellationToken,
}

impl Drop for Lease<'_> {
    fn drop(&mut self) {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.task_id);
    }
}

impl TaskRunner {
    pub fn new(registry: Arc<TaskRegistry>, services: Arc<TaskServices>) -> Self {
        Self {
            registry,
            services,
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    pub fn registry(&self) -> &TaskRegistry {
        &self.registry
    }

    pub fn services(&self) -> &Arc<TaskServices> {
        &self.services
    }

    pub fn is_running(&self, task_id: Uuid) -> bool {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(&task_id)
    }

    /// Cancel an in-flight invocation. Returns `false` if none is running.
    pub fn stop(&self, task_id: Uuid) -> bool {
        match self
            .in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&task_id)
        {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    fn acquire(&self, task_id: Uuid) -> Result<Lease<'_>, TaskError> {
        let mut in_flight = self
            .in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if in_flight.contains_key(&task_id) {
            return Err(TaskError::AlreadyRunning(task_id));
        }
        let token = CancellationToken::new();
        in_flight.insert(task_id, token.clone());
        Ok(Lease {
            in_flight: &self.in_flight,
            task_id,
            token,
        })
    }

    /// Run one invocation of `task` on behalf of `user`.
    ///
    /// Terminal tasks come back untouched. A retryable outcome returns the
    /// task as last persisted so the caller can reschedule it; any other
    /// failure is persisted as `Error` before being returned.
    pub async fn run(&self, task: ProcessTask, user: &BillingUser) -> Result<ProcessTask, TaskError> {
        if task.status.is_terminal() {
            return Ok(task);
        }

        let lease = self.acquire(task.id)?;
        let span = tracing::info_span!(
            "run_task",
            task_id = %task.id,
            process_id = %task.process_id,
            profile_id = %task.profile_id,
            task_kind = %task.task.kind(),
            user_id = %task.user_id,
        );
        self.run_leased(task, user, lease.token.clone())
            .instrument(span)
            .await
    }

    async fn run_leased(
        &self,
        mut task: ProcessTask,
        user: &BillingUser,
        cancel: CancellationToken,
    ) -> Result<ProcessTask, TaskError> {
        let kind = task.task.kind();
        let executor = match self.registry.executor(kind) {
            Ok(executor) => executor,
            Err(err) => return self.fail(task, user, err).await,
        };

        if self.services.billing.is_billable(kind) {
            let funds = match self.services.funds.get_funds(&user.login).await {
                Ok(funds) => funds,
                Err(err) => return self.fail(task, user, err.into()).await,
            };
            if funds <= Decimal::ZERO {
                tracing::warn!(login = %user.login, %funds, "User has no balance");
                return self.fail(task, user, TaskError::NoBalance).await;
            }
        }

        let timeout = self.services.config.timeout_for(kind);
        let ctx = ExecutionContext::new(self.services.clone(), user.clone(), timeout, cancel);
        let backstop = ctx.deadline() + DEADLINE_GRACE;

        let outcome = {
            let run = AssertUnwindSafe(executor.run(&ctx, &mut task)).catch_unwind();
            match tokio::time::timeout_at(backstop, run).await {
                Ok(Ok(result)) => result,
                Ok(Err(panic)) => Err(TaskError::ExecutionFault(panic_message(panic.as_ref()))),
                Err(_) => Err(TaskError::DeadlineExceeded(timeout)),
            }
        };

        match outcome {
            Ok(()) => {
                task.error = None;
                self.services.reconcile(user, &mut task).await?;
                tracing::debug!(status = %task.status, "Task invocation finished");
                Ok(task)
            }
            Err(err) if err.is_retryable() => {
                tracing::debug!("Task not settled yet: {}", err);
                Ok(self.services.store.get_process_task(task.id).await?)
            }
            Err(err) => {
                tracing::error!(code = err.code(), "Task failed: {}", err);
                self.fail(task, user, err).await
            }
        }
    }

    /// Persist `task` as `Error` with the failure message and return `err`.
    async fn fail(
        &self,
        mut task: ProcessTask,
        user: &BillingUser,
        err: TaskError,
    ) -> Result<ProcessTask, TaskError> {
        task.status = Status::Error;
        task.error = Some(err.to_string());
        if let Err(persist_err) = self.services.reconcile(user, &mut task).await {
            tracing::error!("Failed to persist task failure: {}", persist_err);
        }
        Err(err)
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn panic_payloads_are_rendered() {
        let text: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(text.as_ref()), "boom");
        let owned: Box<dyn Any + Send> = Box::new(String::from("kaboom"));
        assert_eq!(panic_message(owned.as_ref()), "kaboom");
        let other: Box<dyn Any + Send> = Box::new(7_u8);
        assert_eq!(panic_message(other.as_ref()), "unknown panic");
    }
}
