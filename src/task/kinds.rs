//! Executors for kinds without on-chain effects.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use rand::Rng;

use crate::chain::{ChainRequest, Operation};
use crate::error::{ChainError, TaskError};
use crate::task::context::ExecutionContext;
use crate::task::registry::TaskExecutor;
use crate::task::types::{DelayParams, MockParams, ProcessTask, Status, TaskKind, VoteParams};

/// Waits until a fixed instant chosen on the first run.
pub struct DelayExecutor;

impl DelayExecutor {
    fn wait_until(params: &mut DelayParams) -> Result<DateTime<Utc>, TaskError> {
        if let Some(at) = params.wait_until {
            return Ok(at);
        }

        let secs = match params.random {
            Some(range) if range.min_secs > range.max_secs => {
                return Err(TaskError::InvalidAmount(format!(
                    "delay range {}..={} is empty",
                    range.min_secs, range.max_secs
                )));
            }
            Some(range) => rand::thread_rng().gen_range(range.min_secs..=range.max_secs),
            None => params.duration_secs,
        };
        let delta = i64::try_from(secs)
            .ok()
            .and_then(TimeDelta::try_seconds)
            .ok_or_else(|| TaskError::InvalidAmount(format!("delay of {secs}s is too long")))?;

        let at = Utc::now() + delta;
        params.wait_until = Some(at);
        Ok(at)
    }
}

#[async_trait]
impl TaskExecutor for DelayExecutor {
    fn kind(&self) -> TaskKind {
        TaskKind::Delay
    }

    async fn run(&self, ctx: &ExecutionContext, task: &mut ProcessTask) -> Result<(), TaskError> {
        if task.status.is_terminal() {
            return Ok(());
        }

        let wait_until = Self::wait_until(task.task.params_mut::<DelayParams>()?)?;
        task.status = Status::Running;
        ctx.persist(task).await?;

        let remaining = (wait_until - Utc::now())
            .to_std()
            .unwrap_or(Duration::ZERO);
        match ctx.sleep(remaining).await {
            Ok(()) => {}
            Err(TaskError::DeadlineExceeded(_) | TaskError::Cancelled) => {
                tracing::debug!(task_id = %task.id, %wait_until, "Delay still pending");
                return Err(TaskError::DelayPending);
            }
            Err(e) => return Err(e),
        }

        task.status = Status::Done;
        ctx.persist(task).await
    }
}

/// Completes immediately. Serves every kind with a mock payload.
pub struct MockExecutor {
    kind: TaskKind,
}

impl MockExecutor {
    pub fn new(kind: TaskKind) -> Self {
        Self { kind }
    }
}

#[async_trait]
impl TaskExecutor for MockExecutor {
    fn kind(&self) -> TaskKind {
        self.kind
    }

    async fn run(&self, ctx: &ExecutionContext, task: &mut ProcessTask) -> Result<(), TaskError> {
        if task.status.is_terminal() {
            return Ok(());
        }
        task.task.params::<MockParams>()?;
        task.status = Status::Done;
        ctx.persist(task).await
    }
}

/// Casts an off-chain governance vote signed by the profile's wallet.
///
/// There is nothing to confirm: the receipt id returned by the client is
/// final, so a task holding a receipt is done.
pub struct VoteExecutor;

#[async_trait]
impl TaskExecutor for VoteExecutor {
    fn kind(&self) -> TaskKind {
        TaskKind::SnapshotVote
    }

    async fn run(&self, ctx: &ExecutionContext, task: &mut ProcessTask) -> Result<(), TaskError> {
        if task.status.is_terminal() {
            return Ok(());
        }
        let params = task.task.params::<VoteParams>()?.clone();

        task.status = Status::Running;
        ctx.persist(task).await?;

        if params.receipt.is_none() {
            let services = ctx.services();
            let profile = ctx.guard(services.profiles.profile(task.profile_id)).await?;
            let settings = ctx
                .guard(services.profiles.network_settings(&task.user_id, params.network))
                .await?;
            let client = ctx
                .guard(services.connector.connect(&profile, &settings, params.network))
                .await?;

            let request = ChainRequest {
                operation: Operation::Vote {
                    space: params.space.clone(),
                    proposal: params.proposal.clone(),
                    choice: params.choice,
                },
                from_token: params.network.native_token(),
                amount: 0,
                estimate_only: false,
                gas: None,
                slippage: None,
            };
            let submission = ctx.guard(client.submit(&request)).await?;
            if submission.tx_id.is_empty() {
                return Err(ChainError::Rpc {
                    network: params.network,
                    reason: "vote returned no receipt".to_string(),
                }
                .into());
            }
            tracing::debug!(task_id = %task.id, space = %params.space, receipt = %submission.tx_id, "Vote cast");
            task.task.params_mut::<VoteParams>()?.receipt = Some(submission.tx_id);
        }

        task.status = Status::Done;
        ctx.persist(task).await
    }
}
