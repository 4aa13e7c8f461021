//! Estimate, execute, wait-for-confirmation lifecycle shared by every
//! transaction-producing task kind.

use std::marker::PhantomData;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, warn};

use crate::chain::{ChainClient, ChainRequest, GasPlan, TxState};
use crate::db::{TxAuditRecord, TxRole};
use crate::error::{ChainError, TaskError};
use crate::profile::NetworkSettings;
use crate::task::amount::{estimate_amount, gas_plan, gas_station, resolve_amount, slippage};
use crate::task::context::ExecutionContext;
use crate::task::registry::TaskExecutor;
use crate::task::types::{ProcessTask, Status, TaskKind, TxParams, TxRecord};

/// Executor for any kind whose payload implements [`TxParams`].
///
/// A recorded transaction is never resubmitted: re-entry with a transaction
/// id skips straight to waiting for it.
pub struct LifecycleExecutor<P> {
    kind: TaskKind,
    _params: PhantomData<fn() -> P>,
}

impl<P: TxParams> LifecycleExecutor<P> {
    pub fn new(kind: TaskKind) -> Self {
        Self {
            kind,
            _params: PhantomData,
        }
    }
}

/// Client and network identity for one attempt.
struct Session<'a> {
    ctx: &'a ExecutionContext,
    client: &'a dyn ChainClient,
    network_id: u64,
}

impl Session<'_> {
    async fn audit(&self, task: &ProcessTask, tx_id: &str, role: TxRole, gas: Option<GasPlan>) {
        let record = TxAuditRecord {
            task_id: task.id,
            process_id: task.process_id,
            profile_id: task.profile_id,
            network: self.client.network(),
            network_id: self.network_id,
            tx_id: tx_id.to_string(),
            role,
            gas,
            recorded_at: Utc::now(),
        };
        self.ctx.audit(&record).await;
    }
}

#[async_trait]
impl<P: TxParams> TaskExecutor for LifecycleExecutor<P> {
    fn kind(&self) -> TaskKind {
        self.kind
    }

    async fn run(&self, ctx: &ExecutionContext, task: &mut ProcessTask) -> Result<(), TaskError> {
        if task.status.is_terminal() {
            return Ok(());
        }
        let params = task.task.params::<P>()?.clone();

        task.status = Status::Running;
        ctx.persist(task).await?;

        let services = ctx.services();
        let network = params.source_network();
        let profile = ctx.guard(services.profiles.profile(task.profile_id)).await?;
        let settings = ctx
            .guard(services.profiles.network_settings(&task.user_id, network))
            .await?;
        let client = ctx
            .guard(services.connector.connect(&profile, &settings, network))
            .await?;
        let network_id = ctx.guard(client.network_id()).await?;

        let session = Session {
            ctx,
            client: client.as_ref(),
            network_id,
        };

        if params.tx().is_none() {
            self.submit(&session, task, &params, &settings).await?;
        }
        self.wait(&session, task).await?;

        let completed = task
            .task
            .params::<P>()?
            .tx()
            .is_some_and(|tx| tx.completed);
        if completed {
            task.status = Status::Done;
            ctx.persist(task).await?;
            debug!(task_id = %task.id, "Task done");
        }
        Ok(())
    }
}

impl<P: TxParams> LifecycleExecutor<P> {
    async fn submit(
        &self,
        session: &Session<'_>,
        task: &mut ProcessTask,
        params: &P,
        settings: &NetworkSettings,
    ) -> Result<(), TaskError> {
        let ctx = session.ctx;
        let client = session.client;

        let address = ctx.guard(client.wallet_address()).await?;
        let amount = match params.amount() {
            Some(spec) => {
                let balance = ctx
                    .guard(client.balance(&address, params.from_token()))
                    .await?;
                resolve_amount(spec, balance.wei)?
            }
            None => 0,
        };
        let slippage = if self.kind.uses_slippage() {
            Some(slippage(settings.source, self.kind)?)
        } else {
            None
        };
        let operation = params.operation(self.kind);

        let dry_run = ChainRequest {
            operation: operation.clone(),
            from_token: params.from_token(),
            amount: estimate_amount(amount),
            estimate_only: true,
            gas: None,
            slippage,
        };
        let estimated = ctx.guard(client.submit(&dry_run)).await?;
        let estimate = gas_station(estimated.cost, params.source_network());
        let plan = gas_plan(estimate, settings, params.destination_network())?;
        debug!(
            task_id = %task.id,
            amount = %amount,
            gas_limit = plan.gas_limit,
            gas_price = %plan.gas_price,
            "Estimated submission"
        );

        let request = ChainRequest {
            operation,
            from_token: params.from_token(),
            amount,
            estimate_only: false,
            gas: Some(plan),
            slippage,
        };
        let submission = ctx.guard(client.submit(&request)).await?;
        if submission.tx_id.is_empty() {
            return Err(ChainError::Rpc {
                network: client.network(),
                reason: "submission returned no transaction id".to_string(),
            }
            .into());
        }

        *task.task.params_mut::<P>()?.tx_mut() = Some(TxRecord::new(
            submission.tx_id.clone(),
            submission.approve_tx_id.clone(),
            plan,
        ));
        ctx.persist(task).await?;
        debug!(task_id = %task.id, tx_id = %submission.tx_id, "Transaction recorded");

        if let Some(approve_tx_id) = &submission.approve_tx_id {
            session
                .audit(task, approve_tx_id, TxRole::Approve, Some(plan))
                .await;
        }
        Ok(())
    }

    async fn wait(&self, session: &Session<'_>, task: &mut ProcessTask) -> Result<(), TaskError> {
        let ctx = session.ctx;
        let Some(tx) = task.task.params::<P>()?.tx().cloned() else {
            return Ok(());
        };
        if tx.completed {
            return Ok(());
        }

        let poll_interval = ctx.services().config.tx_poll_interval;
        loop {
            match ctx.guard(session.client.poll_transaction(&tx.tx_id)).await {
                Ok(TxState::Confirmed) => break,
                Ok(TxState::Failed { reason }) => {
                    return Err(TaskError::TransactionFailed {
                        tx_id: tx.tx_id.clone(),
                        reason,
                    });
                }
                Ok(TxState::Pending) => {}
                Err(TaskError::Chain(e)) => {
                    warn!(task_id = %task.id, tx_id = %tx.tx_id, "Transaction poll failed: {}", e);
                }
                Err(TaskError::DeadlineExceeded(_) | TaskError::Cancelled) => {
                    return Err(TaskError::TransactionNotReady);
                }
                Err(e) => return Err(e),
            }

            match ctx.sleep(poll_interval).await {
                Ok(()) => {}
                Err(TaskError::DeadlineExceeded(_) | TaskError::Cancelled) => {
                    return Err(TaskError::TransactionNotReady);
                }
                Err(e) => return Err(e),
            }
        }

        if let Some(record) = task.task.params_mut::<P>()?.tx_mut() {
            record.completed = true;
        }
        ctx.persist(task).await?;
        session
            .audit(task, &tx.tx_id, TxRole::Primary, tx.gas)
            .await;
        debug!(task_id = %task.id, tx_id = %tx.tx_id, "Transaction confirmed");
        Ok(())
    }
}
