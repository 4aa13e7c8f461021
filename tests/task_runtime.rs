//! End-to-end runs of the task runner against scripted collaborators.

mod common;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chainflow::chain::{GasPlan, Network, Operation, Token, TxState};
use chainflow::config::RuntimeEnv;
use chainflow::db::{ProcessStore, TxRole};
use chainflow::error::{BillingError, TaskError};
use chainflow::task::{
    AmountSpec, BridgeParams, DelayParams, ExecutionContext, MockParams, NftBridgeParams,
    PayloadShape, ProcessTask, Status, SwapParams, Task, TaskExecutor, TaskKind, TaskPayload,
    TaskRegistry, VoteParams, WithdrawParams,
};
use chainflow::testing::{ChainCall, ScriptedChain};
use pretty_assertions::assert_eq;
use rust_decimal_macros::dec;

use common::{Harness, fast_config};

fn swap(amount: AmountSpec) -> Task {
    Task::new(
        TaskKind::SyncSwap,
        TaskPayload::Swap(SwapParams {
            network: Network::ZksyncEra,
            from_token: Token::Eth,
            to_token: Token::Usdc,
            amount,
            tx: None,
        }),
    )
    .expect("swap task")
}

fn zksync() -> ScriptedChain {
    ScriptedChain::new(Network::ZksyncEra).with_balance(Token::Eth, 1_000)
}

#[tokio::test]
async fn swap_runs_estimate_execute_wait_to_done() {
    let harness = Harness::new(
        zksync()
            .with_tx_ids("0xswap", Some("0xapprove"))
            .with_polls([TxState::Pending, TxState::Confirmed]),
    );
    let task = harness.seed(swap(AmountSpec::Percent(dec!(50)))).await;

    let done = harness
        .runner
        .run(task.clone(), &harness.user)
        .await
        .expect("run");

    assert_eq!(done.status, Status::Done);
    assert_eq!(done.error, None);
    let tx = done
        .task
        .params::<SwapParams>()
        .expect("swap params")
        .tx
        .clone()
        .expect("tx recorded");
    assert_eq!(tx.tx_id, "0xswap");
    assert_eq!(tx.approve_tx_id.as_deref(), Some("0xapprove"));
    assert!(tx.completed);

    let submissions = harness.chain.submissions();
    assert_eq!(submissions.len(), 2);
    assert!(submissions[0].estimate_only);
    assert_eq!(submissions[0].amount, 450);
    assert_eq!(submissions[0].gas, None);
    assert_eq!(submissions[0].slippage, Some(dec!(0.5)));
    assert!(!submissions[1].estimate_only);
    assert_eq!(submissions[1].amount, 500);
    assert_eq!(
        submissions[1].gas,
        Some(GasPlan {
            gas_limit: 150_000,
            gas_price: 1_000_000_000,
        })
    );

    let stored = harness.store.get_process_task(task.id).await.expect("stored");
    assert_eq!(stored, done);
    assert_eq!(stored.description, chainflow::task::describe_task(&stored.task).expect("describe"));

    let statuses: Vec<(Status, Status)> = harness
        .store
        .status_history(task.id)
        .await
        .into_iter()
        .map(|change| (change.before, change.after))
        .collect();
    assert_eq!(
        statuses,
        vec![
            (Status::Ready, Status::Running),
            (Status::Running, Status::Done)
        ]
    );

    let audit: Vec<(String, TxRole)> = harness
        .store
        .transactions(task.id)
        .await
        .into_iter()
        .map(|record| (record.tx_id, record.role))
        .collect();
    assert_eq!(
        audit,
        vec![
            ("0xapprove".to_string(), TxRole::Approve),
            ("0xswap".to_string(), TxRole::Primary)
        ]
    );

    let charges = harness.funds.charges();
    assert_eq!(charges.len(), 1);
    assert_eq!(charges[0].status, Status::Running);
    assert_eq!(charges[0].login, "alice");
}

#[tokio::test]
async fn full_balance_is_a_valid_real_amount() {
    let harness = Harness::new(zksync().with_polls([TxState::Confirmed]));
    let task = harness.seed(swap(AmountSpec::Absolute(1_000))).await;

    let done = harness.runner.run(task, &harness.user).await.expect("run");

    assert_eq!(done.status, Status::Done);
    let amounts: Vec<u128> = harness
        .chain
        .submissions()
        .iter()
        .map(|request| request.amount)
        .collect();
    assert_eq!(amounts, vec![900, 1_000]);
}

#[tokio::test]
async fn terminal_tasks_are_returned_untouched() {
    let harness = Harness::new(zksync());
    for status in [Status::Done, Status::Error] {
        let mut task = harness.seed(swap(AmountSpec::Percent(dec!(10)))).await;
        task.status = status;

        let returned = harness
            .runner
            .run(task.clone(), &harness.user)
            .await
            .expect("run");
        assert_eq!(returned, task);
    }

    assert!(harness.chain.calls().is_empty());
    assert!(harness.funds.queries().is_empty());
    assert_eq!(harness.store.write_count().await, 0);
}

#[tokio::test]
async fn no_funds_fails_before_any_chain_call() {
    let harness = Harness::new(zksync());
    harness.funds.set_funds(dec!(0));
    let task = harness.seed(swap(AmountSpec::Percent(dec!(10)))).await;

    let err = harness
        .runner
        .run(task.clone(), &harness.user)
        .await
        .unwrap_err();

    assert!(matches!(err, TaskError::NoBalance));
    let stored = harness.store.get_process_task(task.id).await.expect("stored");
    assert_eq!(stored.status, Status::Error);
    assert_eq!(stored.error.as_deref(), Some("user has no balance"));
    assert!(harness.chain.calls().is_empty());
    assert_eq!(harness.funds.queries(), vec!["alice".to_string()]);
}

#[tokio::test]
async fn funds_service_outage_fails_the_task() {
    let harness = Harness::new(zksync());
    harness.funds.set_unavailable("billing timed out");
    let task = harness.seed(swap(AmountSpec::Percent(dec!(10)))).await;

    let err = harness
        .runner
        .run(task.clone(), &harness.user)
        .await
        .unwrap_err();

    assert!(matches!(err, TaskError::Billing(BillingError::Unavailable(_))));
    let stored = harness.store.get_process_task(task.id).await.expect("stored");
    assert_eq!(stored.status, Status::Error);
    assert!(harness.chain.calls().is_empty());
}

#[tokio::test]
async fn pending_confirmation_is_retryable_and_never_resubmits() {
    let harness = Harness::with_timeout(zksync(), Duration::from_millis(200));
    let task = harness.seed(swap(AmountSpec::Percent(dec!(50)))).await;

    let pending = harness
        .runner
        .run(task.clone(), &harness.user)
        .await
        .expect("retryable outcome");

    assert_eq!(pending.status, Status::Running);
    assert_eq!(pending.error, None);
    let tx = pending
        .task
        .params::<SwapParams>()
        .expect("swap params")
        .tx
        .clone()
        .expect("tx recorded");
    assert!(!tx.completed);
    assert_eq!(harness.chain.submissions().len(), 2);

    harness.chain.queue_polls([TxState::Confirmed]);
    let done = harness
        .runner
        .run(pending, &harness.user)
        .await
        .expect("second run");

    assert_eq!(done.status, Status::Done);
    assert_eq!(harness.chain.submissions().len(), 2);
}

#[tokio::test]
async fn insufficient_balance_marks_error() {
    let harness = Harness::new(zksync());
    let task = harness.seed(swap(AmountSpec::Absolute(1_200))).await;

    let err = harness
        .runner
        .run(task.clone(), &harness.user)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        TaskError::InsufficientBalance {
            requested: 1_200,
            available: 1_000
        }
    ));
    let stored = harness.store.get_process_task(task.id).await.expect("stored");
    assert_eq!(stored.status, Status::Error);
    assert!(
        stored
            .error
            .as_deref()
            .is_some_and(|message| message.starts_with("insufficient balance"))
    );
    assert!(harness.chain.submissions().is_empty());
}

#[tokio::test]
async fn executor_panic_becomes_execution_fault() {
    let harness = Harness::new(zksync().panicking_on_submit("rpc exploded"));
    let task = harness.seed(swap(AmountSpec::Percent(dec!(10)))).await;

    let err = harness
        .runner
        .run(task.clone(), &harness.user)
        .await
        .unwrap_err();

    assert!(matches!(err, TaskError::ExecutionFault(ref message) if message == "rpc exploded"));
    let stored = harness.store.get_process_task(task.id).await.expect("stored");
    assert_eq!(stored.status, Status::Error);
    assert_eq!(stored.error.as_deref(), Some("task panic: rpc exploded"));
    assert!(!harness.runner.is_running(task.id));
}

#[tokio::test]
async fn reverted_transaction_is_terminal() {
    let harness = Harness::new(zksync().with_polls([TxState::Failed {
        reason: "execution reverted".to_string(),
    }]));
    let task = harness.seed(swap(AmountSpec::Percent(dec!(10)))).await;

    let err = harness
        .runner
        .run(task.clone(), &harness.user)
        .await
        .unwrap_err();

    assert!(matches!(err, TaskError::TransactionFailed { .. }));
    let stored = harness.store.get_process_task(task.id).await.expect("stored");
    assert_eq!(stored.status, Status::Error);
}

#[tokio::test]
async fn deadline_during_estimate_is_fatal() {
    let harness = Harness::with_timeout(
        zksync().with_submit_latency(Duration::from_secs(5)),
        Duration::from_millis(100),
    );
    let task = harness.seed(swap(AmountSpec::Percent(dec!(10)))).await;

    let err = harness
        .runner
        .run(task.clone(), &harness.user)
        .await
        .unwrap_err();

    assert!(matches!(err, TaskError::DeadlineExceeded(_)));
    let stored = harness.store.get_process_task(task.id).await.expect("stored");
    assert_eq!(stored.status, Status::Error);
}

#[tokio::test]
async fn stop_cancels_an_in_flight_invocation() {
    let harness = Harness::new(zksync().with_submit_latency(Duration::from_secs(5)));
    let task = harness.seed(swap(AmountSpec::Percent(dec!(10)))).await;
    let task_id = task.id;

    let stopper = async {
        while !harness.runner.is_running(task_id) {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
        harness.runner.stop(task_id)
    };
    let (result, stopped) = tokio::join!(harness.runner.run(task, &harness.user), stopper);

    assert!(stopped);
    assert!(matches!(result, Err(TaskError::Cancelled)));
    assert!(!harness.runner.stop(task_id));
}

#[tokio::test]
async fn concurrent_invocation_of_the_same_task_is_refused() {
    let harness = Harness::new(
        zksync()
            .with_submit_latency(Duration::from_millis(100))
            .with_polls([TxState::Confirmed]),
    );
    let task = harness.seed(swap(AmountSpec::Percent(dec!(10)))).await;

    let second = async {
        tokio::time::sleep(Duration::from_millis(20)).await;
        harness.runner.run(task.clone(), &harness.user).await
    };
    let (first, second) = tokio::join!(harness.runner.run(task.clone(), &harness.user), second);

    assert_eq!(first.expect("first run").status, Status::Done);
    assert!(matches!(second, Err(TaskError::AlreadyRunning(id)) if id == task.id));
}

#[tokio::test]
async fn unchanged_error_status_charges_once() {
    let harness = Harness::new(zksync());
    let task = harness.seed(swap(AmountSpec::Absolute(5_000))).await;

    harness
        .runner
        .run(task.clone(), &harness.user)
        .await
        .unwrap_err();
    let after_failure = harness.funds.charges();
    assert_eq!(
        after_failure
            .iter()
            .map(|charge| charge.status)
            .collect::<Vec<_>>(),
        vec![Status::Running, Status::Error]
    );

    let mut stored = harness.store.get_process_task(task.id).await.expect("stored");
    harness
        .runner
        .services()
        .reconcile(&harness.user, &mut stored)
        .await
        .expect("reconcile");
    harness
        .runner
        .services()
        .reconcile(&harness.user, &mut stored)
        .await
        .expect("reconcile");

    assert_eq!(harness.funds.charges().len(), after_failure.len());
}

#[tokio::test]
async fn delay_reports_pending_until_its_instant() {
    let harness = Harness::with_timeout(zksync(), Duration::from_millis(100));
    let task = harness
        .seed(
            Task::new(
                TaskKind::Delay,
                TaskPayload::Delay(DelayParams {
                    duration_secs: 3_600,
                    random: None,
                    wait_until: None,
                }),
            )
            .expect("delay task"),
        )
        .await;

    let pending = harness
        .runner
        .run(task, &harness.user)
        .await
        .expect("retryable outcome");

    assert_eq!(pending.status, Status::Running);
    assert!(
        pending
            .task
            .params::<DelayParams>()
            .expect("delay params")
            .wait_until
            .is_some()
    );
    assert!(harness.funds.queries().is_empty());
    assert!(harness.funds.charges().is_empty());
}

#[tokio::test]
async fn zero_delay_completes() {
    let harness = Harness::new(zksync());
    let task = harness
        .seed(
            Task::new(
                TaskKind::Delay,
                TaskPayload::Delay(DelayParams {
                    duration_secs: 0,
                    random: None,
                    wait_until: None,
                }),
            )
            .expect("delay task"),
        )
        .await;

    let done = harness.runner.run(task, &harness.user).await.expect("run");
    assert_eq!(done.status, Status::Done);
}

#[tokio::test]
async fn local_env_gates_non_billable_kinds() {
    let harness = Harness::build(
        zksync(),
        fast_config(RuntimeEnv::Local, Duration::from_secs(1)),
        TaskRegistry::standard(),
    );
    let task = harness
        .seed(Task::new(TaskKind::Mock, TaskPayload::Mock(MockParams {})).expect("mock task"))
        .await;

    let done = harness.runner.run(task, &harness.user).await.expect("run");

    assert_eq!(done.status, Status::Done);
    assert_eq!(harness.funds.queries().len(), 1);
    assert!(harness.funds.charges().is_empty());
}

#[tokio::test]
async fn unregistered_kind_is_recorded_as_error() {
    let harness = Harness::build(
        zksync(),
        fast_config(RuntimeEnv::Prod, Duration::from_secs(1)),
        TaskRegistry::builder()
            .with_standard(TaskKind::Mock)
            .build()
            .expect("registry"),
    );
    let task = harness.seed(swap(AmountSpec::Percent(dec!(10)))).await;

    let err = harness
        .runner
        .run(task.clone(), &harness.user)
        .await
        .unwrap_err();

    assert!(matches!(err, TaskError::UnknownTaskKind(_)));
    let stored = harness.store.get_process_task(task.id).await.expect("stored");
    assert_eq!(stored.status, Status::Error);
}

#[tokio::test]
async fn bridge_to_unsupported_starknet_pair_fails() {
    let harness = Harness::new(ScriptedChain::new(Network::Arbitrum).with_balance(Token::Eth, 1_000));
    let task = harness
        .seed(
            Task::new(
                TaskKind::OrbiterBridge,
                TaskPayload::Bridge(BridgeParams {
                    from_network: Network::Arbitrum,
                    to_network: Network::StarkNet,
                    from_token: Token::Eth,
                    to_token: Token::Eth,
                    amount: AmountSpec::Percent(dec!(20)),
                    tx: None,
                }),
            )
            .expect("bridge task"),
        )
        .await;

    let err = harness
        .runner
        .run(task.clone(), &harness.user)
        .await
        .unwrap_err();

    assert!(matches!(err, TaskError::UnsupportedNetwork { .. }));
    let dry_runs = harness.chain.submissions();
    assert_eq!(dry_runs.len(), 1);
    assert!(dry_runs[0].estimate_only);
    assert_eq!(dry_runs[0].slippage, None);
}

#[tokio::test]
async fn retry_status_reenters_like_ready() {
    let harness = Harness::new(zksync().with_polls([TxState::Confirmed]));
    let mut task = harness.seed(swap(AmountSpec::Percent(dec!(50)))).await;
    task.status = Status::Retry;
    harness.store.insert(task.clone()).await;

    let done = harness.runner.run(task.clone(), &harness.user).await.expect("run");

    assert_eq!(done.status, Status::Done);
    assert_eq!(harness.chain.submissions().len(), 2);
    let history: Vec<(Status, Status)> = harness
        .store
        .status_history(task.id)
        .await
        .into_iter()
        .map(|change| (change.before, change.after))
        .collect();
    assert_eq!(
        history,
        vec![
            (Status::Retry, Status::Running),
            (Status::Running, Status::Done)
        ]
    );
    let charged: Vec<Status> = harness
        .funds
        .charges()
        .iter()
        .map(|charge| charge.status)
        .collect();
    assert_eq!(charged, vec![Status::Running]);
}

#[tokio::test]
async fn stop_while_awaiting_confirmation_is_retryable() {
    let harness = Harness::new(zksync());
    let task = harness.seed(swap(AmountSpec::Percent(dec!(10)))).await;
    let task_id = task.id;

    let stopper = async {
        while !harness
            .chain
            .calls()
            .iter()
            .any(|call| matches!(call, ChainCall::Poll(_)))
        {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        harness.runner.stop(task_id)
    };
    let (result, stopped) = tokio::join!(harness.runner.run(task, &harness.user), stopper);

    assert!(stopped);
    let pending = result.expect("retryable outcome");
    assert_eq!(pending.status, Status::Running);
    assert_eq!(pending.error, None);
    let stored = harness.store.get_process_task(task_id).await.expect("stored");
    assert_eq!(stored, pending);
    assert!(
        stored
            .task
            .params::<SwapParams>()
            .expect("swap params")
            .tx
            .as_ref()
            .is_some_and(|tx| !tx.completed)
    );
}

/// Registered under a swap kind but reads a bridge payload.
struct MisreadingExecutor;

#[async_trait]
impl TaskExecutor for MisreadingExecutor {
    fn kind(&self) -> TaskKind {
        TaskKind::SyncSwap
    }

    async fn run(&self, _ctx: &ExecutionContext, task: &mut ProcessTask) -> Result<(), TaskError> {
        task.task.params::<BridgeParams>()?;
        task.status = Status::Done;
        Ok(())
    }
}

#[tokio::test]
async fn executor_payload_mismatch_is_recorded_as_error() {
    let harness = Harness::build(
        zksync(),
        fast_config(RuntimeEnv::Prod, Duration::from_secs(1)),
        TaskRegistry::builder()
            .register(Arc::new(MisreadingExecutor))
            .build()
            .expect("registry"),
    );
    let task = harness.seed(swap(AmountSpec::Percent(dec!(10)))).await;

    let err = harness
        .runner
        .run(task.clone(), &harness.user)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        TaskError::PayloadMismatch {
            kind: TaskKind::SyncSwap,
            expected: PayloadShape::Bridge,
            found: PayloadShape::Swap,
        }
    ));
    let stored = harness.store.get_process_task(task.id).await.expect("stored");
    assert_eq!(stored.status, Status::Error);
    assert_eq!(
        stored.error.as_deref(),
        Some("payload mismatch for SyncSwap: expected bridge payload, found swap")
    );
    assert!(harness.chain.calls().is_empty());
}

#[tokio::test]
async fn snapshot_vote_records_its_receipt() {
    let harness = Harness::new(ScriptedChain::new(Network::Arbitrum).with_tx_ids("0xvote", None));
    let task = harness
        .seed(
            Task::new(
                TaskKind::SnapshotVote,
                TaskPayload::Vote(VoteParams {
                    network: Network::Arbitrum,
                    space: "stgdao.eth".to_string(),
                    proposal: "0xproposal".to_string(),
                    choice: 1,
                    receipt: None,
                }),
            )
            .expect("vote task"),
        )
        .await;

    let done = harness.runner.run(task, &harness.user).await.expect("run");

    assert_eq!(done.status, Status::Done);
    assert_eq!(
        done.task
            .params::<VoteParams>()
            .expect("vote params")
            .receipt
            .as_deref(),
        Some("0xvote")
    );
    let submissions = harness.chain.submissions();
    assert_eq!(submissions.len(), 1);
    assert!(!submissions[0].estimate_only);
    assert_eq!(submissions[0].gas, None);
    assert!(matches!(submissions[0].operation, Operation::Vote { choice: 1, .. }));
    assert_eq!(harness.funds.queries(), vec!["alice".to_string()]);
}

#[tokio::test]
async fn nft_mint_and_bridge_spends_only_fees() {
    let harness = Harness::new(ScriptedChain::new(Network::ZksyncEra).with_polls([TxState::Confirmed]));
    let task = harness
        .seed(
            Task::new(
                TaskKind::MerklyMintAndBridgeNFT,
                TaskPayload::NftBridge(NftBridgeParams {
                    from_network: Network::ZksyncEra,
                    to_network: Network::Arbitrum,
                    tx: None,
                }),
            )
            .expect("nft task"),
        )
        .await;

    let done = harness.runner.run(task, &harness.user).await.expect("run");

    assert_eq!(done.status, Status::Done);
    assert!(harness.chain.balance_queries().is_empty());
    let amounts: Vec<u128> = harness
        .chain
        .submissions()
        .iter()
        .map(|request| request.amount)
        .collect();
    assert_eq!(amounts, vec![0, 0]);
}

#[tokio::test]
async fn exchange_withdrawal_is_free_and_confirmed_on_chain() {
    let harness = Harness::new(ScriptedChain::new(Network::ZksyncEra).with_polls([TxState::Confirmed]));
    let task = harness
        .seed(
            Task::new(
                TaskKind::WithdrawExchange,
                TaskPayload::Withdraw(WithdrawParams {
                    network: Network::ZksyncEra,
                    exchange: "okex".to_string(),
                    token: Token::Eth,
                    amount: 5_000,
                    tx: None,
                }),
            )
            .expect("withdraw task"),
        )
        .await;

    let done = harness.runner.run(task, &harness.user).await.expect("run");

    assert_eq!(done.status, Status::Done);
    assert!(harness.funds.queries().is_empty());
    assert!(harness.funds.charges().is_empty());
    let submissions = harness.chain.submissions();
    assert_eq!(
        submissions[1].operation,
        Operation::ExchangeWithdraw {
            exchange: "okex".to_string(),
            token: Token::Eth,
            amount: 5_000,
        }
    );
}

#[tokio::test]
async fn okex_binance_completes_like_mock() {
    let harness = Harness::new(zksync());
    let task = harness
        .seed(
            Task::new(TaskKind::OkexBinance, TaskPayload::Mock(MockParams {}))
                .expect("okex binance task"),
        )
        .await;

    let done = harness.runner.run(task, &harness.user).await.expect("run");

    assert_eq!(done.status, Status::Done);
    assert!(harness.chain.calls().is_empty());
    assert!(harness.funds.queries().is_empty());
}
