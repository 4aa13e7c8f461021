//! Task orchestration runtime.
//!
//! A [`TaskRunner`] looks up the executor for a task's kind in the
//! [`TaskRegistry`], gates it on funds, runs it under an
//! [`ExecutionContext`] deadline and persists the outcome.

pub mod amount;
mod context;
mod envelope;
mod kinds;
mod lifecycle;
mod registry;
mod types;

pub use self::context::{ExecutionContext, TaskServices};
pub use self::envelope::TaskRunner;
pub use self::kinds::{DelayExecutor, MockExecutor, VoteExecutor};
pub use self::lifecycle::LifecycleExecutor;
pub use self::registry::{TaskExecutor, TaskRegistry, TaskRegistryBuilder, describe_task};
pub use self::types::{
    AmountSpec, BridgeParams, DelayParams, DelayRange, DeployAccountParams, DepositParams,
    LiquidityParams, MockParams, NftBridgeParams, PayloadShape, ProcessTask, Status, SwapParams,
    Task, TaskKind, TaskParams, TaskPayload, TxParams, TxRecord, VoteParams, WithdrawParams,
};
