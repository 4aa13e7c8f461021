//! Task kind to executor dispatch.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::TaskError;
use crate::task::context::ExecutionContext;
use crate::task::kinds::{DelayExecutor, MockExecutor, VoteExecutor};
use crate::task::lifecycle::LifecycleExecutor;
use crate::task::types::{
    BridgeParams, DelayParams, DeployAccountParams, DepositParams, LiquidityParams, MockParams,
    NftBridgeParams, PayloadShape, ProcessTask, SwapParams, Task, TaskKind, VoteParams,
    WithdrawParams,
};

/// Runs one task kind.
///
/// Executors mutate the task in place and persist through
/// [`ExecutionContext::persist`] at each step. They never see terminal tasks
/// from the runner, but must treat one as a no-op if they do.
#[async_trait]
pub trait TaskExecutor: Send + Sync {
    fn kind(&self) -> TaskKind;

    async fn run(&self, ctx: &ExecutionContext, task: &mut ProcessTask) -> Result<(), TaskError>;
}

/// Executor lookup by task kind. Built once and shared.
pub struct TaskRegistry {
    executors: HashMap<TaskKind, Arc<dyn TaskExecutor>>,
}

impl TaskRegistry {
    /// One executor for every [`TaskKind`].
    pub fn standard() -> Self {
        let executors = TaskKind::ALL
            .into_iter()
            .map(|kind| (kind, standard_executor(kind)))
            .collect();
        Self { executors }
    }

    /// Start an empty registry, typically for tests.
    pub fn builder() -> TaskRegistryBuilder {
        TaskRegistryBuilder::default()
    }

    pub fn executor(&self, kind: TaskKind) -> Result<Arc<dyn TaskExecutor>, TaskError> {
        self.executors
            .get(&kind)
            .cloned()
            .ok_or_else(|| TaskError::UnknownTaskKind(kind.to_string()))
    }

    /// Look up an executor by its kind label.
    pub fn lookup(&self, name: &str) -> Result<Arc<dyn TaskExecutor>, TaskError> {
        self.executor(name.parse()?)
    }

    /// Registered kinds in declaration order.
    pub fn kinds(&self) -> Vec<TaskKind> {
        let mut kinds: Vec<TaskKind> = self.executors.keys().copied().collect();
        kinds.sort_unstable();
        kinds
    }
}

fn standard_executor(kind: TaskKind) -> Arc<dyn TaskExecutor> {
    match kind.shape() {
        PayloadShape::Delay => Arc::new(DelayExecutor),
        PayloadShape::Mock => Arc::new(MockExecutor::new(kind)),
        PayloadShape::Vote => Arc::new(VoteExecutor),
        PayloadShape::Swap => Arc::new(LifecycleExecutor::<SwapParams>::new(kind)),
        PayloadShape::Bridge => Arc::new(LifecycleExecutor::<BridgeParams>::new(kind)),
        PayloadShape::Deposit => Arc::new(LifecycleExecutor::<DepositParams>::new(kind)),
        PayloadShape::Withdraw => Arc::new(LifecycleExecutor::<WithdrawParams>::new(kind)),
        PayloadShape::Liquidity => Arc::new(LifecycleExecutor::<LiquidityParams>::new(kind)),
        PayloadShape::NftBridge => Arc::new(LifecycleExecutor::<NftBridgeParams>::new(kind)),
        PayloadShape::DeployAccount => {
            Arc::new(LifecycleExecutor::<DeployAccountParams>::new(kind))
        }
    }
}

#[derive(Default)]
pub struct TaskRegistryBuilder {
    executors: HashMap<TaskKind, Arc<dyn TaskExecutor>>,
    duplicate: Option<TaskKind>,
}

impl TaskRegistryBuilder {
    pub fn register(mut self, executor: Arc<dyn TaskExecutor>) -> Self {
        let kind = executor.kind();
        if self.executors.insert(kind, executor).is_some() && self.duplicate.is_none() {
            self.duplicate = Some(kind);
        }
        self
    }

    /// Register the standard executor for `kind`.
    pub fn with_standard(self, kind: TaskKind) -> Self {
        self.register(standard_executor(kind))
    }

    pub fn build(self) -> Result<TaskRegistry, TaskError> {
        if let Some(kind) = self.duplicate {
            return Err(TaskError::DuplicateExecutor(kind));
        }
        Ok(TaskRegistry {
            executors: self.executors,
        })
    }
}

/// Canonical pretty-JSON rendering of a task's payload, stored alongside it.
pub fn describe_task(task: &Task) -> Result<String, TaskError> {
    let rendered = match task.kind().shape() {
        PayloadShape::Delay => serde_json::to_string_pretty(task.params::<DelayParams>()?),
        PayloadShape::Mock => serde_json::to_string_pretty(task.params::<MockParams>()?),
        PayloadShape::Swap => serde_json::to_string_pretty(task.params::<SwapParams>()?),
        PayloadShape::Bridge => serde_json::to_string_pretty(task.params::<BridgeParams>()?),
        PayloadShape::Deposit => serde_json::to_string_pretty(task.params::<DepositParams>()?),
        PayloadShape::Withdraw => serde_json::to_string_pretty(task.params::<WithdrawParams>()?),
        PayloadShape::Vote => serde_json::to_string_pretty(task.params::<VoteParams>()?),
        PayloadShape::Liquidity => serde_json::to_string_pretty(task.params::<LiquidityParams>()?),
        PayloadShape::NftBridge => serde_json::to_string_pretty(task.params::<NftBridgeParams>()?),
        PayloadShape::DeployAccount => {
            serde_json::to_string_pretty(task.params::<DeployAccountParams>()?)
        }
    }?;
    Ok(rendered)
}
