//! Task payloads, statuses and the persisted `ProcessTask` record.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::chain::{GasPlan, Network, Operation, Token, Wei, wei_string};
use crate::error::TaskError;

/// Discriminant naming the on-chain operation a task performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TaskKind {
    Delay,
    Mock,
    OkexBinance,
    OkexDeposit,
    WithdrawExchange,
    SnapshotVote,
    SyncSwap,
    MuteioSwap,
    MaverickSwap,
    SpaceFiSwap,
    VelocoreSwap,
    IzumiSwap,
    VeSyncSwap,
    EzkaliburSwap,
    ZkSwap,
    PancakeSwap,
    TraderJoeSwap,
    Weth,
    SithSwap,
    JediSwap,
    MySwap,
    ProtossSwap,
    Swap10k,
    SyncSwapLP,
    StargateBridge,
    OrbiterBridge,
    TestNetBridgeSwap,
    ZkSyncOfficialBridgeToEthereum,
    ZkSyncOfficialBridgeFromEthereum,
    StarkNetBridge,
    MerklyMintAndBridgeNFT,
    DeployStarkNetAccount,
}

impl TaskKind {
    pub const ALL: [TaskKind; 32] = [
        Self::Delay,
        Self::Mock,
        Self::OkexBinance,
        Self::OkexDeposit,
        Self::WithdrawExchange,
        Self::SnapshotVote,
        Self::SyncSwap,
        Self::MuteioSwap,
        Self::MaverickSwap,
        Self::SpaceFiSwap,
        Self::VelocoreSwap,
        Self::IzumiSwap,
        Self::VeSyncSwap,
        Self::EzkaliburSwap,
        Self::ZkSwap,
        Self::PancakeSwap,
        Self::TraderJoeSwap,
        Self::Weth,
        Self::SithSwap,
        Self::JediSwap,
        Self::MySwap,
        Self::ProtossSwap,
        Self::Swap10k,
        Self::SyncSwapLP,
        Self::StargateBridge,
        Self::OrbiterBridge,
        Self::TestNetBridgeSwap,
        Self::ZkSyncOfficialBridgeToEthereum,
        Self::ZkSyncOfficialBridgeFromEthereum,
        Self::StarkNetBridge,
        Self::MerklyMintAndBridgeNFT,
        Self::DeployStarkNetAccount,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Delay => "Delay",
            Self::Mock => "Mock",
            Self::OkexBinance => "OkexBinance",
            Self::OkexDeposit => "OkexDeposit",
            Self::WithdrawExchange => "WithdrawExchange",
            Self::SnapshotVote => "SnapshotVote",
            Self::SyncSwap => "SyncSwap",
            Self::MuteioSwap => "MuteioSwap",
            Self::MaverickSwap => "MaverickSwap",
            Self::SpaceFiSwap => "SpaceFiSwap",
            Self::VelocoreSwap => "VelocoreSwap",
            Self::IzumiSwap => "IzumiSwap",
            Self::VeSyncSwap => "VeSyncSwap",
            Self::EzkaliburSwap => "EzkaliburSwap",
            Self::ZkSwap => "ZkSwap",
            Self::PancakeSwap => "PancakeSwap",
            Self::TraderJoeSwap => "TraderJoeSwap",
            Self::Weth => "Weth",
            Self::SithSwap => "SithSwap",
            Self::JediSwap => "JediSwap",
            Self::MySwap => "MySwap",
            Self::ProtossSwap => "ProtossSwap",
            Self::Swap10k => "Swap10k",
            Self::SyncSwapLP => "SyncSwapLP",
            Self::StargateBridge => "StargateBridge",
            Self::OrbiterBridge => "OrbiterBridge",
            Self::TestNetBridgeSwap => "TestNetBridgeSwap",
            Self::ZkSyncOfficialBridgeToEthereum => "ZkSyncOfficialBridgeToEthereum",
            Self::ZkSyncOfficialBridgeFromEthereum => "ZkSyncOfficialBridgeFromEthereum",
            Self::StarkNetBridge => "StarkNetBridge",
            Self::MerklyMintAndBridgeNFT => "MerklyMintAndBridgeNFT",
            Self::DeployStarkNetAccount => "DeployStarkNetAccount",
        }
    }

    /// Payload variant this kind carries.
    pub fn shape(self) -> PayloadShape {
        match self {
            Self::Delay => PayloadShape::Delay,
            Self::Mock => PayloadShape::Mock,
            Self::OkexBinance => PayloadShape::Mock,
            Self::OkexDeposit => PayloadShape::Deposit,
            Self::WithdrawExchange => PayloadShape::Withdraw,
            Self::SnapshotVote => PayloadShape::Vote,
            Self::SyncSwapLP => PayloadShape::Liquidity,
            Self::MerklyMintAndBridgeNFT => PayloadShape::NftBridge,
            Self::DeployStarkNetAccount => PayloadShape::DeployAccount,
            Self::SyncSwap
            | Self::MuteioSwap
            | Self::MaverickSwap
            | Self::SpaceFiSwap
            | Self::VelocoreSwap
            | Self::IzumiSwap
            | Self::VeSyncSwap
            | Self::EzkaliburSwap
            | Self::ZkSwap
            | Self::PancakeSwap
            | Self::TraderJoeSwap
            | Self::Weth
            | Self::SithSwap
            | Self::JediSwap
            | Self::MySwap
            | Self::ProtossSwap
            | Self::Swap10k => PayloadShape::Swap,
            Self::StargateBridge
            | Self::OrbiterBridge
            | Self::TestNetBridgeSwap
            | Self::ZkSyncOfficialBridgeToEthereum
            | Self::ZkSyncOfficialBridgeFromEthereum
            | Self::StarkNetBridge => PayloadShape::Bridge,
        }
    }

    /// Kinds that consume user funds. The runtime environment may widen this
    /// set, see [`crate::billing::BillingPolicy`].
    pub fn is_billable(self) -> bool {
        !matches!(
            self,
            Self::Delay
                | Self::Mock
                | Self::OkexBinance
                | Self::OkexDeposit
                | Self::WithdrawExchange
        )
    }

    /// Kinds executed on StarkNet, which confirms far slower than EVM chains.
    pub fn is_starknet(self) -> bool {
        matches!(
            self,
            Self::SithSwap
                | Self::JediSwap
                | Self::MySwap
                | Self::ProtossSwap
                | Self::Swap10k
                | Self::StarkNetBridge
                | Self::DeployStarkNetAccount
        )
    }

    /// Kinds whose submission carries a slippage tolerance.
    pub fn uses_slippage(self) -> bool {
        match self.shape() {
            PayloadShape::Swap | PayloadShape::Liquidity => true,
            PayloadShape::Bridge => {
                matches!(self, Self::StargateBridge | Self::TestNetBridgeSwap)
            }
            PayloadShape::Delay
            | PayloadShape::Mock
            | PayloadShape::Deposit
            | PayloadShape::Withdraw
            | PayloadShape::Vote
            | PayloadShape::NftBridge
            | PayloadShape::DeployAccount => false,
        }
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskKind {
    type Err = TaskError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| TaskError::UnknownTaskKind(wanted.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PayloadShape {
    Delay,
    Mock,
    Swap,
    Bridge,
    Deposit,
    Withdraw,
    Vote,
    Liquidity,
    NftBridge,
    DeployAccount,
}

impl fmt::Display for PayloadShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Delay => "delay",
            Self::Mock => "mock",
            Self::Swap => "swap",
            Self::Bridge => "bridge",
            Self::Deposit => "deposit",
            Self::Withdraw => "withdraw",
            Self::Vote => "vote",
            Self::Liquidity => "liquidity",
            Self::NftBridge => "nft_bridge",
            Self::DeployAccount => "deploy_account",
        };
        f.write_str(label)
    }
}

/// Status state machine: `Ready -> Running -> {Retry | Done | Error}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Ready,
    Running,
    /// Re-entered like `Ready`.
    Retry,
    Done,
    Error,
}

impl Status {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Error)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ready => "ready",
            Self::Running => "running",
            Self::Retry => "retry",
            Self::Done => "done",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How much of the source token to spend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AmountSpec {
    /// Exact amount in wei.
    Absolute(#[serde(with = "wei_string")] Wei),
    /// Share of the live balance, `0 < percent <= 100`.
    Percent(Decimal),
}

/// On-chain footprint of a task once it has submitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxRecord {
    pub tx_id: String,
    #[serde(default)]
    pub approve_tx_id: Option<String>,
    #[serde(default)]
    pub gas: Option<GasPlan>,
    #[serde(default)]
    pub completed: bool,
    pub submitted_at: DateTime<Utc>,
}

impl TxRecord {
    pub fn new(tx_id: impl Into<String>, approve_tx_id: Option<String>, gas: GasPlan) -> Self {
        Self {
            tx_id: tx_id.into(),
            approve_tx_id,
            gas: Some(gas),
            completed: false,
            submitted_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwapParams {
    pub network: Network,
    pub from_token: Token,
    pub to_token: Token,
    pub amount: AmountSpec,
    #[serde(default)]
    pub tx: Option<TxRecord>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgeParams {
    pub from_network: Network,
    pub to_network: Network,
    pub from_token: Token,
    pub to_token: Token,
    pub amount: AmountSpec,
    #[serde(default)]
    pub tx: Option<TxRecord>,
}

/// Transfer to an exchange deposit address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepositParams {
    pub network: Network,
    pub token: Token,
    pub amount: AmountSpec,
    pub address: String,
    #[serde(default)]
    pub tx: Option<TxRecord>,
}

/// Exchange withdrawal into the profile's wallet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithdrawParams {
    pub network: Network,
    pub exchange: String,
    pub token: Token,
    #[serde(with = "wei_string")]
    pub amount: Wei,
    #[serde(default)]
    pub tx: Option<TxRecord>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteParams {
    pub network: Network,
    pub space: String,
    pub proposal: String,
    pub choice: u32,
    /// Receipt id of the cast vote.
    #[serde(default)]
    pub receipt: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiquidityParams {
    pub network: Network,
    pub token_a: Token,
    pub token_b: Token,
    /// `false` withdraws from the pool.
    pub add: bool,
    pub amount: AmountSpec,
    #[serde(default)]
    pub tx: Option<TxRecord>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NftBridgeParams {
    pub from_network: Network,
    pub to_network: Network,
    #[serde(default)]
    pub tx: Option<TxRecord>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeployAccountParams {
    pub network: Network,
    #[serde(default)]
    pub tx: Option<TxRecord>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelayRange {
    pub min_secs: u64,
    pub max_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelayParams {
    pub duration_secs: u64,
    /// When set, the wait is drawn uniformly from the range instead.
    #[serde(default)]
    pub random: Option<DelayRange>,
    /// Fixed on first run so retries resume the same wait.
    #[serde(default)]
    pub wait_until: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MockParams {}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskPayload {
    Delay(DelayParams),
    Mock(MockParams),
    Swap(SwapParams),
    Bridge(BridgeParams),
    Deposit(DepositParams),
    Withdraw(WithdrawParams),
    Vote(VoteParams),
    Liquidity(LiquidityParams),
    NftBridge(NftBridgeParams),
    DeployAccount(DeployAccountParams),
}

impl TaskPayload {
    pub fn shape(&self) -> PayloadShape {
        match self {
            Self::Delay(_) => PayloadShape::Delay,
            Self::Mock(_) => PayloadShape::Mock,
            Self::Swap(_) => PayloadShape::Swap,
            Self::Bridge(_) => PayloadShape::Bridge,
            Self::Deposit(_) => PayloadShape::Deposit,
            Self::Withdraw(_) => PayloadShape::Withdraw,
            Self::Vote(_) => PayloadShape::Vote,
            Self::Liquidity(_) => PayloadShape::Liquidity,
            Self::NftBridge(_) => PayloadShape::NftBridge,
            Self::DeployAccount(_) => PayloadShape::DeployAccount,
        }
    }
}

/// Typed access to one payload variant.
pub trait TaskParams: Sized {
    const SHAPE: PayloadShape;

    fn from_payload(payload: &TaskPayload) -> Option<&Self>;

    fn from_payload_mut(payload: &mut TaskPayload) -> Option<&mut Self>;
}

macro_rules! task_params {
    ($($params:ty => $variant:ident),+ $(,)?) => {
        $(
            impl TaskParams for $params {
                const SHAPE: PayloadShape = PayloadShape::$variant;

                fn from_payload(payload: &TaskPayload) -> Option<&Self> {
                    match payload {
                        TaskPayload::$variant(p) => Some(p),
                        _ => None,
                    }
                }

                fn from_payload_mut(payload: &mut TaskPayload) -> Option<&mut Self> {
                    match payload {
                        TaskPayload::$variant(p) => Some(p),
                        _ => None,
                    }
                }
            }
        )+
    };
}

task_params! {
    DelayParams => Delay,
    MockParams => Mock,
    SwapParams => Swap,
    BridgeParams => Bridge,
    DepositParams => Deposit,
    WithdrawParams => Withdraw,
    VoteParams => Vote,
    LiquidityParams => Liquidity,
    NftBridgeParams => NftBridge,
    DeployAccountParams => DeployAccount,
}

/// Payloads that go through the estimate, execute, confirm lifecycle.
pub trait TxParams: TaskParams + Clone + Send + Sync + 'static {
    fn source_network(&self) -> Network;

    fn destination_network(&self) -> Network;

    fn from_token(&self) -> Token;

    /// Share of the wallet balance to spend. `None` when the operation
    /// spends nothing beyond fees.
    fn amount(&self) -> Option<&AmountSpec>;

    fn tx(&self) -> Option<&TxRecord>;

    fn tx_mut(&mut self) -> &mut Option<TxRecord>;

    fn operation(&self, kind: TaskKind) -> Operation;
}

impl TxParams for SwapParams {
    fn source_network(&self) -> Network {
        self.network
    }

    fn destination_network(&self) -> Network {
        self.network
    }

    fn from_token(&self) -> Token {
        self.from_token
    }

    fn amount(&self) -> Option<&AmountSpec> {
        Some(&self.amount)
    }

    fn tx(&self) -> Option<&TxRecord> {
        self.tx.as_ref()
    }

    fn tx_mut(&mut self) -> &mut Option<TxRecord> {
        &mut self.tx
    }

    fn operation(&self, kind: TaskKind) -> Operation {
        Operation::Swap {
            kind,
            to_token: self.to_token,
        }
    }
}

impl TxParams for BridgeParams {
    fn source_network(&self) -> Network {
        self.from_network
    }

    fn destination_network(&self) -> Network {
        self.to_network
    }

    fn from_token(&self) -> Token {
        self.from_token
    }

    fn amount(&self) -> Option<&AmountSpec> {
        Some(&self.amount)
    }

    fn tx(&self) -> Option<&TxRecord> {
        self.tx.as_ref()
    }

    fn tx_mut(&mut self) -> &mut Option<TxRecord> {
        &mut self.tx
    }

    fn operation(&self, kind: TaskKind) -> Operation {
        Operation::Bridge {
            kind,
            to_network: self.to_network,
            to_token: self.to_token,
        }
    }
}

impl TxParams for DepositParams {
    fn source_network(&self) -> Network {
        self.network
    }

    fn destination_network(&self) -> Network {
        self.network
    }

    fn from_token(&self) -> Token {
        self.token
    }

    fn amount(&self) -> Option<&AmountSpec> {
        Some(&self.amount)
    }

    fn tx(&self) -> Option<&TxRecord> {
        self.tx.as_ref()
    }

    fn tx_mut(&mut self) -> &mut Option<TxRecord> {
        &mut self.tx
    }

    fn operation(&self, _kind: TaskKind) -> Operation {
        Operation::Transfer {
            to_address: self.address.clone(),
        }
    }
}

impl TxParams for WithdrawParams {
    fn source_network(&self) -> Network {
        self.network
    }

    fn destination_network(&self) -> Network {
        self.network
    }

    fn from_token(&self) -> Token {
        self.token
    }

    fn amount(&self) -> Option<&AmountSpec> {
        None
    }

    fn tx(&self) -> Option<&TxRecord> {
        self.tx.as_ref()
    }

    fn tx_mut(&mut self) -> &mut Option<TxRecord> {
        &mut self.tx
    }

    fn operation(&self, _kind: TaskKind) -> Operation {
        Operation::ExchangeWithdraw {
            exchange: self.exchange.clone(),
            token: self.token,
            amount: self.amount,
        }
    }
}

impl TxParams for LiquidityParams {
    fn source_network(&self) -> Network {
        self.network
    }

    fn destination_network(&self) -> Network {
        self.network
    }

    fn from_token(&self) -> Token {
        self.token_a
    }

    fn amount(&self) -> Option<&AmountSpec> {
        Some(&self.amount)
    }

    fn tx(&self) -> Option<&TxRecord> {
        self.tx.as_ref()
    }

    fn tx_mut(&mut self) -> &mut Option<TxRecord> {
        &mut self.tx
    }

    fn operation(&self, kind: TaskKind) -> Operation {
        Operation::Liquidity {
            kind,
            pair_token: self.token_b,
            add: self.add,
        }
    }
}

impl TxParams for NftBridgeParams {
    fn source_network(&self) -> Network {
        self.from_network
    }

    fn destination_network(&self) -> Network {
        self.to_network
    }

    fn from_token(&self) -> Token {
        self.from_network.native_token()
    }

    fn amount(&self) -> Option<&AmountSpec> {
        None
    }

    fn tx(&self) -> Option<&TxRecord> {
        self.tx.as_ref()
    }

    fn tx_mut(&mut self) -> &mut Option<TxRecord> {
        &mut self.tx
    }

    fn operation(&self, kind: TaskKind) -> Operation {
        Operation::MintAndBridgeNft {
            kind,
            to_network: self.to_network,
        }
    }
}

impl TxParams for DeployAccountParams {
    fn source_network(&self) -> Network {
        self.network
    }

    fn destination_network(&self) -> Network {
        self.network
    }

    fn from_token(&self) -> Token {
        self.network.native_token()
    }

    fn amount(&self) -> Option<&AmountSpec> {
        None
    }

    fn tx(&self) -> Option<&TxRecord> {
        self.tx.as_ref()
    }

    fn tx_mut(&mut self) -> &mut Option<TxRecord> {
        &mut self.tx
    }

    fn operation(&self, _kind: TaskKind) -> Operation {
        Operation::DeployAccount
    }
}

/// A task kind paired with a payload of the matching shape.
///
/// The pairing is checked on construction and on deserialization, so code
/// holding a `Task` never sees a kind whose payload is the wrong variant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawTask", into = "RawTask")]
pub struct Task {
    kind: TaskKind,
    payload: TaskPayload,
}

#[derive(Serialize, Deserialize)]
struct RawTask {
    kind: TaskKind,
    payload: TaskPayload,
}

impl TryFrom<RawTask> for Task {
    type Error = TaskError;

    fn try_from(raw: RawTask) -> Result<Self, Self::Error> {
        Task::new(raw.kind, raw.payload)
    }
}

impl From<Task> for RawTask {
    fn from(task: Task) -> Self {
        Self {
            kind: task.kind,
            payload: task.payload,
        }
    }
}

impl Task {
    pub fn new(kind: TaskKind, payload: TaskPayload) -> Result<Self, TaskError> {
        if kind.shape() != payload.shape() {
            return Err(TaskError::PayloadMismatch {
                kind,
                expected: kind.shape(),
                found: payload.shape(),
            });
        }
        Ok(Self { kind, payload })
    }

    pub fn kind(&self) -> TaskKind {
        self.kind
    }

    pub fn payload(&self) -> &TaskPayload {
        &self.payload
    }

    /// Borrow the payload as `P`, failing if this kind carries another shape.
    pub fn params<P: TaskParams>(&self) -> Result<&P, TaskError> {
        P::from_payload(&self.payload).ok_or(TaskError::PayloadMismatch {
            kind: self.kind,
            expected: P::SHAPE,
            found: self.payload.shape(),
        })
    }

    pub fn params_mut<P: TaskParams>(&mut self) -> Result<&mut P, TaskError> {
        let kind = self.kind;
        let found = self.payload.shape();
        P::from_payload_mut(&mut self.payload).ok_or(TaskError::PayloadMismatch {
            kind,
            expected: P::SHAPE,
            found,
        })
    }
}

/// The persisted unit of work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessTask {
    pub id: Uuid,
    pub process_id: Uuid,
    pub profile_id: Uuid,
    pub user_id: String,
    pub task: Task,
    pub status: Status,
    #[serde(default)]
    pub error: Option<String>,
    /// Canonical rendering of `task`, refreshed on every update.
    #[serde(default)]
    pub description: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ProcessTask {
    /// A fresh `Ready` task with its description already rendered.
    pub fn new(
        process_id: Uuid,
        profile_id: Uuid,
        user_id: impl Into<String>,
        task: Task,
    ) -> Result<Self, TaskError> {
        let now = Utc::now();
        let description = super::registry::describe_task(&task)?;
        Ok(Self {
            id: Uuid::new_v4(),
            process_id,
            profile_id,
            user_id: user_id.into(),
            task,
            status: Status::Ready,
            error: None,
            description,
            created_at: now,
            updated_at: now,
        })
    }
}
