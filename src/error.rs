//! Error types for Chainflow.

use std::time::Duration;

use uuid::Uuid;

use crate::chain::{Network, Wei};
use crate::profile::SettingsSource;
use crate::task::{PayloadShape, TaskKind};

/// Top-level error type for the binary and library entry points.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Task error: {0}")]
    Task(#[from] TaskError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Persistence errors surfaced by a [`crate::db::ProcessStore`].
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },
}

/// Failures reported by a chain client or connector.
#[derive(Debug, thiserror::Error)]
pub enum ChainError {
    #[error("RPC call on {network} failed: {reason}")]
    Rpc { network: Network, reason: String },

    #[error("{operation} is not supported on {network}")]
    Unsupported { network: Network, operation: String },
}

/// Failures of the external funds service.
#[derive(Debug, thiserror::Error)]
pub enum BillingError {
    #[error("Funds service unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, thiserror::Error)]
pub enum ProfileError {
    #[error("Profile {id} not found")]
    NotFound { id: Uuid },

    #[error("No {network} settings for user {user_id}")]
    NetworkSettingsMissing { user_id: String, network: Network },
}

/// Everything that can end or interrupt a task invocation.
#[derive(Debug, thiserror::Error)]
pub enum TaskError {
    #[error("user has no balance")]
    NoBalance,

    #[error("insufficient balance: requested {requested} wei, available {available} wei")]
    InsufficientBalance { requested: Wei, available: Wei },

    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    #[error("transaction is not ready")]
    TransactionNotReady,

    #[error("delay is still pending")]
    DelayPending,

    #[error("unknown task kind: {0}")]
    UnknownTaskKind(String),

    #[error("duplicate executor registered for {0}")]
    DuplicateExecutor(TaskKind),

    #[error("payload mismatch for {kind}: expected {expected} payload, found {found}")]
    PayloadMismatch {
        kind: TaskKind,
        expected: PayloadShape,
        found: PayloadShape,
    },

    #[error("task panic: {0}")]
    ExecutionFault(String),

    #[error("task deadline of {0:?} exceeded")]
    DeadlineExceeded(Duration),

    #[error("task cancelled")]
    Cancelled,

    #[error("task {0} is already running")]
    AlreadyRunning(Uuid),

    #[error("transaction {tx_id} failed: {reason}")]
    TransactionFailed { tx_id: String, reason: String },

    #[error("unsupported network pair {from_network} -> {to_network}")]
    UnsupportedNetwork {
        from_network: Network,
        to_network: Network,
    },

    #[error("no slippage configured for {kind} with {settings_source} settings")]
    UnsupportedSlippage {
        kind: TaskKind,
        settings_source: SettingsSource,
    },

    #[error("gas plan fee {fee} wei exceeds limit {limit} wei")]
    GasLimitExceeded { fee: Wei, limit: Wei },

    #[error("chain error: {0}")]
    Chain(#[from] ChainError),

    #[error("database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("billing error: {0}")]
    Billing(#[from] BillingError),

    #[error("profile error: {0}")]
    Profile(#[from] ProfileError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl TaskError {
    /// Conditions that leave the task as last persisted and ask the caller
    /// to reschedule.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::TransactionNotReady | Self::DelayPending)
    }

    /// Stable machine-readable code for status consumers.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NoBalance => "billing.no_balance",
            Self::InsufficientBalance { .. } => "amount.insufficient_balance",
            Self::InvalidAmount(_) => "amount.invalid",
            Self::TransactionNotReady => "tx.not_ready",
            Self::DelayPending => "delay.pending",
            Self::UnknownTaskKind(_) => "registry.unknown_kind",
            Self::DuplicateExecutor(_) => "registry.duplicate_executor",
            Self::PayloadMismatch { .. } => "registry.payload_mismatch",
            Self::ExecutionFault(_) => "runtime.panic",
            Self::DeadlineExceeded(_) => "runtime.deadline_exceeded",
            Self::Cancelled => "runtime.cancelled",
            Self::AlreadyRunning(_) => "runtime.already_running",
            Self::TransactionFailed { .. } => "tx.failed",
            Self::UnsupportedNetwork { .. } => "gas.unsupported_network",
            Self::UnsupportedSlippage { .. } => "gas.unsupported_slippage",
            Self::GasLimitExceeded { .. } => "gas.limit_exceeded",
            Self::Chain(_) => "chain.error",
            Self::Database(_) => "db.error",
            Self::Billing(_) => "billing.error",
            Self::Profile(_) => "profile.error",
            Self::Serialization(_) => "serialization.error",
        }
    }
}

/// Result type alias for the crate.
pub type Result<T> = std::result::Result<T, Error>;
